//! Synq Control - CLI client for the synq activity store
//!
//! Stands in for the ingestion and dashboard callers: registers devices,
//! records samples and prints per-application activity.

mod cli;
mod commands;
mod errors;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::Session;
use synq_common::{ActivityStore, SynqConfig};

/// Load the config and apply overrides. Rejected override values are
/// returned for reporting once logging is up.
fn load_config(cli: &Cli) -> Result<(SynqConfig, Vec<String>)> {
    let mut config = match &cli.config {
        Some(path) => SynqConfig::load_from(path)?,
        None => SynqConfig::load(),
    };
    let rejected = config.apply_env_overrides();
    if let Some(backend) = cli.backend {
        config.store.backend = backend.into();
    }
    Ok((config, rejected))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let (config, rejected) = load_config(&cli)?;
    init_logging(&config.log.level);
    for message in rejected {
        warn!("{}", message);
    }
    info!(
        "synqctl v{} ({} backend)",
        env!("CARGO_PKG_VERSION"),
        config.store.backend.as_str()
    );

    let store = ActivityStore::from_config(&config.store)?;
    let session = Session {
        store,
        config,
        json: cli.json,
    };

    match cli.command {
        Commands::Register {
            id,
            name,
            device_type,
        } => commands::register(&session, id, name, device_type),
        Commands::Record {
            device,
            timestamp,
            window,
        } => commands::record(&session, device, timestamp, window),
        Commands::Devices => commands::devices(&session),
        Commands::Samples { device, limit } => commands::samples(&session, device, limit),
        Commands::Activity { device, window } => commands::activity(&session, device, &window),
    }
}

fn main() {
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(()) => errors::EXIT_SUCCESS,
        Err(e) => {
            match errors::error_code(&e) {
                Some(code) => eprintln!("Error [{}]: {:#}", code, e),
                None => eprintln!("Error: {:#}", e),
            }
            errors::exit_code_for(&e)
        }
    };
    std::process::exit(code);
}
