//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use synq_common::BackendKind;

/// Synq control - register devices, ingest samples and query activity
#[derive(Parser)]
#[command(name = "synqctl")]
#[command(about = "Synq - per-device active window tracking", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to /etc/synq/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured backend
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendArg>,

    /// Output JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Relational,
    Remote,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Relational => BackendKind::Relational,
            BackendArg::Remote => BackendKind::Remote,
        }
    }
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Register a device or refresh its name and type
    Register {
        /// Device id (a new one is generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Display name
        #[arg(long)]
        name: String,

        /// Device category, e.g. laptop or desktop
        #[arg(long = "type", default_value = "unknown")]
        device_type: String,
    },

    /// Record one active-window sample for a registered device
    Record {
        #[arg(long)]
        device: String,

        /// Client timestamp (defaults to now, local time)
        #[arg(long)]
        timestamp: Option<String>,

        /// Active window title; may be empty
        #[arg(long, default_value = "")]
        window: String,
    },

    /// List devices, most recently active first
    Devices,

    /// Show the most recent samples
    Samples {
        #[arg(long)]
        device: Option<String>,

        /// Maximum rows (defaults to the configured recent_limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Time spent per application over a window (today by default)
    Activity {
        #[arg(long)]
        device: Option<String>,

        #[command(flatten)]
        window: WindowArgs,
    },
}

#[derive(Args)]
pub struct WindowArgs {
    /// Whole days ending tonight at midnight
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub days: Option<u32>,

    /// Window start (inclusive)
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// Window end (exclusive)
    #[arg(long, requires = "from")]
    pub to: Option<String>,
}
