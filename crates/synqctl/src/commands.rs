//! Command execution against the activity store

use anyhow::{Context, Result};
use chrono::Local;
use tracing::debug;

use synq_common::config::SynqConfig;
use synq_common::{
    parse_client_timestamp, ActivityStore, ActivityWindow, DeviceRegistration, NewSample,
    COLLECTOR_TIMESTAMP_FORMAT,
};

use crate::cli::WindowArgs;

/// Everything a command needs: the store plus the settings it was built from
pub struct Session {
    pub store: ActivityStore,
    pub config: SynqConfig,
    pub json: bool,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn register(
    ctx: &Session,
    id: Option<String>,
    name: String,
    device_type: String,
) -> Result<()> {
    // Agents without an id get a fresh one; the store never invents ids
    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let id = ctx
        .store
        .register_device(&DeviceRegistration::new(id, name, device_type))?;

    if ctx.json {
        print_json(&serde_json::json!({ "status": "ok", "device_id": id }))
    } else {
        println!("Registered device {}", id);
        Ok(())
    }
}

pub fn record(
    ctx: &Session,
    device: String,
    timestamp: Option<String>,
    window: String,
) -> Result<()> {
    let timestamp = match timestamp {
        Some(raw) => parse_client_timestamp(&raw)?,
        None => Local::now().naive_local(),
    };
    let sample = ctx
        .store
        .record_sample(&NewSample::new(device, timestamp, window))
        .context("Failed to record sample")?;

    if ctx.json {
        print_json(&sample)
    } else {
        println!(
            "Recorded sample {} for {} at {}",
            sample.id,
            sample.device_id,
            sample.timestamp.format(COLLECTOR_TIMESTAMP_FORMAT)
        );
        Ok(())
    }
}

pub fn devices(ctx: &Session) -> Result<()> {
    let devices = ctx.store.list_devices()?;
    if ctx.json {
        return print_json(&devices);
    }

    if devices.is_empty() {
        println!("No devices registered");
        return Ok(());
    }
    println!("{:<38} {:<20} {:<10} {}", "ID", "NAME", "TYPE", "LAST SEEN");
    for device in devices {
        println!(
            "{:<38} {:<20} {:<10} {}",
            device.id,
            device.device_name,
            device.device_type,
            device.last_seen.with_timezone(&Local).format(COLLECTOR_TIMESTAMP_FORMAT)
        );
    }
    Ok(())
}

pub fn samples(ctx: &Session, device: Option<String>, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or(ctx.config.dashboard.recent_limit);
    let samples = ctx.store.list_samples(device.as_deref(), limit)?;
    if ctx.json {
        return print_json(&samples);
    }

    for sample in samples {
        let label = if sample.active_window.is_empty() {
            synq_common::UNKNOWN_LABEL
        } else {
            sample.active_window.as_str()
        };
        println!(
            "#{:<8} {} {:<20} {}",
            sample.id,
            sample.timestamp.format(COLLECTOR_TIMESTAMP_FORMAT),
            sample.device_id,
            label
        );
    }
    Ok(())
}

/// Resolve the window flags; today when none are given
pub fn resolve_window(args: &WindowArgs) -> Result<ActivityWindow> {
    match (&args.from, &args.to, args.days) {
        (Some(from), Some(to), _) => Ok(ActivityWindow::new(
            parse_client_timestamp(from)?,
            parse_client_timestamp(to)?,
        )?),
        (_, _, Some(days)) => Ok(ActivityWindow::last_days(days, Local::now().naive_local())?),
        _ => Ok(ActivityWindow::today()),
    }
}

pub fn activity(ctx: &Session, device: Option<String>, window: &WindowArgs) -> Result<()> {
    let window = resolve_window(window)?;
    let interval = ctx.config.dashboard.effective_sample_interval();
    debug!("Aggregating {} .. {} every {}s", window.start, window.end, interval);

    let summary = ctx
        .store
        .activity_summary(device.as_deref(), &window, interval)?;
    if ctx.json {
        return print_json(&summary);
    }

    println!(
        "Activity {} .. {} ({} samples, {})",
        window.start.format(COLLECTOR_TIMESTAMP_FORMAT),
        window.end.format(COLLECTOR_TIMESTAMP_FORMAT),
        summary.total_samples,
        summary.total_elapsed.short()
    );
    if summary.is_empty() {
        println!("No activity recorded");
        return Ok(());
    }
    for share in &summary.shares {
        println!(
            "{:>7.2}%  {:>8}  {}",
            share.percentage,
            share.elapsed.short(),
            share.label
        );
    }
    Ok(())
}
