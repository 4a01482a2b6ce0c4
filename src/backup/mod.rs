pub(crate) mod archive; // gzip sink over the output file
pub(crate) mod command; // launching and waiting on dump programs
pub(crate) mod db_dump; // engine-specific flags and credentials
pub(crate) mod pipeline; // stdout -> gzip streaming

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use std::fs;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::config::DumpConfig;
use command::EnvOverlay;
use pipeline::DumpReport;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// Public entry point for the backup process: one dump of one database.
pub async fn run_backup_flow(config: &DumpConfig, cancel: CancellationToken) -> Result<DumpReport> {
    let destination = prepare_destination(config, Local::now().naive_local())?;
    let program = config.target.engine.program();

    let request = config
        .target
        .clone()
        .into_request(&EnvOverlay::inherited(), destination)?;

    println!("🔍 Checking {} availability...", program);
    let executable = command::preflight(&request, config.pipeline.timeout, &cancel)
        .await
        .with_context(|| format!("{} preflight check failed", program))?;

    println!(
        "🚀 Dumping {} database '{}' to {}",
        config.target.engine,
        config.target.name,
        request.destination().display()
    );
    let report = pipeline::run_pipeline(&request, &executable, &config.pipeline, &cancel)
        .await
        .with_context(|| format!("Dump with {} failed", program))?;

    println!(
        "✓ Wrote {} ({} bytes raw, {} bytes compressed) in {:.1}s",
        report.destination.display(),
        report.bytes_in,
        report.bytes_out,
        report.elapsed.as_secs_f64()
    );
    Ok(report)
}

/// Output path for this run.
///
/// An explicit `dump_name` is used as-is; its directory must already exist.
/// Otherwise a timestamped name is generated and `local_backup_dir` is created.
fn prepare_destination(config: &DumpConfig, now: NaiveDateTime) -> Result<PathBuf> {
    if let Some(dump_name) = &config.dump_name {
        return Ok(dump_name.clone());
    }

    fs::create_dir_all(&config.local_backup_dir).with_context(|| {
        format!(
            "Failed to create local backup directory: {}",
            config.local_backup_dir.display()
        )
    })?;
    Ok(config.local_backup_dir.join(default_dump_name(config, now)))
}

fn default_dump_name(config: &DumpConfig, now: NaiveDateTime) -> String {
    let database = if config.target.name.is_empty() {
        "all"
    } else {
        config.target.name.as_str()
    };
    format!(
        "{}_{}_{}.sql.gz",
        config.target.engine,
        database,
        now.format(TIMESTAMP_FORMAT)
    )
}
