//! Database dump tool
//!
//! Runs a database's native dump utility and streams its output into a gzip file.

// dbdump/src/main.rs
mod backup;
mod cli;
mod config;
mod errors;
mod logging;

use anyhow::{Context, Result};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use backup::pipeline::DumpReport;
use errors::DumpError;

/// Main entry point for the dump tool
#[tokio::main]
async fn main() -> ExitCode {
    // Loaded before logging so DBDUMP_LOG can live in .env too.
    dotenv::dotenv().ok();
    let args = cli::parse();

    if let Err(e) = logging::init_logging(args.log_level) {
        eprintln!("❌ Error: {:?}", e);
        return ExitCode::FAILURE;
    }

    match run_app(args).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            exit_code_for(&e)
        }
    }
}

async fn run_app(args: cli::CliArgs) -> Result<DumpReport> {
    let config = config::load(args.config.as_deref(), args.overrides())
        .context("Failed to load dump configuration")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping dump");
            on_interrupt.cancel();
        }
    });

    println!("🚀 Starting Backup Process...");
    backup::run_backup_flow(&config, cancel).await
}

/// Mirrors the dump tool's own exit code when it failed, 1 otherwise.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    let Some(dump_err) = err.downcast_ref::<DumpError>() else {
        return ExitCode::FAILURE;
    };
    if let Some(hint) = dump_err.hint() {
        eprintln!("💡 {}", hint);
    }
    dump_err
        .exit_status()
        .and_then(|status| status.code())
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}
