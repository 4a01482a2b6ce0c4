// dbdump/src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every connection flag is optional here; anything left unset falls back to
//! the environment and then to `config.json`. The password is deliberately not
//! a flag so it never shows up in process listings.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::RawJsonConfig;

/// Command-line arguments for `dbdump`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dbdump",
    version,
    about = "Dump a database with its native dump tool into a gzip file.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (JSON).
    ///
    /// Default: `config.json` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Database driver: postgres or mysql.
    #[arg(long, value_name = "DRIVER")]
    pub driver: Option<String>,

    /// Database host, optionally with `:port`.
    #[arg(long, value_name = "HOST[:PORT]")]
    pub host: Option<String>,

    #[arg(long, value_name = "USER")]
    pub username: Option<String>,

    /// Name of the database to dump.
    #[arg(long, value_name = "NAME")]
    pub database: Option<String>,

    /// Extra flags passed through to the dump tool.
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    pub opts: Option<String>,

    /// Output file. Its directory must already exist.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Kill the dump tool after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Gzip compression level (0-9).
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u32).range(0..=9))]
    pub level: Option<u32>,

    /// Delete the output file if the dump fails.
    #[arg(long)]
    pub remove_partial: bool,

    /// Logging level (off, error, warn, info, debug, trace).
    ///
    /// If omitted, `DBDUMP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    /// Flags given on the command line, as the highest-priority config layer.
    pub fn overrides(&self) -> RawJsonConfig {
        RawJsonConfig {
            driver: self.driver.clone(),
            host: self.host.clone(),
            username: self.username.clone(),
            password: None,
            name: self.database.clone(),
            opts: self.opts.clone(),
            dump_name: self.output.clone(),
            local_backup_dir: None,
            timeout_secs: self.timeout_secs,
            compression_level: self.level,
            remove_partial_on_failure: self.remove_partial.then_some(true),
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
