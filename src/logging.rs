// dbdump/src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `DBDUMP_LOG` environment variable (e.g. "info", "debug", "off")
//! 3. default to `info`
//!
//! Logs go to STDERR, next to the dump tool's own stderr. STDOUT carries the
//! command trace lines and the progress messages.

use anyhow::Result;
use clap::ValueEnum;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => filter_for(lvl),
        None => std::env::var("DBDUMP_LOG")
            .ok()
            .and_then(|s| parse_filter(&s))
            .unwrap_or(LevelFilter::INFO),
    };

    fmt()
        .with_max_level(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))?;

    Ok(())
}

// The CLI spells its levels the way `LevelFilter` parses them.
fn filter_for(lvl: LogLevel) -> LevelFilter {
    lvl.to_possible_value()
        .and_then(|value| parse_filter(value.get_name()))
        .unwrap_or(LevelFilter::INFO)
}

fn parse_filter(s: &str) -> Option<LevelFilter> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter(" DEBUG "), Some(LevelFilter::DEBUG));
        assert_eq!(parse_filter("off"), Some(LevelFilter::OFF));
        assert_eq!(parse_filter("  "), None);
        assert_eq!(parse_filter("loud"), None);
    }

    #[test]
    fn test_every_cli_level_maps_to_its_filter() {
        assert_eq!(filter_for(LogLevel::Off), LevelFilter::OFF);
        assert_eq!(filter_for(LogLevel::Error), LevelFilter::ERROR);
        assert_eq!(filter_for(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(filter_for(LogLevel::Info), LevelFilter::INFO);
        assert_eq!(filter_for(LogLevel::Debug), LevelFilter::DEBUG);
        assert_eq!(filter_for(LogLevel::Trace), LevelFilter::TRACE);
    }
}
