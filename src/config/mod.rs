// dbdump/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backup::archive::DEFAULT_COMPRESSION_LEVEL;
use crate::backup::db_dump::{DumpTarget, Engine};
use crate::backup::pipeline::PipelineOptions;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_BACKUP_DIR: &str = "./backups";

// Struct for deserializing config.json. Every field is optional so the same
// shape can carry environment and CLI overrides.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RawJsonConfig {
    pub driver: Option<String>,
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub opts: Option<String>,
    pub dump_name: Option<PathBuf>,
    pub local_backup_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub compression_level: Option<u32>,
    pub remove_partial_on_failure: Option<bool>,
}

impl RawJsonConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })
    }

    /// Reads overrides from environment variables through `lookup`.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(RawJsonConfig {
            driver: var("DATABASE_DRIVER"),
            host: var("DATABASE_HOST"),
            username: var("DATABASE_USERNAME"),
            password: var("DATABASE_PASSWORD"),
            name: var("DATABASE_NAME"),
            opts: var("DATABASE_OPTS"),
            dump_name: var("DUMP_NAME").map(PathBuf::from),
            local_backup_dir: var("LOCAL_BACKUP_DIR").map(PathBuf::from),
            timeout_secs: var("DUMP_TIMEOUT_SECS")
                .map(|v| v.trim().parse())
                .transpose()
                .context("DUMP_TIMEOUT_SECS must be a whole number of seconds")?,
            compression_level: var("COMPRESSION_LEVEL")
                .map(|v| v.trim().parse())
                .transpose()
                .context("COMPRESSION_LEVEL must be a number between 0 and 9")?,
            remove_partial_on_failure: var("REMOVE_PARTIAL_ON_FAILURE")
                .map(|v| parse_bool(&v))
                .transpose()
                .context("REMOVE_PARTIAL_ON_FAILURE must be true or false")?,
        })
    }

    /// Field-wise merge where values set in `higher` win.
    pub fn overlay(self, higher: RawJsonConfig) -> RawJsonConfig {
        RawJsonConfig {
            driver: higher.driver.or(self.driver),
            host: higher.host.or(self.host),
            username: higher.username.or(self.username),
            password: higher.password.or(self.password),
            name: higher.name.or(self.name),
            opts: higher.opts.or(self.opts),
            dump_name: higher.dump_name.or(self.dump_name),
            local_backup_dir: higher.local_backup_dir.or(self.local_backup_dir),
            timeout_secs: higher.timeout_secs.or(self.timeout_secs),
            compression_level: higher.compression_level.or(self.compression_level),
            remove_partial_on_failure: higher
                .remove_partial_on_failure
                .or(self.remove_partial_on_failure),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("'{}' is not a boolean", other)),
    }
}

// Application's validated configuration
#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub target: DumpTarget,
    /// Explicit output path; when unset a timestamped name under `local_backup_dir` is used.
    pub dump_name: Option<PathBuf>,
    pub local_backup_dir: PathBuf,
    pub pipeline: PipelineOptions,
}

impl DumpConfig {
    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let engine: Engine = raw
            .driver
            .as_deref()
            .context("driver must be set (config.json, DATABASE_DRIVER or --driver)")?
            .parse()?;

        let compression_level = raw.compression_level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        if compression_level > 9 {
            return Err(anyhow::anyhow!(
                "compression_level must be between 0 and 9, got {}",
                compression_level
            ));
        }

        let timeout = match raw.timeout_secs {
            Some(0) => return Err(anyhow::anyhow!("timeout_secs must be greater than zero")),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        if let Some(dump_name) = &raw.dump_name {
            if dump_name.as_os_str().is_empty() {
                return Err(anyhow::anyhow!("dump_name cannot be empty."));
            }
        }

        Ok(DumpConfig {
            target: DumpTarget {
                engine,
                host: raw.host.unwrap_or_default(),
                username: raw.username.unwrap_or_default(),
                password: raw.password.unwrap_or_default(),
                name: raw.name.unwrap_or_default(),
                opts: raw.opts.unwrap_or_default(),
            },
            dump_name: raw.dump_name,
            local_backup_dir: raw
                .local_backup_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR)),
            pipeline: PipelineOptions {
                compression_level,
                timeout,
                remove_partial_on_failure: raw.remove_partial_on_failure.unwrap_or(false),
            },
        })
    }
}

/// Builds the configuration from config file, environment and CLI, in rising priority.
///
/// A missing file is only an error when its path was given explicitly.
pub fn load(config_path: Option<&Path>, cli_overrides: RawJsonConfig) -> Result<DumpConfig> {
    let file_config = match config_path {
        Some(path) => RawJsonConfig::load_from_json(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                RawJsonConfig::load_from_json(default_path)?
            } else {
                RawJsonConfig::default()
            }
        }
    };
    let env_config = RawJsonConfig::from_env_with(|key| std::env::var(key).ok())?;

    DumpConfig::from_raw(file_config.overlay(env_config).overlay(cli_overrides))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_load_from_json() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{
                "driver": "postgres",
                "host": "db:5433",
                "username": "app",
                "name": "orders",
                "timeout_secs": 600
            }}"#
        )?;

        let raw = RawJsonConfig::load_from_json(file.path())?;
        assert_eq!(raw.driver.as_deref(), Some("postgres"));
        assert_eq!(raw.timeout_secs, Some(600));
        assert_eq!(raw.password, None);

        let config = DumpConfig::from_raw(raw)?;
        assert_eq!(config.target.engine, Engine::Postgres);
        assert_eq!(config.pipeline.timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.pipeline.compression_level, DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(config.local_backup_dir, PathBuf::from(DEFAULT_BACKUP_DIR));
        Ok(())
    }

    #[test]
    fn test_unknown_json_field_is_rejected() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{ "driver": "mysql", "databse": "typo" }}"#)?;
        assert!(RawJsonConfig::load_from_json(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> anyhow::Result<()> {
        let raw = RawJsonConfig::from_env_with(env_of(&[
            ("DATABASE_DRIVER", "mysql"),
            ("DATABASE_PASSWORD", "s3cret"),
            ("DATABASE_HOST", "   "),
            ("COMPRESSION_LEVEL", "9"),
            ("REMOVE_PARTIAL_ON_FAILURE", "yes"),
        ]))?;

        assert_eq!(raw.driver.as_deref(), Some("mysql"));
        assert_eq!(raw.password.as_deref(), Some("s3cret"));
        assert_eq!(raw.host, None);
        assert_eq!(raw.compression_level, Some(9));
        assert_eq!(raw.remove_partial_on_failure, Some(true));
        Ok(())
    }

    #[test]
    fn test_env_rejects_bad_numbers() {
        assert!(RawJsonConfig::from_env_with(env_of(&[("DUMP_TIMEOUT_SECS", "soon")])).is_err());
        assert!(RawJsonConfig::from_env_with(env_of(&[("REMOVE_PARTIAL_ON_FAILURE", "maybe")])).is_err());
    }

    #[test]
    fn test_overlay_priority() {
        let file = RawJsonConfig {
            driver: Some("postgres".to_string()),
            host: Some("file-host".to_string()),
            name: Some("orders".to_string()),
            ..Default::default()
        };
        let env = RawJsonConfig {
            host: Some("env-host".to_string()),
            ..Default::default()
        };
        let cli = RawJsonConfig {
            name: Some("cli-db".to_string()),
            ..Default::default()
        };

        let merged = file.overlay(env).overlay(cli);
        assert_eq!(merged.driver.as_deref(), Some("postgres"));
        assert_eq!(merged.host.as_deref(), Some("env-host"));
        assert_eq!(merged.name.as_deref(), Some("cli-db"));
    }

    #[test]
    fn test_validation_errors() {
        assert!(DumpConfig::from_raw(RawJsonConfig::default()).is_err());

        let bad_level = RawJsonConfig {
            driver: Some("pg".to_string()),
            compression_level: Some(12),
            ..Default::default()
        };
        assert!(DumpConfig::from_raw(bad_level).is_err());

        let zero_timeout = RawJsonConfig {
            driver: Some("pg".to_string()),
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(DumpConfig::from_raw(zero_timeout).is_err());

        let unknown_driver = RawJsonConfig {
            driver: Some("oracle".to_string()),
            ..Default::default()
        };
        assert!(DumpConfig::from_raw(unknown_driver).is_err());
    }

    #[test]
    fn test_explicit_missing_config_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(load(Some(missing.as_path()), RawJsonConfig::default()).is_err());
    }
}
