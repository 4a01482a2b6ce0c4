// dbdump/src/backup/db_dump.rs
use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::command::{DumpRequest, EnvOverlay};

/// Relational engines whose native dump utility we know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Postgres,
    Mysql,
}

impl Engine {
    pub fn program(self) -> &'static str {
        match self {
            Engine::Postgres => "pg_dump",
            Engine::Mysql => "mysqldump",
        }
    }

    pub fn default_port(self) -> &'static str {
        match self {
            Engine::Postgres => "5432",
            Engine::Mysql => "3306",
        }
    }

    fn port_flag(self) -> &'static str {
        match self {
            Engine::Postgres => "-p",
            Engine::Mysql => "-P",
        }
    }

    fn user_flag(self) -> &'static str {
        match self {
            Engine::Postgres => "-U",
            Engine::Mysql => "-u",
        }
    }

    /// Environment variable the dump tool reads its password from.
    pub fn password_var(self) -> &'static str {
        match self {
            Engine::Postgres => "PGPASSWORD",
            Engine::Mysql => "MYSQL_PWD",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Engine::Postgres => "postgres",
            Engine::Mysql => "mysql",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Engine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Engine::Postgres),
            "mysql" | "mariadb" => Ok(Engine::Mysql),
            other => Err(anyhow::anyhow!(
                "Unsupported database driver '{}'. Expected one of: postgres, mysql.",
                other
            )),
        }
    }
}

/// Connection details for one database dump.
#[derive(Clone, PartialEq, Eq)]
pub struct DumpTarget {
    pub engine: Engine,
    /// `host` or `host:port`.
    pub host: String,
    pub username: String,
    pub password: String,
    pub name: String,
    /// Extra flags passed to the dump tool, whitespace separated.
    pub opts: String,
}

impl fmt::Debug for DumpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpTarget")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("name", &self.name)
            .field("opts", &self.opts)
            .finish()
    }
}

/// Splits `host[:port]`, falling back to `default_port`.
pub fn split_host_port<'a>(host: &'a str, default_port: &'a str) -> (&'a str, &'a str) {
    let mut parts = host.split(':');
    let host = parts.next().unwrap_or_default();
    let port = parts.next().unwrap_or(default_port);
    (host, port)
}

impl DumpTarget {
    /// Command-line flags for the dump tool, in the order the tool receives them.
    ///
    /// The password is never among them; see [`DumpTarget::environment`].
    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        let (host, port) = split_host_port(&self.host, self.engine.default_port());

        if !host.is_empty() {
            flags.extend(["-h".to_string(), host.to_string()]);
        }
        if !port.is_empty() {
            flags.extend([self.engine.port_flag().to_string(), port.to_string()]);
        }
        if !self.username.is_empty() {
            flags.extend([self.engine.user_flag().to_string(), self.username.clone()]);
        }
        flags.extend(self.opts.split_whitespace().map(str::to_string));
        if !self.name.is_empty() {
            flags.push(self.name.clone());
        }
        flags
    }

    /// `base` plus the password variable, if a password is set.
    pub fn environment(&self, base: &EnvOverlay) -> EnvOverlay {
        if self.password.is_empty() {
            base.clone()
        } else {
            base.with_var(self.engine.password_var(), &self.password)
        }
    }

    pub fn into_request(self, base_env: &EnvOverlay, destination: PathBuf) -> Result<DumpRequest> {
        let env = self.environment(base_env);
        DumpRequest::new(self.engine.program(), self.flags(), env, destination)
            .with_context(|| format!("Invalid dump request for {}", self.engine))
    }
}
