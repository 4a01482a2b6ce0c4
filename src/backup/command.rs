// dbdump/src/backup/command.rs
//! Launching dump programs and waiting on them.
//!
//! The dump program's stdout is the payload; its stderr goes straight to our
//! stderr so the operator sees the tool's own messages live.

use std::collections::BTreeMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{DumpError, Result};

/// Environment handed to a dump program: a base snapshot plus overrides.
///
/// Never mutated in place; `with_var` returns a new overlay.
#[derive(Clone, Default)]
pub struct EnvOverlay {
    base: BTreeMap<OsString, OsString>,
    overrides: BTreeMap<OsString, OsString>,
}

impl EnvOverlay {
    /// Snapshot of the current process environment.
    pub fn inherited() -> Self {
        Self {
            base: env::vars_os().collect(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_var(&self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        let mut next = self.clone();
        next.overrides.insert(key.into(), value.into());
        next
    }

    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        let key = key.as_ref();
        self.overrides
            .get(key)
            .or_else(|| self.base.get(key))
            .map(OsString::as_os_str)
    }

    /// Merged view, overrides win.
    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.base
            .iter()
            .filter(|(key, _)| !self.overrides.contains_key(*key))
            .chain(self.overrides.iter())
            .map(|(key, value)| (key.as_os_str(), value.as_os_str()))
    }
}

impl fmt::Debug for EnvOverlay {
    // Override values are credentials more often than not.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted: Vec<String> = self
            .overrides
            .keys()
            .map(|key| format!("{}=***", key.to_string_lossy()))
            .collect();
        f.debug_struct("EnvOverlay")
            .field("base_vars", &self.base.len())
            .field("overrides", &redacted)
            .finish()
    }
}

/// Everything needed to run one dump: what to run and where the output goes.
#[derive(Debug, Clone)]
pub struct DumpRequest {
    program: String,
    args: Vec<String>,
    env: EnvOverlay,
    destination: PathBuf,
}

impl DumpRequest {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        env: EnvOverlay,
        destination: impl Into<PathBuf>,
    ) -> Result<Self> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(DumpError::InvalidRequest("program name is empty".to_string()));
        }
        Ok(Self {
            program,
            args,
            env,
            destination: destination.into(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &EnvOverlay {
        &self.env
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

/// `$ program arg1 arg2`, the line echoed before every launch.
pub fn trace_line(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        format!("$ {}", program)
    } else {
        format!("$ {} {}", program, args.join(" "))
    }
}

pub fn trace(program: &str, args: &[String]) {
    println!("{}", trace_line(program, args));
}

/// Locates the dump program on the request's `PATH`, falling back to ours.
pub fn resolve_program(request: &DumpRequest) -> Result<PathBuf> {
    let search_path = request
        .env()
        .get("PATH")
        .map(OsStr::to_os_string)
        .or_else(|| env::var_os("PATH"));
    let cwd = env::current_dir().map_err(|e| DumpError::ToolUnavailable {
        program: request.program().to_string(),
        detail: format!("cannot determine working directory: {}", e),
    })?;

    which::which_in(request.program(), search_path, cwd).map_err(|e| {
        DumpError::ToolUnavailable {
            program: request.program().to_string(),
            detail: format!("executable not found in PATH ({})", e),
        }
    })
}

fn base_command(executable: &Path, args: &[String], env: &EnvOverlay) -> Command {
    let mut cmd = Command::new(executable);
    cmd.args(args)
        .env_clear()
        .envs(env.iter())
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}

/// Runs `<program> --version` to completion before the real dump.
///
/// Returns the resolved executable so the dump itself launches the same binary.
/// `timeout` bounds this check on its own; the dump run gets a fresh deadline.
pub async fn preflight(
    request: &DumpRequest,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let executable = resolve_program(request)?;
    let args = vec!["--version".to_string()];

    trace(request.program(), &args);
    let mut cmd = base_command(&executable, &args, request.env());
    cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());

    let mut child = cmd.spawn().map_err(|e| DumpError::ToolUnavailable {
        program: request.program().to_string(),
        detail: format!("failed to run --version: {}", e),
    })?;

    let status = tokio::select! {
        status = child.wait() => status.map_err(|source| DumpError::Wait {
            program: request.program().to_string(),
            source,
        })?,
        _ = cancel.cancelled() => {
            terminate(&mut child, request.program()).await;
            return Err(DumpError::Cancelled { program: request.program().to_string() });
        }
        _ = deadline(timeout) => {
            warn!(program = request.program(), ?timeout, "version check timed out; killing it");
            terminate(&mut child, request.program()).await;
            return Err(DumpError::TimedOut {
                program: request.program().to_string(),
                after: timeout.unwrap_or_default(),
            });
        }
    };

    if !status.success() {
        return Err(DumpError::ToolUnavailable {
            program: request.program().to_string(),
            detail: format!("`{} --version` exited with {}", request.program(), status),
        });
    }
    debug!(program = request.program(), path = %executable.display(), "preflight passed");
    Ok(executable)
}

/// Starts the dump program with its stdout captured for streaming.
pub fn spawn(request: &DumpRequest, executable: &Path) -> Result<RunningProcess> {
    trace(request.program(), request.args());
    let mut cmd = base_command(executable, request.args(), request.env());
    cmd.stdout(Stdio::piped()).stderr(Stdio::inherit());

    let mut child = cmd.spawn().map_err(|source| DumpError::Spawn {
        program: request.program().to_string(),
        source,
    })?;
    let stdout = child.stdout.take().ok_or_else(|| DumpError::Spawn {
        program: request.program().to_string(),
        source: io::Error::other("stdout was not captured"),
    })?;

    info!(program = request.program(), pid = ?child.id(), "dump process started");
    Ok(RunningProcess {
        program: request.program().to_string(),
        child,
        stdout,
    })
}

/// A dump program that has been started and not yet waited on.
#[derive(Debug)]
pub struct RunningProcess {
    program: String,
    child: Child,
    stdout: ChildStdout,
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Forwards stdout into `pipe` and waits for the process to exit.
    ///
    /// `pipe` is dropped (closing its write end) only after the process has
    /// exited or been killed, on every path. That drop is what the reading
    /// side observes as end-of-data.
    pub async fn forward_and_wait<W>(
        self,
        mut pipe: W,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let RunningProcess {
            program,
            mut child,
            stdout,
        } = self;

        let outcome = tokio::select! {
            (forwarded, status) = pump(&mut child, stdout, &mut pipe) => {
                settle_exit(&program, forwarded, status)
            }
            _ = cancel.cancelled() => {
                warn!(program = %program, "cancellation requested; killing dump process");
                terminate(&mut child, &program).await;
                Err(DumpError::Cancelled { program: program.clone() })
            }
            _ = deadline(timeout) => {
                warn!(program = %program, ?timeout, "dump timed out; killing dump process");
                terminate(&mut child, &program).await;
                Err(DumpError::TimedOut {
                    program: program.clone(),
                    after: timeout.unwrap_or_default(),
                })
            }
        };

        drop(pipe);
        outcome
    }
}

/// Resolves after `timeout`, or never.
async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending::<()>().await,
    }
}

async fn pump<W>(
    child: &mut Child,
    stdout: ChildStdout,
    pipe: &mut W,
) -> (io::Result<u64>, io::Result<ExitStatus>)
where
    W: AsyncWrite + Unpin,
{
    let forward = async {
        let mut stdout = stdout;
        let copied = tokio::io::copy(&mut stdout, pipe).await;
        // A failed forward must not leave the child blocked on a full pipe.
        drop(stdout);
        copied
    };
    tokio::join!(forward, child.wait())
}

fn settle_exit(
    program: &str,
    forwarded: io::Result<u64>,
    status: io::Result<ExitStatus>,
) -> Result<()> {
    let status = status.map_err(|source| DumpError::Wait {
        program: program.to_string(),
        source,
    })?;
    info!(program, exit_status = %status, "dump process exited");

    if !status.success() {
        return Err(DumpError::ProcessExit {
            program: program.to_string(),
            status,
        });
    }
    let forwarded = forwarded.map_err(|source| DumpError::OutputRead {
        program: program.to_string(),
        source,
    })?;
    debug!(program, bytes = forwarded, "dump output forwarded");
    Ok(())
}

async fn terminate(child: &mut Child, program: &str) {
    if let Err(e) = child.kill().await {
        warn!(program, error = %e, "failed to kill dump process");
    }
}
