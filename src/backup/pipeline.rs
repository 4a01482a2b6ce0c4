// dbdump/src/backup/pipeline.rs
//! Runs one dump program and streams its stdout into a gzip file.
//!
//! Two tasks run per dump and are joined before anything is reported:
//!
//! ```text
//!   child stdout ──▶ forward_and_wait ──▶ in-memory pipe ──▶ copy task ──▶ CompressingSink ──▶ file
//!                    (drops pipe writer
//!                     after child exit)
//! ```
//!
//! The copy task stops only when the pipe reports end-of-data, and that only
//! happens once the wait side has seen the process exit and dropped its end.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::archive::{CompressingSink, DEFAULT_COMPRESSION_LEVEL};
use super::command::{self, DumpRequest};
use crate::errors::{DumpError, Result};

/// Capacity of the in-memory pipe; the forwarder blocks once this is full.
const PIPE_CAPACITY: usize = 64 * 1024;
const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub compression_level: u32,
    /// Kill the dump program and fail once this much time has passed.
    pub timeout: Option<Duration>,
    /// Unlink the output file when the dump fails instead of leaving a partial artifact.
    pub remove_partial_on_failure: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            timeout: None,
            remove_partial_on_failure: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DumpReport {
    pub destination: PathBuf,
    /// Bytes the dump program wrote to stdout.
    pub bytes_in: u64,
    /// Size of the compressed artifact.
    pub bytes_out: u64,
    pub elapsed: Duration,
}

/// Runs `request` with `executable` and writes its gzipped stdout to the request's destination.
///
/// The destination is created before anything is spawned; if that fails no
/// process is started.
pub async fn run_pipeline(
    request: &DumpRequest,
    executable: &Path,
    options: &PipelineOptions,
    cancel: &CancellationToken,
) -> Result<DumpReport> {
    let started = Instant::now();
    let destination = request.destination().to_path_buf();
    let sink = CompressingSink::create(&destination, options.compression_level)?;

    let process = match command::spawn(request, executable) {
        Ok(process) => process,
        Err(err) => {
            discard(sink, options).await;
            return Err(err);
        }
    };
    debug!(pid = ?process.pid(), path = %destination.display(), "streaming dump output");

    let (pipe_writer, pipe_reader) = tokio::io::duplex(PIPE_CAPACITY);
    // Created on the runtime; used from the blocking copy thread.
    let pipe_reader = SyncIoBridge::new(pipe_reader);

    let program = request.program().to_string();
    let copy_task = tokio::task::spawn_blocking(move || {
        let mut sink = sink;
        let mut pipe_reader = pipe_reader;
        let copied = copy_into_sink(&mut pipe_reader, &mut sink, &program);
        (sink, copied)
    });
    let wait_task = tokio::spawn(process.forward_and_wait(
        pipe_writer,
        cancel.clone(),
        options.timeout,
    ));

    let (copied, waited) = tokio::join!(copy_task, wait_task);
    let (sink, copied) = copied?;
    let waited = waited?;

    // The copy side fails first in every case where both fail: a broken sink
    // drops the pipe reader, which is what makes the forwarder (and then the
    // child) fail.
    let outcome = match (copied, waited) {
        (Ok(bytes), Ok(())) => Ok(bytes),
        (Err(err), _) => Err(err),
        (Ok(_), Err(err)) => Err(err),
    };

    match outcome {
        Ok(bytes_in) => {
            let finalized = tokio::task::spawn_blocking(move || sink.finalize()).await?;
            match finalized {
                Ok(bytes_out) => {
                    let report = DumpReport {
                        destination,
                        bytes_in,
                        bytes_out,
                        elapsed: started.elapsed(),
                    };
                    info!(
                        path = %report.destination.display(),
                        bytes_in = report.bytes_in,
                        bytes_out = report.bytes_out,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "dump written"
                    );
                    Ok(report)
                }
                Err(err) => {
                    remove_partial(&destination, options);
                    Err(err)
                }
            }
        }
        Err(err) => {
            warn!(path = %destination.display(), error = %err, "dump failed");
            discard(sink, options).await;
            Err(err)
        }
    }
}

/// Copies until the pipe reports end-of-data.
///
/// Read and write failures are reported separately so the caller can tell a
/// broken stream from a broken disk.
fn copy_into_sink<R: Read>(
    reader: &mut R,
    sink: &mut CompressingSink,
    program: &str,
) -> Result<u64> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(DumpError::OutputRead {
                    program: program.to_string(),
                    source,
                });
            }
        };
        sink.write_all(&buffer[..read])
            .map_err(|source| DumpError::CompressionIo {
                path: sink.path().to_path_buf(),
                source,
            })?;
        total += read as u64;
    }

    debug!(bytes = total, "copy reached end of pipe");
    Ok(total)
}

/// Finalizes a sink that will not be reported as a success.
///
/// The trailer is still written so whatever was copied stays decodable.
async fn discard(sink: CompressingSink, options: &PipelineOptions) {
    let path = sink.path().to_path_buf();
    debug!(path = %path.display(), bytes_in = sink.bytes_in(), "finalizing partial dump");
    match tokio::task::spawn_blocking(move || sink.finalize()).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => warn!(path = %path.display(), error = %err, "failed to finalize partial dump"),
        Err(err) => warn!(path = %path.display(), error = %err, "finalize task did not complete"),
    }
    remove_partial(&path, options);
}

fn remove_partial(path: &Path, options: &PipelineOptions) {
    if !options.remove_partial_on_failure {
        info!(path = %path.display(), "keeping partial dump for inspection");
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "removed partial dump"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial dump"),
    }
}
