// dbdump/src/errors.rs
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Failures of a single dump run, split by where they originated.
///
/// Every variant is terminal for the run; nothing in the pipeline retries.
#[derive(Error, Debug)]
pub enum DumpError {
    #[error("Invalid dump request: {0}")]
    InvalidRequest(String),

    #[error("{program} is not available: {detail}")]
    ToolUnavailable { program: String, detail: String },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed: {status}")]
    ProcessExit { program: String, status: ExitStatus },

    #[error("Failed to create dump output file {}: {source}", path.display())]
    DestinationCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write compressed dump to {}: {source}", path.display())]
    CompressionIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read output of {program}: {source}")]
    OutputRead {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("{program} timed out after {}s", after.as_secs_f64())]
    TimedOut { program: String, after: Duration },

    #[error("Dump task failed to complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DumpError {
    /// Exit status of the dump program, when it ran to completion and failed.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            DumpError::ProcessExit { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Hint printed next to the error for failures the operator can fix directly.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            DumpError::ToolUnavailable { .. } => Some(
                "Install the database client tools (pg_dump / mysqldump) and make sure they are in your PATH.",
            ),
            DumpError::DestinationCreate { .. } => {
                Some("Check that the output directory exists and is writable.")
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DumpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_their_origin() {
        let err = DumpError::DestinationCreate {
            path: PathBuf::from("/nope/out.gz"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/nope/out.gz"));
        assert!(err.hint().is_some());

        let err = DumpError::Cancelled {
            program: "pg_dump".to_string(),
        };
        assert_eq!(err.to_string(), "pg_dump was cancelled");
        assert!(err.exit_status().is_none());
        assert!(err.hint().is_none());

        let err = DumpError::InvalidRequest("program name is empty".to_string());
        assert_eq!(err.to_string(), "Invalid dump request: program name is empty");
        assert!(err.hint().is_none());
    }

    #[test]
    fn test_io_errors_are_kept_as_source() {
        use std::error::Error as _;

        let err = DumpError::CompressionIo {
            path: PathBuf::from("out.gz"),
            source: io::Error::new(io::ErrorKind::StorageFull, "disk full"),
        };
        let source = err.source().expect("source is attached");
        assert_eq!(source.to_string(), "disk full");
    }
}
