// dbdump/src/backup/archive.rs
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{DumpError, Result};

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Gzip writer over the dump output file.
///
/// Writes go through the encoder; the file only holds a valid gzip stream once
/// [`CompressingSink::finalize`] has written the trailer. The encoder owns the
/// file, so the file cannot be closed ahead of the trailer.
pub struct CompressingSink {
    path: PathBuf,
    encoder: GzEncoder<File>,
    bytes_in: u64,
}

impl CompressingSink {
    /// Creates (or truncates) `path` and wraps it in a gzip encoder.
    ///
    /// # Arguments
    /// * `path` - Destination of the compressed dump. Its parent must exist.
    /// * `level` - Gzip level, 0 (store) to 9 (best).
    pub fn create(path: &Path, level: u32) -> Result<Self> {
        let file = File::create(path).map_err(|source| DumpError::DestinationCreate {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), level, "dump output file created");

        Ok(Self {
            path: path.to_path_buf(),
            encoder: GzEncoder::new(file, Compression::new(level.min(9))),
            bytes_in: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Uncompressed bytes accepted so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Writes the gzip trailer, syncs and closes the file.
    ///
    /// Returns the size of the finished artifact in bytes.
    pub fn finalize(self) -> Result<u64> {
        let path = self.path;
        let to_compression_err = |source: io::Error| DumpError::CompressionIo {
            path: path.clone(),
            source,
        };

        let file = self.encoder.finish().map_err(to_compression_err)?;
        file.sync_all().map_err(to_compression_err)?;
        let bytes_out = file.metadata().map_err(to_compression_err)?.len();

        debug!(path = %path.display(), bytes_in = self.bytes_in, bytes_out, "gzip stream finalized");
        Ok(bytes_out)
    }
}

impl Write for CompressingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.encoder.write(buf)?;
        self.bytes_in += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn decompress(path: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_finalized_sink_is_valid_gzip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump.sql.gz");

        let mut sink = CompressingSink::create(&path, DEFAULT_COMPRESSION_LEVEL)?;
        sink.write_all(b"CREATE TABLE t (id int);\n")?;
        sink.write_all(b"INSERT INTO t VALUES (1);\n")?;
        assert_eq!(sink.bytes_in(), 51);

        let bytes_out = sink.finalize()?;
        assert_eq!(bytes_out, std::fs::metadata(&path)?.len());
        assert_eq!(
            decompress(&path),
            b"CREATE TABLE t (id int);\nINSERT INTO t VALUES (1);\n"
        );
        Ok(())
    }

    #[test]
    fn test_empty_payload_still_gets_trailer() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.gz");

        let bytes_out = CompressingSink::create(&path, 0)?.finalize()?;
        // gzip header + empty deflate block + trailer
        assert!(bytes_out >= 20);
        assert!(decompress(&path).is_empty());
        Ok(())
    }

    #[test]
    fn test_create_truncates_existing_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump.gz");
        std::fs::write(&path, vec![b'x'; 4096])?;

        let mut sink = CompressingSink::create(&path, 9)?;
        sink.write_all(b"fresh")?;
        sink.finalize()?;
        assert_eq!(decompress(&path), b"fresh");
        Ok(())
    }

    #[test]
    fn test_missing_parent_is_destination_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("dump.gz");

        let err = CompressingSink::create(&path, DEFAULT_COMPRESSION_LEVEL)
            .err()
            .expect("creation must fail");
        assert!(matches!(err, DumpError::DestinationCreate { .. }));
        assert!(!path.exists());
    }
}
