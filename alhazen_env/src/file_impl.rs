//! File-backed implementation of RecordSink.

use crate::error::{HarnessError, Result};
use crate::sink::RecordSink;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Production sink writing newline-terminated lines to a file.
///
/// The file is created (or truncated) when the sink is opened, so a run
/// always starts from an empty log.
pub struct FileSink {
    /// Destination path (for error messages)
    path: PathBuf,

    /// Buffered handle
    writer: BufWriter<File>,
}

impl FileSink {
    /// Creates the file at `path`, truncating any existing content.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            HarnessError::logging(format!("cannot open {}: {}", path.display(), e))
        })?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Returns the destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for FileSink {
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .map_err(|e| HarnessError::logging(format!("write to {} failed: {}", self.path.display(), e)))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| HarnessError::logging(format!("flush of {} failed: {}", self.path.display(), e)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");

        let mut sink = FileSink::create(&path).unwrap();
        sink.write_line("first").unwrap();
        sink.write_line("second").unwrap();
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_file_sink_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "stale\n").unwrap();

        let mut sink = FileSink::create(&path).unwrap();
        sink.write_line("fresh").unwrap();
        sink.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("log.txt");

        let result = FileSink::create(&path);
        assert!(matches!(result, Err(HarnessError::Logging(_))));
    }
}
