//! In-memory implementation of RecordSink.

use crate::error::Result;
use crate::sink::RecordSink;
use std::sync::{Arc, Mutex};

/// Sink that keeps every line in memory.
///
/// Clones share the same buffer, so a test can hand one clone to the
/// harness and read the lines back through another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Written lines, in arrival order
    lines: Arc<Mutex<Vec<String>>>,

    /// Number of flushes observed
    flushes: Arc<Mutex<u64>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the written lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// Returns how many times the sink was flushed.
    pub fn flush_count(&self) -> u64 {
        *self.flushes.lock().unwrap()
    }
}

impl RecordSink for MemorySink {
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_buffer() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();

        writer.write_line("a").unwrap();
        writer.write_line("b").unwrap();
        writer.flush().unwrap();

        assert_eq!(sink.lines(), vec!["a", "b"]);
        assert_eq!(sink.flush_count(), 1);
    }
}
