//! Record sink abstraction for experiment logs.

use crate::error::Result;

/// Destination for experiment log lines.
///
/// # Implementations
///
/// - **Production**: `FileSink` - buffered writes to a file on disk
/// - **Testing**: `MemorySink` - lines collected in memory
///
/// # Ownership
///
/// A sink has exactly one owner: the log collector thread in
/// `alhazen_core`. Workers never touch a sink directly; they send records
/// to the collector, which is what keeps lines from interleaving.
///
/// ```text
/// worker 0 ──┐
/// worker 1 ──┼──> channel ──> collector ──> RecordSink
/// orchestr. ─┘
/// ```
pub trait RecordSink: Send + 'static {
    /// Appends one complete line. The sink adds the trailing newline.
    ///
    /// # Returns
    /// * `Ok(())` - Line accepted (possibly still buffered)
    /// * `Err(HarnessError::Logging)` - The destination is unwritable
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Pushes buffered lines to the destination.
    fn flush(&mut self) -> Result<()>;

    /// Human-readable name of the destination (for diagnostics).
    fn describe(&self) -> String;
}

impl RecordSink for Box<dyn RecordSink> {
    fn write_line(&mut self, line: &str) -> Result<()> {
        (**self).write_line(line)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
