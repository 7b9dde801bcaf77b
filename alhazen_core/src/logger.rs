//! Logger Sink - one log destination shared by the orchestrator and every worker.
//!
//! Writers never touch the destination. Each record is formatted into a
//! complete line by the caller and sent to a single collector thread, which
//! owns the `RecordSink` and writes lines one at a time:
//!
//! ```text
//! Logger (clone per worker) ──┐
//! Logger (orchestrator)  ─────┼──> crossbeam channel ──> collector thread ──> RecordSink
//! LogScope (batched)     ─────┘
//! ```
//!
//! A line is therefore never split or interleaved with another one, and in
//! the delimited layout the header is written before the collector accepts
//! any record.

use crate::config::{LogConfig, LogDestination, LogFormat};
use alhazen_env::{FileSink, HarnessError, RecordSink, Result};
use crossbeam::channel::{self, Receiver, Sender};
use std::borrow::Cow;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Message to the collector thread.
#[derive(Debug)]
enum LogMessage {
    /// One formatted line
    Line(String),

    /// Lines from one `LogScope`, written contiguously
    Batch(Vec<String>),

    /// Flush the destination
    Flush,

    /// No more records; exit after draining
    Close,
}

/// Cloneable handle for appending records to the experiment log.
///
/// A disabled logger (no destination configured) accepts every call and
/// writes nothing.
#[derive(Debug, Clone)]
pub struct Logger {
    inner: Option<Arc<LoggerShared>>,
}

#[derive(Debug)]
struct LoggerShared {
    tx: Sender<LogMessage>,
    format: LogFormat,
    failed: Arc<AtomicBool>,
}

impl Logger {
    /// A logger with no destination.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Returns the layout, or `None` when disabled.
    pub fn format(&self) -> Option<&LogFormat> {
        self.inner.as_ref().map(|shared| &shared.format)
    }

    /// Appends one free-form line (text layout only).
    pub fn write(&self, line: impl Into<String>) -> Result<()> {
        match &self.inner {
            None => Ok(()),
            Some(shared) => {
                let line = shared.format_text(line.into())?;
                shared.send(LogMessage::Line(line))
            }
        }
    }

    /// Appends one delimited record (delimited layout only).
    ///
    /// The number of fields must match the header.
    pub fn write_row<I, T>(&self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        match &self.inner {
            None => Ok(()),
            Some(shared) => {
                let line = shared.format_row(fields)?;
                shared.send(LogMessage::Line(line))
            }
        }
    }

    /// Opens a scope whose records are written together and flushed when
    /// the scope ends, including when it ends by unwinding.
    pub fn scope(&self) -> LogScope<'_> {
        LogScope {
            logger: self,
            pending: Vec::new(),
        }
    }

    /// Asks the collector to flush the destination.
    pub fn flush(&self) -> Result<()> {
        match &self.inner {
            None => Ok(()),
            Some(shared) => shared.send(LogMessage::Flush),
        }
    }
}

impl LoggerShared {
    fn send(&self, message: LogMessage) -> Result<()> {
        if self.failed.load(Ordering::Acquire) {
            return Err(HarnessError::logging("log destination is no longer writable"));
        }
        self.tx
            .send(message)
            .map_err(|_| HarnessError::logging("log collector has shut down"))
    }

    fn format_text(&self, line: String) -> Result<String> {
        match &self.format {
            LogFormat::Text => {
                if has_line_break(&line) {
                    return Err(HarnessError::logging("log lines must not contain line breaks"));
                }
                Ok(line)
            }
            LogFormat::Delimited { .. } => Err(HarnessError::logging(
                "free-form write to a structured log; use write_row",
            )),
        }
    }

    fn format_row<I, T>(&self, fields: I) -> Result<String>
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        match &self.format {
            LogFormat::Text => Err(HarnessError::logging(
                "row write to a free-form log; use write",
            )),
            LogFormat::Delimited { fields: header, delimiter } => {
                let values: Vec<String> = fields.into_iter().map(|f| f.to_string()).collect();
                if values.len() != header.len() {
                    return Err(HarnessError::logging(format!(
                        "record has {} fields, header has {}",
                        values.len(),
                        header.len()
                    )));
                }
                // One record per physical line
                if let Some(i) = values.iter().position(|v| has_line_break(v)) {
                    return Err(HarnessError::logging(format!(
                        "field {:?} contains a line break",
                        header[i]
                    )));
                }
                Ok(join_fields(values.as_slice(), *delimiter))
            }
        }
    }
}

/// Scoped log handle.
///
/// Records written through a scope are held until the scope drops, then
/// sent as one batch followed by a flush.
pub struct LogScope<'a> {
    logger: &'a Logger,
    pending: Vec<String>,
}

impl LogScope<'_> {
    /// Adds one free-form line to the scope.
    pub fn write(&mut self, line: impl Into<String>) -> Result<()> {
        if let Some(shared) = &self.logger.inner {
            self.pending.push(shared.format_text(line.into())?);
        }
        Ok(())
    }

    /// Adds one delimited record to the scope.
    pub fn write_row<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        if let Some(shared) = &self.logger.inner {
            self.pending.push(shared.format_row(fields)?);
        }
        Ok(())
    }
}

impl Drop for LogScope<'_> {
    fn drop(&mut self) {
        if let Some(shared) = &self.logger.inner {
            let lines = std::mem::take(&mut self.pending);
            // Errors surface through the collector's final result
            if !lines.is_empty() {
                let _ = shared.send(LogMessage::Batch(lines));
            }
            let _ = shared.send(LogMessage::Flush);
        }
    }
}

fn has_line_break(text: &str) -> bool {
    text.contains(|c: char| c == '\n' || c == '\r')
}

/// Quotes a field if it contains the delimiter or a quote.
fn escape_field(field: &str, delimiter: char) -> Cow<'_, str> {
    if field.contains(|c: char| c == delimiter || c == '"') {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn join_fields<S: AsRef<str>>(fields: &[S], delimiter: char) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(delimiter);
        }
        line.push_str(&escape_field(field.as_ref(), delimiter));
    }
    line
}

/// Owner of the collector thread for one run.
pub(crate) struct LogCollector {
    tx: Sender<LogMessage>,
    handle: JoinHandle<Result<u64>>,
}

impl LogCollector {
    /// Opens the destination, writes the header (delimited layout) and
    /// starts the collector thread.
    ///
    /// Opening happens on the calling thread, so an unwritable destination
    /// fails here, before any hook runs.
    pub(crate) fn start(config: &LogConfig) -> Result<(Logger, LogCollector)> {
        let mut sink: Box<dyn RecordSink> = match &config.destination {
            LogDestination::File(path) => Box::new(FileSink::create(path)?),
            LogDestination::Memory(sink) => Box::new(sink.clone()),
        };

        if let LogFormat::Delimited { fields, delimiter } = &config.format {
            sink.write_line(&join_fields(fields.as_slice(), *delimiter))?;
            sink.flush()?;
        }

        let (tx, rx) = channel::unbounded();
        let failed = Arc::new(AtomicBool::new(false));
        let destination = sink.describe();

        let thread_failed = Arc::clone(&failed);
        let handle = thread::Builder::new()
            .name("alhazen-log".to_string())
            .spawn(move || collect(sink, rx, thread_failed))
            .map_err(|e| HarnessError::logging(format!("cannot start log collector: {}", e)))?;

        debug!(destination = %destination, "Log collector started");

        let logger = Logger {
            inner: Some(Arc::new(LoggerShared {
                tx: tx.clone(),
                format: config.format.clone(),
                failed,
            })),
        };

        Ok((logger, LogCollector { tx, handle }))
    }

    /// Closes the log and waits for every queued record to be written.
    ///
    /// Returns the number of records written, or the first write failure.
    pub(crate) fn finish(self) -> Result<u64> {
        // The collector may already have exited after a failure
        let _ = self.tx.send(LogMessage::Close);
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(HarnessError::logging("log collector panicked")),
        }
    }
}

/// Collector loop. Runs until `Close` arrives or every sender is gone.
fn collect<S: RecordSink>(mut sink: S, rx: Receiver<LogMessage>, failed: Arc<AtomicBool>) -> Result<u64> {
    let mut written = 0u64;
    let mut first_error: Option<HarnessError> = None;

    for message in rx.iter() {
        if first_error.is_some() {
            // Keep draining so writers never block on a dead destination
            if matches!(message, LogMessage::Close) {
                break;
            }
            continue;
        }

        let outcome = match message {
            LogMessage::Line(line) => sink.write_line(&line).map(|_| written += 1),
            LogMessage::Batch(lines) => write_batch(&mut sink, &lines, &mut written),
            LogMessage::Flush => sink.flush(),
            LogMessage::Close => break,
        };

        if let Err(e) = outcome {
            error!(destination = %sink.describe(), "Experiment log failed: {}", e);
            failed.store(true, Ordering::Release);
            first_error = Some(e);
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    sink.flush()?;
    debug!(records = written, "Log collector finished");
    Ok(written)
}

fn write_batch<S: RecordSink>(sink: &mut S, lines: &[String], written: &mut u64) -> Result<()> {
    for line in lines {
        sink.write_line(line)?;
        *written += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alhazen_env::MemorySink;

    fn memory_logger(format: LogFormat) -> (MemorySink, Logger, LogCollector) {
        let sink = MemorySink::new();
        let (logger, collector) = LogCollector::start(&LogConfig::memory(sink.clone(), format)).unwrap();
        (sink, logger, collector)
    }

    #[test]
    fn test_disabled_logger_accepts_everything() {
        let log = Logger::disabled();
        assert!(!log.is_enabled());
        assert!(log.write("anything").is_ok());
        assert!(log.write_row([1, 2, 3]).is_ok());
        let mut scope = log.scope();
        assert!(scope.write("x").is_ok());
    }

    #[test]
    fn test_text_lines() {
        let (sink, log, collector) = memory_logger(LogFormat::Text);

        log.write("first").unwrap();
        log.write(format!("second {}", 2)).unwrap();

        assert_eq!(collector.finish().unwrap(), 2);
        assert_eq!(sink.lines(), vec!["first", "second 2"]);
    }

    #[test]
    fn test_header_written_once_before_rows() {
        let (sink, log, collector) = memory_logger(LogFormat::csv(["a", "b", "c"]));

        for i in 0..5 {
            log.write_row([i, i * 2, i * 3]).unwrap();
        }
        collector.finish().unwrap();

        let lines = sink.lines();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "a,b,c");
        for line in &lines[1..] {
            assert_eq!(line.split(',').count(), 3);
        }
    }

    #[test]
    fn test_row_shape_enforced() {
        let (_sink, log, collector) = memory_logger(LogFormat::csv(["a", "b"]));

        assert!(matches!(log.write_row([1]), Err(HarnessError::Logging(_))));
        assert!(matches!(log.write("free"), Err(HarnessError::Logging(_))));
        collector.finish().unwrap();
    }

    #[test]
    fn test_text_log_rejects_rows_and_newlines() {
        let (_sink, log, collector) = memory_logger(LogFormat::Text);

        assert!(log.write_row(["a"]).is_err());
        assert!(log.write("two\nlines").is_err());
        assert!(log.write("two\rlines").is_err());
        collector.finish().unwrap();
    }

    #[test]
    fn test_line_breaks_in_fields_rejected() {
        let (sink, log, collector) = memory_logger(LogFormat::csv(["a", "b", "c"]));

        assert!(matches!(log.write_row(["1", "multi\nline", "3"]), Err(HarnessError::Logging(_))));
        assert!(matches!(log.write_row(["1", "2", "carriage\r"]), Err(HarnessError::Logging(_))));
        log.write_row(["4", "5", "6"]).unwrap();

        let mut scope = log.scope();
        assert!(scope.write_row(["x", "y\nz", "w"]).is_err());
        drop(scope);

        assert_eq!(collector.finish().unwrap(), 1);
        assert_eq!(sink.lines(), vec!["a,b,c", "4,5,6"]);
    }

    #[test]
    fn test_fields_escaped() {
        assert_eq!(join_fields(&["plain", "with,comma", "say \"hi\""], ','),
            "plain,\"with,comma\",\"say \"\"hi\"\"\"");
        assert_eq!(join_fields(&["a;b", "c"], ','), "a;b,c");
    }

    #[test]
    fn test_scope_batches_and_flushes() {
        let (sink, log, collector) = memory_logger(LogFormat::Text);

        {
            let mut scope = log.scope();
            scope.write("one").unwrap();
            scope.write("two").unwrap();
        }
        collector.finish().unwrap();

        assert_eq!(sink.lines(), vec!["one", "two"]);
        assert!(sink.flush_count() >= 1);
    }

    #[test]
    fn test_scope_flushes_on_unwind() {
        let (sink, log, collector) = memory_logger(LogFormat::Text);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut scope = log.scope();
            scope.write("before fault").unwrap();
            panic!("hook fault");
        }));
        assert!(outcome.is_err());

        collector.finish().unwrap();
        assert_eq!(sink.lines(), vec!["before fault"]);
    }

    #[test]
    fn test_concurrent_writers_never_interleave() {
        let (sink, log, collector) = memory_logger(LogFormat::csv(["worker", "seq", "payload"]));

        let handles: Vec<_> = (0..8)
            .map(|w| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for seq in 0..200 {
                        log.write_row([w.to_string(), seq.to_string(), "x".repeat(64)]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(collector.finish().unwrap(), 1600);
        let lines = sink.lines();
        assert_eq!(lines.len(), 1601);
        for line in &lines[1..] {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 3);
            assert_eq!(fields[2].len(), 64);
        }
    }

    #[test]
    fn test_writes_after_finish_fail() {
        let (_sink, log, collector) = memory_logger(LogFormat::Text);
        collector.finish().unwrap();

        assert!(matches!(log.write("late"), Err(HarnessError::Logging(_))));
    }

    #[test]
    fn test_file_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let (log, collector) = LogCollector::start(&LogConfig::structured(&path, ["a", "b", "c"])).unwrap();
        log.write_row(["1", "2", "3"]).unwrap();
        collector.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b,c\n1,2,3\n");
    }

    #[test]
    fn test_unwritable_file_fails_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("log.txt");

        let result = LogCollector::start(&LogConfig::text(&path));
        assert!(matches!(result, Err(HarnessError::Logging(_))));
    }
}
