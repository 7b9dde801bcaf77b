//! Alhazen Environment Abstraction Layer
//!
//! This crate holds the pieces shared by the orchestrator and every worker:
//! - `Context`: the keyed state threaded through experiment hooks
//! - `HarnessError`: the error taxonomy surfaced by a run
//! - `RecordSink`: where experiment log records end up (file or memory)
//!
//! Nothing in here knows about threads or scheduling. The engine in
//! `alhazen_core` builds on these types.
//!
//! # Example
//!
//! ```ignore
//! use alhazen_env::{Context, RecordSink, FileSink};
//!
//! let mut context = Context::new();
//! context.set("width", 2.5)?;
//! let width: f64 = context.get("width")?;
//!
//! let mut sink = FileSink::create("run.log")?;
//! sink.write_line(&format!("width={width}"))?;
//! sink.flush()?;
//! ```

mod context;
mod error;
mod file_impl;
mod memory_impl;
mod sink;
mod types;

pub use context::{Context, Params};
pub use error::{HarnessError, Result};
pub use file_impl::FileSink;
pub use memory_impl::MemorySink;
pub use sink::RecordSink;
pub use types::{RunId, WorkerId};
