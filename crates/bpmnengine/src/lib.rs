//! Element lifecycle processing for BPMN workflow instances.
//!
//! The [`Engine`] owns one partition: a log of workflow instance records, the
//! state derived from it and the lifecycle handlers that turn each record into
//! follow-up records.

mod engine;
pub mod handlers;
mod output;
mod processor;
mod registry;
pub mod state;

pub use engine::{Engine, EngineConfig};
pub use output::{KeyGenerator, OutputSink, PendingRecord, RecordWriter};
pub use processor::{ProcessedRecord, ProcessingOutcome, RecordProcessor};
pub use registry::HandlerRegistry;
pub use state::EngineState;
