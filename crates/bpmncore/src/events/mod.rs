// crates/bpmncore/src/events/mod.rs

mod base;

pub use base::{RecordBus, RecordFilter};
