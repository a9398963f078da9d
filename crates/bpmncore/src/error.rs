use crate::Key;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(#[from] Violation),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Rejected command: {0}")]
    Command(String),

    #[error("Partition halted after invariant violation: {0}")]
    Halted(String),

    #[error("Processed more than {limit} records in a single run")]
    RecordLimitExceeded { limit: usize },
}

impl EngineError {
    /// Whether this error halts the partition instead of rejecting a single command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InvariantViolation(_)
                | EngineError::Halted(_)
                | EngineError::RecordLimitExceeded { .. }
        )
    }
}

/// Conditions that can only arise from an engine defect or a corrupted model.
///
/// These are never recovered from locally; the partition stops processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("expected container {scope_key} without a none start event to have a deferred record, but nothing was found")]
    MissingDeferredRecord { scope_key: Key },

    #[error("expected exactly one deferred start record for container {scope_key}, found {count}")]
    MultipleDeferredRecords { scope_key: Key, count: usize },

    #[error("cannot consume a token of scope {scope_key}: no active tokens left")]
    TokenUnderflow { scope_key: Key },

    #[error("element instance {key} not found")]
    MissingElementInstance { key: Key },

    #[error("record {key} has no flow scope")]
    NoFlowScope { key: Key },

    #[error("flow scope {scope_key} of record {key} not found")]
    MissingFlowScope { key: Key, scope_key: Key },

    #[error("element '{element_id}' not found in workflow {workflow_key}")]
    UnknownElement { workflow_key: Key, element_id: String },

    #[error("workflow {workflow_key} is not deployed")]
    UnknownWorkflow { workflow_key: Key },

    #[error("element '{element_id}' is not a {expected}")]
    UnexpectedElementKind { element_id: String, expected: &'static str },

    #[error("container '{element_id}' declares no start events")]
    NoStartEvents { element_id: String },

    #[error("timer '{element_id}' cannot be scheduled after {clock}")]
    TimerOutOfRange { element_id: String, clock: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Duplicate element id: {0}")]
    DuplicateElement(String),

    #[error("Invalid sequence flow '{flow}': {reason}")]
    InvalidSequenceFlow { flow: String, reason: String },

    #[error("Invalid start events in '{scope}': {reason}")]
    InvalidStartEvents { scope: String, reason: String },

    #[error("Element '{0}' is not reachable from any start event")]
    Unreachable(String),

    #[error("Workflow '{0}' has no none start event and cannot be instantiated directly")]
    NoNoneStartEvent(String),
}
