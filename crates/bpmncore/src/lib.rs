//! Core model of the workflow lifecycle engine
//!
//! This crate provides the record types, the compiled process catalog and the
//! error types that the engine crate builds on. It holds no engine state.

mod catalog;
mod element;
mod error;
pub mod events;
mod record;
mod workflow;

pub use catalog::{Catalog, ExecutableProcess};
pub use element::{
    BpmnElementType, ContainerElement, ElementKind, EventDefinition, ExecutableElement,
    SequenceFlow, StartEventElement,
};
pub use error::{EngineError, Violation, WorkflowError};
pub use events::*;
pub use record::{Intent, Key, LifecycleState, Record, WorkflowInstanceRecord};
pub use workflow::{FlowElementDefinition, ProcessBuilder, ProcessDefinition, SequenceFlowDefinition};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
