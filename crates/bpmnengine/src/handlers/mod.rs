//! Lifecycle handlers, one per (element kind, intent) transition.
//!
//! Handlers are plain functions over [`BpmnStepContext`]. Shared steps live in
//! [`element`] and are called explicitly by the concrete handlers.

pub mod activity;
pub mod container;
pub mod element;
pub mod event;
pub mod eventsubproc;
pub mod flow;

#[cfg(test)]
pub(crate) mod test_support;

use crate::output::OutputSink;
use crate::state::{ElementInstance, EngineState};
use bpmncore::{
    ExecutableElement, ExecutableProcess, Intent, Key, Result, Violation, WorkflowInstanceRecord,
};

/// Everything a handler may read or write while processing one record.
pub struct BpmnStepContext<'a> {
    pub key: Key,
    pub intent: Intent,
    pub value: &'a WorkflowInstanceRecord,
    pub process: &'a ExecutableProcess,
    /// The element the record is about. For SEQUENCE_FLOW_TAKEN records this
    /// is the target of the flow.
    pub element: &'a ExecutableElement,
    pub state: &'a mut EngineState,
    pub output: &'a mut dyn OutputSink,
}

impl BpmnStepContext<'_> {
    pub fn element_instance(&self) -> Option<&ElementInstance> {
        self.state.instances.get_instance(self.key)
    }

    pub fn flow_scope_instance(&self) -> Option<&ElementInstance> {
        self.value
            .flow_scope_key
            .and_then(|key| self.state.instances.get_instance(key))
    }

    /// Flow scope key of the record, which every non-root record must carry.
    pub fn require_flow_scope_key(&self) -> Result<Key> {
        self.value
            .flow_scope_key
            .ok_or_else(|| Violation::NoFlowScope { key: self.key }.into())
    }
}

/// Decides whether a record applies at all.
pub type ShouldHandle = fn(&BpmnStepContext<'_>) -> bool;

/// Runs the transition. `Ok(false)` means "not handled this time" and leaves no side effects.
pub type Handle = fn(&mut BpmnStepContext<'_>) -> Result<bool>;

#[derive(Clone, Copy)]
pub struct StepHandler {
    pub should_handle: ShouldHandle,
    pub handle: Handle,
}

impl StepHandler {
    pub fn new(should_handle: ShouldHandle, handle: Handle) -> Self {
        Self {
            should_handle,
            handle,
        }
    }

    /// A lifecycle transition that only applies while the instance is in the record's state.
    pub fn lifecycle(handle: Handle) -> Self {
        Self::new(element::is_state_same_as_element_state, handle)
    }
}
