use crate::BpmnElementType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique, monotonically assigned key of a record and of the element instance it describes.
pub type Key = i64;

/// Intents of workflow instance records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    ElementActivating,
    ElementActivated,
    ElementCompleting,
    ElementCompleted,
    ElementTerminating,
    ElementTerminated,
    EventOccurred,
    SequenceFlowTaken,
}

impl Intent {
    /// The lifecycle state an element instance enters when a record with this intent is written.
    pub fn lifecycle_state(self) -> Option<LifecycleState> {
        match self {
            Intent::ElementActivating => Some(LifecycleState::Activating),
            Intent::ElementActivated => Some(LifecycleState::Activated),
            Intent::ElementCompleting => Some(LifecycleState::Completing),
            Intent::ElementCompleted => Some(LifecycleState::Completed),
            Intent::ElementTerminating => Some(LifecycleState::Terminating),
            Intent::ElementTerminated => Some(LifecycleState::Terminated),
            Intent::EventOccurred | Intent::SequenceFlowTaken => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::ElementActivating => "ELEMENT_ACTIVATING",
            Intent::ElementActivated => "ELEMENT_ACTIVATED",
            Intent::ElementCompleting => "ELEMENT_COMPLETING",
            Intent::ElementCompleted => "ELEMENT_COMPLETED",
            Intent::ElementTerminating => "ELEMENT_TERMINATING",
            Intent::ElementTerminated => "ELEMENT_TERMINATED",
            Intent::EventOccurred => "EVENT_OCCURRED",
            Intent::SequenceFlowTaken => "SEQUENCE_FLOW_TAKEN",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of an element instance.
///
/// `Activating -> Activated -> Completing -> Completed`, with
/// `Terminating -> Terminated` reachable from every non-final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Activating,
    Activated,
    Completing,
    Completed,
    Terminating,
    Terminated,
}

impl LifecycleState {
    /// States from which a TERMINATING transition still tears down live execution.
    pub fn can_terminate(self) -> bool {
        matches!(
            self,
            LifecycleState::Activating | LifecycleState::Activated | LifecycleState::Completing
        )
    }

    pub fn is_final(self) -> bool {
        matches!(self, LifecycleState::Completed | LifecycleState::Terminated)
    }

    pub fn intent(self) -> Intent {
        match self {
            LifecycleState::Activating => Intent::ElementActivating,
            LifecycleState::Activated => Intent::ElementActivated,
            LifecycleState::Completing => Intent::ElementCompleting,
            LifecycleState::Completed => Intent::ElementCompleted,
            LifecycleState::Terminating => Intent::ElementTerminating,
            LifecycleState::Terminated => Intent::ElementTerminated,
        }
    }
}

/// Value carried by every workflow instance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstanceRecord {
    pub bpmn_process_id: String,
    pub workflow_key: Key,
    pub version: u32,
    pub workflow_instance_key: Key,
    pub element_id: String,
    pub bpmn_element_type: BpmnElementType,
    /// Key of the enclosing element instance; `None` for the root process instance.
    pub flow_scope_key: Option<Key>,
}

impl WorkflowInstanceRecord {
    /// A value for another element that keeps this value's process identity.
    pub fn for_element(
        &self,
        element_id: impl Into<String>,
        element_type: BpmnElementType,
        flow_scope_key: Option<Key>,
    ) -> Self {
        Self {
            bpmn_process_id: self.bpmn_process_id.clone(),
            workflow_key: self.workflow_key,
            version: self.version,
            workflow_instance_key: self.workflow_instance_key,
            element_id: element_id.into(),
            bpmn_element_type: element_type,
            flow_scope_key,
        }
    }
}

/// A committed entry of the partition log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub position: u64,
    pub key: Key,
    /// Position of the record whose processing wrote this one.
    pub source_position: Option<u64>,
    pub intent: Intent,
    pub value: WorkflowInstanceRecord,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} key={} {} {} '{}'",
            self.position, self.key, self.intent, self.value.bpmn_element_type, self.value.element_id
        )
    }
}
