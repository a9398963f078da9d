use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BpmnElementType {
    Process,
    SubProcess,
    EventSubProcess,
    StartEvent,
    ServiceTask,
    EndEvent,
    SequenceFlow,
}

impl BpmnElementType {
    pub fn is_container(self) -> bool {
        matches!(
            self,
            BpmnElementType::Process | BpmnElementType::SubProcess | BpmnElementType::EventSubProcess
        )
    }
}

impl fmt::Display for BpmnElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BpmnElementType::Process => "PROCESS",
            BpmnElementType::SubProcess => "SUB_PROCESS",
            BpmnElementType::EventSubProcess => "EVENT_SUB_PROCESS",
            BpmnElementType::StartEvent => "START_EVENT",
            BpmnElementType::ServiceTask => "SERVICE_TASK",
            BpmnElementType::EndEvent => "END_EVENT",
            BpmnElementType::SequenceFlow => "SEQUENCE_FLOW",
        };
        f.write_str(name)
    }
}

/// What a catch event waits for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDefinition {
    #[default]
    None,
    Timer {
        duration_ms: u64,
    },
    Message {
        name: String,
        /// Variable whose value is the correlation key of the subscription.
        correlation_key: Option<String>,
    },
}

impl EventDefinition {
    /// Delay of a timer event. `None` for other events and for durations that
    /// do not fit the clock range.
    pub fn timer_delay(&self) -> Option<chrono::Duration> {
        let EventDefinition::Timer { duration_ms } = self else {
            return None;
        };
        let delay = i64::try_from(*duration_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)?;
        DateTime::<Utc>::UNIX_EPOCH.checked_add_signed(delay)?;
        Some(delay)
    }
}

/// Compiled start event, as listed by its container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartEventElement {
    pub id: String,
    pub definition: EventDefinition,
    pub interrupting: bool,
    /// Id of the event sub-process this start event belongs to, if any.
    pub event_sub_process: Option<String>,
}

impl StartEventElement {
    pub fn is_none(&self) -> bool {
        matches!(self.definition, EventDefinition::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerElement {
    /// Start events in declaration order.
    pub start_events: Vec<StartEventElement>,
    /// Event sub-processes embedded directly in this container.
    pub event_sub_processes: Vec<String>,
    pub is_event_sub_process: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Container(ContainerElement),
    StartEvent(StartEventElement),
    ServiceTask { job_type: String },
    EndEvent,
}

/// Read-only element of a deployed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableElement {
    pub id: String,
    pub element_type: BpmnElementType,
    /// Id of the enclosing container; `None` for the process itself.
    pub flow_scope: Option<String>,
    pub kind: ElementKind,
}

impl ExecutableElement {
    pub fn as_container(&self) -> Option<&ContainerElement> {
        match &self.kind {
            ElementKind::Container(container) => Some(container),
            _ => None,
        }
    }

    pub fn as_start_event(&self) -> Option<&StartEventElement> {
        match &self.kind {
            ElementKind::StartEvent(start) => Some(start),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
}
