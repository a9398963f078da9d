use crate::EventDefinition;
use serde::{Deserialize, Serialize};

/// Process model as deployed by clients, before compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub elements: Vec<FlowElementDefinition>,
    #[serde(default)]
    pub flows: Vec<SequenceFlowDefinition>,
}

impl ProcessDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            elements: Vec::new(),
            flows: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowElementDefinition {
    StartEvent {
        id: String,
        #[serde(default)]
        event: EventDefinition,
        #[serde(default = "default_interrupting")]
        interrupting: bool,
    },
    ServiceTask {
        id: String,
        job_type: String,
    },
    EndEvent {
        id: String,
    },
    SubProcess {
        id: String,
        elements: Vec<FlowElementDefinition>,
        #[serde(default)]
        flows: Vec<SequenceFlowDefinition>,
    },
    EventSubProcess {
        id: String,
        elements: Vec<FlowElementDefinition>,
        #[serde(default)]
        flows: Vec<SequenceFlowDefinition>,
    },
}

fn default_interrupting() -> bool {
    true
}

impl FlowElementDefinition {
    pub fn id(&self) -> &str {
        match self {
            FlowElementDefinition::StartEvent { id, .. }
            | FlowElementDefinition::ServiceTask { id, .. }
            | FlowElementDefinition::EndEvent { id }
            | FlowElementDefinition::SubProcess { id, .. }
            | FlowElementDefinition::EventSubProcess { id, .. } => id,
        }
    }
}

/// Sequence flow between two flow nodes of the same scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFlowDefinition {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Fluent builder for process models.
///
/// Every flow node added after another one is connected to it, so a chain
/// `start_event -> service_task -> end_event` needs no explicit flows.
/// Start events and event sub-processes never receive an incoming flow.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    id: String,
    elements: Vec<FlowElementDefinition>,
    flows: Vec<SequenceFlowDefinition>,
    last: Option<String>,
}

impl ProcessBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            elements: Vec::new(),
            flows: Vec::new(),
            last: None,
        }
    }

    pub fn start_event(self, id: impl Into<String>) -> Self {
        self.add_start_event(id.into(), EventDefinition::None)
    }

    pub fn timer_start_event(self, id: impl Into<String>, duration_ms: u64) -> Self {
        self.add_start_event(id.into(), EventDefinition::Timer { duration_ms })
    }

    pub fn message_start_event(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        correlation_key: impl Into<String>,
    ) -> Self {
        self.add_start_event(
            id.into(),
            EventDefinition::Message {
                name: name.into(),
                correlation_key: Some(correlation_key.into()),
            },
        )
    }

    /// Sets the interrupting flag of the start event added last.
    pub fn interrupting(mut self, interrupting: bool) -> Self {
        let last = self.last.clone();
        for element in self.elements.iter_mut().rev() {
            if let FlowElementDefinition::StartEvent { id, interrupting: flag, .. } = element {
                if Some(id.as_str()) == last.as_deref() {
                    *flag = interrupting;
                    break;
                }
            }
        }
        self
    }

    pub fn service_task(self, id: impl Into<String>, job_type: impl Into<String>) -> Self {
        self.add_flow_node(FlowElementDefinition::ServiceTask {
            id: id.into(),
            job_type: job_type.into(),
        })
    }

    pub fn end_event(self, id: impl Into<String>) -> Self {
        self.add_flow_node(FlowElementDefinition::EndEvent { id: id.into() })
    }

    pub fn sub_process(
        self,
        id: impl Into<String>,
        build: impl FnOnce(ProcessBuilder) -> ProcessBuilder,
    ) -> Self {
        let id = id.into();
        let inner = build(ProcessBuilder::new(id.clone()));
        self.add_flow_node(FlowElementDefinition::SubProcess {
            id,
            elements: inner.elements,
            flows: inner.flows,
        })
    }

    pub fn event_sub_process(
        mut self,
        id: impl Into<String>,
        build: impl FnOnce(ProcessBuilder) -> ProcessBuilder,
    ) -> Self {
        let id = id.into();
        let inner = build(ProcessBuilder::new(id.clone()));
        self.elements.push(FlowElementDefinition::EventSubProcess {
            id,
            elements: inner.elements,
            flows: inner.flows,
        });
        self
    }

    /// Continue the chain from an element that was added earlier.
    pub fn move_to(mut self, id: impl Into<String>) -> Self {
        self.last = Some(id.into());
        self
    }

    pub fn connect(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        self.flows.push(SequenceFlowDefinition {
            id: format!("flow_{}_{}", source, target),
            source,
            target,
        });
        self
    }

    pub fn build(self) -> ProcessDefinition {
        ProcessDefinition {
            id: self.id,
            name: None,
            elements: self.elements,
            flows: self.flows,
        }
    }

    fn add_start_event(mut self, id: String, event: EventDefinition) -> Self {
        self.elements.push(FlowElementDefinition::StartEvent {
            id: id.clone(),
            event,
            interrupting: true,
        });
        self.last = Some(id);
        self
    }

    fn add_flow_node(mut self, element: FlowElementDefinition) -> Self {
        let id = element.id().to_string();
        self.elements.push(element);
        if let Some(previous) = self.last.take() {
            self = self.connect(previous, id.clone());
        }
        self.last = Some(id);
        self
    }
}
