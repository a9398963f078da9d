use crate::{
    BpmnElementType, ContainerElement, ElementKind, EventDefinition, ExecutableElement,
    FlowElementDefinition, Key, ProcessDefinition, SequenceFlow, SequenceFlowDefinition,
    StartEventElement, WorkflowError,
};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A deployed, compiled process definition. Immutable once built.
#[derive(Debug)]
pub struct ExecutableProcess {
    pub key: Key,
    pub bpmn_process_id: String,
    pub version: u32,
    elements: HashMap<String, ExecutableElement>,
    flows: HashMap<String, SequenceFlow>,
    graph: DiGraph<String, String>,
    node_index: HashMap<String, NodeIndex>,
}

impl ExecutableProcess {
    pub fn compile(
        key: Key,
        version: u32,
        definition: &ProcessDefinition,
    ) -> Result<Self, WorkflowError> {
        let mut compiler = Compiler::default();
        let root = compiler.scope(&definition.id, &definition.elements, &definition.flows, false)?;
        compiler.validate_process_start_events(&definition.id, &root)?;
        compiler.insert(ExecutableElement {
            id: definition.id.clone(),
            element_type: BpmnElementType::Process,
            flow_scope: None,
            kind: ElementKind::Container(root),
        })?;
        compiler.check_reachability()?;

        Ok(Self {
            key,
            bpmn_process_id: definition.id.clone(),
            version,
            elements: compiler.elements,
            flows: compiler.flows,
            graph: compiler.graph,
            node_index: compiler.node_index,
        })
    }

    /// The process element itself.
    pub fn root(&self) -> &ExecutableElement {
        &self.elements[&self.bpmn_process_id]
    }

    pub fn element(&self, id: &str) -> Option<&ExecutableElement> {
        self.elements.get(id)
    }

    pub fn elements(&self) -> impl Iterator<Item = &ExecutableElement> {
        self.elements.values()
    }

    pub fn sequence_flow(&self, id: &str) -> Option<&SequenceFlow> {
        self.flows.get(id)
    }

    /// Outgoing sequence flows of a flow node, in declaration order.
    pub fn outgoing(&self, element_id: &str) -> Vec<&SequenceFlow> {
        let Some(index) = self.node_index.get(element_id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(*index, Direction::Outgoing)
            .collect();
        edges.sort_by_key(|edge| edge.id().index());
        edges
            .into_iter()
            .filter_map(|edge| self.flows.get(edge.weight()))
            .collect()
    }

    /// Start events of the process itself (event sub-process start events excluded).
    pub fn start_events(&self) -> &[StartEventElement] {
        match &self.root().kind {
            ElementKind::Container(container) => &container.start_events,
            _ => &[],
        }
    }

    pub fn none_start_event(&self) -> Option<&StartEventElement> {
        self.start_events().iter().find(|start| start.is_none())
    }
}

#[derive(Default)]
struct Compiler {
    elements: HashMap<String, ExecutableElement>,
    flows: HashMap<String, SequenceFlow>,
    graph: DiGraph<String, String>,
    node_index: HashMap<String, NodeIndex>,
}

impl Compiler {
    fn scope(
        &mut self,
        scope_id: &str,
        elements: &[FlowElementDefinition],
        flows: &[SequenceFlowDefinition],
        is_event_sub_process: bool,
    ) -> Result<ContainerElement, WorkflowError> {
        let mut container = ContainerElement {
            start_events: Vec::new(),
            event_sub_processes: Vec::new(),
            is_event_sub_process,
        };

        for element in elements {
            let flow_scope = Some(scope_id.to_string());
            let compiled = match element {
                FlowElementDefinition::StartEvent { id, event, interrupting } => {
                    if matches!(event, EventDefinition::Timer { .. }) && event.timer_delay().is_none() {
                        return Err(WorkflowError::InvalidStartEvents {
                            scope: scope_id.to_string(),
                            reason: format!("timer duration of '{}' is out of range", id),
                        });
                    }
                    let start = StartEventElement {
                        id: id.clone(),
                        definition: event.clone(),
                        interrupting: *interrupting,
                        event_sub_process: is_event_sub_process.then(|| scope_id.to_string()),
                    };
                    container.start_events.push(start.clone());
                    ExecutableElement {
                        id: id.clone(),
                        element_type: BpmnElementType::StartEvent,
                        flow_scope,
                        kind: ElementKind::StartEvent(start),
                    }
                }
                FlowElementDefinition::ServiceTask { id, job_type } => ExecutableElement {
                    id: id.clone(),
                    element_type: BpmnElementType::ServiceTask,
                    flow_scope,
                    kind: ElementKind::ServiceTask {
                        job_type: job_type.clone(),
                    },
                },
                FlowElementDefinition::EndEvent { id } => ExecutableElement {
                    id: id.clone(),
                    element_type: BpmnElementType::EndEvent,
                    flow_scope,
                    kind: ElementKind::EndEvent,
                },
                FlowElementDefinition::SubProcess { id, elements, flows } => {
                    let inner = self.scope(id, elements, flows, false)?;
                    Self::expect_single_start(id, &inner, true)?;
                    ExecutableElement {
                        id: id.clone(),
                        element_type: BpmnElementType::SubProcess,
                        flow_scope,
                        kind: ElementKind::Container(inner),
                    }
                }
                FlowElementDefinition::EventSubProcess { id, elements, flows } => {
                    let inner = self.scope(id, elements, flows, true)?;
                    Self::expect_single_start(id, &inner, false)?;
                    container.event_sub_processes.push(id.clone());
                    ExecutableElement {
                        id: id.clone(),
                        element_type: BpmnElementType::EventSubProcess,
                        flow_scope,
                        kind: ElementKind::Container(inner),
                    }
                }
            };
            self.insert(compiled)?;
        }

        for flow in flows {
            self.add_flow(scope_id, flow)?;
        }

        Ok(container)
    }

    fn insert(&mut self, element: ExecutableElement) -> Result<(), WorkflowError> {
        if self.elements.contains_key(&element.id) {
            return Err(WorkflowError::DuplicateElement(element.id));
        }
        let index = self.graph.add_node(element.id.clone());
        self.node_index.insert(element.id.clone(), index);
        self.elements.insert(element.id.clone(), element);
        Ok(())
    }

    fn add_flow(&mut self, scope_id: &str, flow: &SequenceFlowDefinition) -> Result<(), WorkflowError> {
        let invalid = |reason: String| WorkflowError::InvalidSequenceFlow {
            flow: flow.id.clone(),
            reason,
        };

        if self.flows.contains_key(&flow.id) || self.elements.contains_key(&flow.id) {
            return Err(WorkflowError::DuplicateElement(flow.id.clone()));
        }

        for end in [&flow.source, &flow.target] {
            let element = self
                .elements
                .get(end)
                .ok_or_else(|| invalid(format!("unknown element '{}'", end)))?;
            if element.flow_scope.as_deref() != Some(scope_id) {
                return Err(invalid(format!("'{}' is not part of scope '{}'", end, scope_id)));
            }
            if element.element_type == BpmnElementType::EventSubProcess {
                return Err(invalid(format!("event sub-process '{}' cannot be connected", end)));
            }
        }
        if self.elements[&flow.target].element_type == BpmnElementType::StartEvent {
            return Err(invalid(format!("start event '{}' cannot have incoming flows", flow.target)));
        }
        if self.elements[&flow.source].element_type == BpmnElementType::EndEvent {
            return Err(invalid(format!("end event '{}' cannot have outgoing flows", flow.source)));
        }

        let source = self.node_index[&flow.source];
        let target = self.node_index[&flow.target];
        self.graph.add_edge(source, target, flow.id.clone());
        self.flows.insert(
            flow.id.clone(),
            SequenceFlow {
                id: flow.id.clone(),
                source: flow.source.clone(),
                target: flow.target.clone(),
            },
        );
        Ok(())
    }

    fn expect_single_start(
        scope: &str,
        container: &ContainerElement,
        expect_none: bool,
    ) -> Result<(), WorkflowError> {
        let invalid = |reason: &str| WorkflowError::InvalidStartEvents {
            scope: scope.to_string(),
            reason: reason.to_string(),
        };
        match container.start_events.as_slice() {
            [start] if start.is_none() == expect_none => Ok(()),
            [_] if expect_none => Err(invalid("a sub-process must start with a none start event")),
            [_] => Err(invalid("an event sub-process must start with a timer or message start event")),
            [] => Err(invalid("exactly one start event is required, found none")),
            _ => Err(invalid("exactly one start event is required")),
        }
    }

    fn validate_process_start_events(
        &self,
        process_id: &str,
        root: &ContainerElement,
    ) -> Result<(), WorkflowError> {
        let invalid = |reason: &str| WorkflowError::InvalidStartEvents {
            scope: process_id.to_string(),
            reason: reason.to_string(),
        };
        if root.start_events.is_empty() {
            return Err(invalid("a process needs at least one start event"));
        }
        let none_count = root.start_events.iter().filter(|s| s.is_none()).count();
        if none_count > 0 && root.start_events.len() > 1 {
            return Err(invalid(
                "a process with a none start event cannot declare other start events",
            ));
        }
        if root
            .start_events
            .iter()
            .any(|s| matches!(&s.definition, EventDefinition::Timer { duration_ms: 0 }))
        {
            return Err(invalid("timer start events need a positive duration"));
        }
        Ok(())
    }

    fn check_reachability(&self) -> Result<(), WorkflowError> {
        let mut visited = std::collections::HashSet::new();
        for element in self.elements.values() {
            if element.element_type != BpmnElementType::StartEvent {
                continue;
            }
            let mut dfs = Dfs::new(&self.graph, self.node_index[&element.id]);
            while let Some(index) = dfs.next(&self.graph) {
                visited.insert(self.graph[index].clone());
            }
        }

        let mut unreachable: Vec<_> = self
            .elements
            .values()
            .filter(|e| {
                e.flow_scope.is_some()
                    && e.element_type != BpmnElementType::EventSubProcess
                    && !visited.contains(&e.id)
            })
            .map(|e| e.id.clone())
            .collect();
        unreachable.sort();
        match unreachable.into_iter().next() {
            Some(id) => Err(WorkflowError::Unreachable(id)),
            None => Ok(()),
        }
    }
}

/// Deployed workflows of a partition.
#[derive(Debug, Default)]
pub struct Catalog {
    workflows: BTreeMap<Key, Arc<ExecutableProcess>>,
    latest: HashMap<String, Key>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a definition under `key`, as the next version of its process id.
    pub fn deploy(
        &mut self,
        key: Key,
        definition: &ProcessDefinition,
    ) -> Result<Arc<ExecutableProcess>, WorkflowError> {
        let version = self
            .latest_by_process_id(&definition.id)
            .map(|w| w.version + 1)
            .unwrap_or(1);
        let process = Arc::new(ExecutableProcess::compile(key, version, definition)?);

        tracing::info!(
            workflow_key = key,
            bpmn_process_id = %definition.id,
            version,
            "Deployed workflow"
        );
        self.workflows.insert(key, process.clone());
        self.latest.insert(definition.id.clone(), key);
        Ok(process)
    }

    pub fn get(&self, workflow_key: Key) -> Option<Arc<ExecutableProcess>> {
        self.workflows.get(&workflow_key).cloned()
    }

    pub fn latest_by_process_id(&self, bpmn_process_id: &str) -> Option<Arc<ExecutableProcess>> {
        self.latest
            .get(bpmn_process_id)
            .and_then(|key| self.workflows.get(key))
            .cloned()
    }

    pub fn workflows(&self) -> impl Iterator<Item = &Arc<ExecutableProcess>> {
        self.workflows.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProcessBuilder;

    fn two_event_sub_processes() -> ProcessDefinition {
        ProcessBuilder::new("proc")
            .event_sub_process("event_sub_proc_timer", |b| {
                b.timer_start_event("event_sub_start_timer", 60_000)
                    .interrupting(false)
                    .end_event("event_sub_end_timer")
            })
            .event_sub_process("event_sub_proc_msg", |b| {
                b.message_start_event("event_sub_start_msg", "msg", "key")
                    .interrupting(true)
                    .end_event("event_sub_end_msg")
            })
            .start_event("start_proc")
            .service_task("task", "type")
            .end_event("end_proc")
            .build()
    }

    #[test]
    fn compiles_event_sub_process_start_events() {
        let process = ExecutableProcess::compile(1, 1, &two_event_sub_processes()).unwrap();

        let root = process.root().as_container().unwrap();
        assert_eq!(root.start_events.len(), 1);
        assert!(root.start_events[0].is_none());
        assert_eq!(root.event_sub_processes, vec!["event_sub_proc_timer", "event_sub_proc_msg"]);

        let timer = process.element("event_sub_proc_timer").unwrap();
        assert_eq!(timer.element_type, BpmnElementType::EventSubProcess);
        let start = &timer.as_container().unwrap().start_events[0];
        assert_eq!(start.event_sub_process.as_deref(), Some("event_sub_proc_timer"));
        assert!(!start.interrupting);

        let msg_start = process.element("event_sub_start_msg").unwrap().as_start_event().unwrap();
        assert!(msg_start.interrupting);
    }

    #[test]
    fn outgoing_follows_declaration_order() {
        let definition = ProcessBuilder::new("proc")
            .start_event("start")
            .service_task("a", "a")
            .end_event("end_a")
            .move_to("start")
            .service_task("b", "b")
            .end_event("end_b")
            .build();
        let process = ExecutableProcess::compile(1, 1, &definition).unwrap();

        let targets: Vec<_> = process.outgoing("start").iter().map(|f| f.target.clone()).collect();
        assert_eq!(targets, vec!["a", "b"]);
        assert!(process.outgoing("end_a").is_empty());
    }

    #[test]
    fn rejects_none_start_event_next_to_message_start_event() {
        let definition = ProcessBuilder::new("proc")
            .start_event("start")
            .end_event("end")
            .message_start_event("msg_start", "msg", "key")
            .end_event("msg_end")
            .build();

        let err = ExecutableProcess::compile(1, 1, &definition).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStartEvents { .. }));
    }

    #[test]
    fn rejects_event_sub_process_with_none_start_event() {
        let definition = ProcessBuilder::new("proc")
            .event_sub_process("esp", |b| b.start_event("esp_start").end_event("esp_end"))
            .start_event("start")
            .end_event("end")
            .build();

        let err = ExecutableProcess::compile(1, 1, &definition).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStartEvents { scope, .. } if scope == "esp"));
    }

    #[test]
    fn rejects_timer_duration_out_of_clock_range() {
        let definition = ProcessBuilder::new("proc")
            .event_sub_process("esp", |b| {
                b.timer_start_event("esp_timer", 10_000_000_000_000_000)
                    .interrupting(false)
                    .end_event("esp_end")
            })
            .start_event("start")
            .end_event("end")
            .build();
        let err = ExecutableProcess::compile(1, 1, &definition).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStartEvents { scope, .. } if scope == "esp"));

        let definition = ProcessBuilder::new("proc")
            .timer_start_event("timer", u64::MAX)
            .end_event("end")
            .build();
        let err = ExecutableProcess::compile(1, 1, &definition).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStartEvents { scope, .. } if scope == "proc"));
    }

    #[test]
    fn rejects_cross_scope_flow() {
        let definition = ProcessBuilder::new("proc")
            .start_event("start")
            .sub_process("sub", |b| b.start_event("sub_start").end_event("sub_end"))
            .end_event("end")
            .connect("start", "sub_end")
            .build();

        let err = ExecutableProcess::compile(1, 1, &definition).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidSequenceFlow { .. }));
    }

    #[test]
    fn rejects_unreachable_flow_node() {
        let mut definition = ProcessBuilder::new("proc")
            .start_event("start")
            .end_event("end")
            .build();
        definition.elements.push(FlowElementDefinition::EndEvent {
            id: "orphan".to_string(),
        });

        let err = ExecutableProcess::compile(1, 1, &definition).unwrap_err();
        assert_eq!(err, WorkflowError::Unreachable("orphan".to_string()));
    }

    #[test]
    fn catalog_versions_per_process_id() {
        let mut catalog = Catalog::new();
        let first = catalog.deploy(10, &two_event_sub_processes()).unwrap();
        let second = catalog.deploy(11, &two_event_sub_processes()).unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(catalog.latest_by_process_id("proc").unwrap().key, 11);
        assert_eq!(catalog.get(10).unwrap().version, 1);
    }
}
