use crate::{BpmnElementType, Intent, Key, Record};
use tokio::sync::broadcast;

/// Broadcasts every committed record to exporters and observers.
pub struct RecordBus {
    sender: broadcast::Sender<Record>,
}

impl RecordBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Record> {
        self.sender.subscribe()
    }

    /// Publish a record; a bus without subscribers drops it.
    pub fn publish(&self, record: &Record) {
        let _ = self.sender.send(record.clone());
    }
}

/// Predicate over exported records, composed the way record assertions are written.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    workflow_instance_key: Option<Key>,
    intent: Option<Intent>,
    element_id: Option<String>,
    element_type: Option<BpmnElementType>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow_instance_key(mut self, key: Key) -> Self {
        self.workflow_instance_key = Some(key);
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_element_id(mut self, element_id: impl Into<String>) -> Self {
        self.element_id = Some(element_id.into());
        self
    }

    pub fn with_element_type(mut self, element_type: BpmnElementType) -> Self {
        self.element_type = Some(element_type);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.workflow_instance_key
            .map_or(true, |key| record.value.workflow_instance_key == key)
            && self.intent.map_or(true, |intent| record.intent == intent)
            && self
                .element_id
                .as_deref()
                .map_or(true, |id| record.value.element_id == id)
            && self
                .element_type
                .map_or(true, |t| record.value.bpmn_element_type == t)
    }

    pub fn apply<'a>(&self, records: &'a [Record]) -> impl Iterator<Item = &'a Record> + 'a {
        let filter = self.clone();
        records.iter().filter(move |record| filter.matches(record))
    }
}
