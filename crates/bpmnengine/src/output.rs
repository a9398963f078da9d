use bpmncore::{Intent, Key, WorkflowInstanceRecord};

/// Hands out unique, monotonically increasing keys.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    next: Key,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(next: Key) -> Self {
        Self { next }
    }

    pub fn next_key(&mut self) -> Key {
        let key = self.next;
        self.next += 1;
        key
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A record written by a handler, not yet committed to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub key: Key,
    pub intent: Intent,
    pub value: WorkflowInstanceRecord,
}

/// The only side-effecting boundary of a lifecycle handler.
pub trait OutputSink {
    /// Append a record for a new entity; returns the freshly assigned key.
    fn append_new_event(&mut self, intent: Intent, value: WorkflowInstanceRecord) -> Key;

    /// Append a record for an existing entity, keeping its key.
    fn append_follow_up_event(
        &mut self,
        key: Key,
        intent: Intent,
        value: WorkflowInstanceRecord,
    ) -> Key;

    /// Reserve a key for an entity that is not a record, e.g. a subscription.
    fn next_key(&mut self) -> Key;
}

/// Collects the records of one processing step in write order.
pub struct RecordWriter<'a> {
    keys: &'a mut KeyGenerator,
    pending: Vec<PendingRecord>,
}

impl<'a> RecordWriter<'a> {
    pub fn new(keys: &'a mut KeyGenerator) -> Self {
        Self {
            keys,
            pending: Vec::new(),
        }
    }

    pub fn into_pending(self) -> Vec<PendingRecord> {
        self.pending
    }
}

impl OutputSink for RecordWriter<'_> {
    fn append_new_event(&mut self, intent: Intent, value: WorkflowInstanceRecord) -> Key {
        let key = self.keys.next_key();
        self.append_follow_up_event(key, intent, value)
    }

    fn append_follow_up_event(
        &mut self,
        key: Key,
        intent: Intent,
        value: WorkflowInstanceRecord,
    ) -> Key {
        self.pending.push(PendingRecord { key, intent, value });
        key
    }

    fn next_key(&mut self) -> Key {
        self.keys.next_key()
    }
}
