use crate::state::EventTrigger;
use bpmncore::{Intent, Key, WorkflowInstanceRecord};
use std::collections::BTreeMap;

/// Why a record was set aside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Purpose {
    /// Waiting for a precondition of its scope; replayed as a follow-up record.
    Deferred,
    /// Could not be handled when it was processed; re-driven on retry.
    Failed,
}

/// A record buffered against a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: Key,
    pub intent: Intent,
    pub value: WorkflowInstanceRecord,
    pub purpose: Purpose,
    /// Trigger consumed on behalf of the record, applied once it is published.
    pub trigger: Option<EventTrigger>,
}

#[derive(Debug, Default)]
pub struct DeferredRecordStore {
    records: BTreeMap<Key, BTreeMap<(Purpose, Key), StoredRecord>>,
}

impl DeferredRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_record(&mut self, scope_key: Key, record: StoredRecord) {
        self.records
            .entry(scope_key)
            .or_default()
            .insert((record.purpose, record.key), record);
    }

    /// Deferred records of a scope, ordered by key.
    pub fn get_deferred_records(&self, scope_key: Key) -> Vec<&StoredRecord> {
        self.records_of(scope_key, Purpose::Deferred)
    }

    pub fn get_failed_records(&self, scope_key: Key) -> Vec<&StoredRecord> {
        self.records_of(scope_key, Purpose::Failed)
    }

    /// Scopes that currently hold failed records.
    pub fn scopes_with_failed_records(&self) -> Vec<Key> {
        self.records
            .iter()
            .filter(|(_, records)| records.keys().any(|(p, _)| *p == Purpose::Failed))
            .map(|(scope_key, _)| *scope_key)
            .collect()
    }

    pub fn remove_stored_record(
        &mut self,
        scope_key: Key,
        key: Key,
        purpose: Purpose,
    ) -> Option<StoredRecord> {
        let records = self.records.get_mut(&scope_key)?;
        let removed = records.remove(&(purpose, key));
        if records.is_empty() {
            self.records.remove(&scope_key);
        }
        removed
    }

    pub fn remove_scope(&mut self, scope_key: Key) {
        self.records.remove(&scope_key);
    }

    fn records_of(&self, scope_key: Key, purpose: Purpose) -> Vec<&StoredRecord> {
        self.records
            .get(&scope_key)
            .into_iter()
            .flat_map(|records| records.values())
            .filter(|record| record.purpose == purpose)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpmncore::BpmnElementType;

    fn stored(key: Key, purpose: Purpose) -> StoredRecord {
        StoredRecord {
            key,
            intent: Intent::ElementActivating,
            value: WorkflowInstanceRecord {
                bpmn_process_id: "proc".to_string(),
                workflow_key: 1,
                version: 1,
                workflow_instance_key: 2,
                element_id: "start".to_string(),
                bpmn_element_type: BpmnElementType::StartEvent,
                flow_scope_key: Some(2),
            },
            purpose,
            trigger: None,
        }
    }

    #[test]
    fn separates_purposes() {
        let mut store = DeferredRecordStore::new();
        store.store_record(2, stored(5, Purpose::Deferred));
        store.store_record(2, stored(4, Purpose::Failed));

        let deferred: Vec<_> = store.get_deferred_records(2).iter().map(|r| r.key).collect();
        assert_eq!(deferred, vec![5]);
        assert_eq!(store.get_failed_records(2).len(), 1);
        assert_eq!(store.scopes_with_failed_records(), vec![2]);
    }

    #[test]
    fn removes_by_scope_key_and_purpose() {
        let mut store = DeferredRecordStore::new();
        store.store_record(2, stored(5, Purpose::Deferred));

        assert!(store.remove_stored_record(2, 5, Purpose::Failed).is_none());
        assert!(store.remove_stored_record(2, 5, Purpose::Deferred).is_some());
        assert!(store.get_deferred_records(2).is_empty());
    }
}
