use bpmncore::{Key, LifecycleState, Violation, WorkflowInstanceRecord};
use std::collections::{BTreeMap, BTreeSet};

/// Runtime state of one activation of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInstance {
    key: Key,
    value: WorkflowInstanceRecord,
    state: LifecycleState,
    token_count: u32,
    interrupting_event_key: Option<Key>,
    token_released: bool,
}

impl ElementInstance {
    pub fn new(key: Key, value: WorkflowInstanceRecord, state: LifecycleState) -> Self {
        Self {
            key,
            value,
            state,
            token_count: 0,
            interrupting_event_key: None,
            token_released: false,
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn value(&self) -> &WorkflowInstanceRecord {
        &self.value
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    pub fn flow_scope_key(&self) -> Option<Key> {
        self.value.flow_scope_key
    }

    pub fn can_terminate(&self) -> bool {
        self.state.can_terminate()
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Activated
    }

    /// Number of active execution branches inside this instance's scope.
    pub fn token_count(&self) -> u32 {
        self.token_count
    }

    pub fn spawn_token(&mut self) {
        self.token_count += 1;
    }

    pub fn consume_token(&mut self) -> Result<(), Violation> {
        if self.token_count == 0 {
            return Err(Violation::TokenUnderflow { scope_key: self.key });
        }
        self.token_count -= 1;
        Ok(())
    }

    /// Key of the event sub-process activation that is taking over this scope.
    pub fn interrupting_event_key(&self) -> Option<Key> {
        self.interrupting_event_key
    }

    pub fn set_interrupting_event_key(&mut self, key: Option<Key>) {
        self.interrupting_event_key = key;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupting_event_key.is_some()
    }

    /// Whether the token this instance holds in its flow scope was already
    /// consumed on its behalf by an interruption.
    pub fn token_released(&self) -> bool {
        self.token_released
    }
}

/// Element instances of a partition, indexed by key and by flow scope.
///
/// Owns the token ledger: every scope's count of active execution branches.
#[derive(Debug, Default)]
pub struct ElementInstanceStore {
    instances: BTreeMap<Key, ElementInstance>,
    children: BTreeMap<Key, BTreeSet<Key>>,
}

impl ElementInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_instance(
        &mut self,
        key: Key,
        value: WorkflowInstanceRecord,
        state: LifecycleState,
    ) -> Result<&mut ElementInstance, Violation> {
        if let Some(scope_key) = value.flow_scope_key {
            if !self.instances.contains_key(&scope_key) {
                return Err(Violation::MissingFlowScope { key, scope_key });
            }
            self.children.entry(scope_key).or_default().insert(key);
        }
        Ok(self
            .instances
            .entry(key)
            .or_insert_with(|| ElementInstance::new(key, value, state)))
    }

    pub fn get_instance(&self, key: Key) -> Option<&ElementInstance> {
        self.instances.get(&key)
    }

    /// Replace the stored instance with an updated copy.
    pub fn update_instance(&mut self, instance: ElementInstance) {
        self.instances.insert(instance.key, instance);
    }

    pub fn set_state(&mut self, key: Key, state: LifecycleState) -> Result<(), Violation> {
        let instance = self
            .instances
            .get_mut(&key)
            .ok_or(Violation::MissingElementInstance { key })?;
        instance.set_state(state);
        Ok(())
    }

    pub fn remove_instance(&mut self, key: Key) -> Option<ElementInstance> {
        let instance = self.instances.remove(&key)?;
        if let Some(scope_key) = instance.flow_scope_key() {
            if let Some(siblings) = self.children.get_mut(&scope_key) {
                siblings.remove(&key);
                if siblings.is_empty() {
                    self.children.remove(&scope_key);
                }
            }
        }
        self.children.remove(&key);
        Some(instance)
    }

    /// Children of a scope, ordered by key.
    pub fn get_children(&self, scope_key: Key) -> Vec<&ElementInstance> {
        self.children
            .get(&scope_key)
            .into_iter()
            .flatten()
            .filter_map(|key| self.instances.get(key))
            .collect()
    }

    /// Children that have not yet reached COMPLETED or TERMINATED.
    pub fn live_children_count(&self, scope_key: Key) -> usize {
        self.get_children(scope_key)
            .iter()
            .filter(|child| !child.state().is_final())
            .count()
    }

    pub fn spawn_token(&mut self, scope_key: Key) -> Result<(), Violation> {
        self.instances
            .get_mut(&scope_key)
            .ok_or(Violation::MissingElementInstance { key: scope_key })?
            .spawn_token();
        Ok(())
    }

    pub fn consume_token(&mut self, scope_key: Key) -> Result<(), Violation> {
        self.instances
            .get_mut(&scope_key)
            .ok_or(Violation::MissingElementInstance { key: scope_key })?
            .consume_token()
    }

    pub fn release_token(&mut self, key: Key) -> Result<(), Violation> {
        self.instances
            .get_mut(&key)
            .ok_or(Violation::MissingElementInstance { key })?
            .token_released = true;
        Ok(())
    }

    pub fn instances(&self) -> impl Iterator<Item = &ElementInstance> {
        self.instances.values()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpmncore::BpmnElementType;

    fn value(element_id: &str, flow_scope_key: Option<Key>) -> WorkflowInstanceRecord {
        WorkflowInstanceRecord {
            bpmn_process_id: "proc".to_string(),
            workflow_key: 1,
            version: 1,
            workflow_instance_key: 10,
            element_id: element_id.to_string(),
            bpmn_element_type: BpmnElementType::ServiceTask,
            flow_scope_key,
        }
    }

    #[test]
    fn tracks_children_per_scope() {
        let mut store = ElementInstanceStore::new();
        store.new_instance(10, value("proc", None), LifecycleState::Activated).unwrap();
        store.new_instance(12, value("b", Some(10)), LifecycleState::Activating).unwrap();
        store.new_instance(11, value("a", Some(10)), LifecycleState::Activated).unwrap();

        let keys: Vec<_> = store.get_children(10).iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec![11, 12]);

        store.set_state(11, LifecycleState::Completed).unwrap();
        assert_eq!(store.live_children_count(10), 1);

        store.remove_instance(12);
        store.remove_instance(11);
        assert!(store.get_children(10).is_empty());
    }

    #[test]
    fn rejects_child_of_unknown_scope() {
        let mut store = ElementInstanceStore::new();
        let err = store
            .new_instance(2, value("a", Some(1)), LifecycleState::Activating)
            .unwrap_err();
        assert_eq!(err, Violation::MissingFlowScope { key: 2, scope_key: 1 });
    }

    #[test]
    fn token_ledger_never_goes_negative() {
        let mut store = ElementInstanceStore::new();
        store.new_instance(1, value("proc", None), LifecycleState::Activated).unwrap();

        store.spawn_token(1).unwrap();
        store.spawn_token(1).unwrap();
        assert_eq!(store.get_instance(1).unwrap().token_count(), 2);

        store.consume_token(1).unwrap();
        store.consume_token(1).unwrap();
        assert_eq!(store.get_instance(1).unwrap().token_count(), 0);
        assert_eq!(
            store.consume_token(1),
            Err(Violation::TokenUnderflow { scope_key: 1 })
        );
    }

    #[test]
    fn update_instance_persists_scope_changes() {
        let mut store = ElementInstanceStore::new();
        store.new_instance(1, value("proc", None), LifecycleState::Activated).unwrap();

        let mut scope = store.get_instance(1).cloned().unwrap();
        scope.spawn_token();
        scope.set_interrupting_event_key(Some(7));
        store.update_instance(scope);

        let scope = store.get_instance(1).unwrap();
        assert_eq!(scope.token_count(), 1);
        assert_eq!(scope.interrupting_event_key(), Some(7));
        assert!(scope.is_interrupted());
    }
}
