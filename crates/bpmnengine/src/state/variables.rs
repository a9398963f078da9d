use bpmncore::Key;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Variables held by scope instances.
#[derive(Debug, Default)]
pub struct VariableStore {
    scopes: BTreeMap<Key, Map<String, Value>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the entries of a JSON object into the scope. Non-object payloads are ignored.
    pub fn merge(&mut self, scope_key: Key, payload: &Value) {
        if let Value::Object(entries) = payload {
            if entries.is_empty() {
                return;
            }
            let scope = self.scopes.entry(scope_key).or_default();
            for (name, value) in entries {
                scope.insert(name.clone(), value.clone());
            }
        }
    }

    pub fn get(&self, scope_key: Key, name: &str) -> Option<&Value> {
        self.scopes.get(&scope_key)?.get(name)
    }

    pub fn scope(&self, scope_key: Key) -> Option<&Map<String, Value>> {
        self.scopes.get(&scope_key)
    }

    pub fn remove_scope(&mut self, scope_key: Key) {
        self.scopes.remove(&scope_key);
    }
}
