use bpmncore::Key;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// A caught timer or message occurrence waiting to be consumed by the element it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTrigger {
    /// Key of the EVENT_OCCURRED record written for this occurrence.
    pub event_key: Key,
    pub element_id: String,
    pub payload: serde_json::Value,
}

/// Captured event occurrences, queued per scope in arrival order.
#[derive(Debug, Default)]
pub struct EventTriggerStore {
    triggers: BTreeMap<Key, VecDeque<EventTrigger>>,
}

impl EventTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&mut self, scope_key: Key, trigger: EventTrigger) {
        self.triggers.entry(scope_key).or_default().push_back(trigger);
    }

    /// Oldest unconsumed trigger of `element_id` within the scope.
    pub fn get_triggered_event(&self, scope_key: Key, element_id: &str) -> Option<&EventTrigger> {
        self.triggers
            .get(&scope_key)?
            .iter()
            .find(|trigger| trigger.element_id == element_id)
    }

    /// Remove a trigger once it has been consumed.
    pub fn consume(&mut self, scope_key: Key, event_key: Key) -> Option<EventTrigger> {
        let queue = self.triggers.get_mut(&scope_key)?;
        let position = queue.iter().position(|t| t.event_key == event_key)?;
        let trigger = queue.remove(position);
        if queue.is_empty() {
            self.triggers.remove(&scope_key);
        }
        trigger
    }

    pub fn remove_scope(&mut self, scope_key: Key) {
        self.triggers.remove(&scope_key);
    }

    pub fn len(&self, scope_key: Key) -> usize {
        self.triggers.get(&scope_key).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trigger(event_key: Key, element_id: &str) -> EventTrigger {
        EventTrigger {
            event_key,
            element_id: element_id.to_string(),
            payload: json!({ "n": event_key }),
        }
    }

    #[test]
    fn returns_oldest_trigger_of_element() {
        let mut store = EventTriggerStore::new();
        store.trigger(1, trigger(5, "timer_start"));
        store.trigger(1, trigger(6, "msg_start"));
        store.trigger(1, trigger(7, "msg_start"));

        assert_eq!(store.get_triggered_event(1, "msg_start").unwrap().event_key, 6);
        assert!(store.get_triggered_event(2, "msg_start").is_none());
    }

    #[test]
    fn consumes_each_trigger_once() {
        let mut store = EventTriggerStore::new();
        store.trigger(1, trigger(5, "msg_start"));

        assert!(store.consume(1, 5).is_some());
        assert!(store.consume(1, 5).is_none());
        assert!(store.get_triggered_event(1, "msg_start").is_none());
        assert_eq!(store.len(1), 0);
    }
}
