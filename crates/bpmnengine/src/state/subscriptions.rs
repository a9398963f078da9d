use bpmncore::Key;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One-shot duration timer of a start event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSubscription {
    pub key: Key,
    pub workflow_key: Key,
    pub element_id: String,
    /// Embedding scope for event sub-process start events; `None` for process start events.
    pub scope_key: Option<Key>,
    pub due: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSubscription {
    pub key: Key,
    pub workflow_key: Key,
    pub element_id: String,
    pub scope_key: Option<Key>,
    pub message_name: String,
    /// `None` matches every correlation key.
    pub correlation_key: Option<String>,
    pub close_on_correlate: bool,
}

impl MessageSubscription {
    fn matches(&self, name: &str, correlation_key: &str) -> bool {
        self.message_name == name
            && self
                .correlation_key
                .as_deref()
                .map_or(true, |expected| expected == correlation_key)
    }
}

/// Correlation key a variable value stands for. Strings are taken as they are,
/// anything else in its JSON form.
pub fn correlation_key_of(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Open catch-event subscriptions of a partition.
#[derive(Debug, Default)]
pub struct SubscriptionStore {
    timers: BTreeMap<Key, TimerSubscription>,
    messages: BTreeMap<Key, MessageSubscription>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_timer(&mut self, timer: TimerSubscription) {
        tracing::debug!(key = timer.key, element_id = %timer.element_id, due = %timer.due, "Opened timer");
        self.timers.insert(timer.key, timer);
    }

    pub fn open_message(&mut self, subscription: MessageSubscription) {
        tracing::debug!(
            key = subscription.key,
            element_id = %subscription.element_id,
            message_name = %subscription.message_name,
            "Opened message subscription"
        );
        self.messages.insert(subscription.key, subscription);
    }

    /// Remove and return timers due at `now`, earliest first.
    pub fn take_due_timers(&mut self, now: DateTime<Utc>) -> Vec<TimerSubscription> {
        let mut due: Vec<_> = self
            .timers
            .values()
            .filter(|timer| timer.due <= now)
            .cloned()
            .collect();
        due.sort_by_key(|timer| (timer.due, timer.key));
        for timer in &due {
            self.timers.remove(&timer.key);
        }
        due
    }

    /// Subscriptions a published message correlates to, in opening order.
    pub fn correlate(&self, name: &str, correlation_key: &str) -> Vec<MessageSubscription> {
        self.messages
            .values()
            .filter(|subscription| subscription.matches(name, correlation_key))
            .cloned()
            .collect()
    }

    pub fn close_message(&mut self, key: Key) {
        self.messages.remove(&key);
    }

    /// Close every subscription opened on behalf of a scope.
    pub fn close_scope(&mut self, scope_key: Key) {
        self.timers.retain(|_, timer| timer.scope_key != Some(scope_key));
        self.messages
            .retain(|_, subscription| subscription.scope_key != Some(scope_key));
    }

    /// Close the process start subscriptions of a workflow.
    pub fn close_workflow_start_events(&mut self, workflow_key: Key) {
        self.timers
            .retain(|_, t| !(t.scope_key.is_none() && t.workflow_key == workflow_key));
        self.messages
            .retain(|_, m| !(m.scope_key.is_none() && m.workflow_key == workflow_key));
    }

    pub fn timers(&self) -> impl Iterator<Item = &TimerSubscription> {
        self.timers.values()
    }

    pub fn messages(&self) -> impl Iterator<Item = &MessageSubscription> {
        self.messages.values()
    }

    pub fn has_scope_subscriptions(&self, scope_key: Key) -> bool {
        self.timers.values().any(|t| t.scope_key == Some(scope_key))
            || self.messages.values().any(|m| m.scope_key == Some(scope_key))
    }
}
