//! Partition state read and written by the lifecycle handlers.

mod deferred;
mod instance;
mod jobs;
mod subscriptions;
mod trigger;
mod variables;

pub use deferred::{DeferredRecordStore, Purpose, StoredRecord};
pub use instance::{ElementInstance, ElementInstanceStore};
pub use jobs::{Job, JobStore};
pub use subscriptions::{correlation_key_of, MessageSubscription, SubscriptionStore, TimerSubscription};
pub use trigger::{EventTrigger, EventTriggerStore};
pub use variables::VariableStore;

use crate::output::PendingRecord;
use bpmncore::{EventDefinition, Intent, Key, Violation};
use chrono::{DateTime, Utc};

/// All stores of one partition. Owned by the partition's single processing thread.
#[derive(Debug)]
pub struct EngineState {
    pub instances: ElementInstanceStore,
    pub deferred: DeferredRecordStore,
    pub triggers: EventTriggerStore,
    pub jobs: JobStore,
    pub subscriptions: SubscriptionStore,
    pub variables: VariableStore,
    clock: DateTime<Utc>,
}

impl EngineState {
    pub fn new(clock: DateTime<Utc>) -> Self {
        Self {
            instances: ElementInstanceStore::new(),
            deferred: DeferredRecordStore::new(),
            triggers: EventTriggerStore::new(),
            jobs: JobStore::new(),
            subscriptions: SubscriptionStore::new(),
            variables: VariableStore::new(),
            clock,
        }
    }

    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    /// Move the clock forward. Returns `false` and leaves the clock as it was
    /// when the new time does not fit the clock range.
    pub fn advance_clock(&mut self, by: chrono::Duration) -> bool {
        match self.clock.checked_add_signed(by) {
            Some(clock) => {
                self.clock = clock;
                true
            }
            None => false,
        }
    }

    /// When a timer started now becomes due.
    pub fn timer_due(
        &self,
        element_id: &str,
        timer: &EventDefinition,
    ) -> Result<DateTime<Utc>, Violation> {
        timer
            .timer_delay()
            .and_then(|delay| self.clock.checked_add_signed(delay))
            .ok_or_else(|| Violation::TimerOutOfRange {
                element_id: element_id.to_string(),
                clock: self.clock.to_rfc3339(),
            })
    }

    /// Apply the instance state change a written record stands for.
    ///
    /// ELEMENT_ACTIVATING creates the instance under its flow scope; the other
    /// lifecycle intents move an existing instance to the matching state.
    pub fn apply(&mut self, record: &PendingRecord) -> Result<(), Violation> {
        let Some(state) = record.intent.lifecycle_state() else {
            return Ok(());
        };
        if record.intent == Intent::ElementActivating {
            self.instances
                .new_instance(record.key, record.value.clone(), state)?
                .set_state(state);
            Ok(())
        } else {
            self.instances.set_state(record.key, state)
        }
    }

    /// Drop an instance together with everything stored against its scope.
    pub fn remove_element_instance(&mut self, key: Key) -> Option<ElementInstance> {
        self.deferred.remove_scope(key);
        self.triggers.remove_scope(key);
        self.subscriptions.close_scope(key);
        self.variables.remove_scope(key);
        self.jobs.remove(key);
        self.instances.remove_instance(key)
    }

    /// Look a variable up in the scope and then in its ancestors.
    pub fn resolve_variable(&self, scope_key: Key, name: &str) -> Option<&serde_json::Value> {
        let mut current = Some(scope_key);
        while let Some(key) = current {
            if let Some(value) = self.variables.get(key, name) {
                return Some(value);
            }
            current = self
                .instances
                .get_instance(key)
                .and_then(|instance| instance.flow_scope_key());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_due_is_checked_against_the_clock_range() {
        let mut state = EngineState::new(DateTime::<Utc>::UNIX_EPOCH);
        let timer = EventDefinition::Timer { duration_ms: 60_000 };
        assert_eq!(
            state.timer_due("timer", &timer).unwrap(),
            DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(60)
        );

        let far = chrono::Duration::days(365 * 200_000);
        assert!(state.advance_clock(far));
        let timer = EventDefinition::Timer {
            duration_ms: far.num_milliseconds() as u64,
        };
        let err = state.timer_due("timer", &timer).unwrap_err();
        assert!(matches!(err, Violation::TimerOutOfRange { element_id, .. } if element_id == "timer"));
    }

    #[test]
    fn advance_clock_keeps_clock_on_overflow() {
        let mut state = EngineState::new(DateTime::<Utc>::UNIX_EPOCH);
        assert!(!state.advance_clock(chrono::Duration::MAX));
        assert_eq!(state.clock(), DateTime::<Utc>::UNIX_EPOCH);
    }
}
