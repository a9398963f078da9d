use crate::handlers::{activity, container, event, eventsubproc, flow, Handle, StepHandler};
use bpmncore::{BpmnElementType, Intent};
use std::collections::HashMap;

/// Registry of lifecycle handlers, keyed by element type and record intent.
pub struct HandlerRegistry {
    handlers: HashMap<(BpmnElementType, Intent), StepHandler>,
}

/// The six lifecycle steps of one element kind.
struct Lifecycle {
    activating: Handle,
    activated: Handle,
    completing: Handle,
    completed: Handle,
    terminating: Handle,
    terminated: Handle,
}

const CONTAINER: Lifecycle = Lifecycle {
    activating: container::activating,
    activated: container::activated,
    completing: container::completing,
    completed: container::completed,
    terminating: container::terminating,
    terminated: container::terminated,
};

const EVENT: Lifecycle = Lifecycle {
    activating: event::activating,
    activated: event::activated,
    completing: event::completing,
    completed: event::completed,
    terminating: event::terminating,
    terminated: event::terminated,
};

const SERVICE_TASK: Lifecycle = Lifecycle {
    activating: activity::activating,
    activated: activity::activated,
    completing: activity::completing,
    completed: activity::completed,
    terminating: activity::terminating,
    terminated: activity::terminated,
};

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry with the handlers of every supported element type.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register_lifecycle(BpmnElementType::Process, &CONTAINER);
        registry.register_lifecycle(BpmnElementType::SubProcess, &CONTAINER);
        registry.register_lifecycle(BpmnElementType::StartEvent, &EVENT);
        registry.register_lifecycle(BpmnElementType::EndEvent, &EVENT);
        registry.register_lifecycle(BpmnElementType::ServiceTask, &SERVICE_TASK);

        registry.register(
            BpmnElementType::StartEvent,
            Intent::EventOccurred,
            StepHandler::new(eventsubproc::should_handle, eventsubproc::event_occurred),
        );
        registry.register(
            BpmnElementType::SequenceFlow,
            Intent::SequenceFlowTaken,
            StepHandler::new(flow::should_handle, flow::sequence_flow_taken),
        );
        registry
    }

    /// Register a handler, replacing any handler registered for the same pair.
    pub fn register(&mut self, element_type: BpmnElementType, intent: Intent, handler: StepHandler) {
        tracing::debug!("Registering handler: {} {}", element_type, intent);
        self.handlers.insert((element_type, intent), handler);
    }

    fn register_lifecycle(&mut self, element_type: BpmnElementType, lifecycle: &Lifecycle) {
        let steps = [
            (Intent::ElementActivating, lifecycle.activating),
            (Intent::ElementActivated, lifecycle.activated),
            (Intent::ElementCompleting, lifecycle.completing),
            (Intent::ElementCompleted, lifecycle.completed),
            (Intent::ElementTerminating, lifecycle.terminating),
            (Intent::ElementTerminated, lifecycle.terminated),
        ];
        for (intent, handle) in steps {
            self.register(element_type, intent, StepHandler::lifecycle(handle));
        }
    }

    pub fn get(&self, element_type: BpmnElementType, intent: Intent) -> Option<StepHandler> {
        self.handlers.get(&(element_type, intent)).copied()
    }

    /// Get all registered (element type, intent) pairs
    pub fn list_handlers(&self) -> Vec<(BpmnElementType, Intent)> {
        let mut pairs: Vec<_> = self.handlers.keys().copied().collect();
        pairs.sort();
        pairs
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_lifecycle_step() {
        let registry = HandlerRegistry::standard();
        for element_type in [
            BpmnElementType::Process,
            BpmnElementType::SubProcess,
            BpmnElementType::StartEvent,
            BpmnElementType::ServiceTask,
            BpmnElementType::EndEvent,
        ] {
            for intent in [
                Intent::ElementActivating,
                Intent::ElementActivated,
                Intent::ElementCompleting,
                Intent::ElementCompleted,
                Intent::ElementTerminating,
                Intent::ElementTerminated,
            ] {
                assert!(registry.get(element_type, intent).is_some(), "{} {}", element_type, intent);
            }
        }
        assert!(registry
            .get(BpmnElementType::StartEvent, Intent::EventOccurred)
            .is_some());
        assert!(registry
            .get(BpmnElementType::ServiceTask, Intent::EventOccurred)
            .is_none());
        assert!(HandlerRegistry::new().list_handlers().is_empty());
    }
}
