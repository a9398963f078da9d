//! Occurrence of an event sub-process start event inside an active scope.
//!
//! A non-interrupting occurrence activates the event sub-process next to the
//! running children. An interrupting one first terminates every terminable
//! child of the scope; the activation is then deferred until the last child
//! has left, unless nothing had to be terminated.

use crate::handlers::{element, BpmnStepContext};
use crate::state::{EventTrigger, Purpose, StoredRecord};
use bpmncore::{BpmnElementType, Intent, Key, Result, Violation, WorkflowInstanceRecord};

/// Only occurrences in an active scope that is not already being interrupted apply.
pub fn should_handle(ctx: &BpmnStepContext<'_>) -> bool {
    element::is_scope_open(ctx.flow_scope_instance())
}

pub fn event_occurred(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    let scope_key = ctx.require_flow_scope_key()?;

    let Some(trigger) = ctx
        .state
        .triggers
        .get_triggered_event(scope_key, &ctx.value.element_id)
        .cloned()
    else {
        tracing::warn!(
            key = ctx.key,
            scope_key,
            element_id = %ctx.value.element_id,
            "No triggered event found for start event occurrence"
        );
        return Ok(false);
    };

    let process = ctx.process;
    let element = ctx.element;
    let start_event = element
        .as_start_event()
        .ok_or_else(|| Violation::UnexpectedElementKind {
            element_id: element.id.clone(),
            expected: "start event",
        })?;
    let event_sub_process = start_event
        .event_sub_process
        .as_deref()
        .and_then(|id| process.element(id))
        .ok_or_else(|| Violation::UnexpectedElementKind {
            element_id: start_event.id.clone(),
            expected: "event sub-process start event",
        })?;
    // event sub-process instances run as plain sub-processes
    let container_value = ctx.value.for_element(
        event_sub_process.id.clone(),
        BpmnElementType::SubProcess,
        Some(scope_key),
    );

    ctx.state.triggers.consume(scope_key, trigger.event_key);

    let interrupting_event_key = if start_event.interrupting {
        Some(interrupt(ctx, scope_key, container_value, trigger)?)
    } else {
        ctx.state.variables.merge(scope_key, &trigger.payload);
        ctx.output
            .append_follow_up_event(ctx.key, Intent::ElementActivating, container_value);
        None
    };

    let mut scope = ctx
        .state
        .instances
        .get_instance(scope_key)
        .cloned()
        .ok_or(Violation::MissingFlowScope {
            key: ctx.key,
            scope_key,
        })?;
    scope.spawn_token();
    scope.set_interrupting_event_key(interrupting_event_key);
    ctx.state.instances.update_instance(scope);
    Ok(true)
}

/// Interrupt the scope. Returns the key the event sub-process will be activated with.
fn interrupt(
    ctx: &mut BpmnStepContext<'_>,
    scope_key: Key,
    container_value: WorkflowInstanceRecord,
    trigger: EventTrigger,
) -> Result<Key> {
    let wait_for_termination = terminate_children(ctx, scope_key)?;
    ctx.state.subscriptions.close_scope(scope_key);

    if wait_for_termination {
        tracing::info!(
            key = ctx.key,
            scope_key,
            "Interrupting scope, event sub-process waits for its children to terminate"
        );
        ctx.state.deferred.store_record(
            scope_key,
            StoredRecord {
                key: ctx.key,
                intent: Intent::ElementActivating,
                value: container_value,
                purpose: Purpose::Deferred,
                trigger: Some(trigger),
            },
        );
        Ok(ctx.key)
    } else {
        ctx.state.variables.merge(scope_key, &trigger.payload);
        Ok(ctx
            .output
            .append_new_event(Intent::ElementActivating, container_value))
    }
}

/// Terminate every child that can still be terminated. A child that cannot is
/// already on its way out; its token is given back to the scope right here.
fn terminate_children(ctx: &mut BpmnStepContext<'_>, scope_key: Key) -> Result<bool> {
    let children: Vec<(Key, WorkflowInstanceRecord, bool)> = ctx
        .state
        .instances
        .get_children(scope_key)
        .into_iter()
        .map(|child| (child.key(), child.value().clone(), child.can_terminate()))
        .collect();

    let mut wait_for_termination = false;
    for (child_key, child_value, can_terminate) in children {
        if can_terminate {
            ctx.output
                .append_follow_up_event(child_key, Intent::ElementTerminating, child_value);
            wait_for_termination = true;
        } else {
            ctx.state.instances.consume_token(scope_key)?;
            ctx.state.instances.release_token(child_key)?;
        }
    }
    Ok(wait_for_termination)
}

/// Publish the event sub-process activation deferred by an interrupt of `scope_key`.
pub fn activate_deferred(ctx: &mut BpmnStepContext<'_>, scope_key: Key) -> Result<()> {
    let Some(event_key) = ctx
        .state
        .instances
        .get_instance(scope_key)
        .and_then(|scope| scope.interrupting_event_key())
    else {
        return Ok(());
    };

    if let Some(deferred) =
        ctx.state
            .deferred
            .remove_stored_record(scope_key, event_key, Purpose::Deferred)
    {
        if let Some(trigger) = &deferred.trigger {
            ctx.state.variables.merge(scope_key, &trigger.payload);
        }
        tracing::info!(
            scope_key,
            key = deferred.key,
            element_id = %deferred.value.element_id,
            "Activating interrupting event sub-process"
        );
        ctx.output
            .append_follow_up_event(deferred.key, deferred.intent, deferred.value);
    }
    Ok(())
}
