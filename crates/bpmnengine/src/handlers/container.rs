//! Processes, sub-processes and event sub-processes.

use crate::handlers::{element, BpmnStepContext};
use crate::state::{correlation_key_of, MessageSubscription, Purpose, StoredRecord, TimerSubscription};
use bpmncore::{
    BpmnElementType, ContainerElement, EventDefinition, Intent, Key, Result, StartEventElement,
    Violation, WorkflowInstanceRecord,
};

pub fn activating(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::activating(ctx)
}

/// Enter the container: activate its initial execution path and register one token for it.
pub fn activated(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    if !element::activated(ctx)? {
        return Ok(false);
    }

    let element = ctx.element;
    let container = element
        .as_container()
        .ok_or_else(|| Violation::UnexpectedElementKind {
            element_id: element.id.clone(),
            expected: "container",
        })?;
    let first_start_event = container
        .start_events
        .first()
        .ok_or_else(|| Violation::NoStartEvents {
            element_id: element.id.clone(),
        })?;

    // a container with a none start event has no other start events; an event
    // sub-process is entered through the start event whose event occurred
    if first_start_event.is_none() || first_start_event.event_sub_process.is_some() {
        activate_start_event(ctx, first_start_event);
    } else {
        publish_deferred_record(ctx)?;
    }

    ctx.state.instances.spawn_token(ctx.key)?;
    open_event_sub_process_subscriptions(ctx, container)?;
    Ok(true)
}

pub fn completing(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    ctx.state.subscriptions.close_scope(ctx.key);
    element::completing(ctx)
}

pub fn completed(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::completed(ctx)
}

/// Tear down every live child before the container itself terminates.
pub fn terminating(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    let scope_key = ctx.key;
    ctx.state.subscriptions.close_scope(scope_key);
    ctx.state.deferred.remove_scope(scope_key);
    ctx.state.triggers.remove_scope(scope_key);

    let terminable: Vec<(Key, WorkflowInstanceRecord)> = ctx
        .state
        .instances
        .get_children(scope_key)
        .into_iter()
        .filter(|child| child.can_terminate())
        .map(|child| (child.key(), child.value().clone()))
        .collect();

    for (child_key, child_value) in &terminable {
        ctx.output
            .append_follow_up_event(*child_key, Intent::ElementTerminating, child_value.clone());
    }

    if terminable.is_empty() && ctx.state.instances.live_children_count(scope_key) == 0 {
        ctx.output
            .append_follow_up_event(scope_key, Intent::ElementTerminated, ctx.value.clone());
    }
    Ok(true)
}

pub fn terminated(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::terminated(ctx)
}

fn activate_start_event(ctx: &mut BpmnStepContext<'_>, start_event: &StartEventElement) {
    let value = ctx.value.for_element(
        start_event.id.clone(),
        BpmnElementType::StartEvent,
        Some(ctx.key),
    );
    ctx.output.append_new_event(Intent::ElementActivating, value);
}

fn publish_deferred_record(ctx: &mut BpmnStepContext<'_>) -> Result<()> {
    let deferred = take_deferred_record(ctx)?;
    tracing::debug!(
        scope_key = ctx.key,
        key = deferred.key,
        element_id = %deferred.value.element_id,
        "Publishing deferred start record"
    );
    ctx.output
        .append_follow_up_event(deferred.key, deferred.intent, deferred.value);
    Ok(())
}

/// Instantiation must have deferred exactly one chosen start path for this scope.
fn take_deferred_record(ctx: &mut BpmnStepContext<'_>) -> Result<StoredRecord> {
    let scope_key = ctx.key;
    let key = match ctx.state.deferred.get_deferred_records(scope_key).as_slice() {
        [] => return Err(Violation::MissingDeferredRecord { scope_key }.into()),
        [record] => record.key,
        records => {
            return Err(Violation::MultipleDeferredRecords {
                scope_key,
                count: records.len(),
            }
            .into())
        }
    };

    ctx.state
        .deferred
        .remove_stored_record(scope_key, key, Purpose::Deferred)
        .ok_or_else(|| Violation::MissingDeferredRecord { scope_key }.into())
}

fn open_event_sub_process_subscriptions(
    ctx: &mut BpmnStepContext<'_>,
    container: &ContainerElement,
) -> Result<()> {
    let process = ctx.process;
    for event_sub_process in &container.event_sub_processes {
        let start_event = process
            .element(event_sub_process)
            .and_then(|esp| esp.as_container())
            .and_then(|esp| esp.start_events.first())
            .ok_or_else(|| Violation::UnknownElement {
                workflow_key: process.key,
                element_id: event_sub_process.clone(),
            })?;

        match &start_event.definition {
            EventDefinition::Timer { .. } => {
                let due = ctx.state.timer_due(&start_event.id, &start_event.definition)?;
                let key = ctx.output.next_key();
                ctx.state.subscriptions.open_timer(TimerSubscription {
                    key,
                    workflow_key: process.key,
                    element_id: start_event.id.clone(),
                    scope_key: Some(ctx.key),
                    due,
                });
            }
            EventDefinition::Message {
                name,
                correlation_key,
            } => {
                let correlation_key = match correlation_key {
                    Some(variable) => match ctx.state.resolve_variable(ctx.key, variable) {
                        Some(value) => Some(correlation_key_of(value)),
                        None => {
                            tracing::warn!(
                                scope_key = ctx.key,
                                element_id = %start_event.id,
                                variable = %variable,
                                "Correlation key variable not found, message subscription not opened"
                            );
                            continue;
                        }
                    },
                    None => None,
                };
                let key = ctx.output.next_key();
                ctx.state.subscriptions.open_message(MessageSubscription {
                    key,
                    workflow_key: process.key,
                    element_id: start_event.id.clone(),
                    scope_key: Some(ctx.key),
                    message_name: name.clone(),
                    correlation_key,
                    close_on_correlate: start_event.interrupting,
                });
            }
            EventDefinition::None => {}
        }
    }
    Ok(())
}
