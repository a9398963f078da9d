use crate::handlers::{eventsubproc, BpmnStepContext};
use crate::state::ElementInstance;
use bpmncore::{BpmnElementType, Intent, Key, LifecycleState, Result, Violation};

pub fn is_state_same_as_element_state(ctx: &BpmnStepContext<'_>) -> bool {
    match (ctx.element_instance(), ctx.intent.lifecycle_state()) {
        (Some(instance), Some(state)) => instance.state() == state,
        _ => false,
    }
}

/// Active and not being taken over by an interrupting event sub-process.
pub fn is_scope_open(instance: Option<&ElementInstance>) -> bool {
    instance.map_or(false, |scope| scope.is_active() && !scope.is_interrupted())
}

fn transition_to(ctx: &mut BpmnStepContext<'_>, intent: Intent) {
    ctx.output
        .append_follow_up_event(ctx.key, intent, ctx.value.clone());
}

pub fn activating(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    transition_to(ctx, Intent::ElementActivated);
    Ok(true)
}

/// Generic ACTIVATED bookkeeping shared by every element.
///
/// An element only proceeds while its flow scope is still active.
pub fn activated(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    let Some(scope_key) = ctx.value.flow_scope_key else {
        return Ok(true);
    };
    match ctx.flow_scope_instance() {
        Some(scope) if scope.is_active() => Ok(true),
        Some(scope) => {
            tracing::debug!(
                key = ctx.key,
                scope_key,
                scope_state = ?scope.state(),
                "Flow scope is not active, element does not proceed"
            );
            Ok(false)
        }
        None => Err(Violation::MissingFlowScope {
            key: ctx.key,
            scope_key,
        }
        .into()),
    }
}

pub fn completing(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    transition_to(ctx, Intent::ElementCompleted);
    Ok(true)
}

/// Leave the element through its outgoing flows and give back its token.
pub fn completed(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    let Some(scope_key) = ctx.value.flow_scope_key else {
        return Ok(true);
    };

    let released = ctx.element_instance().map_or(false, ElementInstance::token_released);
    if !released {
        if is_scope_open(ctx.flow_scope_instance()) {
            take_sequence_flows(ctx, scope_key)?;
        }
        ctx.state.instances.consume_token(scope_key)?;
    }

    on_child_left(ctx, scope_key)?;
    Ok(true)
}

pub fn terminating(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    transition_to(ctx, Intent::ElementTerminated);
    Ok(true)
}

pub fn terminated(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    let Some(scope_key) = ctx.value.flow_scope_key else {
        return Ok(true);
    };

    let released = ctx.element_instance().map_or(false, ElementInstance::token_released);
    if !released {
        ctx.state.instances.consume_token(scope_key)?;
    }

    on_child_left(ctx, scope_key)?;
    Ok(true)
}

fn take_sequence_flows(ctx: &mut BpmnStepContext<'_>, scope_key: Key) -> Result<()> {
    let process = ctx.process;
    let element = ctx.element;
    for flow in process.outgoing(&element.id) {
        ctx.state.instances.spawn_token(scope_key)?;
        let value = ctx
            .value
            .for_element(flow.id.clone(), BpmnElementType::SequenceFlow, Some(scope_key));
        ctx.output.append_new_event(Intent::SequenceFlowTaken, value);
    }
    Ok(())
}

/// Re-evaluate a scope after one of its execution branches ended.
///
/// A terminating scope without live children terminates; an interrupted scope
/// without live children activates the waiting event sub-process; an active
/// scope without tokens completes.
pub fn on_child_left(ctx: &mut BpmnStepContext<'_>, scope_key: Key) -> Result<()> {
    let Some(scope) = ctx.state.instances.get_instance(scope_key) else {
        return Ok(());
    };
    let scope_state = scope.state();
    let scope_value = scope.value().clone();
    let interrupted = scope.is_interrupted();
    let live_children = ctx.state.instances.live_children_count(scope_key);

    match scope_state {
        LifecycleState::Terminating if live_children == 0 => {
            ctx.output
                .append_follow_up_event(scope_key, Intent::ElementTerminated, scope_value);
        }
        LifecycleState::Activated => {
            if interrupted && live_children == 0 {
                eventsubproc::activate_deferred(ctx, scope_key)?;
            }
            let tokens = ctx
                .state
                .instances
                .get_instance(scope_key)
                .map_or(0, ElementInstance::token_count);
            if tokens == 0 {
                tracing::debug!(scope_key, "No active tokens left, completing scope");
                ctx.output
                    .append_follow_up_event(scope_key, Intent::ElementCompleting, scope_value);
            }
        }
        _ => {}
    }
    Ok(())
}
