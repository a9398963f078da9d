use crate::handlers::{element, BpmnStepContext};
use bpmncore::{Intent, Result};

pub fn should_handle(_ctx: &BpmnStepContext<'_>) -> bool {
    true
}

/// Activate the flow's target, which takes over the flow's token. A flow
/// reaching a scope that is no longer open gives its token back instead.
pub fn sequence_flow_taken(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    let scope_key = ctx.require_flow_scope_key()?;

    if element::is_scope_open(ctx.flow_scope_instance()) {
        let target = ctx.element;
        let value = ctx
            .value
            .for_element(target.id.clone(), target.element_type, Some(scope_key));
        ctx.output.append_new_event(Intent::ElementActivating, value);
        return Ok(true);
    }

    if ctx.flow_scope_instance().is_none() {
        tracing::debug!(key = ctx.key, scope_key, "Flow scope already left, dropping sequence flow");
        return Ok(true);
    }
    ctx.state.instances.consume_token(scope_key)?;
    element::on_child_left(ctx, scope_key)?;
    Ok(true)
}
