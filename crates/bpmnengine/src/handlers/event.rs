//! Start and end events pass straight through their lifecycle.

use crate::handlers::{element, BpmnStepContext};
use bpmncore::{Intent, Result};

pub fn activating(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::activating(ctx)
}

pub fn activated(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    if !element::activated(ctx)? {
        return Ok(false);
    }
    ctx.output
        .append_follow_up_event(ctx.key, Intent::ElementCompleting, ctx.value.clone());
    Ok(true)
}

pub fn completing(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::completing(ctx)
}

pub fn completed(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::completed(ctx)
}

pub fn terminating(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::terminating(ctx)
}

pub fn terminated(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::terminated(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::Fixture;
    use bpmncore::{BpmnElementType, LifecycleState, ProcessBuilder};

    fn fixture() -> Fixture {
        Fixture::new(
            ProcessBuilder::new("proc")
                .start_event("start")
                .service_task("task", "work")
                .end_event("end")
                .build(),
        )
    }

    #[test]
    fn activated_event_completes_right_away() {
        let mut fixture = fixture();
        fixture.add_instance(1, "proc", None, LifecycleState::Activated);
        fixture.add_instance(2, "start", Some(1), LifecycleState::Activated);

        let (result, written) = fixture.run(activated, 2, Intent::ElementActivated);

        assert!(result.unwrap());
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].key, 2);
        assert_eq!(written[0].intent, Intent::ElementCompleting);
    }

    #[test]
    fn completed_event_takes_its_outgoing_flow() {
        let mut fixture = fixture();
        fixture.add_instance(1, "proc", None, LifecycleState::Activated);
        fixture.add_instance(2, "start", Some(1), LifecycleState::Completed);

        let (result, written) = fixture.run(completed, 2, Intent::ElementCompleted);

        assert!(result.unwrap());
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].intent, Intent::SequenceFlowTaken);
        assert_eq!(written[0].value.element_id, "flow_start_task");
        assert_eq!(written[0].value.bpmn_element_type, BpmnElementType::SequenceFlow);
        // the start event's token moved to the flow
        assert_eq!(fixture.token_count(1), 1);
    }

    #[test]
    fn completing_the_last_end_event_completes_the_scope() {
        let mut fixture = fixture();
        fixture.add_instance(1, "proc", None, LifecycleState::Activated);
        fixture.add_instance(2, "end", Some(1), LifecycleState::Completed);

        let (result, written) = fixture.run(completed, 2, Intent::ElementCompleted);

        assert!(result.unwrap());
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].key, 1);
        assert_eq!(written[0].intent, Intent::ElementCompleting);
        assert_eq!(fixture.token_count(1), 0);
    }
}
