//! Service tasks wait for an external worker to complete their job.

use crate::handlers::{element, BpmnStepContext};
use crate::state::Job;
use bpmncore::{ElementKind, Result, Violation};

pub fn activating(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::activating(ctx)
}

pub fn activated(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    if !element::activated(ctx)? {
        return Ok(false);
    }
    let ElementKind::ServiceTask { job_type } = &ctx.element.kind else {
        return Err(Violation::UnexpectedElementKind {
            element_id: ctx.element.id.clone(),
            expected: "service task",
        }
        .into());
    };
    ctx.state.jobs.create(Job {
        key: ctx.key,
        job_type: job_type.clone(),
        workflow_instance_key: ctx.value.workflow_instance_key,
        element_id: ctx.value.element_id.clone(),
    });
    Ok(true)
}

pub fn completing(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::completing(ctx)
}

pub fn completed(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::completed(ctx)
}

pub fn terminating(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    if ctx.state.jobs.remove(ctx.key).is_some() {
        tracing::debug!(key = ctx.key, "Cancelled job of terminating task");
    }
    element::terminating(ctx)
}

pub fn terminated(ctx: &mut BpmnStepContext<'_>) -> Result<bool> {
    element::terminated(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{Fixture, INSTANCE_KEY};
    use bpmncore::{Intent, LifecycleState, ProcessBuilder};

    fn fixture() -> Fixture {
        Fixture::new(
            ProcessBuilder::new("proc")
                .start_event("start")
                .service_task("task", "payment")
                .end_event("end")
                .build(),
        )
    }

    #[test]
    fn activated_task_creates_a_job() {
        let mut fixture = fixture();
        fixture.add_instance(1, "proc", None, LifecycleState::Activated);
        fixture.add_instance(2, "task", Some(1), LifecycleState::Activated);

        let (result, written) = fixture.run(activated, 2, Intent::ElementActivated);

        assert!(result.unwrap());
        assert!(written.is_empty());
        let job = fixture.state.jobs.find(INSTANCE_KEY, "payment").unwrap();
        assert_eq!(job.key, 2);
        assert_eq!(job.element_id, "task");
    }

    #[test]
    fn terminating_task_cancels_its_job() {
        let mut fixture = fixture();
        fixture.add_instance(1, "proc", None, LifecycleState::Activated);
        fixture.add_instance(2, "task", Some(1), LifecycleState::Activated);
        fixture.run(activated, 2, Intent::ElementActivated).0.unwrap();
        fixture
            .state
            .instances
            .set_state(2, LifecycleState::Terminating)
            .unwrap();

        let (result, written) = fixture.run(terminating, 2, Intent::ElementTerminating);

        assert!(result.unwrap());
        assert!(fixture.state.jobs.get(2).is_none());
        assert_eq!(written[0].intent, Intent::ElementTerminated);
    }
}
