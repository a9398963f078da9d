// crates/bpmnengine/tests/process_start_test.rs

use bpmncore::{BpmnElementType, Intent, ProcessBuilder, RecordFilter};
use bpmnengine::Engine;
use serde_json::json;
use std::time::Duration;

fn intents_of(engine: &Engine, element_id: &str) -> Vec<Intent> {
    RecordFilter::new()
        .with_element_id(element_id)
        .apply(engine.records())
        .map(|record| record.intent)
        .collect()
}

#[test]
fn test_none_start_event_runs_to_completion() {
    let mut engine = Engine::new();
    engine
        .deploy(&ProcessBuilder::new("proc").start_event("start").end_event("end").build())
        .unwrap();

    let key = engine.create_instance("proc", json!({})).unwrap();

    assert_eq!(
        intents_of(&engine, "proc"),
        vec![
            Intent::ElementActivating,
            Intent::ElementActivated,
            Intent::ElementCompleting,
            Intent::ElementCompleted,
        ]
    );
    assert_eq!(
        intents_of(&engine, "flow_start_end"),
        vec![Intent::SequenceFlowTaken]
    );
    assert!(engine.instance(key).is_none());
    assert!(engine.state().instances.is_empty());
}

#[test]
fn test_message_start_event_activates_through_deferred_record() {
    let mut engine = Engine::new();
    engine
        .deploy(
            &ProcessBuilder::new("order")
                .message_start_event("order_received", "order", "orderId")
                .service_task("ship", "shipping")
                .end_event("end")
                .build(),
        )
        .unwrap();

    let correlated = engine
        .publish_message("order", "o-1", json!({ "orderId": "o-1" }))
        .unwrap();
    assert_eq!(correlated, 1);

    let process_record = RecordFilter::new()
        .with_element_type(BpmnElementType::Process)
        .with_intent(Intent::ElementActivated)
        .apply(engine.records())
        .next()
        .expect("process should be activated");
    let start_record = RecordFilter::new()
        .with_element_id("order_received")
        .with_intent(Intent::ElementActivating)
        .apply(engine.records())
        .next()
        .expect("message start event should be activated");

    assert_eq!(start_record.value.flow_scope_key, Some(process_record.key));
    assert!(
        start_record.key > process_record.key,
        "Deferred start record was keyed when the instance was created"
    );
    assert!(engine.state().deferred.get_deferred_records(process_record.key).is_empty());
    assert!(engine
        .state()
        .jobs
        .find(process_record.value.workflow_instance_key, "shipping")
        .is_some());
    assert_eq!(
        engine
            .state()
            .variables
            .get(process_record.key, "orderId"),
        Some(&json!("o-1"))
    );

    // process start subscriptions stay open for further instances
    assert_eq!(engine.publish_message("order", "o-2", json!({})).unwrap(), 1);
    assert_eq!(
        RecordFilter::new()
            .with_element_type(BpmnElementType::Process)
            .with_intent(Intent::ElementActivated)
            .apply(engine.records())
            .count(),
        2
    );
}

#[test]
fn test_timer_start_event_creates_instance_once_due() {
    let mut engine = Engine::new();
    engine
        .deploy(
            &ProcessBuilder::new("nightly")
                .timer_start_event("timer", 1_000)
                .end_event("end")
                .build(),
        )
        .unwrap();

    assert_eq!(engine.increase_time(Duration::from_millis(999)).unwrap(), 0);
    assert!(engine.records().is_empty());

    assert_eq!(engine.increase_time(Duration::from_millis(1)).unwrap(), 1);
    assert_eq!(
        intents_of(&engine, "nightly").last(),
        Some(&Intent::ElementCompleted)
    );
    assert_eq!(engine.increase_time(Duration::from_secs(60)).unwrap(), 0);
}

#[test]
fn test_new_version_replaces_start_subscriptions() {
    let mut engine = Engine::new();
    let definition = ProcessBuilder::new("order")
        .message_start_event("order_received", "order", "orderId")
        .end_event("end")
        .build();
    let v1 = engine.deploy(&definition).unwrap();
    let v2 = engine.deploy(&definition).unwrap();

    assert_eq!(v2.version, v1.version + 1);
    let subscriptions: Vec<_> = engine.state().subscriptions.messages().collect();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].workflow_key, v2.key);

    engine.publish_message("order", "o-1", json!({})).unwrap();
    let process_record = RecordFilter::new()
        .with_element_type(BpmnElementType::Process)
        .apply(engine.records())
        .next()
        .unwrap();
    assert_eq!(process_record.value.version, v2.version);
}

#[test]
fn test_create_instance_requires_none_start_event() {
    let mut engine = Engine::new();
    engine
        .deploy(
            &ProcessBuilder::new("order")
                .message_start_event("order_received", "order", "orderId")
                .end_event("end")
                .build(),
        )
        .unwrap();

    assert!(engine.create_instance("order", json!({})).is_err());
    assert!(engine.records().is_empty());
    assert!(engine.halted().is_none());
}

#[test]
fn test_cancel_terminates_running_instance() {
    let mut engine = Engine::new();
    engine
        .deploy(
            &ProcessBuilder::new("proc")
                .start_event("start")
                .service_task("task", "work")
                .end_event("end")
                .build(),
        )
        .unwrap();
    let key = engine.create_instance("proc", json!({})).unwrap();

    engine.cancel_instance(key).unwrap();

    assert_eq!(
        intents_of(&engine, "task"),
        vec![
            Intent::ElementActivating,
            Intent::ElementActivated,
            Intent::ElementTerminating,
            Intent::ElementTerminated,
        ]
    );
    assert_eq!(intents_of(&engine, "proc").last(), Some(&Intent::ElementTerminated));
    assert_eq!(engine.jobs().count(), 0);
    assert!(engine.cancel_instance(key).is_err());
}
