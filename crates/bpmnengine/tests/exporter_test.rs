// crates/bpmnengine/tests/exporter_test.rs

use bpmncore::{Intent, ProcessBuilder};
use bpmnengine::{Engine, EngineConfig};
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::test]
async fn test_exporter_receives_every_committed_record() {
    let mut engine = Engine::with_config(EngineConfig {
        exporter_buffer_size: 256,
        ..EngineConfig::default()
    });
    let mut rx = engine.subscribe();
    engine
        .deploy(&ProcessBuilder::new("proc").start_event("start").end_event("end").build())
        .unwrap();

    let key = engine.create_instance("proc", json!({})).unwrap();

    let mut exported = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(record) => exported.push(record),
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("exporter lagged: {}", e),
        }
    }

    assert_eq!(exported, engine.records().to_vec());
    assert_eq!(exported[0].key, key);
    assert_eq!(exported[0].intent, Intent::ElementActivating);
    assert_eq!(exported[0].source_position, None);
    assert!(exported[1..].iter().all(|record| record.source_position.is_some()));
    assert!(exported.windows(2).all(|w| w[0].position < w[1].position));
}

#[tokio::test]
async fn test_exporter_in_background_task() {
    let mut engine = Engine::new();
    let mut rx = engine.subscribe();

    let listener = tokio::spawn(async move {
        let mut completed = 0;
        while let Ok(record) = rx.recv().await {
            if record.intent == Intent::ElementCompleted && record.value.flow_scope_key.is_none() {
                completed += 1;
            }
        }
        completed
    });

    engine
        .deploy(&ProcessBuilder::new("proc").start_event("start").end_event("end").build())
        .unwrap();
    engine.create_instance("proc", json!({})).unwrap();
    engine.create_instance("proc", json!({})).unwrap();
    drop(engine);

    assert_eq!(listener.await.unwrap(), 2);
}
