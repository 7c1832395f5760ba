use botbrain_core::{Brain, BrainEvent, Snapshot};
use botbrain_memory::{BrainCall, InMemoryBrain, RecordingBrain};
use serde_json::json;

fn snapshot(value: serde_json::Value) -> Snapshot {
    value.as_object().cloned().expect("object")
}

// ---------------------------------------------------------------------------
// Autosave
// ---------------------------------------------------------------------------

#[tokio::test]
async fn set_emits_full_state_when_autosave_enabled() {
    let brain = InMemoryBrain::new();
    let mut events = brain.subscribe();

    brain.set("a", json!(1)).await;
    brain.set("b", json!("two")).await;

    assert_eq!(
        events.recv().await.unwrap(),
        BrainEvent::Save(Some(snapshot(json!({ "a": 1 }))))
    );
    assert_eq!(
        events.recv().await.unwrap(),
        BrainEvent::Save(Some(snapshot(json!({ "a": 1, "b": "two" }))))
    );
}

#[tokio::test]
async fn set_is_silent_when_autosave_disabled() {
    let brain = InMemoryBrain::new();
    let mut events = brain.subscribe();

    brain.set_auto_save(false);
    brain.set("a", json!(1)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(brain.get("a").await, Some(json!(1)));
}

#[tokio::test]
async fn explicit_save_ignores_autosave() {
    let brain = InMemoryBrain::new();
    brain.set_auto_save(false);
    brain.set("a", json!(1)).await;

    let mut events = brain.subscribe();
    brain.save().await;
    assert_eq!(
        events.recv().await.unwrap(),
        BrainEvent::Save(Some(snapshot(json!({ "a": 1 }))))
    );
}

#[tokio::test]
async fn remove_missing_key_emits_nothing() {
    let brain = InMemoryBrain::new();
    let mut events = brain.subscribe();

    assert!(brain.remove("ghost").await.is_none());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn close_emits_close_event() {
    let brain = InMemoryBrain::new();
    let mut events = brain.subscribe();
    brain.close();
    assert_eq!(events.recv().await.unwrap(), BrainEvent::Close);
}

// ---------------------------------------------------------------------------
// Merge / connected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn merge_is_additive() {
    let brain = InMemoryBrain::new();
    brain.set("kept", json!(true)).await;
    brain.set("replaced", json!("old")).await;

    brain
        .merge_data(snapshot(json!({ "replaced": "new", "added": 3 })))
        .await
        .unwrap();

    assert_eq!(
        brain.data().await,
        snapshot(json!({ "kept": true, "replaced": "new", "added": 3 }))
    );
}

#[tokio::test]
async fn wait_connected_returns_after_signal() {
    let brain = std::sync::Arc::new(InMemoryBrain::new());
    assert_eq!(brain.connected_count(), 0);

    let waiter = {
        let brain = brain.clone();
        tokio::spawn(async move { brain.wait_connected().await })
    };
    brain.emit_connected();

    tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
        .await
        .expect("signal observed")
        .unwrap();
    assert_eq!(brain.connected_count(), 1);
}

#[tokio::test]
async fn recording_brain_records_calls_in_order() {
    let brain = RecordingBrain::new();

    brain.set_auto_save(false);
    brain
        .merge_data(snapshot(json!({ "a": 1 })))
        .await
        .unwrap();
    brain.emit_connected();
    brain.set_auto_save(true);

    assert_eq!(
        brain.calls(),
        vec![
            BrainCall::SetAutoSave(false),
            BrainCall::Merge(snapshot(json!({ "a": 1 }))),
            BrainCall::Connected,
            BrainCall::SetAutoSave(true),
        ]
    );
    assert_eq!(brain.inner().get("a").await, Some(json!(1)));
    assert_eq!(brain.inner().connected_count(), 1);
}
