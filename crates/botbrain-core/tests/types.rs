use botbrain_core::{BrainError, BrainEvent, ConnectionEvent, ConnectionFault, Snapshot};
use serde_json::json;

#[test]
fn error_display_includes_subsystem() {
    let err = BrainError::Store("Redis GET error: broken pipe".into());
    assert_eq!(err.to_string(), "store error: Redis GET error: broken pipe");

    let err = BrainError::Config("invalid redis url".into());
    assert_eq!(err.to_string(), "config error: invalid redis url");
}

#[test]
fn fault_without_refused_field_deserializes_as_not_refused() {
    let fault: ConnectionFault =
        serde_json::from_value(json!({ "message": "timeout", "trace": "Timeout" })).unwrap();
    assert!(!fault.refused);
    assert!(!fault.is_connection_refused());
}

#[test]
fn save_event_carries_full_state() {
    let mut state = Snapshot::new();
    state.insert("users".into(), json!({ "1": { "name": "shell" } }));

    let event = BrainEvent::Save(Some(state.clone()));
    match event {
        BrainEvent::Save(Some(data)) => assert_eq!(data, state),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn connection_events_compare_by_value() {
    let a = ConnectionEvent::Error(ConnectionFault::new("boom", "trace"));
    let b = ConnectionEvent::Error(ConnectionFault::new("boom", "trace"));
    assert_eq!(a, b);
    assert_ne!(a, ConnectionEvent::Connected);
}
