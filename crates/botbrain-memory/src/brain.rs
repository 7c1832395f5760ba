use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use botbrain_core::{Brain, BrainError, BrainEvent, Snapshot};
use serde_json::Value;
use tokio::sync::{broadcast, watch, RwLock};

const EVENT_CAPACITY: usize = 64;

/// In-memory brain state with autosave semantics.
///
/// Mutations through [`set`](InMemoryBrain::set) and
/// [`remove`](InMemoryBrain::remove) emit [`BrainEvent::Save`] with the full
/// state only while autosave is enabled. [`save`](InMemoryBrain::save) always
/// emits. Autosave starts enabled.
pub struct InMemoryBrain {
    data: RwLock<Snapshot>,
    auto_save: AtomicBool,
    events: broadcast::Sender<BrainEvent>,
    connected: watch::Sender<usize>,
}

impl InMemoryBrain {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (connected, _) = watch::channel(0);
        Self {
            data: RwLock::new(Snapshot::new()),
            auto_save: AtomicBool::new(true),
            events,
            connected,
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.data.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        let snapshot = {
            let mut data = self.data.write().await;
            data.insert(key.into(), value);
            data.clone()
        };
        self.auto_persist(snapshot);
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        let (removed, snapshot) = {
            let mut data = self.data.write().await;
            let removed = data.remove(key);
            (removed, data.clone())
        };
        if removed.is_some() {
            self.auto_persist(snapshot);
        }
        removed
    }

    /// A copy of the whole state.
    pub async fn data(&self) -> Snapshot {
        self.data.read().await.clone()
    }

    /// Emit a save event with the current state regardless of autosave.
    pub async fn save(&self) {
        let snapshot = self.data().await;
        let _ = self.events.send(BrainEvent::Save(Some(snapshot)));
    }

    /// Emit the close event.
    pub fn close(&self) {
        let _ = self.events.send(BrainEvent::Close);
    }

    pub fn auto_save(&self) -> bool {
        self.auto_save.load(Ordering::SeqCst)
    }

    /// How many times the "connected" signal has been raised.
    pub fn connected_count(&self) -> usize {
        *self.connected.borrow()
    }

    /// Wait until the "connected" signal has been raised at least once.
    pub async fn wait_connected(&self) {
        let mut rx = self.connected.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|count| *count > 0).await;
    }

    fn auto_persist(&self, snapshot: Snapshot) {
        if self.auto_save() {
            let _ = self.events.send(BrainEvent::Save(Some(snapshot)));
        }
    }
}

impl Default for InMemoryBrain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brain for InMemoryBrain {
    fn set_auto_save(&self, enabled: bool) {
        self.auto_save.store(enabled, Ordering::SeqCst);
    }

    async fn merge_data(&self, incoming: Snapshot) -> Result<(), BrainError> {
        let mut data = self.data.write().await;
        for (key, value) in incoming {
            data.insert(key, value);
        }
        Ok(())
    }

    fn emit_connected(&self) {
        self.connected.send_modify(|count| *count += 1);
    }

    fn subscribe(&self) -> broadcast::Receiver<BrainEvent> {
        self.events.subscribe()
    }
}

/// A call made on a [`RecordingBrain`].
#[derive(Debug, Clone, PartialEq)]
pub enum BrainCall {
    SetAutoSave(bool),
    Merge(Snapshot),
    Connected,
}

/// A brain that records every call made on it, useful for testing.
///
/// Calls are forwarded to an inner [`InMemoryBrain`], so events and state
/// behave exactly as they would without the recorder.
#[derive(Default, Clone)]
pub struct RecordingBrain {
    inner: Arc<InMemoryBrain>,
    calls: Arc<Mutex<Vec<BrainCall>>>,
}

impl RecordingBrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryBrain {
        &self.inner
    }

    pub fn calls(&self) -> Vec<BrainCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Payloads of every merge, in order.
    pub fn merges(&self) -> Vec<Snapshot> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrainCall::Merge(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BrainCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl Brain for RecordingBrain {
    fn set_auto_save(&self, enabled: bool) {
        self.record(BrainCall::SetAutoSave(enabled));
        self.inner.set_auto_save(enabled);
    }

    async fn merge_data(&self, data: Snapshot) -> Result<(), BrainError> {
        self.record(BrainCall::Merge(data.clone()));
        self.inner.merge_data(data).await
    }

    fn emit_connected(&self) {
        self.record(BrainCall::Connected);
        self.inner.emit_connected();
    }

    fn subscribe(&self) -> broadcast::Receiver<BrainEvent> {
        self.inner.subscribe()
    }
}
