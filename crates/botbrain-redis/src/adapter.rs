use std::sync::{Arc, Mutex, PoisonError};

use botbrain_core::{
    Brain, BrainError, BrainEvent, ConnectionEvent, ConnectionFault, Snapshot, StoreClient,
};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinSet;

use crate::client::RedisStoreClient;
use crate::config::ConnectionConfig;

/// Lifecycle of a [`RedisBrain`].
///
/// `Init → AwaitingConnect → Loading → Ready`, with `Closed` reachable from
/// any of them. Autosave is off until `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Init,
    AwaitingConnect,
    Loading,
    Ready,
    Closed,
}

/// Handle on a spawned write.
///
/// Dropping it leaves the write running unobserved. Either way the adapter
/// lets the write finish before closing the connection.
#[derive(Debug)]
pub struct WriteAck {
    outcome: oneshot::Receiver<Result<(), BrainError>>,
}

impl WriteAck {
    /// Wait for the write to reach the store.
    pub async fn wait(self) -> Result<(), BrainError> {
        self.outcome
            .await
            .map_err(|e| BrainError::Store(format!("write task failed: {e}")))?
    }
}

enum Step {
    Store(Result<ConnectionEvent, RecvError>),
    Brain(Result<BrainEvent, RecvError>),
}

/// Persists a [`Brain`] to a store under `<prefix>:storage`.
///
/// Construction disables autosave on the brain. [`run`](RedisBrain::run)
/// opens the store and drives the state machine from the store's connection
/// events and the brain's save/close events until the brain closes.
pub struct RedisBrain {
    brain: Arc<dyn Brain>,
    store: Arc<dyn StoreClient>,
    config: ConnectionConfig,
    storage_key: String,
    state: watch::Sender<AdapterState>,
    brain_events: broadcast::Receiver<BrainEvent>,
    store_events: broadcast::Receiver<ConnectionEvent>,
    pending_writes: Mutex<JoinSet<()>>,
}

impl RedisBrain {
    pub fn new(
        brain: Arc<dyn Brain>,
        store: Arc<dyn StoreClient>,
        config: ConnectionConfig,
    ) -> Self {
        let brain_events = brain.subscribe();
        let store_events = store.subscribe();
        brain.set_auto_save(false);

        let (state, _) = watch::channel(AdapterState::Init);
        Self {
            storage_key: config.storage_key(),
            brain,
            store,
            config,
            state,
            brain_events,
            store_events,
            pending_writes: Mutex::new(JoinSet::new()),
        }
    }

    /// Build an adapter for the Redis described by the process environment.
    pub fn from_env(brain: Arc<dyn Brain>) -> Result<Self, BrainError> {
        let config = ConnectionConfig::from_env()?;
        let store = RedisStoreClient::new(&config)?;
        Ok(Self::new(brain, Arc::new(store), config))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn state(&self) -> AdapterState {
        *self.state.borrow()
    }

    pub fn state_watcher(&self) -> watch::Receiver<AdapterState> {
        self.state.subscribe()
    }

    /// Drive the adapter until the brain closes.
    ///
    /// # Errors
    ///
    /// A failed read of the stored state is fatal and ends the loop with the
    /// error; nothing is retried.
    pub async fn run(mut self) -> Result<(), BrainError> {
        self.store.open();
        self.set_state(AdapterState::AwaitingConnect);

        let mut store_open = true;
        loop {
            let step = tokio::select! {
                biased;
                event = self.store_events.recv(), if store_open => Step::Store(event),
                event = self.brain_events.recv() => Step::Brain(event),
            };

            match step {
                Step::Store(Ok(ConnectionEvent::Connected)) => self.handle_connect().await?,
                Step::Store(Ok(ConnectionEvent::Error(fault))) => handle_connection_error(&fault),
                Step::Store(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "missed store connection events");
                }
                Step::Store(Err(RecvError::Closed)) => store_open = false,
                Step::Brain(Ok(BrainEvent::Save(data))) => {
                    if let Err(e) = self.save(data) {
                        tracing::error!(error = %e, "failed to persist brain");
                    }
                }
                Step::Brain(Ok(BrainEvent::Close)) | Step::Brain(Err(RecvError::Closed)) => {
                    self.close().await;
                    return Ok(());
                }
                Step::Brain(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "missed brain events");
                }
            }
        }
    }

    /// React to the store reporting a live connection.
    ///
    /// Only the first connection loads data. With credentials the load runs
    /// after a successful `AUTH`; a failed `AUTH` is logged and the adapter
    /// keeps waiting.
    pub async fn handle_connect(&mut self) -> Result<(), BrainError> {
        let state = self.state();
        if state != AdapterState::AwaitingConnect {
            tracing::debug!(?state, "ignoring connect event");
            return Ok(());
        }
        tracing::debug!("successfully connected to Redis");

        if let Some(secret) = self.config.auth_secret.clone() {
            if !self.config.auth_handled {
                if let Err(e) = self.store.auth(&secret).await {
                    tracing::error!(error = %e, "failed to authenticate to Redis");
                    return Ok(());
                }
                tracing::info!("successfully authenticated to Redis");
                self.config.auth_handled = true;
            }
        }

        self.fetch_and_merge().await
    }

    /// Load the stored state into the brain, then enable autosave.
    pub async fn fetch_and_merge(&self) -> Result<(), BrainError> {
        self.set_state(AdapterState::Loading);
        let prefix = &self.config.key_prefix;

        let reply = self.store.get(&self.storage_key).await.map_err(|e| {
            tracing::error!(prefix = %prefix, error = %e, "failed to read brain from Redis");
            e
        })?;

        let data = match reply.filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                tracing::info!(prefix = %prefix, "data for brain retrieved from Redis");
                decode_snapshot(&raw)?
            }
            None => {
                tracing::info!(prefix = %prefix, "initializing new data for brain");
                Snapshot::new()
            }
        };

        self.brain.merge_data(data).await?;
        self.brain.emit_connected();
        self.brain.set_auto_save(true);
        self.set_state(AdapterState::Ready);
        Ok(())
    }

    /// Write the full state. The write runs on its own task; await the
    /// returned [`WriteAck`] to observe its outcome.
    pub fn save(&self, data: Option<Snapshot>) -> Result<WriteAck, BrainError> {
        let payload = encode_snapshot(data)?;
        let store = Arc::clone(&self.store);
        let key = self.storage_key.clone();
        let (tx, outcome) = oneshot::channel();

        let mut pending = self
            .pending_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            let _ = tx.send(store.set(&key, payload).await);
        });
        Ok(WriteAck { outcome })
    }

    /// Let in-flight writes finish, then close the store connection.
    pub async fn close(&self) {
        let mut pending = std::mem::take(
            &mut *self
                .pending_writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "brain write task failed before close");
            }
        }

        if let Err(e) = self.store.quit().await {
            tracing::warn!(error = %e, "error while closing Redis connection");
        }
        self.set_state(AdapterState::Closed);
    }

    fn set_state(&self, next: AdapterState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::trace!(from = ?previous, to = ?next, "adapter state changed");
        }
    }
}

/// Log a connection-level fault. Refused connections are expected while the
/// client keeps trying and produce no output.
pub fn handle_connection_error(fault: &ConnectionFault) {
    if fault.is_connection_refused() {
        return;
    }
    tracing::error!(trace = %fault.trace, "Redis connection error: {}", fault.message);
}

/// Serialize a save payload; an absent payload is written as `{}`.
pub fn encode_snapshot(data: Option<Snapshot>) -> Result<String, BrainError> {
    serde_json::to_string(&data.unwrap_or_default())
        .map_err(|e| BrainError::Parsing(format!("JSON serialize error: {e}")))
}

/// Deserialize a stored blob. JSON `null` reads as an empty mapping; any
/// other non-object is rejected.
pub fn decode_snapshot(raw: &str) -> Result<Snapshot, BrainError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| BrainError::Parsing(format!("JSON deserialize error: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Snapshot::new()),
        other => Err(BrainError::Parsing(format!(
            "stored brain is not a JSON object: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_payload_encodes_as_empty_object() {
        assert_eq!(encode_snapshot(None).unwrap(), "{}");
    }

    #[test]
    fn payload_encodes_as_json_object() {
        let data = json!({ "a": 1 }).as_object().cloned();
        assert_eq!(encode_snapshot(data).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn decode_accepts_object_and_null() {
        assert_eq!(decode_snapshot(r#"{"a":1}"#).unwrap()["a"], json!(1));
        assert!(decode_snapshot("null").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_non_objects_and_garbage() {
        assert!(matches!(decode_snapshot("[1,2]"), Err(BrainError::Parsing(_))));
        assert!(matches!(decode_snapshot("{not json"), Err(BrainError::Parsing(_))));
    }
}
