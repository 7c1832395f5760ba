use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use botbrain_core::{BrainError, ConnectionEvent, ConnectionFault, StoreClient};
use tokio::sync::{broadcast, watch, RwLock};

const EVENT_CAPACITY: usize = 64;

/// A call made on an [`InMemoryStoreClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Open,
    Get(String),
    Set(String, String),
    Auth(String),
    Quit,
}

/// Scriptable in-memory store client.
///
/// `open()` first reports every scripted connect fault, then `Connected`.
/// After `quit()` every command fails, as on a closed connection.
/// Clients created with [`sharing`](InMemoryStoreClient::sharing) see the same
/// key space, which stands in for a restarted process talking to the same
/// server.
pub struct InMemoryStoreClient {
    data: Arc<RwLock<HashMap<String, String>>>,
    events: broadcast::Sender<ConnectionEvent>,
    connect_faults: Vec<ConnectionFault>,
    fail_auth: AtomicBool,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    closed: AtomicBool,
    calls: Mutex<Vec<StoreCall>>,
    writes: watch::Sender<usize>,
}

impl InMemoryStoreClient {
    pub fn new() -> Self {
        Self::with_data(Arc::new(RwLock::new(HashMap::new())))
    }

    fn with_data(data: Arc<RwLock<HashMap<String, String>>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (writes, _) = watch::channel(0);
        Self {
            data,
            events,
            connect_faults: Vec::new(),
            fail_auth: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            writes,
        }
    }

    /// A fresh client over the same key space.
    pub fn sharing(&self) -> Self {
        Self::with_data(Arc::clone(&self.data))
    }

    /// Faults reported by `open()` before the connection succeeds.
    pub fn with_connect_faults(mut self, faults: Vec<ConnectionFault>) -> Self {
        self.connect_faults = faults;
        self
    }

    pub fn failing_auth(self) -> Self {
        self.fail_auth.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_get(self) -> Self {
        self.fail_get.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_set(self) -> Self {
        self.fail_set.store(true, Ordering::SeqCst);
        self
    }

    /// Report a dropped connection followed by a successful reconnect.
    pub fn reconnect_after(&self, fault: ConnectionFault) {
        let _ = self.events.send(ConnectionEvent::Error(fault));
        let _ = self.events.send(ConnectionEvent::Connected);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().await.insert(key.into(), value.into());
    }

    pub async fn value(&self, key: &str) -> Option<String> {
        self.data.read().await.get(key).cloned()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every `(key, value)` passed to `set`, in call order.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Set(key, value) => Some((key, value)),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` writes have been attempted.
    pub async fn wait_for_writes(&self, count: usize) {
        let mut rx = self.writes.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }

    fn record(&self, call: StoreCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn ensure_open(&self, command: &str) -> Result<(), BrainError> {
        if self.is_closed() {
            return Err(BrainError::Store(format!(
                "Redis {command} error: connection closed"
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for InMemoryStoreClient {
    fn open(&self) {
        self.record(StoreCall::Open);
        for fault in &self.connect_faults {
            let _ = self.events.send(ConnectionEvent::Error(fault.clone()));
        }
        let _ = self.events.send(ConnectionEvent::Connected);
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BrainError> {
        self.record(StoreCall::Get(key.to_string()));
        self.ensure_open("GET")?;
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(BrainError::Store(
                "Redis GET error: connection reset by peer".to_string(),
            ));
        }
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), BrainError> {
        self.record(StoreCall::Set(key.to_string(), value.clone()));
        let result = if let Err(e) = self.ensure_open("SET") {
            Err(e)
        } else if self.fail_set.load(Ordering::SeqCst) {
            Err(BrainError::Store(
                "Redis SET error: OOM command not allowed".to_string(),
            ))
        } else {
            self.data.write().await.insert(key.to_string(), value);
            Ok(())
        };
        self.writes.send_modify(|n| *n += 1);
        result
    }

    async fn auth(&self, password: &str) -> Result<(), BrainError> {
        self.record(StoreCall::Auth(password.to_string()));
        self.ensure_open("AUTH")?;
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(BrainError::Auth("ERR invalid password".to_string()));
        }
        Ok(())
    }

    async fn quit(&self) -> Result<(), BrainError> {
        self.record(StoreCall::Quit);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }
}
