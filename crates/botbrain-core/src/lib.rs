use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

/// Full brain state as persisted: an opaque JSON object owned by the brain.
pub type Snapshot = Map<String, Value>;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by a [`Brain`] for its persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BrainEvent {
    /// The brain wants its state persisted. `None` is treated as an empty mapping.
    Save(Option<Snapshot>),
    /// The brain is shutting down.
    Close,
}

/// A connection-level failure reported by a [`StoreClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionFault {
    pub message: String,
    /// Diagnostic trace (error chain / debug representation) for logging.
    pub trace: String,
    /// Set when the client already knows the peer refused the connection.
    #[serde(default)]
    pub refused: bool,
}

impl ConnectionFault {
    pub fn new(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: trace.into(),
            refused: false,
        }
    }

    pub fn refused(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            refused: true,
            ..Self::new(message, trace)
        }
    }

    /// Whether this fault is a refused connection, which is expected while
    /// the client keeps trying to reach the store.
    pub fn is_connection_refused(&self) -> bool {
        self.refused || self.message.contains("ECONNREFUSED")
    }
}

/// Lifecycle events emitted by a [`StoreClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Transport-level connection established (and ready, if checked).
    Connected,
    Error(ConnectionFault),
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for botbrain.
#[derive(Debug, Error)]
pub enum BrainError {
    #[error("store error: {0}")]
    Store(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("parsing error: {0}")]
    Parsing(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("brain error: {0}")]
    Brain(String),
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// The bot's in-memory key-value state container.
///
/// A persistence layer toggles autosave, merges loaded state into the brain,
/// raises the "connected" signal once loading finished and listens for
/// [`BrainEvent`]s through [`subscribe`](Brain::subscribe).
#[async_trait]
pub trait Brain: Send + Sync {
    /// Toggle whether the brain emits [`BrainEvent::Save`] on mutation.
    fn set_auto_save(&self, enabled: bool);

    /// Merge a loaded mapping into the current state (additive, not replace).
    async fn merge_data(&self, data: Snapshot) -> Result<(), BrainError>;

    /// Signal that the persisted state has been loaded.
    fn emit_connected(&self);

    fn subscribe(&self) -> broadcast::Receiver<BrainEvent>;
}

/// A connection to a remote key-value store.
///
/// Connecting happens in the background after [`open`](StoreClient::open);
/// progress is reported as [`ConnectionEvent`]s.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Start connecting. Must not block.
    fn open(&self);

    async fn get(&self, key: &str) -> Result<Option<String>, BrainError>;

    async fn set(&self, key: &str, value: String) -> Result<(), BrainError>;

    async fn auth(&self, password: &str) -> Result<(), BrainError>;

    /// Close the connection gracefully.
    async fn quit(&self) -> Result<(), BrainError>;

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_flag_marks_fault() {
        let fault = ConnectionFault::refused("connection refused", "os error 111");
        assert!(fault.is_connection_refused());
    }

    #[test]
    fn econnrefused_message_marks_fault() {
        let fault = ConnectionFault::new("connect ECONNREFUSED 127.0.0.1:6379", "");
        assert!(fault.is_connection_refused());
    }

    #[test]
    fn other_fault_is_not_refused() {
        let fault =
            ConnectionFault::new("READONLY You can't write against a read only replica", "");
        assert!(!fault.is_connection_refused());
    }
}
