//! Redis persistence for a bot brain.
//!
//! - [`ConnectionConfig`] — resolves the Redis URL from `REDISTOGO_URL`,
//!   `REDISCLOUD_URL`, `BOXEN_REDIS_URL` or `REDIS_URL` (in that order) and
//!   parses it into host/port or socket path, password and key prefix.
//! - [`RedisStoreClient`] — implements [`StoreClient`](botbrain_core::StoreClient)
//!   over one multiplexed connection.
//! - [`RedisBrain`] — loads `<prefix>:storage` into the brain once connected
//!   and writes the full state back on every save event.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use botbrain_memory::InMemoryBrain;
//! use botbrain_redis::RedisBrain;
//!
//! # async fn example() -> Result<(), botbrain_core::BrainError> {
//! let brain = Arc::new(InMemoryBrain::new());
//! let adapter = RedisBrain::from_env(brain.clone())?;
//! let task = tokio::spawn(adapter.run());
//!
//! brain.wait_connected().await;
//! brain.set("greeting", serde_json::json!("hello")).await;
//! brain.close();
//! # let _ = task.await;
//! # Ok(())
//! # }
//! ```

mod adapter;
mod client;
mod config;

pub use adapter::{
    decode_snapshot, encode_snapshot, handle_connection_error, AdapterState, RedisBrain, WriteAck,
};
pub use client::{RedisStoreClient, RedisStoreClientConfig};
pub use config::{
    resolve_url, resolve_url_env, ConnectionConfig, DEFAULT_PREFIX, DEFAULT_URL,
    NO_CHECK_ENV_VAR, URL_ENV_VARS,
};

// Re-export core types for convenience.
pub use botbrain_core::{Brain, BrainError, BrainEvent, Snapshot, StoreClient};
