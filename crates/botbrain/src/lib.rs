//! botbrain — persist a chat-bot brain to Redis across restarts.
//!
//! This crate re-exports the botbrain sub-crates for single-import usage.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `memory`, `redis` |
//! | `memory` | `InMemoryBrain`, `RecordingBrain`, `InMemoryStoreClient` |
//! | `redis` | `ConnectionConfig`, `RedisStoreClient`, `RedisBrain` |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use botbrain::core::{Brain, BrainEvent};
//! use botbrain::memory::InMemoryBrain;
//! use botbrain::redis::RedisBrain;
//! ```

/// Collaborator traits and types: Brain, StoreClient, BrainEvent, BrainError.
/// Always available.
pub use botbrain_core as core;

/// In-process brain and scriptable store client.
#[cfg(feature = "memory")]
pub use botbrain_memory as memory;

/// Redis connection config, store client and persistence adapter.
#[cfg(feature = "redis")]
pub use botbrain_redis as redis;
