//! In-process collaborators for botbrain.
//!
//! - [`InMemoryBrain`] — a [`Brain`](botbrain_core::Brain) holding its state in
//!   memory and emitting save/close events.
//! - [`RecordingBrain`] — wraps an `InMemoryBrain` and records every call a
//!   persistence layer makes, useful for testing.
//! - [`InMemoryStoreClient`] — a scriptable [`StoreClient`](botbrain_core::StoreClient)
//!   backed by a shared map.

mod brain;
mod store;

pub use brain::{BrainCall, InMemoryBrain, RecordingBrain};
pub use store::{InMemoryStoreClient, StoreCall};

// Re-export core traits for convenience.
pub use botbrain_core::{Brain, BrainEvent, Snapshot, StoreClient};
