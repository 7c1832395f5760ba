use std::sync::Arc;

use botbrain::core::BrainError;
use botbrain::memory::InMemoryBrain;
use botbrain::redis::RedisBrain;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), BrainError> {
    tracing_subscriber::fmt::init();

    let brain = Arc::new(InMemoryBrain::new());
    let adapter = RedisBrain::from_env(brain.clone())?;
    println!("Persisting brain under {}", adapter.storage_key());
    let task = tokio::spawn(adapter.run());

    brain.wait_connected().await;

    let launches = brain
        .get("launches")
        .await
        .and_then(|value| value.as_u64())
        .unwrap_or(0)
        + 1;
    brain.set("launches", json!(launches)).await;
    println!("This brain has been started {launches} time(s)");

    // The adapter flushes pending writes before it sends QUIT.
    brain.close();

    task.await
        .map_err(|e| BrainError::Brain(format!("adapter task failed: {e}")))??;
    tracing::info!("brain closed");
    Ok(())
}
