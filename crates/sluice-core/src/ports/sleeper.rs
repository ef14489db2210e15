//! Sleeper port - time passing, abstracted.

use std::time::Duration;

use async_trait::async_trait;

/// Waits for `d`.
///
/// Callers race this against the shutdown signal, so implementations
/// do not need to be cancellation-aware themselves.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, d: Duration);
}

/// Real sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}
