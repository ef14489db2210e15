//! Shutdown signal shared by every worker.

use tokio::sync::watch;

/// Creates a shutdown signal pair.
///
/// The trigger side fires once; every clone of the signal observes it.
/// Dropping the trigger counts as firing it.
#[must_use]
pub fn shutdown_signal() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Non-blocking check, used between attempts.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown has been triggered (or the trigger dropped).
    pub async fn triggered(&mut self) {
        // Err means the sender is gone, which we treat as shutdown.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
