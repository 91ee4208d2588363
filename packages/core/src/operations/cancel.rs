//! Cooperative cancellation for long-running forest scans
//!
//! Validate and Rebuild walk whole forests. Callers that may need to abort
//! them (shutdown, a client disconnect) create a `CancelTrigger` /
//! `CancelSignal` pair and pass the signal in; the scan checks it periodically
//! and stops without committing anything.

use tokio::sync::watch;

/// Sending half: flips the signal once
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        // Receivers may all be gone already; nothing left to tell then.
        let _ = self.tx.send(true);
    }
}

/// Receiving half, cheap to clone
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a connected trigger/signal pair
    pub fn pair() -> (CancelTrigger, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelTrigger { tx }, CancelSignal { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation has been requested.
    ///
    /// Never resolves if the trigger is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
