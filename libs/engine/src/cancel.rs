//! Cooperative cancellation primitives
//!
//! A watch channel carries the cancellation flag from the manager to the
//! engine and into step code. Steps poll [`CancelObserver::is_cancelled`] at
//! their suspension points; the engine additionally races long waits against
//! [`CancelObserver::cancelled`].

use tokio::sync::watch;

/// Create a linked signal/observer pair
#[must_use]
pub fn cancel_pair() -> (CancelSignal, CancelObserver) {
    let (tx, rx) = watch::channel(false);
    (CancelSignal { tx }, CancelObserver { rx })
}

/// Sender half, held by the workflow manager
pub struct CancelSignal {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    /// Signal cancellation; signalling more than once is a no-op
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether cancellation has been signalled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiver half, cloned into contexts and engine tasks
#[derive(Clone)]
pub struct CancelObserver {
    rx: watch::Receiver<bool>,
}

impl CancelObserver {
    /// Whether cancellation has been signalled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is signalled
    ///
    /// A dropped signal counts as cancellation: it means the owning manager
    /// is gone and the workflow must unwind.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_is_observed() {
        let (signal, observer) = cancel_pair();
        assert!(!observer.is_cancelled());

        signal.cancel();
        assert!(observer.is_cancelled());

        // The future resolves immediately once signalled.
        tokio::time::timeout(Duration::from_millis(100), observer.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (signal, observer) = cancel_pair();
        signal.cancel();
        signal.cancel();
        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_signal_counts_as_cancelled() {
        let (signal, observer) = cancel_pair();
        drop(signal);

        tokio::time::timeout(Duration::from_millis(100), observer.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pending_until_signalled() {
        let (signal, observer) = cancel_pair();

        let pending =
            tokio::time::timeout(Duration::from_millis(50), observer.cancelled()).await;
        assert!(pending.is_err());

        signal.cancel();
    }
}
