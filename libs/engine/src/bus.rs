//! Progress bus
//!
//! In-process fan-out of workflow progress events. Topics are workflow ids
//! plus the wildcard "all" stream. Each subscriber owns a bounded ring
//! buffer; a slow subscriber loses the oldest events and sees its `dropped`
//! counter grow, publishers are never blocked.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use metalforge_domain::ProgressEvent;

/// Ring-buffer capacity per subscriber
const CHANNEL_CAPACITY: usize = 256;

/// Hub distributing progress events to subscribers
pub struct ProgressBus {
    /// Per-workflow broadcast channels
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<ProgressEvent>>>>,
    /// Wildcard channel receiving every event
    all: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        let (all, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            all,
        }
    }

    /// Subscribe to one workflow's events
    ///
    /// Creates the topic channel if it does not exist yet, so subscribing
    /// before the workflow starts is safe.
    pub async fn subscribe(&self, workflow_id: &str) -> ProgressSubscriber {
        let mut topics = self.topics.write().await;

        let rx = if let Some(sender) = topics.get(workflow_id) {
            sender.subscribe()
        } else {
            let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
            topics.insert(workflow_id.to_string(), tx);
            rx
        };

        ProgressSubscriber { rx, dropped: 0 }
    }

    /// Subscribe to every workflow's events
    #[must_use]
    pub fn subscribe_all(&self) -> ProgressSubscriber {
        ProgressSubscriber {
            rx: self.all.subscribe(),
            dropped: 0,
        }
    }

    /// Publish an event to its workflow topic and the wildcard stream
    ///
    /// Send errors mean no receiver is attached; events are dropped
    /// silently in that case.
    pub async fn publish(&self, event: ProgressEvent) {
        let _ = self.all.send(event.clone());

        let topics = self.topics.read().await;
        if let Some(sender) = topics.get(&event.workflow_id) {
            let _ = sender.send(event);
        }
    }

    /// Drop a workflow's channel once its last subscriber is gone
    pub async fn cleanup(&self, workflow_id: &str) {
        let mut topics = self.topics.write().await;
        if let Some(sender) = topics.get(workflow_id) {
            if sender.receiver_count() == 0 {
                topics.remove(workflow_id);
            }
        }
    }

    /// Number of live workflow topics
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }
}

// =============================================================================
// Subscriber
// =============================================================================

/// One subscriber's view of a topic
///
/// Events arrive in publication order; overflow drops the oldest events and
/// accumulates into [`ProgressSubscriber::dropped`].
pub struct ProgressSubscriber {
    rx: broadcast::Receiver<ProgressEvent>,
    dropped: u64,
}

impl ProgressSubscriber {
    /// Receive the next event; `None` when the topic is closed
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Events lost to ring-buffer overflow so far
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

// =============================================================================
// Tests
// =============================================================================
