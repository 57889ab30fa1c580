//! Lifecycle events for external collaborators.
//!
//! The orchestrator owns an explicit publish/subscribe bus; UI
//! collaborators subscribe to it instead of listening on a global
//! namespace.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Sync status for a UI indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No connectivity; local writes continue to succeed.
    Offline,
    /// Connected and idle.
    Online,
    /// A sync run is in progress.
    Syncing,
    /// The last sync run failed.
    Error,
}

/// An event emitted by the sync layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Status transition for a UI indicator.
    Status(SyncStatus),
    /// The progressive loader persisted its first page; the UI may render.
    FirstBatchReady {
        /// Number of records in the first page.
        count: usize,
        /// When the page was persisted.
        at: DateTime<Utc>,
    },
    /// Incremental progress from the progressive loader.
    Progress {
        /// Records persisted so far.
        loaded: usize,
        /// Total records reported by the remote.
        total: u64,
    },
    /// The progressive loader finished its background phase.
    BackgroundSyncComplete {
        /// Total records persisted across both phases.
        total: usize,
    },
}

/// Distributes sync events to subscribers.
///
/// Subscribers that drop their receiver are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<UnboundedSender<SyncEvent>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to all subscribers, dropping disconnected ones.
    pub fn emit(&self, event: SyncEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::Status(SyncStatus::Syncing));
        assert_eq!(rx.recv().await, Some(SyncEvent::Status(SyncStatus::Syncing)));
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let event = SyncEvent::Progress { loaded: 10, total: 23 };
        bus.emit(event.clone());

        assert_eq!(rx1.recv().await, Some(event.clone()));
        assert_eq!(rx2.recv().await, Some(event));
    }

    #[tokio::test]
    async fn disconnected_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(rx);
        bus.emit(SyncEvent::Status(SyncStatus::Online));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
