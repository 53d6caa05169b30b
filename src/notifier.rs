//! Change notification for data store observers.
//!
//! Observers subscribe once and receive a [`DataUpdated`] signal whenever the
//! stored collections may have changed. The signal carries no data: observers
//! re-read through the store. Two transports feed the same channel, the store's
//! own writes and storage events relayed from other tabs, and an observer
//! cannot tell them apart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// "The store changed" signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataUpdated {
    /// When the notification was emitted
    pub timestamp: DateTime<Utc>,
    /// Whether the equipment collection is non-empty
    pub has_data: bool,
    /// Whether the budget collection is non-empty
    pub has_budget_data: bool,
}

/// Which transport triggered a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// A write made by this handle
    InProcess,
    /// A storage event from another tab
    CrossTab,
}

/// Broadcast channel of [`DataUpdated`] signals.
#[derive(Debug)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<DataUpdated>,
    capacity: usize,
}

impl ChangeNotifier {
    /// Creates a notifier buffering `capacity` signals per observer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribes to all future signals. Signals sent before this call are
    /// not received.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DataUpdated> {
        self.tx.subscribe()
    }

    /// Sends a signal to every observer, returning how many received it.
    /// Having no observer is not an error.
    pub fn publish(&self, event: DataUpdated, transport: Transport) -> usize {
        let delivered = self.tx.send(event).unwrap_or(0);
        tracing::debug!(
            ?transport,
            has_data = event.has_data,
            has_budget_data = event.has_budget_data,
            "data change notified to {delivered} observer(s)"
        );
        delivered
    }

    /// Current number of observers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
