//! Storage areas - the medium the data store persists its envelopes in.
//!
//! A storage area is a string key-value store shared by several handles. Each
//! handle plays the part of one browser tab: writes through one handle are
//! visible to all of them, and every *other* handle is told about the change
//! through a [`StorageEvent`]. A handle never receives events for its own
//! writes, and writes that leave a value unchanged produce no event.

mod memory;
mod sqlite;

pub use memory::MemoryArea;
pub use sqlite::SqliteArea;

use crate::errors::Result;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::{self, error::RecvError};

/// Identity of one handle onto a shared storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(pub u64);

/// A change made to a storage key through some handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that was written or removed
    pub key: String,
    /// Handle that made the change
    pub origin: TabId,
}

/// Receiver of storage events made by other handles.
pub struct StorageEvents {
    rx: broadcast::Receiver<StorageEvent>,
    own: TabId,
}

impl StorageEvents {
    /// Waits for the next change made by another handle.
    ///
    /// # Errors
    /// Returns `RecvError::Lagged` when events were dropped and
    /// `RecvError::Closed` when the area is gone.
    pub async fn recv(&mut self) -> std::result::Result<StorageEvent, RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if event.origin != self.own {
                return Ok(event);
            }
        }
    }
}

/// Key-value medium shared between handles.
pub trait StorageArea: Clone + Send + Sync + 'static {
    /// Identity of this handle
    fn tab(&self) -> TabId;

    /// Reads the value stored under `key`.
    fn get_item(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Replaces the value stored under `key`.
    fn set_item(&self, key: &str, value: String) -> impl Future<Output = Result<()>> + Send;

    /// Deletes `key`; deleting a missing key is not an error.
    fn remove_item(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Subscribes to changes made through other handles.
    fn subscribe(&self) -> StorageEvents;
}

/// Broadcast hub shared by all handles of one area.
#[derive(Debug)]
pub(crate) struct EventHub {
    tx: broadcast::Sender<StorageEvent>,
    next_tab: AtomicU64,
}

impl EventHub {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_tab: AtomicU64::new(0),
        }
    }

    pub(crate) fn allocate_tab(&self) -> TabId {
        TabId(self.next_tab.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn publish(&self, key: &str, origin: TabId) {
        tracing::trace!("storage event on {key} from tab {}", origin.0);
        // No listener is fine: nothing else has the area open.
        let _ = self.tx.send(StorageEvent {
            key: key.to_string(),
            origin,
        });
    }

    pub(crate) fn subscribe(&self, own: TabId) -> StorageEvents {
        StorageEvents {
            rx: self.tx.subscribe(),
            own,
        }
    }
}
