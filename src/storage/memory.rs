use super::{EventHub, StorageArea, StorageEvents, TabId};
use crate::errors::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage area. Cloning keeps the same tab; use
/// [`MemoryArea::open_tab`] for a new handle onto the same data.
#[derive(Debug, Clone)]
pub struct MemoryArea {
    items: Arc<RwLock<HashMap<String, String>>>,
    hub: Arc<EventHub>,
    tab: TabId,
}

impl MemoryArea {
    /// Creates an empty area whose event channel buffers `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let hub = Arc::new(EventHub::new(capacity));
        let tab = hub.allocate_tab();
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            hub,
            tab,
        }
    }

    /// Opens another handle onto the same data.
    #[must_use]
    pub fn open_tab(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            hub: Arc::clone(&self.hub),
            tab: self.hub.allocate_tab(),
        }
    }
}

impl StorageArea for MemoryArea {
    fn tab(&self) -> TabId {
        self.tab
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<()> {
        let changed = {
            let mut items = self.items.write().await;
            let previous = items.insert(key.to_string(), value);
            previous.as_deref() != items.get(key).map(String::as_str)
        };
        if changed {
            self.hub.publish(key, self.tab);
        }
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let removed = self.items.write().await.remove(key).is_some();
        if removed {
            self.hub.publish(key, self.tab);
        }
        Ok(())
    }

    fn subscribe(&self) -> StorageEvents {
        self.hub.subscribe(self.tab)
    }
}
