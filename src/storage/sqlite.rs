use super::{EventHub, StorageArea, StorageEvents, TabId};
use crate::config::database::{create_connection, create_tables};
use crate::entities::{StorageEntry, storage_entry};
use crate::errors::Result;
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use std::sync::Arc;

/// Storage area persisted in a `SQLite` key-value table through `SeaORM`.
///
/// Events reach handles opened from the same area within this process.
#[derive(Debug, Clone)]
pub struct SqliteArea {
    db: DatabaseConnection,
    hub: Arc<EventHub>,
    tab: TabId,
}

impl SqliteArea {
    /// Connects to `database_url` and creates the storage table if needed.
    pub async fn open(database_url: &str, capacity: usize) -> Result<Self> {
        let db = create_connection(database_url).await?;
        create_tables(&db).await?;
        Ok(Self::from_connection(db, capacity))
    }

    /// Wraps an existing connection whose tables are already created.
    #[must_use]
    pub fn from_connection(db: DatabaseConnection, capacity: usize) -> Self {
        let hub = Arc::new(EventHub::new(capacity));
        let tab = hub.allocate_tab();
        Self { db, hub, tab }
    }

    /// Opens another handle onto the same database.
    #[must_use]
    pub fn open_tab(&self) -> Self {
        Self {
            db: self.db.clone(),
            hub: Arc::clone(&self.hub),
            tab: self.hub.allocate_tab(),
        }
    }

    async fn find_entry(&self, key: &str) -> Result<Option<storage_entry::Model>> {
        StorageEntry::find()
            .filter(storage_entry::Column::Key.eq(key))
            .one(&self.db)
            .await
            .map_err(Into::into)
    }
}

impl StorageArea for SqliteArea {
    fn tab(&self) -> TabId {
        self.tab
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.find_entry(key).await?.map(|entry| entry.value))
    }

    async fn set_item(&self, key: &str, value: String) -> Result<()> {
        let now = Utc::now().naive_utc();

        if let Some(entry) = self.find_entry(key).await? {
            if entry.value == value {
                return Ok(());
            }
            let mut active_model: storage_entry::ActiveModel = entry.into();
            active_model.value = Set(value);
            active_model.updated_at = Set(now);
            active_model.update(&self.db).await?;
        } else {
            let active_model = storage_entry::ActiveModel {
                key: Set(key.to_string()),
                value: Set(value),
                updated_at: Set(now),
                ..Default::default()
            };
            active_model.insert(&self.db).await?;
        }

        self.hub.publish(key, self.tab);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let result = StorageEntry::delete_many()
            .filter(storage_entry::Column::Key.eq(key))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            self.hub.publish(key, self.tab);
        }
        Ok(())
    }

    fn subscribe(&self) -> StorageEvents {
        self.hub.subscribe(self.tab)
    }
}
