//! The data store - sole reader and writer of the persisted collections.
//!
//! Two envelopes live in the storage area: the equipment collection and the
//! budget collection derived from it. Every save replaces the equipment
//! envelope, regenerates the whole budget collection through the cost model,
//! replaces the budget envelope and then notifies observers once. Reads never
//! fail: a missing or corrupt envelope reads as an empty collection.
//!
//! The store is constructed explicitly and shared by handle (`Arc<DataStore>`)
//! with every view that needs it.

use crate::config::{AppConfig, StoreSettings};
use crate::core::cost_model::CostModel;
use crate::core::fleet::{EquipmentField, apply_edit};
use crate::core::normalizer::normalize;
use crate::errors::{Error, Result};
use crate::models::{BudgetMeta, BudgetRecord, EquipmentRecord, Row, StoreEnvelope, StoreMeta};
use crate::notifier::{ChangeNotifier, DataUpdated, Transport};
use crate::storage::StorageArea;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Only the collection part of an envelope.
#[derive(Deserialize)]
struct EnvelopeData<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// Gateway to the equipment and budget collections.
#[derive(Debug)]
pub struct DataStore<S: StorageArea> {
    area: S,
    settings: StoreSettings,
    cost_model: CostModel,
    notifier: ChangeNotifier,
}

impl<S: StorageArea> DataStore<S> {
    /// Creates a store over `area` with an explicit cost model.
    #[must_use]
    pub fn new(area: S, settings: StoreSettings, cost_model: CostModel) -> Self {
        let notifier = ChangeNotifier::new(settings.event_capacity);
        Self {
            area,
            settings,
            cost_model,
            notifier,
        }
    }

    /// Creates a store configured from the application settings.
    #[must_use]
    pub fn from_config(area: S, config: &AppConfig) -> Self {
        Self::new(
            area,
            config.store.clone(),
            CostModel::from_settings(&config.cost_model),
        )
    }

    /// The storage area handle this store writes through.
    #[must_use]
    pub const fn area(&self) -> &S {
        &self.area
    }

    /// Storage keys and notification settings.
    #[must_use]
    pub const fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// The cost model used to derive budget records.
    #[must_use]
    pub const fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    /// Subscribes to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DataUpdated> {
        self.notifier.subscribe()
    }

    /// Replaces the equipment collection, regenerates the budget collection
    /// and notifies observers.
    ///
    /// Both envelopes are built before anything is written. If the budget
    /// write fails, the previous equipment envelope is put back, so a failed
    /// save leaves both collections as they were.
    ///
    /// # Errors
    /// Returns the storage error that aborted the save, or `Error::Storage`
    /// when restoring the previous equipment envelope failed as well.
    pub async fn save(&self, records: &[EquipmentRecord], source: &str) -> Result<()> {
        let equipment = self.equipment_envelope(records, source)?;
        let (budget, budget_count) = self.budget_envelope(records, source)?;
        let previous = self.area.get_item(&self.settings.equipment_key).await?;

        self.area
            .set_item(&self.settings.equipment_key, equipment)
            .await?;
        if let Err(e) = self.area.set_item(&self.settings.budget_key, budget).await {
            error!("Budget write failed, restoring previous equipment data: {e}");
            return match self.restore_equipment(previous).await {
                Ok(()) => Err(e),
                Err(rollback) => Err(Error::Storage {
                    message: format!("budget write failed ({e}) and rollback failed ({rollback})"),
                }),
            };
        }

        info!(
            "Saved {} equipment records and {budget_count} budget records from {source}",
            records.len()
        );
        self.notify_data_change(Transport::InProcess).await;
        Ok(())
    }

    /// Normalizes imported rows and saves them.
    ///
    /// # Errors
    /// Returns an error if the save fails.
    pub async fn import_rows(&self, rows: &[Row], source: &str) -> Result<Vec<EquipmentRecord>> {
        let records = normalize(rows);
        debug!("Normalized {} rows imported from {source}", rows.len());
        self.save(&records, source).await?;
        Ok(records)
    }

    /// Edits one field of the stored record at `index` and saves the
    /// collection back, which also regenerates the budget.
    ///
    /// # Errors
    /// Returns `Error::RecordNotFound` for a bad index, or a storage error.
    pub async fn edit_record(
        &self,
        index: usize,
        field: EquipmentField,
        value: &str,
        source: &str,
    ) -> Result<EquipmentRecord> {
        let mut records = self.get().await;
        apply_edit(&mut records, index, field, value)?;
        self.save(&records, source).await?;
        Ok(records.swap_remove(index))
    }

    /// Regenerates the budget collection when equipment data exists but no
    /// budget data does. Returns whether a regeneration happened.
    ///
    /// # Errors
    /// Returns an error if the budget write fails.
    pub async fn ensure_budget(&self, source: &str) -> Result<bool> {
        if self.has_budget_data().await {
            return Ok(false);
        }
        let records = self.get().await;
        if records.is_empty() {
            return Ok(false);
        }
        info!("Generating budget data from {} stored equipment records", records.len());
        let (budget, _) = self.budget_envelope(&records, source)?;
        self.area.set_item(&self.settings.budget_key, budget).await?;
        self.notify_data_change(Transport::InProcess).await;
        Ok(true)
    }

    /// The equipment collection, empty when absent or unreadable.
    pub async fn get(&self) -> Vec<EquipmentRecord> {
        self.read_data(&self.settings.equipment_key).await
    }

    /// The budget collection, empty when absent or unreadable.
    pub async fn get_budget(&self) -> Vec<BudgetRecord> {
        self.read_data(&self.settings.budget_key).await
    }

    /// Save metadata of the equipment collection.
    pub async fn meta(&self) -> Option<StoreMeta> {
        self.read_meta(&self.settings.equipment_key).await
    }

    /// Save metadata of the budget collection.
    pub async fn budget_meta(&self) -> Option<BudgetMeta> {
        self.read_meta(&self.settings.budget_key).await
    }

    /// Whether any equipment is stored.
    pub async fn has_data(&self) -> bool {
        !self.get().await.is_empty()
    }

    /// Whether any budget data is stored.
    pub async fn has_budget_data(&self) -> bool {
        !self.get_budget().await.is_empty()
    }

    /// Removes both collections and notifies observers.
    ///
    /// # Errors
    /// Returns an error if the storage area rejects a removal.
    pub async fn clear(&self) -> Result<()> {
        self.area.remove_item(&self.settings.equipment_key).await?;
        self.area.remove_item(&self.settings.budget_key).await?;
        info!("All stored data cleared");
        self.notify_data_change(Transport::InProcess).await;
        Ok(())
    }

    /// Spawns the relay turning other tabs' storage events on either
    /// collection key into local notifications.
    ///
    /// The task only holds a weak reference to the store. It ends once the
    /// store is dropped, at the latest on the next storage event, or when the
    /// storage area's event channel closes.
    pub fn listen_for_storage_events(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let mut events = self.area.subscribe();

        tokio::spawn(async move {
            loop {
                let received = events.recv().await;
                let Some(store) = weak.upgrade() else {
                    debug!("Data store dropped, relay stopping");
                    break;
                };
                match received {
                    Ok(event) => {
                        if store.is_collection_key(&event.key) {
                            store.notify_data_change(Transport::CrossTab).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Storage relay lagged by {skipped} events, re-notifying");
                        store.notify_data_change(Transport::CrossTab).await;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Storage event channel closed, relay stopping");
                        break;
                    }
                }
            }
        })
    }

    fn is_collection_key(&self, key: &str) -> bool {
        key == self.settings.equipment_key || key == self.settings.budget_key
    }

    /// Publishes the current store state to every observer.
    pub async fn notify_data_change(&self, transport: Transport) {
        let event = DataUpdated {
            timestamp: Utc::now(),
            has_data: self.has_data().await,
            has_budget_data: self.has_budget_data().await,
        };
        self.notifier.publish(event, transport);
    }

    async fn restore_equipment(&self, previous: Option<String>) -> Result<()> {
        match previous {
            Some(raw) => self.area.set_item(&self.settings.equipment_key, raw).await,
            None => self.area.remove_item(&self.settings.equipment_key).await,
        }
    }

    fn equipment_envelope(&self, records: &[EquipmentRecord], source: &str) -> Result<String> {
        let envelope = StoreEnvelope {
            data: records.to_vec(),
            meta: StoreMeta {
                timestamp: Utc::now(),
                source: source.to_string(),
                count: records.len(),
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Derives the budget collection and serializes its envelope, returning
    /// it with the number of budget records.
    fn budget_envelope(&self, records: &[EquipmentRecord], source: &str) -> Result<(String, usize)> {
        let now = Utc::now();
        let budget = self.cost_model.derive_all(records, now);

        let total_budget: u64 = budget.iter().map(|b| b.unit_cost).sum();
        // Cast safety: totals and counts stay far below 2^52.
        #[allow(clippy::cast_precision_loss)]
        let avg_cost = if budget.is_empty() {
            0.0
        } else {
            total_budget as f64 / budget.len() as f64
        };

        let count = budget.len();
        let envelope = StoreEnvelope {
            meta: BudgetMeta {
                store: StoreMeta {
                    timestamp: now,
                    source: source.to_string(),
                    count,
                },
                total_budget,
                avg_cost,
            },
            data: budget,
        };
        Ok((serde_json::to_string(&envelope)?, count))
    }

    async fn read_raw(&self, key: &str) -> Option<String> {
        match self.area.get_item(key).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to read {key} from storage: {e}");
                None
            }
        }
    }

    async fn read_data<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let Some(raw) = self.read_raw(key).await else {
            return Vec::new();
        };
        match serde_json::from_str::<EnvelopeData<T>>(&raw) {
            Ok(envelope) => envelope.data,
            Err(e) => {
                error!("Error reading stored data under {key}: {e}");
                Vec::new()
            }
        }
    }

    async fn read_meta<M: DeserializeOwned>(&self, key: &str) -> Option<M> {
        let raw = self.read_raw(key).await?;
        serde_json::from_str(&raw)
            .inspect_err(|e| error!("Error reading metadata under {key}: {e}"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::models::Cell;
    use crate::storage::{MemoryArea, StorageEvents, TabId};
    use crate::test_utils::{init_test_tracing, memory_store, sample_records};
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Memory area that rejects every write to one key.
    #[derive(Debug, Clone)]
    struct ReadOnlyKeyArea {
        inner: MemoryArea,
        read_only_key: String,
    }

    impl StorageArea for ReadOnlyKeyArea {
        fn tab(&self) -> TabId {
            self.inner.tab()
        }

        async fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key).await
        }

        async fn set_item(&self, key: &str, value: String) -> Result<()> {
            if key == self.read_only_key {
                return Err(Error::Storage {
                    message: format!("{key} is read-only"),
                });
            }
            self.inner.set_item(key, value).await
        }

        async fn remove_item(&self, key: &str) -> Result<()> {
            self.inner.remove_item(key).await
        }

        fn subscribe(&self) -> StorageEvents {
            self.inner.subscribe()
        }
    }

    fn store_with_read_only_budget(area: &MemoryArea) -> DataStore<ReadOnlyKeyArea> {
        let config = AppConfig::default();
        let failing = ReadOnlyKeyArea {
            inner: area.clone(),
            read_only_key: config.store.budget_key.clone(),
        };
        DataStore::from_config(failing, &config)
    }

    #[tokio::test]
    async fn test_save_then_get_returns_same_records() -> Result<()> {
        init_test_tracing();
        let store = memory_store();
        let records = sample_records();

        store.save(&records, "dashboard").await?;

        assert_eq!(store.get().await, records);
        let budget = store.get_budget().await;
        assert_eq!(budget.len(), records.len());

        let budget_regs: HashSet<_> = budget
            .iter()
            .map(|b| b.equipment.registration.clone())
            .collect();
        let input_regs: HashSet<_> = records.iter().map(|r| r.registration.clone()).collect();
        assert_eq!(budget_regs, input_regs);
        Ok(())
    }

    #[tokio::test]
    async fn test_envelope_metadata() -> Result<()> {
        let store = memory_store();
        let records = sample_records();
        store.save(&records, "import").await?;

        let meta = store.meta().await.unwrap();
        assert_eq!(meta.count, records.len());
        assert_eq!(meta.source, "import");

        let budget_meta = store.budget_meta().await.unwrap();
        let budget = store.get_budget().await;
        assert_eq!(budget_meta.store.count, budget.len());
        let total: u64 = budget.iter().map(|b| b.unit_cost).sum();
        assert_eq!(budget_meta.total_budget, total);
        assert!((budget_meta.avg_cost - total as f64 / budget.len() as f64).abs() < 1e-6);
        Ok(())
    }

    #[tokio::test]
    async fn test_camion_scenario() -> Result<()> {
        let store = memory_store();
        let record = EquipmentRecord {
            registration: "A1".to_string(),
            equipment_type: "Camion".to_string(),
            corps: "Armée de Terre".to_string(),
            location: "Metz".to_string(),
            status: "Active".to_string(),
            ..Default::default()
        };
        store.save(&[record], "x").await?;

        let budget = store.get_budget().await;
        assert_eq!(budget.len(), 1);
        assert!((180_000..=350_000).contains(&budget[0].unit_cost));
        assert_eq!(budget[0].amortization_years, 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_empties_both_collections() -> Result<()> {
        let store = memory_store();
        store.save(&sample_records(), "x").await?;
        assert!(store.has_data().await);
        assert!(store.has_budget_data().await);

        store.clear().await?;

        assert!(store.get().await.is_empty());
        assert!(store.get_budget().await.is_empty());
        assert!(store.meta().await.is_none());
        assert!(!store.has_data().await);
        assert!(!store.has_budget_data().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_never_saved_reads_empty() {
        let store = memory_store();
        assert!(store.get().await.is_empty());
        assert!(store.get_budget().await.is_empty());
        assert!(store.meta().await.is_none());
        assert!(store.budget_meta().await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_storage_reads_empty() -> Result<()> {
        init_test_tracing();
        let store = memory_store();
        let keys = store.settings().clone();
        store
            .area()
            .set_item(&keys.equipment_key, "{not json".to_string())
            .await?;
        store
            .area()
            .set_item(&keys.budget_key, "[1, 2".to_string())
            .await?;

        assert!(store.get().await.is_empty());
        assert!(store.get_budget().await.is_empty());
        assert!(store.meta().await.is_none());
        assert!(store.budget_meta().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_each_save_notifies_once() -> Result<()> {
        let store = memory_store();
        let mut rx = store.subscribe();

        store.save(&sample_records(), "dashboard").await?;
        store.save(&sample_records()[..1], "budget").await?;

        let first = rx.try_recv().unwrap();
        assert!(first.has_data && first.has_budget_data);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "exactly two notifications expected");

        // An observer arriving afterwards only sees the final state
        let mut late = store.subscribe();
        assert!(late.try_recv().is_err());
        assert_eq!(store.get().await.len(), 1);
        assert_eq!(store.meta().await.unwrap().source, "budget");
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_notifies_empty_state() -> Result<()> {
        let store = memory_store();
        store.save(&sample_records(), "x").await?;
        let mut rx = store.subscribe();

        store.clear().await?;

        let event = rx.try_recv().unwrap();
        assert!(!event.has_data);
        assert!(!event.has_budget_data);
        Ok(())
    }

    #[tokio::test]
    async fn test_import_rows_normalizes_and_saves() -> Result<()> {
        let store = memory_store();
        let rows: Vec<Row> = vec![
            [
                ("Immatriculation".to_string(), Cell::from("Z9")),
                ("type".to_string(), Cell::from("Autopompe")),
            ]
            .into_iter()
            .collect(),
            Row::new(),
        ];

        let records = store.import_rows(&rows, "import").await?;
        assert_eq!(records.len(), 2);
        assert_eq!(store.get().await, records);
        assert_eq!(store.get_budget().await[0].amortization_years, 12);
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_record_saves_and_regenerates() -> Result<()> {
        let store = memory_store();
        store.save(&sample_records(), "x").await?;
        let mut rx = store.subscribe();

        let edited = store
            .edit_record(0, EquipmentField::Type, "Extincteur", "table")
            .await?;
        assert_eq!(edited.equipment_type, "Extincteur");

        assert_eq!(store.get().await[0].equipment_type, "Extincteur");
        assert_eq!(store.get_budget().await[0].amortization_years, 20);
        assert_eq!(store.meta().await.unwrap().source, "table");
        assert!(rx.try_recv().is_ok());

        let missing = store.edit_record(42, EquipmentField::Type, "x", "table").await;
        assert!(matches!(missing, Err(Error::RecordNotFound { index: 42 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_budget_regenerates_missing_budget() -> Result<()> {
        let store = memory_store();
        assert!(!store.ensure_budget("budget").await?);

        store.save(&sample_records(), "x").await?;
        assert!(!store.ensure_budget("budget").await?);

        let budget_key = store.settings().budget_key.clone();
        store.area().remove_item(&budget_key).await?;
        assert!(!store.has_budget_data().await);

        assert!(store.ensure_budget("budget").await?);
        assert_eq!(store.get_budget().await.len(), sample_records().len());
        assert_eq!(store.budget_meta().await.unwrap().store.source, "budget");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_budget_write_restores_equipment() -> Result<()> {
        init_test_tracing();
        let area = MemoryArea::new(16);
        let store = DataStore::from_config(area.clone(), &AppConfig::default());
        store.save(&sample_records(), "dashboard").await?;
        let budget_before = store.get_budget().await;
        let meta_before = store.meta().await.unwrap();

        let failing = store_with_read_only_budget(&area);
        let mut rx = failing.subscribe();
        let result = failing.save(&sample_records()[..1], "budget").await;

        assert!(matches!(result, Err(Error::Storage { .. })));
        assert_eq!(store.get().await, sample_records());
        assert_eq!(store.meta().await.unwrap(), meta_before);
        assert_eq!(store.get_budget().await, budget_before);
        assert!(rx.try_recv().is_err(), "a failed save must not notify");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_first_save_leaves_store_empty() {
        let area = MemoryArea::new(16);
        let failing = store_with_read_only_budget(&area);

        assert!(failing.save(&sample_records(), "import").await.is_err());

        assert!(!failing.has_data().await);
        assert!(failing.meta().await.is_none());
        assert!(!failing.has_budget_data().await);
    }

    #[tokio::test]
    async fn test_relay_stops_when_store_is_dropped() {
        let store = Arc::new(memory_store());
        let relay = store.listen_for_storage_events();

        drop(store);

        let finished = timeout(Duration::from_millis(500), relay).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_relay_stops_on_next_event_after_drop() -> Result<()> {
        let area = MemoryArea::new(16);
        let other = area.open_tab();
        let store = Arc::new(DataStore::from_config(area, &AppConfig::default()));
        let equipment_key = store.settings().equipment_key.clone();
        let relay = store.listen_for_storage_events();

        drop(store);
        other.set_item(&equipment_key, "{}".to_string()).await?;

        let finished = timeout(Duration::from_millis(500), relay).await;
        assert!(matches!(finished, Ok(Ok(()))));
        Ok(())
    }

    #[tokio::test]
    async fn test_other_tab_is_notified() -> Result<()> {
        init_test_tracing();
        let area = MemoryArea::new(16);
        let writer = DataStore::from_config(area.clone(), &AppConfig::default());
        let reader = Arc::new(DataStore::from_config(area.open_tab(), &AppConfig::default()));
        let relay = reader.listen_for_storage_events();
        let mut rx = reader.subscribe();

        writer.save(&sample_records(), "other-tab").await?;

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.has_data);
        assert_eq!(reader.get().await, sample_records());

        relay.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_own_writes_do_not_echo_through_relay() -> Result<()> {
        let store = Arc::new(memory_store());
        let relay = store.listen_for_storage_events();
        let mut rx = store.subscribe();

        store.save(&sample_records(), "x").await?;

        assert!(rx.recv().await.is_ok());
        let echo = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(echo.is_err(), "own writes must only notify once");

        relay.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_unrelated_keys_are_ignored_by_relay() -> Result<()> {
        let area = MemoryArea::new(16);
        let other = area.open_tab();
        let store = Arc::new(DataStore::from_config(area, &AppConfig::default()));
        let relay = store.listen_for_storage_events();
        let mut rx = store.subscribe();

        other.set_item("sidebar.collapsed", "true".to_string()).await?;

        let nothing = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(nothing.is_err());
        relay.abort();
        Ok(())
    }
}
