//! Shared test utilities for `Fleetwatch`.
//!
//! This module provides tracing setup, an in-memory data store and a small
//! fleet of sample equipment records covering every corps.

use crate::{
    config::AppConfig, models::EquipmentRecord, storage::MemoryArea, store::DataStore,
};
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates a data store over a fresh in-memory area with default settings.
pub fn memory_store() -> DataStore<MemoryArea> {
    let config = AppConfig::default();
    DataStore::from_config(MemoryArea::new(config.store.event_capacity), &config)
}

fn record(
    registration: &str,
    equipment_type: &str,
    corps: &str,
    location: &str,
    status: &str,
    (latitude, longitude): (f64, f64),
) -> EquipmentRecord {
    EquipmentRecord {
        registration: registration.to_string(),
        equipment_type: equipment_type.to_string(),
        corps: corps.to_string(),
        location: location.to_string(),
        status: status.to_string(),
        latitude,
        longitude,
    }
}

/// Four records across the three corps.
///
/// # Contents
/// * `A1` - Camion, Armée de Terre, Metz
/// * `B2` - Fourgon, Marine Nationale, Brest
/// * `C3` - Extincteur CO2, Armée de l'Air, Istres
/// * `D4` - Remorque, Marine Nationale, Toulon
pub fn sample_records() -> Vec<EquipmentRecord> {
    vec![
        record("A1", "Camion", "Armée de Terre", "Metz", "Active", (49.12, 6.18)),
        record("B2", "Fourgon", "Marine Nationale", "Brest", "Maintenance", (48.39, -4.49)),
        record("C3", "Extincteur CO2", "Armée de l'Air", "Istres", "Active", (43.51, 4.92)),
        record("D4", "Remorque", "Marine Nationale", "Toulon", "Hors service", (43.12, 5.93)),
    ]
}
