//! Manual out-of-contract ("hors forfait") price entries.
//!
//! The ledger is a plain list persisted under its own storage key, next to
//! the equipment and budget envelopes. Invalid input never reaches storage.

use crate::errors::Result;
use crate::models::Surcharge;
use crate::storage::StorageArea;
use tracing::{debug, error, info};

/// Persisted list of surcharge entries.
#[derive(Debug, Clone)]
pub struct SurchargeLedger<S: StorageArea> {
    area: S,
    key: String,
}

impl<S: StorageArea> SurchargeLedger<S> {
    /// Creates a ledger stored under `key`.
    #[must_use]
    pub fn new(area: S, key: impl Into<String>) -> Self {
        Self {
            area,
            key: key.into(),
        }
    }

    /// Appends an entry.
    ///
    /// The vehicle type is trimmed and the price accepts a decimal comma and
    /// is rounded to cents. An empty type or a price that is not a finite
    /// number aborts silently with `Ok(None)`.
    ///
    /// # Errors
    /// Returns an error if the storage area rejects the write.
    pub async fn add(&self, vehicle_type: &str, price_input: &str) -> Result<Option<Surcharge>> {
        let vehicle_type = vehicle_type.trim();
        let Some(price) = parse_price(price_input) else {
            debug!("Ignoring surcharge with invalid price {price_input:?}");
            return Ok(None);
        };
        if vehicle_type.is_empty() {
            debug!("Ignoring surcharge without a vehicle type");
            return Ok(None);
        }

        let entry = Surcharge {
            vehicle_type: vehicle_type.to_string(),
            price,
        };
        let mut entries = self.list().await;
        entries.push(entry.clone());
        self.area
            .set_item(&self.key, serde_json::to_string(&entries)?)
            .await?;

        info!("Added surcharge of {price} for {vehicle_type}");
        Ok(Some(entry))
    }

    /// Stored entries, in insertion order. Empty when absent or unreadable.
    pub async fn list(&self) -> Vec<Surcharge> {
        let raw = match self.area.get_item(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("Failed to read surcharges: {e}");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            error!("Error reading stored surcharges: {e}");
            Vec::new()
        })
    }
}

fn parse_price(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    trimmed
        .parse::<f64>()
        .or_else(|_| trimmed.replace(',', ".").parse::<f64>())
        .ok()
        .filter(|price| price.is_finite())
        .map(|price| (price * 100.0).round() / 100.0)
}
