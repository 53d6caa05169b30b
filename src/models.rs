//! Record shapes shared by the normalizer, cost model, data store and reports.
//!
//! Everything here is plain data: the canonical equipment record, its derived
//! budget projection, the envelopes the data store persists, and the loosely
//! typed spreadsheet rows the normalizer consumes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One scalar spreadsheet cell, as produced by a workbook reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Blank cell
    Empty,
    /// Boolean cell
    Bool(bool),
    /// Numeric cell
    Number(f64),
    /// Text cell
    Text(String),
}

impl Cell {
    /// Whether the cell carries a usable value. Blank text counts as empty.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Renders the cell as text. Integral numbers print without a fraction.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format!("{n}"),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value.to_string())
        }
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// A spreadsheet row keyed by its (arbitrary) header strings.
pub type Row = HashMap<String, Cell>;

/// Canonical fleet entry: identity, classification, location and status.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EquipmentRecord {
    /// Registration number, the natural key joining budget records
    pub registration: String,
    /// Free-text equipment classification (e.g. "Camion-citerne")
    #[serde(rename = "type")]
    pub equipment_type: String,
    /// Owning corps or branch
    pub corps: String,
    /// Site where the equipment is stationed
    pub location: String,
    /// Operational status
    pub status: String,
    /// Latitude, 0 when unlocated
    pub latitude: f64,
    /// Longitude, 0 when unlocated
    pub longitude: f64,
}

impl EquipmentRecord {
    /// Whether the record carries map coordinates.
    #[must_use]
    pub fn is_located(&self) -> bool {
        self.latitude != 0.0 && self.longitude != 0.0
    }
}

/// Financial projection derived from one equipment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetRecord {
    /// The equipment this projection was generated from
    #[serde(flatten)]
    pub equipment: EquipmentRecord,
    /// Purchase price in whole euros
    pub unit_cost: u64,
    /// Date of acquisition, serialized as `dd/mm/yyyy`
    #[serde(with = "french_date")]
    pub acquisition_date: NaiveDate,
    /// Amortization period in years
    pub amortization_years: u32,
    /// Yearly maintenance cost as a fraction of the unit cost
    pub maintenance_rate: f64,
    /// Current worth after linear depreciation
    pub residual_value: f64,
    /// Purchase order number (`BC{year}-{nnnn}`)
    #[serde(default)]
    pub purchase_order: String,
    /// Budget line code the purchase was charged to
    #[serde(default)]
    pub budget_line: String,
    /// Title of the purchase order
    #[serde(default)]
    pub order_title: String,
}

/// Save metadata shared by every persisted collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    /// When the collection was last written
    pub timestamp: DateTime<Utc>,
    /// Which view or import produced it
    pub source: String,
    /// Number of records at save time
    pub count: usize,
}

/// Save metadata of the budget collection, with its headline aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetMeta {
    /// Common envelope metadata
    #[serde(flatten)]
    pub store: StoreMeta,
    /// Sum of all unit costs
    pub total_budget: u64,
    /// Mean unit cost, 0 for an empty collection
    pub avg_cost: f64,
}

/// A persisted collection together with its save metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEnvelope<T, M> {
    /// The wrapped collection
    pub data: Vec<T>,
    /// Save metadata
    #[serde(flatten)]
    pub meta: M,
}

/// Manual out-of-contract ("hors forfait") price entry for a vehicle type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surcharge {
    /// Vehicle type the surcharge applies to
    pub vehicle_type: String,
    /// Price in euros, rounded to cents
    pub price: f64,
}

/// Serde adapter for French calendar dates (`dd/mm/yyyy`).
pub mod french_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    /// Display format of acquisition dates
    pub const FORMAT: &str = "%d/%m/%Y";

    /// Serializes a date as `dd/mm/yyyy`.
    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }

    /// Parses a `dd/mm/yyyy` date.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, FORMAT).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_cell_text_rendering() {
        assert_eq!(Cell::Number(12345.0).to_text(), "12345");
        assert_eq!(Cell::Number(48.85).to_text(), "48.85");
        assert_eq!(Cell::Empty.to_text(), "");
        assert!(Cell::from("").is_blank());
        assert!(!Cell::Number(0.0).is_blank());
    }

    #[test]
    fn test_budget_record_serializes_flat_with_french_date() {
        let record = BudgetRecord {
            equipment: EquipmentRecord {
                registration: "A1".to_string(),
                equipment_type: "Camion".to_string(),
                ..Default::default()
            },
            unit_cost: 200_000,
            acquisition_date: NaiveDate::from_ymd_opt(2015, 3, 9).unwrap(),
            amortization_years: 10,
            maintenance_rate: 0.08,
            residual_value: 120_000.0,
            purchase_order: "BC2026-0042".to_string(),
            budget_line: "6.2.1.001".to_string(),
            order_title: "Acquisition camion-citerne incendie".to_string(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["registration"], "A1");
        assert_eq!(json["type"], "Camion");
        assert_eq!(json["acquisitionDate"], "09/03/2015");
        assert_eq!(json["unitCost"], 200_000);

        let back: BudgetRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_equipment_record_tolerates_missing_fields() {
        let record: EquipmentRecord = serde_json::from_str(r#"{"registration":"B2"}"#).unwrap();
        assert_eq!(record.registration, "B2");
        assert_eq!(record.status, "");
        assert!(!record.is_located());
    }
}
