//! Fleet table operations: filtering, searching and in-place field edits.
//!
//! These work on render-local copies of the equipment collection. Edits only
//! become visible to other views once the edited collection is saved back
//! through the data store.

use crate::core::normalizer::{CANONICAL_HEADERS, DEFAULT_STATUS, try_parse_coordinate};
use crate::errors::{Error, Result};
use crate::models::EquipmentRecord;
use std::str::FromStr;

/// An editable column of the fleet table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquipmentField {
    /// Registration number
    Registration,
    /// Equipment type
    Type,
    /// Owning corps
    Corps,
    /// Site
    Location,
    /// Operational status
    Status,
    /// Latitude
    Latitude,
    /// Longitude
    Longitude,
}

impl EquipmentField {
    /// All fields, in table column order
    pub const ALL: [Self; 7] = [
        Self::Registration,
        Self::Type,
        Self::Corps,
        Self::Location,
        Self::Status,
        Self::Latitude,
        Self::Longitude,
    ];

    /// Column header as written in exported sheets
    #[must_use]
    pub const fn header(self) -> &'static str {
        CANONICAL_HEADERS[self as usize]
    }

    /// Current value of this field, as displayed in the table.
    #[must_use]
    pub fn value_of(self, record: &EquipmentRecord) -> String {
        match self {
            Self::Registration => record.registration.clone(),
            Self::Type => record.equipment_type.clone(),
            Self::Corps => record.corps.clone(),
            Self::Location => record.location.clone(),
            Self::Status => record.status.clone(),
            Self::Latitude => record.latitude.to_string(),
            Self::Longitude => record.longitude.to_string(),
        }
    }
}

impl FromStr for EquipmentField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        let field = match lowered.as_str() {
            "immatriculation" | "registration" => Self::Registration,
            "type" | "equipment_type" => Self::Type,
            "corps d'armée" | "corps armée" | "corps_armee" | "corpsarmee" | "corps" => Self::Corps,
            "localisation" | "location" => Self::Location,
            "statut" | "status" => Self::Status,
            "latitude" => Self::Latitude,
            "longitude" => Self::Longitude,
            _ => {
                return Err(Error::UnknownField {
                    name: s.to_string(),
                });
            }
        };
        Ok(field)
    }
}

/// Replaces one field of the record at `index`.
///
/// Coordinates accept a decimal comma. Unparsable coordinate text leaves the
/// record untouched. A blank status becomes the default status, as on import.
///
/// # Errors
/// Returns `Error::RecordNotFound` when `index` is out of range.
pub fn apply_edit(
    records: &mut [EquipmentRecord],
    index: usize,
    field: EquipmentField,
    value: &str,
) -> Result<()> {
    let record = records
        .get_mut(index)
        .ok_or(Error::RecordNotFound { index })?;

    match field {
        EquipmentField::Registration => record.registration = value.to_string(),
        EquipmentField::Type => record.equipment_type = value.to_string(),
        EquipmentField::Corps => record.corps = value.to_string(),
        EquipmentField::Location => record.location = value.to_string(),
        EquipmentField::Status => {
            record.status = if value.trim().is_empty() {
                DEFAULT_STATUS.to_string()
            } else {
                value.to_string()
            };
        }
        EquipmentField::Latitude => {
            if let Some(latitude) = try_parse_coordinate(value) {
                record.latitude = latitude;
            }
        }
        EquipmentField::Longitude => {
            if let Some(longitude) = try_parse_coordinate(value) {
                record.longitude = longitude;
            }
        }
    }
    Ok(())
}

/// Keeps records of the given corps (exact match, empty means any) whose
/// fields contain `search`, case-insensitively (empty means any).
#[must_use]
pub fn filter_records<'a>(
    records: &'a [EquipmentRecord],
    corps: &str,
    search: &str,
) -> Vec<&'a EquipmentRecord> {
    let needle = search.trim().to_lowercase();
    records
        .iter()
        .filter(|record| corps.is_empty() || record.corps == corps)
        .filter(|record| {
            needle.is_empty()
                || EquipmentField::ALL
                    .iter()
                    .any(|field| field.value_of(record).to_lowercase().contains(&needle))
        })
        .collect()
}
