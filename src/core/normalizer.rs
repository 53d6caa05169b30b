//! Spreadsheet row normalization.
//!
//! Imported workbooks label their columns in many ways ("Immatriculation",
//! "immatriculation", "Registration", ...). Each target field has a canonical
//! header followed by known variants; the first one present with a non-blank
//! value is used, otherwise the field takes its default. Rows are never
//! dropped, so a malformed sheet degrades to records with empty fields rather
//! than a failed import.

use crate::models::{Cell, EquipmentRecord, Row};

/// Header candidates of the registration column, canonical first
pub const REGISTRATION_HEADERS: &[&str] = &[
    "Immatriculation",
    "immatriculation",
    "Registration",
    "registration",
];
/// Header candidates of the equipment type column
pub const TYPE_HEADERS: &[&str] = &["Type", "type"];
/// Header candidates of the corps column
pub const CORPS_HEADERS: &[&str] = &[
    "Corps d'Armée",
    "corps_armee",
    "CorpsArmee",
    "Corps Armée",
    "Corps",
    "corps",
];
/// Header candidates of the location column
pub const LOCATION_HEADERS: &[&str] = &["Localisation", "localisation", "Location", "location"];
/// Header candidates of the status column
pub const STATUS_HEADERS: &[&str] = &["Statut", "statut", "Status", "status"];
/// Header candidates of the latitude column
pub const LATITUDE_HEADERS: &[&str] = &["Latitude", "latitude"];
/// Header candidates of the longitude column
pub const LONGITUDE_HEADERS: &[&str] = &["Longitude", "longitude"];

/// Status given to rows without one
pub const DEFAULT_STATUS: &str = "Active";

/// Canonical column order used when writing equipment sheets.
pub const CANONICAL_HEADERS: [&str; 7] = [
    REGISTRATION_HEADERS[0],
    TYPE_HEADERS[0],
    CORPS_HEADERS[0],
    LOCATION_HEADERS[0],
    STATUS_HEADERS[0],
    LATITUDE_HEADERS[0],
    LONGITUDE_HEADERS[0],
];

/// Maps loosely typed rows onto equipment records, one record per row.
#[must_use]
pub fn normalize(rows: &[Row]) -> Vec<EquipmentRecord> {
    rows.iter().map(normalize_row).collect()
}

/// Maps a single row onto an equipment record.
#[must_use]
pub fn normalize_row(row: &Row) -> EquipmentRecord {
    let status = text_field(row, STATUS_HEADERS);

    EquipmentRecord {
        registration: text_field(row, REGISTRATION_HEADERS),
        equipment_type: text_field(row, TYPE_HEADERS),
        corps: text_field(row, CORPS_HEADERS),
        location: text_field(row, LOCATION_HEADERS),
        status: if status.is_empty() {
            DEFAULT_STATUS.to_string()
        } else {
            status
        },
        latitude: numeric_field(row, LATITUDE_HEADERS),
        longitude: numeric_field(row, LONGITUDE_HEADERS),
    }
}

fn resolve<'a>(row: &'a Row, headers: &[&str]) -> Option<&'a Cell> {
    headers
        .iter()
        .filter_map(|header| row.get(*header))
        .find(|cell| !cell.is_blank())
}

fn text_field(row: &Row, headers: &[&str]) -> String {
    resolve(row, headers).map(Cell::to_text).unwrap_or_default()
}

fn numeric_field(row: &Row, headers: &[&str]) -> f64 {
    let value = match resolve(row, headers) {
        Some(Cell::Number(n)) => *n,
        Some(Cell::Text(s)) => parse_coordinate(s),
        _ => 0.0,
    };
    if value.is_finite() { value } else { 0.0 }
}

/// Parses a coordinate written with either a decimal point or a decimal comma.
/// Anything unparsable is 0.
#[must_use]
pub fn parse_coordinate(raw: &str) -> f64 {
    try_parse_coordinate(raw).unwrap_or(0.0)
}

/// Strict variant of [`parse_coordinate`], `None` for unparsable or
/// non-finite input.
#[must_use]
pub fn try_parse_coordinate(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    trimmed
        .parse::<f64>()
        .or_else(|_| trimmed.replace(',', ".").parse::<f64>())
        .ok()
        .filter(|value| value.is_finite())
}
