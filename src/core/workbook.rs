//! Sheet import and export.
//!
//! Workbooks are exchanged as CSV: one file per sheet, first row as headers.
//! Reading happens here, asynchronously, and hands loosely typed rows to the
//! normalizer; nothing downstream touches the filesystem.

use crate::core::normalizer::{CANONICAL_HEADERS, DEFAULT_STATUS};
use crate::core::report::summarize;
use crate::errors::{Error, Result};
use crate::models::{BudgetRecord, Cell, EquipmentRecord, Row};
use chrono::NaiveDate;
use csv::{ReaderBuilder, WriterBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sheet name of the equipment data in a full export
pub const MAIN_SHEET: &str = "Données Principales";
/// Sheet name of the budget analysis in a full export
pub const ANALYSIS_SHEET: &str = "Analyse Budgétaire";
/// Sheet name of the detailed budget data
pub const DETAIL_SHEET: &str = "Données Détaillées";
/// Sheet name of the budget indicators
pub const SUMMARY_SHEET: &str = "Synthèse Budgétaire";

const ANALYSIS_HEADERS: [&str; 10] = [
    "Immatriculation",
    "Type",
    "Corps d'Armée",
    "Localisation",
    "Coût Initial (€)",
    "Date Acquisition",
    "Durée Amortissement (ans)",
    "Coût Maintenance (%)",
    "Valeur Résiduelle (€)",
    "Statut",
];

const DETAIL_HEADERS: [&str; 10] = [
    "Immatriculation",
    "Type",
    "Corps d'Armée",
    "Localisation",
    "Coût Unitaire (€)",
    "Date d'Acquisition",
    "Bon de Commande",
    "Ligne Budgétaire",
    "Intitulé Commande",
    "Statut",
];

/// One named table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    /// Sheet name
    pub name: String,
    /// Column headers
    pub headers: Vec<String>,
    /// Cell values, one inner vector per row, aligned with `headers`
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    fn new(name: &str, headers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            headers: headers.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        }
    }
}

/// A set of sheets written together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workbook {
    /// Base file name, without extension
    pub file_stem: String,
    /// Sheets in output order
    pub sheets: Vec<Sheet>,
}

/// Reads the rows of a sheet file, keyed by the header row.
///
/// Every non-empty cell is read as text; the normalizer handles numbers.
///
/// # Errors
/// Returns `Error::Workbook` if the file cannot be read or parsed.
pub async fn read_first_sheet(path: impl AsRef<Path>) -> Result<Vec<Row>> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| Error::Workbook {
        message: format!("cannot read {}: {e}", path.display()),
    })?;
    let rows = parse_rows(&bytes).map_err(|e| Error::Workbook {
        message: format!("cannot parse {}: {e}", path.display()),
    })?;
    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn parse_rows(bytes: &[u8]) -> std::result::Result<Vec<Row>, csv::Error> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), Cell::from(value)))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Writes every sheet as `{file_stem}_{sheet name}.csv` under `dir`,
/// creating the directory if needed. Returns the written paths.
///
/// # Errors
/// Returns an error if the directory or a file cannot be written.
pub async fn write_workbook(dir: impl AsRef<Path>, workbook: &Workbook) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;

    let mut written = Vec::with_capacity(workbook.sheets.len());
    for sheet in &workbook.sheets {
        let path = dir.join(format!("{}_{}.csv", workbook.file_stem, sheet.name));
        tokio::fs::write(&path, sheet_to_csv(sheet)?).await?;
        written.push(path);
    }
    info!(
        "Exported workbook {} ({} sheets) to {}",
        workbook.file_stem,
        written.len(),
        dir.display()
    );
    Ok(written)
}

fn sheet_to_csv(sheet: &Sheet) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&sheet.headers)?;
    for row in &sheet.rows {
        writer.write_record(row)?;
    }
    writer.into_inner().map_err(|e| Error::Workbook {
        message: e.to_string(),
    })
}

/// Equipment records under the canonical headers, so that the sheet imports
/// back to the same records. A blank status is written as the default status,
/// which is what importing the blank cell would produce.
#[must_use]
pub fn equipment_sheet(name: &str, records: &[EquipmentRecord]) -> Sheet {
    let mut sheet = Sheet::new(name, &CANONICAL_HEADERS);
    sheet.rows = records
        .iter()
        .map(|r| {
            let status = if r.status.trim().is_empty() {
                DEFAULT_STATUS
            } else {
                r.status.as_str()
            };
            vec![
                r.registration.clone(),
                r.equipment_type.clone(),
                r.corps.clone(),
                r.location.clone(),
                status.to_string(),
                r.latitude.to_string(),
                r.longitude.to_string(),
            ]
        })
        .collect();
    sheet
}

fn analysis_sheet(budget: &[BudgetRecord]) -> Sheet {
    let mut sheet = Sheet::new(ANALYSIS_SHEET, &ANALYSIS_HEADERS);
    sheet.rows = budget
        .iter()
        .map(|b| {
            let e = &b.equipment;
            vec![
                e.registration.clone(),
                e.equipment_type.clone(),
                e.corps.clone(),
                e.location.clone(),
                b.unit_cost.to_string(),
                french_date(b.acquisition_date),
                b.amortization_years.to_string(),
                format!("{:.1}", b.maintenance_rate * 100.0),
                format!("{:.0}", b.residual_value.round()),
                e.status.clone(),
            ]
        })
        .collect();
    sheet
}

fn detail_sheet(budget: &[BudgetRecord]) -> Sheet {
    let mut sheet = Sheet::new(DETAIL_SHEET, &DETAIL_HEADERS);
    sheet.rows = budget
        .iter()
        .map(|b| {
            let e = &b.equipment;
            vec![
                e.registration.clone(),
                e.equipment_type.clone(),
                e.corps.clone(),
                e.location.clone(),
                b.unit_cost.to_string(),
                french_date(b.acquisition_date),
                b.purchase_order.clone(),
                b.budget_line.clone(),
                b.order_title.clone(),
                e.status.clone(),
            ]
        })
        .collect();
    sheet
}

fn summary_sheet(budget: &[BudgetRecord]) -> Sheet {
    let summary = summarize(budget);
    let mut sheet = Sheet::new(SUMMARY_SHEET, &["Indicateur", "Valeur"]);
    sheet.rows = [
        ("Budget Total (€)", summary.total.to_string()),
        ("Coût Moyen (€)", format!("{:.0}", summary.average.round())),
        ("Nombre d'Équipements", summary.count.to_string()),
        ("Coût Maximum (€)", summary.max.to_string()),
    ]
    .into_iter()
    .map(|(label, value)| vec![label.to_string(), value])
    .collect();
    sheet
}

fn french_date(date: NaiveDate) -> String {
    date.format(crate::models::french_date::FORMAT).to_string()
}

/// Full export: the equipment sheet plus, when budget data exists, the
/// budget analysis sheet.
///
/// # Errors
/// Returns `Error::NothingToExport` when there is no equipment.
pub fn full_export(
    records: &[EquipmentRecord],
    budget: &[BudgetRecord],
    date: NaiveDate,
) -> Result<Workbook> {
    if records.is_empty() {
        return Err(Error::NothingToExport {
            collection: "equipment".to_string(),
        });
    }
    let mut sheets = vec![equipment_sheet(MAIN_SHEET, records)];
    if !budget.is_empty() {
        sheets.push(analysis_sheet(budget));
    }
    Ok(Workbook {
        file_stem: format!("Export_Complet_{}", date.format("%Y-%m-%d")),
        sheets,
    })
}

/// Budget export: detailed budget data plus a sheet of headline indicators.
///
/// # Errors
/// Returns `Error::NothingToExport` when there is no budget data.
pub fn budget_export(budget: &[BudgetRecord], date: NaiveDate) -> Result<Workbook> {
    if budget.is_empty() {
        return Err(Error::NothingToExport {
            collection: "budget".to_string(),
        });
    }
    Ok(Workbook {
        file_stem: format!("Analyse_Budgetaire_{}", date.format("%Y-%m-%d")),
        sheets: vec![detail_sheet(budget), summary_sheet(budget)],
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::cost_model::CostModel;
    use crate::core::normalizer::normalize;
    use crate::test_utils::sample_records;
    use chrono::{TimeZone, Utc};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[tokio::test]
    async fn test_export_then_import_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let records = sample_records();

        let workbook = full_export(&records, &[], date())?;
        let paths = write_workbook(dir.path(), &workbook).await?;
        assert_eq!(paths.len(), 1);

        let rows = read_first_sheet(&paths[0]).await?;
        assert_eq!(normalize(&rows), records);
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_status_exports_as_default() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut records = sample_records();
        records[0].status = String::new();

        let sheet = equipment_sheet(MAIN_SHEET, &records);
        assert_eq!(sheet.rows[0][4], DEFAULT_STATUS);

        let workbook = full_export(&records, &[], date())?;
        let paths = write_workbook(dir.path(), &workbook).await?;
        let reimported = normalize(&read_first_sheet(&paths[0]).await?);

        let exported: Vec<String> = reimported.iter().map(|r| r.status.clone()).collect();
        let written: Vec<String> = sheet.rows.iter().map(|row| row[4].clone()).collect();
        assert_eq!(exported, written);
        assert_eq!(reimported[1..], records[1..]);
        Ok(())
    }

    #[tokio::test]
    async fn test_read_missing_file_is_workbook_error() {
        let result = read_first_sheet("/definitely/not/here.csv").await;
        assert!(matches!(result, Err(Error::Workbook { .. })));
    }

    #[tokio::test]
    async fn test_read_handles_bom_and_blank_cells() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("parc.csv");
        tokio::fs::write(&path, "\u{feff}Immatriculation,Type,Latitude\nA1,,\"48,39\"\n").await?;

        let rows = read_first_sheet(&path).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Immatriculation"], Cell::from("A1"));
        assert_eq!(rows[0]["Type"], Cell::Empty);
        assert_eq!(rows[0]["Latitude"], Cell::from("48,39"));
        Ok(())
    }

    #[test]
    fn test_empty_collections_have_nothing_to_export() {
        assert!(matches!(
            full_export(&[], &[], date()),
            Err(Error::NothingToExport { .. })
        ));
        assert!(matches!(
            budget_export(&[], date()),
            Err(Error::NothingToExport { .. })
        ));
    }

    #[test]
    fn test_full_export_sheets() {
        let records = sample_records();
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap();
        let budget = CostModel::default().derive_all(&records, now);

        let workbook = full_export(&records, &budget, date()).unwrap();
        assert_eq!(workbook.file_stem, "Export_Complet_2025-03-14");
        assert_eq!(workbook.sheets.len(), 2);
        assert_eq!(workbook.sheets[0].name, MAIN_SHEET);

        let analysis = &workbook.sheets[1];
        assert_eq!(analysis.name, ANALYSIS_SHEET);
        assert_eq!(analysis.rows.len(), budget.len());
        // Maintenance rate as a percentage with one decimal
        assert_eq!(
            analysis.rows[0][7],
            format!("{:.1}", budget[0].maintenance_rate * 100.0)
        );
        assert!(!analysis.rows[0][8].contains('.'));
    }

    #[test]
    fn test_budget_export_summary() {
        let records = sample_records();
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap();
        let budget = CostModel::default().derive_all(&records, now);

        let workbook = budget_export(&budget, date()).unwrap();
        assert_eq!(workbook.file_stem, "Analyse_Budgetaire_2025-03-14");

        let detail = &workbook.sheets[0];
        assert_eq!(detail.name, DETAIL_SHEET);
        assert_eq!(detail.rows[0][6], budget[0].purchase_order);

        let summary = &workbook.sheets[1];
        assert_eq!(summary.headers, vec!["Indicateur", "Valeur"]);
        let total: u64 = budget.iter().map(|b| b.unit_cost).sum();
        assert_eq!(summary.rows[0][1], total.to_string());
        assert_eq!(summary.rows[2][1], records.len().to_string());
    }
}
