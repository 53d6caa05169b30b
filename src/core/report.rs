//! Budget and fleet report generation.
//!
//! This module aggregates the stored collections into the figures shown by
//! the dashboards: budget totals, per-corps and per-type breakdowns, the most
//! expensive sites and the fleet composition. All functions are pure and work
//! on slices, so they can be fed straight from [`crate::store::DataStore`].

use crate::models::{BudgetRecord, EquipmentRecord};
use std::collections::{HashMap, HashSet};

/// Label used for records without a corps, type or location
pub const UNSPECIFIED: &str = "Non spécifié";

/// Default number of locations in [`top_locations_by_cost`]
pub const DEFAULT_TOP_LOCATIONS: usize = 10;

/// Headline figures of the budget collection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetSummary {
    /// Sum of all unit costs
    pub total: u64,
    /// Mean unit cost, 0 when there are no records
    pub average: f64,
    /// Highest unit cost, 0 when there are no records
    pub max: u64,
    /// Number of budget records
    pub count: usize,
}

/// Computes the headline figures of a budget collection.
#[must_use]
pub fn summarize(budget: &[BudgetRecord]) -> BudgetSummary {
    let total: u64 = budget.iter().map(|b| b.unit_cost).sum();
    let max = budget.iter().map(|b| b.unit_cost).max().unwrap_or(0);

    BudgetSummary {
        total,
        average: mean(total, budget.len()),
        max,
        count: budget.len(),
    }
}

/// Total unit cost per corps, in first-seen order.
#[must_use]
pub fn budget_by_corps(budget: &[BudgetRecord]) -> Vec<(String, u64)> {
    sum_by(budget, |b| &b.equipment.corps)
}

/// Mean unit cost per equipment type, in first-seen order.
#[must_use]
pub fn average_cost_by_type(budget: &[BudgetRecord]) -> Vec<(String, f64)> {
    let totals = sum_by(budget, |b| &b.equipment.equipment_type);
    let counts = count_by(budget, |b| &b.equipment.equipment_type);

    totals
        .into_iter()
        .map(|(label, total)| {
            let count = counts.get(&label).copied().unwrap_or(1);
            (label, mean(total, count))
        })
        .collect()
}

/// Locations with the highest total unit cost, most expensive first.
///
/// # Arguments
/// * `budget` - Budget records to aggregate
/// * `limit` - Maximum number of locations returned (see [`DEFAULT_TOP_LOCATIONS`])
#[must_use]
pub fn top_locations_by_cost(budget: &[BudgetRecord], limit: usize) -> Vec<(String, u64)> {
    let mut totals = sum_by(budget, |b| &b.equipment.location);
    // Stable sort keeps first-seen order between equal totals
    totals.sort_by(|a, b| b.1.cmp(&a.1));
    totals.truncate(limit);
    totals
}

/// Raw per-corps statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpsStats {
    /// Corps label
    pub corps: String,
    /// Number of equipment records
    pub count: usize,
    /// Sum of unit costs
    pub total_cost: u64,
    /// Mean unit cost
    pub average_cost: f64,
    /// Highest unit cost
    pub max_cost: u64,
    /// Number of distinct locations
    pub sites: usize,
}

impl CorpsStats {
    /// Metrics as floats, in the order of [`CORPS_METRICS`].
    // Cast safety: counts and costs stay far below 2^52.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn metrics(&self) -> [f64; 5] {
        [
            self.count as f64,
            self.total_cost as f64,
            self.average_cost,
            self.max_cost as f64,
            self.sites as f64,
        ]
    }
}

/// Labels of the per-corps comparison axes
pub const CORPS_METRICS: [&str; 5] = [
    "Nombre d'équipements",
    "Budget total",
    "Coût moyen",
    "Équipement le plus cher",
    "Nombre de sites",
];

/// Per-corps statistics with every metric scaled to a percentage of the
/// largest value of that metric across corps.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpsComparison {
    /// Raw figures
    pub stats: CorpsStats,
    /// Scaled figures (0-100), in the order of [`CORPS_METRICS`]
    pub normalized: [f64; 5],
}

/// Computes per-corps statistics and their normalized comparison.
#[must_use]
pub fn corps_statistics(budget: &[BudgetRecord]) -> Vec<CorpsComparison> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, (CorpsStats, HashSet<&str>)> = HashMap::new();

    for record in budget {
        let corps = label(&record.equipment.corps);
        let (stats, sites) = grouped.entry(corps.clone()).or_insert_with(|| {
            order.push(corps.clone());
            (
                CorpsStats {
                    corps,
                    count: 0,
                    total_cost: 0,
                    average_cost: 0.0,
                    max_cost: 0,
                    sites: 0,
                },
                HashSet::new(),
            )
        });
        stats.count += 1;
        stats.total_cost += record.unit_cost;
        stats.max_cost = stats.max_cost.max(record.unit_cost);
        sites.insert(record.equipment.location.as_str());
    }

    let stats: Vec<CorpsStats> = order
        .iter()
        .filter_map(|corps| grouped.remove(corps))
        .map(|(mut stats, sites)| {
            stats.average_cost = mean(stats.total_cost, stats.count);
            stats.sites = sites.len();
            stats
        })
        .collect();

    let mut maxima = [0.0_f64; 5];
    for entry in &stats {
        for (max, value) in maxima.iter_mut().zip(entry.metrics()) {
            *max = f64::max(*max, value);
        }
    }

    stats
        .into_iter()
        .map(|stats| {
            let mut normalized = stats.metrics();
            for (value, max) in normalized.iter_mut().zip(maxima) {
                *value = if max > 0.0 { *value / max * 100.0 } else { 0.0 };
            }
            CorpsComparison { stats, normalized }
        })
        .collect()
}

/// Fleet composition by branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetCounts {
    /// Air force equipment
    pub air: usize,
    /// Navy equipment
    pub navy: usize,
    /// Army equipment
    pub army: usize,
}

/// Counts equipment per branch from the corps name.
///
/// Matching is a case-insensitive substring test, checked in the order air,
/// navy, army; a record is counted at most once.
#[must_use]
pub fn fleet_counts(records: &[EquipmentRecord]) -> FleetCounts {
    let mut counts = FleetCounts::default();
    for record in records {
        let corps = record.corps.to_lowercase();
        if corps.contains("air") {
            counts.air += 1;
        } else if corps.contains("marine") {
            counts.navy += 1;
        } else if corps.contains("terre") {
            counts.army += 1;
        }
    }
    counts
}

/// Formats a euro amount the French way: no decimals, narrow no-break space
/// thousands separator and a trailing euro sign.
#[must_use]
pub fn format_eur(amount: f64) -> String {
    // Cast safety: rounded amounts are well inside i64 range
    #[allow(clippy::cast_possible_truncation)]
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() * 2);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('\u{202f}');
        }
        grouped.push(c);
    }

    let sign = if rounded < 0 { "-" } else { "" };
    format!("{sign}{grouped}\u{a0}€")
}

fn label(raw: &str) -> String {
    if raw.trim().is_empty() {
        UNSPECIFIED.to_string()
    } else {
        raw.to_string()
    }
}

// Cast safety: totals and counts stay far below 2^52
#[allow(clippy::cast_precision_loss)]
fn mean(total: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

fn sum_by<F>(budget: &[BudgetRecord], key: F) -> Vec<(String, u64)>
where
    F: Fn(&BudgetRecord) -> &String,
{
    let mut totals: Vec<(String, u64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in budget {
        let label = label(key(record));
        if let Some(&i) = index.get(&label) {
            totals[i].1 += record.unit_cost;
        } else {
            index.insert(label.clone(), totals.len());
            totals.push((label, record.unit_cost));
        }
    }
    totals
}

fn count_by<F>(budget: &[BudgetRecord], key: F) -> HashMap<String, usize>
where
    F: Fn(&BudgetRecord) -> &String,
{
    let mut counts = HashMap::new();
    for record in budget {
        *counts.entry(label(key(record))).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use chrono::NaiveDate;

    fn budget(corps: &str, kind: &str, location: &str, unit_cost: u64) -> BudgetRecord {
        BudgetRecord {
            equipment: EquipmentRecord {
                registration: format!("{kind}-{unit_cost}"),
                equipment_type: kind.to_string(),
                corps: corps.to_string(),
                location: location.to_string(),
                status: "Active".to_string(),
                ..Default::default()
            },
            unit_cost,
            acquisition_date: NaiveDate::from_ymd_opt(2015, 6, 1).unwrap_or_default(),
            amortization_years: 10,
            maintenance_rate: 0.05,
            residual_value: 0.0,
            purchase_order: String::new(),
            budget_line: String::new(),
            order_title: String::new(),
        }
    }

    fn sample_budget() -> Vec<BudgetRecord> {
        vec![
            budget("Armée de Terre", "Camion", "Metz", 200_000),
            budget("Marine Nationale", "Fourgon", "Brest", 100_000),
            budget("Armée de Terre", "Camion", "Nancy", 300_000),
            budget("", "Remorque", "", 30_000),
        ]
    }

    #[test]
    fn test_summarize() {
        let summary = summarize(&sample_budget());
        assert_eq!(summary.total, 630_000);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.max, 300_000);
        assert_eq!(summary.average, 157_500.0);
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.average, 0.0);
        assert_eq!(summary.max, 0);
        assert_eq!(summary.count, 0);
    }

    #[test]
    fn test_budget_by_corps_groups_unspecified() {
        let by_corps = budget_by_corps(&sample_budget());
        assert_eq!(
            by_corps,
            vec![
                ("Armée de Terre".to_string(), 500_000),
                ("Marine Nationale".to_string(), 100_000),
                (UNSPECIFIED.to_string(), 30_000),
            ]
        );
    }

    #[test]
    fn test_average_cost_by_type() {
        let by_type = average_cost_by_type(&sample_budget());
        assert_eq!(by_type[0], ("Camion".to_string(), 250_000.0));
        assert_eq!(by_type[1], ("Fourgon".to_string(), 100_000.0));
        assert_eq!(by_type.len(), 3);
    }

    #[test]
    fn test_top_locations_sorted_and_limited() {
        let top = top_locations_by_cost(&sample_budget(), 2);
        assert_eq!(
            top,
            vec![("Nancy".to_string(), 300_000), ("Metz".to_string(), 200_000)]
        );
        assert_eq!(
            top_locations_by_cost(&sample_budget(), DEFAULT_TOP_LOCATIONS).len(),
            4
        );
    }

    #[test]
    fn test_corps_statistics_normalized() {
        let stats = corps_statistics(&sample_budget());
        assert_eq!(stats.len(), 3);

        let army = &stats[0];
        assert_eq!(army.stats.corps, "Armée de Terre");
        assert_eq!(army.stats.count, 2);
        assert_eq!(army.stats.total_cost, 500_000);
        assert_eq!(army.stats.max_cost, 300_000);
        assert_eq!(army.stats.sites, 2);
        // The army leads every metric
        assert_eq!(army.normalized, [100.0; 5]);

        let navy = &stats[1];
        assert_eq!(navy.normalized[0], 50.0);
        assert_eq!(navy.normalized[1], 20.0);
        assert!(navy.normalized.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn test_corps_statistics_empty() {
        assert!(corps_statistics(&[]).is_empty());
    }

    #[test]
    fn test_fleet_counts() {
        let corps = [
            "Armée de l'Air",
            "MARINE NATIONALE",
            "Armée de Terre",
            "Gendarmerie",
            "",
        ];
        let records: Vec<EquipmentRecord> = corps
            .iter()
            .map(|corps| EquipmentRecord {
                corps: (*corps).to_string(),
                ..Default::default()
            })
            .collect();

        assert_eq!(
            fleet_counts(&records),
            FleetCounts {
                air: 1,
                navy: 1,
                army: 1
            }
        );
    }

    #[test]
    fn test_format_eur() {
        assert_eq!(format_eur(0.0), "0\u{a0}€");
        assert_eq!(format_eur(999.4), "999\u{a0}€");
        assert_eq!(format_eur(1000.0), "1\u{202f}000\u{a0}€");
        assert_eq!(format_eur(1_234_567.6), "1\u{202f}234\u{202f}568\u{a0}€");
        assert_eq!(format_eur(-45_000.0), "-45\u{202f}000\u{a0}€");
    }
}
