//! Cost model - derives budget projections from equipment records.
//!
//! Equipment types are classified against an ordered list of keyword tiers:
//! the first tier whose keyword occurs (case-insensitively) in the type string
//! wins, and unmatched types fall back to a default tier. The order matters:
//! "Véhicule de Secours" is listed after "Véhicule" and is therefore never
//! reached by any type that contains it.
//!
//! Unit cost and acquisition date are drawn at random inside the matched
//! tier. With [`Randomness::Entropy`] two derivations of the same record give
//! different figures; [`Randomness::Seeded`] draws them from a generator seeded
//! by the registration instead.

use crate::config::CostModelSettings;
use crate::models::{BudgetRecord, EquipmentRecord};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// One classification bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Keyword searched for in the equipment type
    pub keyword: String,
    /// Lowest unit cost in euros
    pub min_cost: u64,
    /// Highest unit cost in euros
    pub max_cost: u64,
    /// Amortization period in years
    pub amortization_years: u32,
    /// Yearly maintenance cost as a fraction of the unit cost
    pub maintenance_rate: f64,
    /// Budget line codes purchases are charged to
    #[serde(default)]
    pub budget_lines: Vec<String>,
    /// Typical purchase order titles
    #[serde(default)]
    pub order_titles: Vec<String>,
}

impl Tier {
    fn new(
        keyword: &str,
        cost: (u64, u64),
        amortization_years: u32,
        maintenance_rate: f64,
        budget_lines: &[&str],
        order_titles: &[&str],
    ) -> Self {
        Self {
            keyword: keyword.to_string(),
            min_cost: cost.0,
            max_cost: cost.1,
            amortization_years,
            maintenance_rate,
            budget_lines: budget_lines.iter().map(ToString::to_string).collect(),
            order_titles: order_titles.iter().map(ToString::to_string).collect(),
        }
    }

    fn matches(&self, lowered_type: &str) -> bool {
        lowered_type.contains(&self.keyword.to_lowercase())
    }
}

const DEFAULT_LINES: &[&str] = &["6.9.9.001", "6.9.9.002"];
const DEFAULT_TITLES: &[&str] = &[
    "Matériel de sécurité incendie",
    "Équipement de protection",
    "Matériel de secours",
];

/// The built-in tier list, in classification order.
#[must_use]
pub fn default_tiers() -> Vec<Tier> {
    vec![
        Tier::new(
            "Camion",
            (180_000, 350_000),
            10,
            0.08,
            &["6.2.1.001", "6.2.1.002", "6.2.1.003"],
            &[
                "Acquisition camion-citerne incendie",
                "Renouvellement véhicule de secours",
                "Achat camion grande échelle",
            ],
        ),
        Tier::new(
            "Fourgon",
            (90_000, 180_000),
            8,
            0.06,
            &["6.2.2.001", "6.2.2.002", "6.2.2.003"],
            &[
                "Fourgon pompe-tonne léger",
                "Véhicule de première intervention",
                "Fourgon mousse haute expansion",
            ],
        ),
        Tier::new(
            "Véhicule",
            (60_000, 140_000),
            7,
            0.05,
            &["6.2.3.001", "6.2.3.002", "6.2.3.003"],
            &[
                "Véhicule de liaison",
                "Voiture de service",
                "Véhicule de commandement",
            ],
        ),
        Tier::new(
            "Remorque",
            (25_000, 60_000),
            15,
            0.03,
            &["6.2.4.001", "6.2.4.002"],
            &[
                "Remorque porte-matériel",
                "Remorque éclairage",
                "Remorque groupe électrogène",
            ],
        ),
        Tier::new(
            "Extincteur",
            (80, 800),
            20,
            0.02,
            &["6.3.1.001", "6.3.1.002"],
            &[
                "Extincteurs portatifs CO2",
                "Extincteurs à poudre ABC",
                "Extincteurs à eau pulvérisée",
            ],
        ),
        Tier::new("Échelle", (200_000, 500_000), 15, 0.10, DEFAULT_LINES, DEFAULT_TITLES),
        Tier::new("Autopompe", (250_000, 400_000), 12, 0.12, DEFAULT_LINES, DEFAULT_TITLES),
        Tier::new(
            "Véhicule de Secours",
            (150_000, 300_000),
            7,
            0.05,
            DEFAULT_LINES,
            DEFAULT_TITLES,
        ),
    ]
}

/// The tier used when no keyword matches.
#[must_use]
pub fn fallback_tier() -> Tier {
    Tier::new("default", (15_000, 120_000), 10, 0.06, DEFAULT_LINES, DEFAULT_TITLES)
}

/// Ordered (keyword, tier) list with a fallback.
#[derive(Debug, Clone)]
pub struct TierTable {
    tiers: Vec<Tier>,
    fallback: Tier,
}

impl TierTable {
    /// Builds a table evaluated in the order given.
    #[must_use]
    pub const fn new(tiers: Vec<Tier>, fallback: Tier) -> Self {
        Self { tiers, fallback }
    }

    /// Returns the first tier whose keyword occurs in `equipment_type`.
    #[must_use]
    pub fn classify(&self, equipment_type: &str) -> &Tier {
        let lowered = equipment_type.to_lowercase();
        self.tiers
            .iter()
            .find(|tier| tier.matches(&lowered))
            .unwrap_or(&self.fallback)
    }

    /// Tiers in evaluation order, without the fallback.
    #[must_use]
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::new(default_tiers(), fallback_tier())
    }
}

/// Lower bound of the residual value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualFloor {
    /// Fraction of the unit cost
    pub ratio: f64,
    /// Absolute minimum in euros
    pub minimum: f64,
}

impl ResidualFloor {
    /// The floor for an asset of the given cost: the larger of the ratio and
    /// the minimum, never above the cost itself.
    #[must_use]
    pub fn value_for(self, unit_cost: f64) -> f64 {
        (unit_cost * self.ratio)
            .max(self.minimum)
            .min(unit_cost)
            .max(0.0)
    }
}

impl Default for ResidualFloor {
    fn default() -> Self {
        Self {
            ratio: 0.05,
            minimum: 1000.0,
        }
    }
}

/// Straight-line residual value of an asset `age_years` old.
///
/// Equals `unit_cost` at age 0 and reaches the floor at the end of the
/// amortization period, staying there afterwards.
#[must_use]
pub fn residual_value(
    unit_cost: f64,
    amortization_years: u32,
    age_years: f64,
    floor: ResidualFloor,
) -> f64 {
    let floor_value = floor.value_for(unit_cost);
    let age = age_years.max(0.0);
    let period = f64::from(amortization_years);

    if amortization_years == 0 || age >= period {
        return floor_value;
    }

    let yearly_depreciation = unit_cost / period;
    (unit_cost - yearly_depreciation * age).max(floor_value)
}

/// Fractional years between an acquisition date (at midnight UTC) and `now`.
#[must_use]
pub fn age_in_years(acquired: NaiveDate, now: DateTime<Utc>) -> f64 {
    let acquired_at = acquired.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    // Cast safety: second counts of realistic ages are far below 2^52.
    #[allow(clippy::cast_precision_loss)]
    let seconds = (now - acquired_at).num_seconds() as f64;
    seconds / SECONDS_PER_YEAR
}

/// Where random draws come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Randomness {
    /// Fresh entropy on every derivation
    Entropy,
    /// Generator seeded from the registration and this salt
    Seeded {
        /// Mixed into every record seed
        salt: u64,
    },
}

/// Derives budget records from equipment records.
#[derive(Debug, Clone)]
pub struct CostModel {
    table: TierTable,
    epoch: NaiveDate,
    floor: ResidualFloor,
    randomness: Randomness,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::from_settings(&CostModelSettings::default())
    }
}

impl CostModel {
    /// Builds a model from its configuration section.
    #[must_use]
    pub fn from_settings(settings: &CostModelSettings) -> Self {
        Self {
            table: TierTable::new(settings.tiers.clone(), settings.default_tier.clone()),
            epoch: settings.acquisition_epoch,
            floor: ResidualFloor {
                ratio: settings.residual_floor_ratio,
                minimum: settings.residual_floor_minimum,
            },
            randomness: if settings.reproducible {
                Randomness::Seeded { salt: 0 }
            } else {
                Randomness::Entropy
            },
        }
    }

    /// Replaces the randomness source.
    #[must_use]
    pub const fn with_randomness(mut self, randomness: Randomness) -> Self {
        self.randomness = randomness;
        self
    }

    /// The classification table.
    #[must_use]
    pub const fn table(&self) -> &TierTable {
        &self.table
    }

    /// The residual value floor.
    #[must_use]
    pub const fn floor(&self) -> ResidualFloor {
        self.floor
    }

    /// Classifies an equipment type.
    #[must_use]
    pub fn classify(&self, equipment_type: &str) -> &Tier {
        self.table.classify(equipment_type)
    }

    /// Derives the budget projection of one record as seen at `now`.
    #[must_use]
    pub fn derive(&self, record: &EquipmentRecord, now: DateTime<Utc>) -> BudgetRecord {
        match self.randomness {
            Randomness::Entropy => self.derive_with(record, now, &mut rand::thread_rng()),
            Randomness::Seeded { salt } => {
                let mut rng = StdRng::seed_from_u64(record_seed(&record.registration, salt));
                self.derive_with(record, now, &mut rng)
            }
        }
    }

    /// Derives one budget record per input record, in order.
    #[must_use]
    pub fn derive_all(&self, records: &[EquipmentRecord], now: DateTime<Utc>) -> Vec<BudgetRecord> {
        records.iter().map(|record| self.derive(record, now)).collect()
    }

    /// Derives a budget record drawing from the given generator.
    pub fn derive_with<R: Rng + ?Sized>(
        &self,
        record: &EquipmentRecord,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> BudgetRecord {
        let tier = self.classify(&record.equipment_type);

        let unit_cost = rng.gen_range(tier.min_cost..=tier.max_cost);
        let acquisition_date = self.random_acquisition_date(now, rng);
        // Cast safety: tier costs are configured in euros, well below 2^52.
        #[allow(clippy::cast_precision_loss)]
        let residual = residual_value(
            unit_cost as f64,
            tier.amortization_years,
            age_in_years(acquisition_date, now),
            self.floor,
        );

        BudgetRecord {
            equipment: record.clone(),
            unit_cost,
            acquisition_date,
            amortization_years: tier.amortization_years,
            maintenance_rate: tier.maintenance_rate,
            residual_value: residual,
            purchase_order: format!("BC{}-{:04}", now.year(), rng.gen_range(1..=9999)),
            budget_line: pick(&tier.budget_lines, rng),
            order_title: pick(&tier.order_titles, rng),
        }
    }

    fn random_acquisition_date<R: Rng + ?Sized>(&self, now: DateTime<Utc>, rng: &mut R) -> NaiveDate {
        let today = now.date_naive();
        if today <= self.epoch {
            return today;
        }
        let span = u64::try_from((today - self.epoch).num_days()).unwrap_or(0);
        let offset = rng.gen_range(0..=span);
        self.epoch.checked_add_days(Days::new(offset)).unwrap_or(today)
    }
}

fn pick<R: Rng + ?Sized>(choices: &[String], rng: &mut R) -> String {
    choices.choose(rng).cloned().unwrap_or_default()
}

/// FNV-1a over the registration, so seeds stay stable across builds.
fn record_seed(registration: &str, salt: u64) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    registration
        .bytes()
        .fold(OFFSET ^ salt, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}
