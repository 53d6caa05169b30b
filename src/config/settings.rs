//! Application settings loading from config.toml
//!
//! Every section is optional: a missing file or a missing table falls back to
//! the built-in defaults. The cost tiers are kept as an ordered TOML array of
//! tables so that first-match classification follows the file order.

use crate::core::cost_model::{Tier, default_tiers, fallback_tier};
use crate::errors::{Error, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Storage keys and notification settings
    pub store: StoreSettings,
    /// Budget derivation settings
    pub cost_model: CostModelSettings,
}

/// Storage keys and notification settings of the data store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Key of the equipment envelope
    pub equipment_key: String,
    /// Key of the budget envelope
    pub budget_key: String,
    /// Key of the manual surcharge list
    pub surcharge_key: String,
    /// Number of change notifications buffered per observer
    pub event_capacity: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            equipment_key: "fleetwatch.equipment".to_string(),
            budget_key: "fleetwatch.budget".to_string(),
            surcharge_key: "fleetwatch.surcharges".to_string(),
            event_capacity: 64,
        }
    }
}

/// Settings of the cost model
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostModelSettings {
    /// Earliest possible acquisition date
    pub acquisition_epoch: NaiveDate,
    /// Seed derived values from the registration instead of fresh entropy
    pub reproducible: bool,
    /// Residual value floor as a fraction of the unit cost
    pub residual_floor_ratio: f64,
    /// Residual value floor in euros
    pub residual_floor_minimum: f64,
    /// Ordered classification tiers, first match wins
    pub tiers: Vec<Tier>,
    /// Tier used when no keyword matches
    pub default_tier: Tier,
}

impl Default for CostModelSettings {
    fn default() -> Self {
        Self {
            acquisition_epoch: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default(),
            reproducible: false,
            residual_floor_ratio: 0.05,
            residual_floor_minimum: 1000.0,
            tiers: default_tiers(),
            default_tier: fallback_tier(),
        }
    }
}

impl AppConfig {
    /// Checks the invariants the cost model relies on.
    ///
    /// # Errors
    /// Returns `Error::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.store.event_capacity == 0 {
            return Err(config_error("store.event_capacity must be at least 1"));
        }
        let keys = [
            &self.store.equipment_key,
            &self.store.budget_key,
            &self.store.surcharge_key,
        ];
        if keys.iter().any(|k| k.trim().is_empty()) {
            return Err(config_error("store keys cannot be empty"));
        }
        if keys[0] == keys[1] || keys[0] == keys[2] || keys[1] == keys[2] {
            return Err(config_error("store keys must be distinct"));
        }

        let model = &self.cost_model;
        if !(0.0..=1.0).contains(&model.residual_floor_ratio) {
            return Err(config_error("cost_model.residual_floor_ratio must be within [0, 1]"));
        }
        if model.residual_floor_minimum < 0.0 {
            return Err(config_error("cost_model.residual_floor_minimum cannot be negative"));
        }
        for tier in &model.tiers {
            if tier.keyword.trim().is_empty() {
                return Err(config_error("tier keywords cannot be empty"));
            }
            validate_tier(tier)?;
        }
        validate_tier(&model.default_tier)
    }
}

fn validate_tier(tier: &Tier) -> Result<()> {
    if tier.min_cost > tier.max_cost {
        return Err(config_error(&format!(
            "tier '{}': min_cost {} exceeds max_cost {}",
            tier.keyword, tier.min_cost, tier.max_cost
        )));
    }
    if tier.amortization_years == 0 {
        return Err(config_error(&format!(
            "tier '{}': amortization_years must be at least 1",
            tier.keyword
        )));
    }
    if !(0.0..=1.0).contains(&tier.maintenance_rate) {
        return Err(config_error(&format!(
            "tier '{}': maintenance_rate must be within [0, 1]",
            tier.keyword
        )));
    }
    Ok(())
}

fn config_error(message: &str) -> Error {
    Error::Config {
        message: message.to_string(),
    }
}

/// Parses and validates configuration from TOML text.
///
/// # Errors
/// Returns an error if the TOML syntax is invalid or a setting is out of range.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A setting violates its range
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;
    parse_config(&contents)
}

/// Loads configuration from the default location (./config.toml), or the
/// built-in defaults when that file does not exist.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_default_config() -> Result<AppConfig> {
    let path = Path::new(DEFAULT_CONFIG_PATH);
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!("No {DEFAULT_CONFIG_PATH} found, using built-in defaults");
        Ok(AppConfig::default())
    }
}
