/// Storage database connection and table management
pub mod database;

/// Application settings loading from config.toml
pub mod settings;

pub use settings::{AppConfig, CostModelSettings, StoreSettings, load_config, load_default_config};
