/// Budget projection from equipment records
pub mod cost_model;

/// Filtering, searching and editing the fleet table
pub mod fleet;

/// Spreadsheet row normalization
pub mod normalizer;

/// Budget and fleet aggregates
pub mod report;

/// Manual out-of-contract price entries
pub mod surcharge;

/// CSV sheet import and export
pub mod workbook;
