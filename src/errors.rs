use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Workbook error: {message}")]
    Workbook { message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Nothing to export: the {collection} collection is empty")]
    NothingToExport { collection: String },

    #[error("No equipment record at position {index}")]
    RecordNotFound { index: usize },

    #[error("Unknown equipment field: {name}")]
    UnknownField { name: String },
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
