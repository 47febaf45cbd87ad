use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MoverflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid URL for '{field}': {reason}")]
    InvalidUrl { field: &'static str, reason: String },
}

/// Failure of one report generation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("generation failed: {0}")]
    Failed(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generator transport error: {0}")]
    Transport(String),

    #[error("generator returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid mover candidate '{symbol}': {reason}")]
    InvalidCandidate { symbol: String, reason: String },

    #[error("Persisting '{id}' timed out after {timeout:?}")]
    PersistTimeout { id: String, timeout: Duration },

    #[error("Failed to read batch file '{path}': {source}")]
    ReadBatch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse batch JSON: {0}")]
    ParseBatch(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl IngestError {
    /// True for failures confined to one candidate or entity. Anything
    /// else means the store itself is unusable and aborts the batch.
    pub fn is_per_item(&self) -> bool {
        match self {
            IngestError::InvalidCandidate { .. } | IngestError::PersistTimeout { .. } => true,
            IngestError::Database(e) => e.is_constraint_violation(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MoverflowError>;
