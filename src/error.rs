use thiserror::Error;

use crate::pipeline::processing::enrich::EnrichmentError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not load enricher: {0}")]
    UnknownEnricher(String),

    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    #[error("Schema {schema} has no property {prop}")]
    UnknownProperty { schema: String, prop: String },

    #[error("Resolver error: {0}")]
    Resolver(String),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
