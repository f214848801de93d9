/// Enricher type names accepted in a dataset's `[config]` table
pub const LOCAL_ENRICHER: &str = "local";
pub const REMOTE_ENRICHER: &str = "remote";

/// Default match score threshold when a dataset does not configure one
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Default number of candidates an enricher returns per entity
pub const DEFAULT_LIMIT: usize = 5;

/// Flush the shared cache every this many entities
pub const CACHE_FLUSH_INTERVAL: usize = 1000;

/// Log progress every this many entities
pub const PROGRESS_LOG_INTERVAL: usize = 10_000;

/// Default cache lifetime for remote API responses
pub const DEFAULT_CACHE_DAYS: u32 = 7;

// Environment variables read by `Settings::from_env`
pub const ENV_DATA_PATH: &str = "ENRICH_DATA_PATH";
pub const ENV_RESOLVER_PATH: &str = "ENRICH_RESOLVER_PATH";
pub const ENV_CACHE_PATH: &str = "ENRICH_CACHE_PATH";
pub const ENV_API_KEY: &str = "ENRICH_API_KEY";

/// Get all supported enricher type names
pub fn get_supported_enrichers() -> Vec<&'static str> {
    vec![LOCAL_ENRICHER, REMOTE_ENRICHER]
}
