use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_LIMIT, DEFAULT_THRESHOLD, ENV_API_KEY, ENV_CACHE_PATH, ENV_DATA_PATH,
    ENV_RESOLVER_PATH,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::cleaning::lookup::Lookups;

/// Dataset descriptor, loaded from a TOML file per dataset.
///
/// ```toml
/// name = "ann_registry_enrich"
/// inputs = ["us_sanctions"]
///
/// [config]
/// type = "local"
/// dataset = "company_registry"
/// threshold = 0.7
/// limit = 5
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Prefix for generated entity IDs; defaults to the dataset name
    #[serde(default)]
    pub prefix: Option<String>,
    /// Datasets whose entities are walked by an enrichment run
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Enricher configuration; only enrichment datasets carry one
    #[serde(default)]
    pub config: Option<EnricherConfig>,
    #[serde(default)]
    pub lookups: Lookups,
}

impl DatasetConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read dataset file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let dataset: DatasetConfig = toml::from_str(content)?;
        if let Some(config) = &dataset.config {
            config.validate()?;
        }
        Ok(dataset)
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(&self.name)
    }

    /// The enricher configuration, required for an enrichment run
    pub fn enricher_config(&self) -> Result<&EnricherConfig> {
        self.config.as_ref().ok_or_else(|| {
            PipelineError::Config(format!("Dataset {} has no enricher config", self.name))
        })
    }
}

/// Flat enricher configuration: `type` selects the implementation, the
/// remaining keys are handed to it.
#[derive(Debug, Clone, Deserialize)]
pub struct EnricherConfig {
    #[serde(rename = "type")]
    pub enricher_type: String,
    #[serde(default = "default_threshold", alias = "cutoff")]
    pub threshold: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(flatten)]
    pub params: toml::Table,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl EnricherConfig {
    pub fn new(enricher_type: &str) -> Self {
        Self {
            enricher_type: enricher_type.to_string(),
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
            params: toml::Table::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::Config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    pub fn param_u32(&self, key: &str) -> Option<u32> {
        self.params
            .get(key)
            .and_then(|v| v.as_integer())
            .and_then(|v| u32::try_from(v).ok())
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.param_str(key).ok_or_else(|| {
            PipelineError::Config(format!(
                "Enricher '{}' requires a '{}' setting",
                self.enricher_type, key
            ))
        })
    }
}

/// Process-wide paths and credentials, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_path: PathBuf,
    pub resolver_path: PathBuf,
    pub cache_path: PathBuf,
    pub api_key: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        let data_path = std::env::var(ENV_DATA_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let mut settings = Self::with_data_path(data_path);
        if let Ok(path) = std::env::var(ENV_RESOLVER_PATH) {
            settings.resolver_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var(ENV_CACHE_PATH) {
            settings.cache_path = PathBuf::from(path);
        }
        settings.api_key = std::env::var(ENV_API_KEY).ok();
        settings
    }

    pub fn with_data_path<P: AsRef<Path>>(data_path: P) -> Self {
        let data_path = data_path.as_ref().to_path_buf();
        Self {
            resolver_path: data_path.join("resolve.sqlite"),
            cache_path: data_path.join("cache.sqlite"),
            data_path,
            api_key: None,
        }
    }

    pub fn dataset_path(&self, dataset: &str) -> PathBuf {
        self.data_path.join("datasets").join(dataset)
    }
}
