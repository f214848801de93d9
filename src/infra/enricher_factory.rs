use std::sync::Arc;
use tracing::info;

use crate::app::ports::Cache;
use crate::config::{EnricherConfig, Settings};
use crate::constants::{get_supported_enrichers, LOCAL_ENRICHER, REMOTE_ENRICHER};
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::enrich::{Enricher, LocalEnricher, RemoteMatchEnricher};

/// Build the enricher named by `config.type`.
pub fn create_enricher(
    config: &EnricherConfig,
    settings: &Settings,
    cache: Arc<dyn Cache>,
) -> Result<Box<dyn Enricher>> {
    config.validate()?;
    let enricher: Box<dyn Enricher> = match config.enricher_type.as_str() {
        LOCAL_ENRICHER => Box::new(LocalEnricher::new(config, settings)?),
        REMOTE_ENRICHER => Box::new(RemoteMatchEnricher::new(config, settings, cache)?),
        other => {
            return Err(PipelineError::UnknownEnricher(format!(
                "{} (supported: {})",
                other,
                get_supported_enrichers().join(", ")
            )))
        }
    };
    info!(
        enricher = enricher.name(),
        threshold = config.threshold,
        limit = config.limit,
        "Created enricher"
    );
    Ok(enricher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Entity;
    use crate::infra::cache::MemoryCache;
    use crate::infra::entity_store::DatasetStore;
    use tempfile::tempdir;

    #[test]
    fn test_unknown_type_is_rejected() {
        let settings = Settings::with_data_path("/tmp/unused");
        let config = EnricherConfig::new("telepathy");
        let result = create_enricher(&config, &settings, Arc::new(MemoryCache::new()));
        match result {
            Err(PipelineError::UnknownEnricher(msg)) => assert!(msg.starts_with("telepathy")),
            _ => panic!("expected UnknownEnricher"),
        }
    }

    #[test]
    fn test_creates_local_enricher() {
        let dir = tempdir().unwrap();
        let settings = Settings::with_data_path(dir.path());
        let mut company = Entity::new("Company").unwrap().with_id("c1");
        company.add("name", "Umbrella Corporation").unwrap();
        DatasetStore::new(&settings, "registry")
            .write_all(&[company])
            .unwrap();

        let mut config = EnricherConfig::new(LOCAL_ENRICHER);
        config.params.insert("dataset".into(), "registry".into());
        let enricher = create_enricher(&config, &settings, Arc::new(MemoryCache::new())).unwrap();
        assert_eq!(enricher.name(), "local");
    }

    #[test]
    fn test_local_enricher_requires_dataset() {
        let settings = Settings::with_data_path("/tmp/unused");
        let config = EnricherConfig::new(LOCAL_ENRICHER);
        let result = create_enricher(&config, &settings, Arc::new(MemoryCache::new()));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
