use std::sync::Arc;
use tracing::{info_span, Span};
use uuid::Uuid;

use crate::app::ports::{Cache, EntitySink};
use crate::config::{DatasetConfig, Settings};
use crate::domain::Entity;
use crate::error::Result;
use crate::idempotency;
use crate::pipeline::processing::cleaning::Cleaner;

/// Everything one run needs besides its inputs: the dataset being produced,
/// process settings, the shared cache, the emission sink and the logging
/// span all events of the run are recorded under.
pub struct Context {
    pub dataset: DatasetConfig,
    pub settings: Settings,
    pub cache: Arc<dyn Cache>,
    sink: Box<dyn EntitySink>,
    run_id: Uuid,
    span: Span,
}

impl Context {
    pub fn new(
        dataset: DatasetConfig,
        settings: Settings,
        cache: Arc<dyn Cache>,
        sink: Box<dyn EntitySink>,
    ) -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!("enrich", dataset = %dataset.name, run_id = %run_id);
        Self {
            dataset,
            settings,
            cache,
            sink,
            run_id,
            span,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Cleaner configured with this dataset's lookups
    pub fn cleaner(&self) -> Cleaner {
        Cleaner::new(self.dataset.lookups.clone())
    }

    pub fn make_id(&self, parts: &[&str]) -> Option<String> {
        idempotency::make_id(self.dataset.prefix(), parts)
    }

    pub fn make_slug(&self, parts: &[&str]) -> Option<String> {
        idempotency::make_slug(self.dataset.prefix(), parts)
    }

    pub fn emit(&mut self, entity: &Entity, target: bool, external: bool) -> Result<()> {
        self.sink.emit(entity, target, external)
    }

    pub fn flush_cache(&self) -> Result<()> {
        self.cache.flush()
    }

    /// Write out everything emitted during the run
    pub fn finish(&mut self) -> Result<()> {
        self.sink.finish()
    }
}
