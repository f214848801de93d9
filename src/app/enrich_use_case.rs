use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::app::context::Context;
use crate::app::ports::{Cache, EntityView};
use crate::config::{DatasetConfig, Settings};
use crate::constants::{CACHE_FLUSH_INTERVAL, PROGRESS_LOG_INTERVAL};
use crate::domain::Entity;
use crate::error::{PipelineError, Result};
use crate::infra::cache::SqliteCache;
use crate::infra::enricher_factory::create_enricher;
use crate::infra::entity_output_adapter::{FileEntitySink, OUTPUT_FILE};
use crate::infra::entity_store::DatasetView;
use crate::infra::resolver_store::ResolverStore;
use crate::observability::metrics;
use crate::pipeline::processing::enrich::{
    DateCutoff, Enricher, EnricherGuard, EnrichmentError, PersonCutoff,
};
use crate::pipeline::processing::resolver::{Judgement, Resolver};

/// Counters for one enrichment run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichSummary {
    pub entities: usize,
    pub candidates: usize,
    pub externals: usize,
    pub primaries: usize,
    pub negatives: usize,
    pub cutoff_skipped: usize,
    pub errors: usize,
}

/// Walks the entities of the input datasets, matches each against the
/// enricher's reference and emits what the resolver's judgements allow.
pub struct EnrichUseCase {
    enricher: EnricherGuard,
    cutoff: Box<dyn PersonCutoff + Send>,
}

impl EnrichUseCase {
    pub fn new(enricher: Box<dyn Enricher>) -> Self {
        Self {
            enricher: EnricherGuard::new(enricher),
            cutoff: Box::new(DateCutoff::default()),
        }
    }

    pub fn with_cutoff(mut self, cutoff: Box<dyn PersonCutoff + Send>) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Run the enrichment. The enricher is closed when this returns, on
    /// success or failure. Per-entity enrichment errors are logged and
    /// skipped; any other error aborts the run before the resolver is saved.
    pub fn run(
        mut self,
        ctx: &mut Context,
        view: &dyn EntityView,
        resolver: &mut dyn Resolver,
    ) -> Result<EnrichSummary> {
        let span = ctx.span().clone();
        let _entered = span.enter();
        let started = Instant::now();
        let mut summary = EnrichSummary::default();
        info!(enricher = self.enricher.name(), "Starting enrichment");

        for (idx, entity) in view.entities()?.enumerate() {
            let entity = entity?;
            if idx > 0 && idx % CACHE_FLUSH_INTERVAL == 0 {
                ctx.flush_cache()?;
            }
            if idx > 0 && idx % PROGRESS_LOG_INTERVAL == 0 {
                info!(processed = idx, "Enrichment in progress");
            }
            summary.entities += 1;
            metrics::enrich::entity_processed(&ctx.dataset.name);

            match self.enrich_entity(ctx, resolver, &entity, &mut summary) {
                Ok(()) => {}
                Err(PipelineError::Enrichment(e)) => {
                    log_enrichment_error(&entity, &e);
                    summary.errors += 1;
                    metrics::enrich::error(self.enricher.name());
                }
                Err(e) => return Err(e),
            }
        }

        resolver.save()?;
        ctx.finish()?;
        ctx.flush_cache()?;

        let elapsed = started.elapsed().as_secs_f64();
        metrics::enrich::run_duration(elapsed);
        info!(
            entities = summary.entities,
            candidates = summary.candidates,
            externals = summary.externals,
            primaries = summary.primaries,
            negatives = summary.negatives,
            cutoff_skipped = summary.cutoff_skipped,
            errors = summary.errors,
            elapsed_secs = elapsed,
            "Enrichment complete"
        );
        Ok(summary)
    }

    fn enrich_entity(
        &mut self,
        ctx: &mut Context,
        resolver: &dyn Resolver,
        entity: &Entity,
        summary: &mut EnrichSummary,
    ) -> Result<()> {
        let entity_id = match entity.id.as_deref() {
            Some(id) => id,
            None => return Ok(()),
        };

        for candidate in self.enricher.match_entity(entity)? {
            let candidate_id = match candidate.entity.id.as_deref() {
                Some(id) => id,
                None => continue,
            };
            if !entity.schema().can_match(candidate.entity.schema()) {
                continue;
            }
            summary.candidates += 1;
            metrics::enrich::candidate_seen();

            match resolver.get_judgement(candidate_id, entity_id) {
                Judgement::Positive => {
                    for adjacent in self.enricher.expand(entity, &candidate.entity)? {
                        if self.cutoff.is_cut_off(&adjacent) {
                            debug!(entity = %adjacent, "Skipping person outside cutoff");
                            summary.cutoff_skipped += 1;
                            metrics::enrich::cutoff_skipped();
                            continue;
                        }
                        ctx.emit(&adjacent, true, false)?;
                        summary.primaries += 1;
                        metrics::enrich::primary_emitted();
                    }
                }
                Judgement::Negative => {
                    summary.negatives += 1;
                    metrics::enrich::negative_skipped();
                }
                Judgement::Unsure => {
                    debug!(candidate = %candidate.entity, score = candidate.score, "Unconfirmed match");
                    ctx.emit(&candidate.entity, false, true)?;
                    summary.externals += 1;
                    metrics::enrich::external_emitted();
                }
            }
        }
        Ok(())
    }
}

fn log_enrichment_error(entity: &Entity, e: &EnrichmentError) {
    error!(
        entity_id = entity.id.as_deref().unwrap_or(""),
        schema = entity.schema().name,
        error = %e,
        "Enrichment failed"
    );
}

/// Enrich `dataset` with the stores configured in `settings`: the input
/// datasets' files, the SQLite resolver and cache, and an NDJSON sink in
/// the dataset's directory.
pub fn run_enrichment(settings: &Settings, dataset: &DatasetConfig) -> Result<EnrichSummary> {
    let config = dataset.enricher_config()?;
    if dataset.inputs.is_empty() {
        warn!(dataset = %dataset.name, "Dataset has no inputs to enrich");
    }
    let cache: Arc<dyn Cache> = Arc::new(SqliteCache::open(&settings.cache_path)?);
    let enricher = create_enricher(config, settings, cache.clone())?;
    let use_case = EnrichUseCase::new(enricher);

    let view = DatasetView::for_datasets(settings, &dataset.inputs)?;
    let mut resolver = ResolverStore::open(&settings.resolver_path)?;
    let sink = FileEntitySink::new(
        settings.dataset_path(&dataset.name).join(OUTPUT_FILE),
        &dataset.name,
    );
    let mut ctx = Context::new(dataset.clone(), settings.clone(), cache, Box::new(sink));
    use_case.run(&mut ctx, &view, &mut resolver)
}
