//! Metrics for the enrichment and cleaning pipeline
//!
//! Counters are recorded through the `metrics` facade; installing an
//! exporter is left to the embedding process.

use std::fmt;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Enrichment metrics
    EnrichEntitiesProcessed,
    EnrichCandidatesSeen,
    EnrichExternalEmitted,
    EnrichPrimaryEmitted,
    EnrichNegativeSkipped,
    EnrichCutoffSkipped,
    EnrichErrors,
    EnrichRunDuration,

    // Cleaning metrics
    CleaningRejected,
    CleaningIdentifierFallback,
    CleaningLengthExceeded,

    // Cache metrics
    CacheFlushes,
    CacheHits,
    CacheMisses,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::EnrichEntitiesProcessed => "enrich_entities_processed_total",
            MetricName::EnrichCandidatesSeen => "enrich_candidates_seen_total",
            MetricName::EnrichExternalEmitted => "enrich_external_emitted_total",
            MetricName::EnrichPrimaryEmitted => "enrich_primary_emitted_total",
            MetricName::EnrichNegativeSkipped => "enrich_negative_skipped_total",
            MetricName::EnrichCutoffSkipped => "enrich_cutoff_skipped_total",
            MetricName::EnrichErrors => "enrich_errors_total",
            MetricName::EnrichRunDuration => "enrich_run_duration_seconds",

            MetricName::CleaningRejected => "cleaning_rejected_total",
            MetricName::CleaningIdentifierFallback => "cleaning_identifier_fallback_total",
            MetricName::CleaningLengthExceeded => "cleaning_length_exceeded_total",

            MetricName::CacheFlushes => "cache_flushes_total",
            MetricName::CacheHits => "cache_hits_total",
            MetricName::CacheMisses => "cache_misses_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Enrichment Metrics
// ============================================================================

pub mod enrich {
    use super::MetricName;

    pub fn entity_processed(dataset: &str) {
        ::metrics::counter!(MetricName::EnrichEntitiesProcessed.as_str(), "dataset" => dataset.to_string())
            .increment(1);
    }

    pub fn candidate_seen() {
        ::metrics::counter!(MetricName::EnrichCandidatesSeen.as_str()).increment(1);
    }

    pub fn external_emitted() {
        ::metrics::counter!(MetricName::EnrichExternalEmitted.as_str()).increment(1);
    }

    pub fn primary_emitted() {
        ::metrics::counter!(MetricName::EnrichPrimaryEmitted.as_str()).increment(1);
    }

    pub fn negative_skipped() {
        ::metrics::counter!(MetricName::EnrichNegativeSkipped.as_str()).increment(1);
    }

    pub fn cutoff_skipped() {
        ::metrics::counter!(MetricName::EnrichCutoffSkipped.as_str()).increment(1);
    }

    pub fn error(enricher: &str) {
        ::metrics::counter!(MetricName::EnrichErrors.as_str(), "enricher" => enricher.to_string())
            .increment(1);
    }

    pub fn run_duration(secs: f64) {
        ::metrics::histogram!(MetricName::EnrichRunDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Cleaning Metrics
// ============================================================================

pub mod cleaning {
    use super::MetricName;

    pub fn rejected() {
        ::metrics::counter!(MetricName::CleaningRejected.as_str()).increment(1);
    }

    pub fn identifier_fallback() {
        ::metrics::counter!(MetricName::CleaningIdentifierFallback.as_str()).increment(1);
    }

    pub fn length_exceeded() {
        ::metrics::counter!(MetricName::CleaningLengthExceeded.as_str()).increment(1);
    }
}

// ============================================================================
// Cache Metrics
// ============================================================================

pub mod cache {
    use super::MetricName;

    pub fn flushed() {
        ::metrics::counter!(MetricName::CacheFlushes.as_str()).increment(1);
    }

    pub fn hit() {
        ::metrics::counter!(MetricName::CacheHits.as_str()).increment(1);
    }

    pub fn miss() {
        ::metrics::counter!(MetricName::CacheMisses.as_str()).increment(1);
    }
}
