// Data processing pipeline: cleaning, resolution and enrichment stages

pub mod processing;

// Re-export key types from each stage
pub use processing::cleaning::{CleanOptions, Cleaner};
pub use processing::enrich::{Candidate, Enricher, EnrichmentError};
pub use processing::resolver::{Judgement, Resolver};
