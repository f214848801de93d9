pub mod context;
pub mod enrich_use_case;
pub mod import_use_case;
pub mod ports;

pub use context::Context;
pub use enrich_use_case::{run_enrichment, EnrichSummary, EnrichUseCase};
pub use import_use_case::{run_import, ImportSummary, ImportUseCase};
