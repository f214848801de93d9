// Pipeline processing: value cleaning, match resolution and enrichment

pub mod cleaning;
pub mod enrich;
pub mod resolver;
