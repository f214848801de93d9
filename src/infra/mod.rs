// Adapters behind the application ports: SQLite stores, NDJSON files and
// the enricher registry

pub mod cache;
pub mod enricher_factory;
pub mod entity_output_adapter;
pub mod entity_store;
pub mod resolver_store;
