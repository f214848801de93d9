use crate::domain::Entity;
use crate::error::Result;

/// Destination of the entities an enrichment run produces.
pub trait EntitySink: Send {
    /// `target` marks entities that belong to the dataset proper; `external`
    /// marks unconfirmed candidates kept for later review.
    fn emit(&mut self, entity: &Entity, target: bool, external: bool) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

/// Shared response cache. Implementations buffer writes until `flush`.
pub trait Cache: Send + Sync {
    /// A cached value no older than `max_age_days`
    fn get(&self, key: &str, max_age_days: u32) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn flush(&self) -> Result<()>;
}

/// Read-only access to the entities of one or more datasets.
pub trait EntityView {
    fn entities(&self) -> Result<Box<dyn Iterator<Item = Result<Entity>> + '_>>;
}
