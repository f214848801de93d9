use std::ops::{Deref, DerefMut};
use thiserror::Error;
use tracing::debug;

use crate::domain::Entity;

pub mod cutoff;
pub mod local;
pub mod remote;
pub mod scoring;

pub use cutoff::{DateCutoff, PersonCutoff};
pub use local::LocalEnricher;
pub use remote::RemoteMatchEnricher;
pub use scoring::{MatchScorer, NameScorer};

/// Failure to match or expand a single entity. The orchestrator logs it and
/// moves on to the next entity.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response from {url}: {message}")]
    Response { url: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Index error: {0}")]
    Index(String),
}

/// A reference entity proposed as a match for a source entity
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entity: Entity,
    pub score: f64,
}

impl Candidate {
    pub fn new(entity: Entity, score: f64) -> Self {
        Self { entity, score }
    }
}

/// Matches entities against an external reference and expands accepted
/// matches into their neighbourhood in that reference.
pub trait Enricher {
    fn name(&self) -> &str;

    /// Candidates for `entity`, already filtered by threshold and capped at
    /// the configured limit.
    fn match_entity(&mut self, entity: &Entity) -> Result<Vec<Candidate>, EnrichmentError>;

    /// The matched entity plus the related entities that should be imported
    /// alongside it.
    fn expand(&mut self, entity: &Entity, matched: &Entity)
        -> Result<Vec<Entity>, EnrichmentError>;

    /// Release held resources. Must be safe to call more than once.
    fn close(&mut self) {}
}

/// Owns an enricher for the duration of a run and closes it on drop,
/// whether the run completed or bailed out early.
pub struct EnricherGuard {
    inner: Box<dyn Enricher>,
}

impl EnricherGuard {
    pub fn new(inner: Box<dyn Enricher>) -> Self {
        Self { inner }
    }
}

impl Deref for EnricherGuard {
    type Target = dyn Enricher;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for EnricherGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for EnricherGuard {
    fn drop(&mut self) {
        debug!(enricher = self.inner.name(), "Closing enricher");
        self.inner.close();
    }
}

/// Keep candidates scoring at least `threshold`, best first, at most `limit`.
pub fn rank_candidates(mut candidates: Vec<Candidate>, threshold: f64, limit: usize) -> Vec<Candidate> {
    candidates.retain(|c| c.score >= threshold);
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(limit);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingEnricher {
        closed: Rc<Cell<u32>>,
    }

    impl Enricher for CountingEnricher {
        fn name(&self) -> &str {
            "counting"
        }

        fn match_entity(&mut self, _entity: &Entity) -> Result<Vec<Candidate>, EnrichmentError> {
            Ok(Vec::new())
        }

        fn expand(
            &mut self,
            _entity: &Entity,
            matched: &Entity,
        ) -> Result<Vec<Entity>, EnrichmentError> {
            Ok(vec![matched.clone()])
        }

        fn close(&mut self) {
            self.closed.set(self.closed.get() + 1);
        }
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let closed = Rc::new(Cell::new(0));
        {
            let mut guard = EnricherGuard::new(Box::new(CountingEnricher {
                closed: closed.clone(),
            }));
            let entity = Entity::new("Company").unwrap().with_id("c1");
            assert!(guard.match_entity(&entity).unwrap().is_empty());
            assert_eq!(guard.name(), "counting");
        }
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn test_rank_candidates() {
        let make = |id: &str, score: f64| {
            Candidate::new(Entity::new("Company").unwrap().with_id(id), score)
        };
        let ranked = rank_candidates(
            vec![make("a", 0.6), make("b", 0.9), make("c", 0.4), make("d", 0.75)],
            0.5,
            2,
        );
        let ids: Vec<_> = ranked.iter().map(|c| c.entity.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["b", "d"]);
        assert!(rank_candidates(vec![make("a", 1.0)], 0.5, 0).is_empty());
    }
}
