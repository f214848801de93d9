use std::collections::{BTreeSet, HashMap};
use tracing::info;

use super::scoring::{name_tokens, MatchScorer, NameScorer};
use super::{rank_candidates, Candidate, Enricher, EnrichmentError};
use crate::config::{EnricherConfig, Settings};
use crate::domain::{Entity, PropertyType};
use crate::error::Result;
use crate::infra::entity_store::DatasetStore;

/// Matches against another dataset held in this data directory. The
/// reference is loaded once into an in-memory index.
pub struct LocalEnricher {
    dataset: String,
    threshold: f64,
    limit: usize,
    scorer: Box<dyn MatchScorer + Send>,
    entities: Vec<Entity>,
    by_id: HashMap<String, usize>,
    by_token: HashMap<String, Vec<usize>>,
    by_identifier: HashMap<String, Vec<usize>>,
    /// referenced ID -> entities referencing it
    inbound: HashMap<String, Vec<usize>>,
}

impl LocalEnricher {
    pub fn new(config: &EnricherConfig, settings: &Settings) -> Result<Self> {
        let dataset = config.require_str("dataset")?;
        let store = DatasetStore::new(settings, dataset);
        let entities = store.load_all()?;
        info!(
            dataset = dataset,
            entities = entities.len(),
            "Loaded local reference dataset"
        );
        Ok(Self::from_entities(dataset, entities, config.threshold, config.limit))
    }

    pub fn from_entities(dataset: &str, entities: Vec<Entity>, threshold: f64, limit: usize) -> Self {
        let mut by_id = HashMap::new();
        let mut by_token: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_identifier: HashMap<String, Vec<usize>> = HashMap::new();
        let mut inbound: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, entity) in entities.iter().enumerate() {
            if let Some(id) = &entity.id {
                by_id.insert(id.clone(), idx);
            }
            for token in name_tokens(entity) {
                by_token.entry(token).or_default().push(idx);
            }
            for value in entity.values_of_type(PropertyType::Identifier) {
                by_identifier.entry(value.to_string()).or_default().push(idx);
            }
            for target in entity.references() {
                inbound.entry(target.to_string()).or_default().push(idx);
            }
        }
        Self {
            dataset: dataset.to_string(),
            threshold,
            limit,
            scorer: Box::new(NameScorer),
            entities,
            by_id,
            by_token,
            by_identifier,
            inbound,
        }
    }

    pub fn with_scorer(mut self, scorer: Box<dyn MatchScorer + Send>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    fn get(&self, id: &str) -> Option<&Entity> {
        self.by_id.get(id).map(|&idx| &self.entities[idx])
    }
}

impl Enricher for LocalEnricher {
    fn name(&self) -> &str {
        "local"
    }

    fn match_entity(&mut self, entity: &Entity) -> std::result::Result<Vec<Candidate>, EnrichmentError> {
        let mut results = Vec::new();
        let same_id = entity.id.as_deref().and_then(|id| self.by_id.get(id).copied());
        if let Some(idx) = same_id {
            results.push(Candidate::new(self.entities[idx].clone(), 1.0));
        }

        let by_name = name_tokens(entity)
            .into_iter()
            .filter_map(|token| self.by_token.get(&token))
            .flatten();
        let by_identifier = entity
            .values_of_type(PropertyType::Identifier)
            .into_iter()
            .filter_map(|value| self.by_identifier.get(value))
            .flatten();
        let pool: BTreeSet<usize> = by_name
            .chain(by_identifier)
            .copied()
            .filter(|idx| Some(*idx) != same_id)
            .collect();
        let scored: Vec<Candidate> = pool
            .into_iter()
            .map(|idx| &self.entities[idx])
            .filter(|candidate| entity.schema().can_match(candidate.schema()))
            .map(|candidate| Candidate::new(candidate.clone(), self.scorer.score(entity, candidate)))
            .collect();

        results.extend(rank_candidates(scored, self.threshold, self.limit));
        results.truncate(self.limit);
        Ok(results)
    }

    fn expand(
        &mut self,
        _entity: &Entity,
        matched: &Entity,
    ) -> std::result::Result<Vec<Entity>, EnrichmentError> {
        let id = matched
            .id
            .as_deref()
            .ok_or_else(|| EnrichmentError::Index(format!("Match has no ID: {}", matched)))?;
        let mut seen = BTreeSet::new();
        let mut expanded = Vec::new();

        let root = self.get(id).cloned().unwrap_or_else(|| matched.clone());
        seen.insert(id.to_string());
        expanded.push(root);

        let referrers: Vec<usize> = self.inbound.get(id).cloned().unwrap_or_default();
        let mut adjacent = Vec::new();
        for idx in referrers {
            let referrer = &self.entities[idx];
            if let Some(ref_id) = &referrer.id {
                if seen.insert(ref_id.clone()) {
                    expanded.push(referrer.clone());
                }
            }
            adjacent.extend(referrer.references().into_iter().map(str::to_string));
        }
        for adjacent_id in adjacent {
            if let Some(other) = self.get(&adjacent_id) {
                if seen.insert(adjacent_id) {
                    expanded.push(other.clone());
                }
            }
        }
        Ok(expanded)
    }

    fn close(&mut self) {
        self.entities.clear();
        self.by_id.clear();
        self.by_token.clear();
        self.by_identifier.clear();
        self.inbound.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(schema: &str, id: &str, props: &[(&str, &str)]) -> Entity {
        let mut entity = Entity::new(schema).unwrap().with_id(id);
        for (prop, value) in props {
            entity.add(prop, value).unwrap();
        }
        entity
    }

    fn reference() -> Vec<Entity> {
        vec![
            entity("Company", "osv-umbrella-corp", &[("name", "Umbrella Corporation")]),
            entity(
                "Ownership",
                "osv-umbrella-ownership",
                &[("owner", "osv-oswell-spencer"), ("asset", "osv-umbrella-corp")],
            ),
            entity("Person", "osv-oswell-spencer", &[("name", "Oswell E. Spencer")]),
            entity("Person", "osv-john-doe", &[("name", "John Doe")]),
            entity("Person", "osv-johnny-doe", &[("name", "Johnny Doe")]),
        ]
    }

    fn umbrella() -> Entity {
        entity("LegalEntity", "xxx", &[("name", "Umbrella Corp.")])
    }

    #[test]
    fn test_match_and_expand() {
        let mut enricher = LocalEnricher::from_entities("registry", reference(), 0.5, 5);
        let results = enricher.match_entity(&umbrella()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity.id.as_deref(), Some("osv-umbrella-corp"));

        let expanded = enricher.expand(&umbrella(), &results[0].entity).unwrap();
        let schemata: Vec<_> = expanded.iter().map(|e| e.schema().name).collect();
        assert_eq!(schemata, vec!["Company", "Ownership", "Person"]);
        assert_eq!(expanded[1].get("owner"), vec!["osv-oswell-spencer"]);
        assert_eq!(expanded[2].id.as_deref(), Some("osv-oswell-spencer"));
    }

    #[test]
    fn test_same_id_comes_first() {
        let mut enricher = LocalEnricher::from_entities("registry", reference(), 0.5, 5);
        let jon = entity("Person", "osv-john-doe", &[("name", "Jon Doe")]);
        let results = enricher.match_entity(&jon).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entity.id.as_deref(), Some("osv-john-doe"));
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[1].entity.id.as_deref(), Some("osv-johnny-doe"));
    }

    #[test]
    fn test_shared_identifier_found_despite_different_name() {
        let mut registry = reference();
        registry[0].add("registrationNumber", "HRB 1234").unwrap();
        let mut enricher = LocalEnricher::from_entities("registry", registry, 0.5, 5);

        let mut listed = entity("LegalEntity", "xxx", &[("name", "Arklay Holdings")]);
        listed.add("registrationNumber", "HRB 1234").unwrap();
        let results = enricher.match_entity(&listed).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity.id.as_deref(), Some("osv-umbrella-corp"));
        assert_eq!(results[0].score, 1.0);
    }

    #[test]
    fn test_high_threshold_excludes_fuzzy_matches() {
        let mut enricher = LocalEnricher::from_entities("registry", reference(), 0.99, 5);
        assert!(enricher.match_entity(&umbrella()).unwrap().is_empty());
    }

    #[test]
    fn test_zero_limit_returns_nothing() {
        let mut enricher = LocalEnricher::from_entities("registry", reference(), 0.5, 0);
        assert!(enricher.match_entity(&umbrella()).unwrap().is_empty());
    }

    #[test]
    fn test_unmatchable_schemata_are_skipped() {
        let mut enricher = LocalEnricher::from_entities("registry", reference(), 0.1, 5);
        let vessel = entity("Vessel", "v1", &[("name", "Umbrella")]);
        assert!(enricher.match_entity(&vessel).unwrap().is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut enricher = LocalEnricher::from_entities("registry", reference(), 0.5, 5);
        enricher.close();
        enricher.close();
        assert!(enricher.match_entity(&umbrella()).unwrap().is_empty());
    }
}
