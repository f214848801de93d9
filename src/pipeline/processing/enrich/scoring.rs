use std::collections::BTreeSet;

use crate::domain::{Entity, PropertyType};

/// Scores how likely a reference entity describes the same subject as a
/// source entity, in [0, 1].
pub trait MatchScorer {
    fn score(&self, entity: &Entity, candidate: &Entity) -> f64;
}

/// Default scorer: best Jaro-Winkler similarity over normalized names. A
/// shared identifier value is a certain match.
#[derive(Debug, Default, Clone, Copy)]
pub struct NameScorer;

impl MatchScorer for NameScorer {
    fn score(&self, entity: &Entity, candidate: &Entity) -> f64 {
        let ids: BTreeSet<&str> = entity
            .values_of_type(PropertyType::Identifier)
            .into_iter()
            .collect();
        if candidate
            .values_of_type(PropertyType::Identifier)
            .iter()
            .any(|v| ids.contains(v))
        {
            return 1.0;
        }

        let left: Vec<String> = entity.names().into_iter().map(normalize_name).collect();
        let right: Vec<String> = candidate.names().into_iter().map(normalize_name).collect();
        let mut best: f64 = 0.0;
        for l in left.iter().filter(|n| !n.is_empty()) {
            for r in right.iter().filter(|n| !n.is_empty()) {
                best = best.max(strsim::jaro_winkler(l, r));
            }
        }
        best
    }
}

/// Lowercase, strip punctuation and collapse spaces
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercased name tokens used to index entities for candidate lookup
pub fn name_tokens(entity: &Entity) -> BTreeSet<String> {
    entity
        .names()
        .into_iter()
        .flat_map(|n| {
            normalize_name(n)
                .split(' ')
                .filter(|t| t.chars().count() > 1)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(name: &str) -> Entity {
        let mut entity = Entity::new("Company").unwrap();
        entity.add("name", name).unwrap();
        entity
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Umbrella  Corp."), "umbrella corp");
        assert_eq!(normalize_name("O'Brien & Sons"), "o brien sons");
    }

    #[test]
    fn test_similar_names_score_high() {
        let score = NameScorer.score(&company("Umbrella Corp."), &company("Umbrella Corporation"));
        assert!(score > 0.9 && score < 0.99, "score was {}", score);
        let score = NameScorer.score(&company("Umbrella Corp."), &company("Jon Doe"));
        assert!(score < 0.6, "score was {}", score);
    }

    #[test]
    fn test_shared_identifier_is_certain() {
        let mut a = company("Alpha");
        a.add("registrationNumber", "HRB 1234").unwrap();
        let mut b = company("Omega");
        b.add("registrationNumber", "HRB 1234").unwrap();
        assert_eq!(NameScorer.score(&a, &b), 1.0);
    }

    #[test]
    fn test_name_tokens() {
        let tokens = name_tokens(&company("Umbrella Corp. A"));
        assert!(tokens.contains("umbrella"));
        assert!(tokens.contains("corp"));
        assert!(!tokens.contains("a"));
    }
}
