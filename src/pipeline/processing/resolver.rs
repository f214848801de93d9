use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// A decision about whether two entity IDs denote the same subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Judgement {
    Positive,
    Negative,
    /// No decision has been made, or the reviewer could not decide
    Unsure,
}

impl Judgement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Judgement::Positive => "positive",
            Judgement::Negative => "negative",
            Judgement::Unsure => "unsure",
        }
    }
}

impl fmt::Display for Judgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Judgement {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "positive" => Ok(Judgement::Positive),
            "negative" => Ok(Judgement::Negative),
            "unsure" => Ok(Judgement::Unsure),
            other => Err(PipelineError::Resolver(format!("Invalid judgement: {}", other))),
        }
    }
}

/// Order-independent key for two entity IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pair {
    pub left: String,
    pub right: String,
}

impl Pair {
    pub fn new(a: &str, b: &str) -> Self {
        let (left, right) = if a <= b { (a, b) } else { (b, a) };
        Self {
            left: left.to_string(),
            right: right.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub pair: Pair,
    pub judgement: Judgement,
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Durable store of pairwise match judgements.
///
/// Enrichment only reads judgements; `decide` belongs to confirmation
/// workflows.
pub trait Resolver {
    fn get_judgement(&self, a: &str, b: &str) -> Judgement;

    fn decide(&mut self, a: &str, b: &str, judgement: Judgement, user: Option<&str>) -> Result<()>;

    /// Durably persist all judgements
    fn save(&mut self) -> Result<()>;
}

/// In-memory judgement graph. Positive edges are transitive: IDs connected
/// through positive judgements form one cluster. A negative edge between
/// any members of two clusters makes the clusters negative.
#[derive(Debug, Default)]
pub struct JudgementGraph {
    edges: HashMap<Pair, Edge>,
    positive: HashMap<String, BTreeSet<String>>,
}

impl JudgementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge(&self, pair: &Pair) -> Option<&Edge> {
        self.edges.get(pair)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Record an edge, replacing any earlier decision for the same pair
    pub fn insert(&mut self, edge: Edge) {
        if let Some(previous) = self.edges.get(&edge.pair) {
            if previous.judgement == Judgement::Positive {
                self.unlink(&edge.pair);
            }
        }
        if edge.judgement == Judgement::Positive {
            self.link(&edge.pair);
        }
        self.edges.insert(edge.pair.clone(), edge);
    }

    fn link(&mut self, pair: &Pair) {
        self.positive
            .entry(pair.left.clone())
            .or_default()
            .insert(pair.right.clone());
        self.positive
            .entry(pair.right.clone())
            .or_default()
            .insert(pair.left.clone());
    }

    fn unlink(&mut self, pair: &Pair) {
        if let Some(ids) = self.positive.get_mut(&pair.left) {
            ids.remove(&pair.right);
        }
        if let Some(ids) = self.positive.get_mut(&pair.right) {
            ids.remove(&pair.left);
        }
    }

    /// All IDs positively connected to `id`, including itself
    pub fn connected(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(neighbours) = self.positive.get(&current) {
                queue.extend(neighbours.iter().filter(|n| !seen.contains(*n)).cloned());
            }
        }
        seen
    }

    pub fn get_judgement(&self, a: &str, b: &str) -> Judgement {
        if a == b {
            return Judgement::Positive;
        }
        if let Some(edge) = self.edges.get(&Pair::new(a, b)) {
            if edge.judgement != Judgement::Unsure {
                return edge.judgement;
            }
        }
        let left = self.connected(a);
        if left.contains(b) {
            return Judgement::Positive;
        }
        let right = self.connected(b);
        for l in &left {
            for r in &right {
                let negative = self
                    .edges
                    .get(&Pair::new(l, r))
                    .map_or(false, |e| e.judgement == Judgement::Negative);
                if negative {
                    return Judgement::Negative;
                }
            }
        }
        Judgement::Unsure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: &str, b: &str, judgement: Judgement) -> Edge {
        Edge {
            pair: Pair::new(a, b),
            judgement,
            user: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pair_is_order_independent() {
        assert_eq!(Pair::new("b", "a"), Pair::new("a", "b"));
        assert_eq!(Pair::new("b", "a").left, "a");
    }

    #[test]
    fn test_missing_judgement_is_unsure() {
        let graph = JudgementGraph::new();
        assert_eq!(graph.get_judgement("a", "b"), Judgement::Unsure);
        assert_eq!(graph.get_judgement("a", "a"), Judgement::Positive);
    }

    #[test]
    fn test_judgement_is_symmetric() {
        let mut graph = JudgementGraph::new();
        graph.insert(edge("a", "b", Judgement::Negative));
        assert_eq!(graph.get_judgement("a", "b"), Judgement::Negative);
        assert_eq!(graph.get_judgement("b", "a"), Judgement::Negative);
    }

    #[test]
    fn test_positive_is_transitive() {
        let mut graph = JudgementGraph::new();
        graph.insert(edge("a", "b", Judgement::Positive));
        graph.insert(edge("b", "c", Judgement::Positive));
        assert_eq!(graph.get_judgement("a", "c"), Judgement::Positive);
        assert_eq!(graph.connected("c").len(), 3);
    }

    #[test]
    fn test_negative_spans_clusters() {
        let mut graph = JudgementGraph::new();
        graph.insert(edge("a", "b", Judgement::Positive));
        graph.insert(edge("c", "d", Judgement::Positive));
        graph.insert(edge("b", "c", Judgement::Negative));
        assert_eq!(graph.get_judgement("a", "d"), Judgement::Negative);
    }

    #[test]
    fn test_overwriting_positive_unlinks_cluster() {
        let mut graph = JudgementGraph::new();
        graph.insert(edge("a", "b", Judgement::Positive));
        graph.insert(edge("b", "c", Judgement::Positive));
        graph.insert(edge("a", "b", Judgement::Unsure));
        assert_eq!(graph.get_judgement("a", "c"), Judgement::Unsure);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_parse_judgement() {
        assert_eq!("POSITIVE".parse::<Judgement>().unwrap(), Judgement::Positive);
        assert!("maybe".parse::<Judgement>().is_err());
    }
}
