use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::pipeline::processing::resolver::{Edge, Judgement, JudgementGraph, Pair, Resolver};

/// SQLite-backed resolver. All edges are loaded at open; decisions are kept
/// in memory until `save`, which writes them in a single transaction.
pub struct ResolverStore {
    conn: Connection,
    graph: JudgementGraph,
    dirty: BTreeSet<Pair>,
}

fn resolver_error(context: &'static str) -> impl Fn(rusqlite::Error) -> PipelineError {
    move |e| PipelineError::Resolver(format!("{}: {}", context, e))
}

impl ResolverStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(resolver_error("cannot open resolver"))?;
        let store = Self::init(conn)?;
        info!(
            path = %path.display(),
            edges = store.graph.len(),
            "Loaded resolver"
        );
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(resolver_error("cannot open resolver"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS resolver (
                left_id     TEXT NOT NULL,
                right_id    TEXT NOT NULL,
                judgement   TEXT NOT NULL,
                user        TEXT,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (left_id, right_id)
            );
            "#,
        )
        .map_err(resolver_error("cannot create resolver table"))?;

        let mut graph = JudgementGraph::new();
        {
            let mut stmt = conn
                .prepare("SELECT left_id, right_id, judgement, user, created_at FROM resolver")
                .map_err(resolver_error("cannot load judgements"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(resolver_error("cannot load judgements"))?;
            for row in rows {
                let (left, right, judgement, user, created_at) =
                    row.map_err(resolver_error("cannot read judgement"))?;
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| PipelineError::Resolver(format!("bad timestamp: {}", e)))?
                    .with_timezone(&Utc);
                graph.insert(Edge {
                    pair: Pair::new(&left, &right),
                    judgement: judgement.parse()?,
                    user,
                    created_at,
                });
            }
        }

        Ok(Self {
            conn,
            graph,
            dirty: BTreeSet::new(),
        })
    }

    pub fn graph(&self) -> &JudgementGraph {
        &self.graph
    }

    pub fn pending(&self) -> usize {
        self.dirty.len()
    }
}

impl Resolver for ResolverStore {
    fn get_judgement(&self, a: &str, b: &str) -> Judgement {
        self.graph.get_judgement(a, b)
    }

    fn decide(&mut self, a: &str, b: &str, judgement: Judgement, user: Option<&str>) -> Result<()> {
        if a == b {
            return Err(PipelineError::Resolver(format!(
                "Cannot judge {} against itself",
                a
            )));
        }
        let pair = Pair::new(a, b);
        debug!(left = %pair.left, right = %pair.right, %judgement, "Recording judgement");
        self.graph.insert(Edge {
            pair: pair.clone(),
            judgement,
            user: user.map(str::to_string),
            created_at: Utc::now(),
        });
        self.dirty.insert(pair);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(resolver_error("cannot begin resolver transaction"))?;
        for pair in &self.dirty {
            if let Some(edge) = self.graph.edge(pair) {
                tx.execute(
                    "INSERT INTO resolver (left_id, right_id, judgement, user, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(left_id, right_id) DO UPDATE SET
                        judgement=excluded.judgement,
                        user=excluded.user,
                        created_at=excluded.created_at",
                    params![
                        edge.pair.left,
                        edge.pair.right,
                        edge.judgement.as_str(),
                        edge.user,
                        edge.created_at.to_rfc3339(),
                    ],
                )
                .map_err(resolver_error("cannot write judgement"))?;
            }
        }
        tx.commit().map_err(resolver_error("cannot commit judgements"))?;
        debug!(written = self.dirty.len(), "Saved resolver");
        self.dirty.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_judgements_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resolve.sqlite");

        let mut store = ResolverStore::open(&path).unwrap();
        store
            .decide("osv-umbrella-corp", "xxx", Judgement::Positive, Some("reviewer"))
            .unwrap();
        store.decide("a", "b", Judgement::Negative, None).unwrap();
        assert_eq!(store.pending(), 2);
        store.save().unwrap();
        assert_eq!(store.pending(), 0);
        drop(store);

        let reopened = ResolverStore::open(&path).unwrap();
        assert_eq!(
            reopened.get_judgement("xxx", "osv-umbrella-corp"),
            Judgement::Positive
        );
        assert_eq!(reopened.get_judgement("b", "a"), Judgement::Negative);
        assert_eq!(reopened.get_judgement("a", "c"), Judgement::Unsure);
    }

    #[test]
    fn test_unsaved_decisions_are_not_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resolve.sqlite");

        let mut store = ResolverStore::open(&path).unwrap();
        store.decide("a", "b", Judgement::Positive, None).unwrap();
        drop(store);

        let reopened = ResolverStore::open(&path).unwrap();
        assert!(reopened.graph().is_empty());
    }

    #[test]
    fn test_save_without_changes_is_a_no_op() {
        let mut store = ResolverStore::open_in_memory().unwrap();
        store.save().unwrap();
        store.save().unwrap();
        assert!(store.graph().is_empty());
    }

    #[test]
    fn test_self_judgement_rejected() {
        let mut store = ResolverStore::open_in_memory().unwrap();
        assert!(store.decide("a", "a", Judgement::Positive, None).is_err());
    }
}
