use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::app::ports::Cache;
use crate::error::Result;
use crate::observability::metrics;

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn oldest_allowed(max_age_days: u32) -> DateTime<Utc> {
    Utc::now() - Duration::days(i64::from(max_age_days))
}

/// SQLite-backed response cache. Writes are buffered in memory and written
/// in one transaction on `flush`.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    pending: Mutex<BTreeMap<String, (String, DateTime<Utc>)>>,
}

impl SqliteCache {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "Opening response cache");
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS cache (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                timestamp  TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            pending: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Cache for SqliteCache {
    fn get(&self, key: &str, max_age_days: u32) -> Result<Option<String>> {
        let cutoff = oldest_allowed(max_age_days);
        {
            let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((value, at)) = pending.get(key) {
                if *at >= cutoff {
                    metrics::cache::hit();
                    return Ok(Some(value.clone()));
                }
            }
        }
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM cache WHERE key = ?1 AND timestamp >= ?2",
                params![key, timestamp(cutoff)],
                |row| row.get(0),
            )
            .optional()?;
        if value.is_some() {
            metrics::cache::hit();
        } else {
            metrics::cache::miss();
        }
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), (value.to_string(), Utc::now()));
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // Entries stay pending until the transaction commits.
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;
        for (key, (value, at)) in pending.iter() {
            tx.execute(
                "INSERT OR REPLACE INTO cache (key, value, timestamp) VALUES (?1, ?2, ?3)",
                params![key, value, timestamp(*at)],
            )?;
        }
        tx.commit()?;
        debug!(entries = pending.len(), "Flushed response cache");
        pending.clear();
        metrics::cache::flushed();
        Ok(())
    }
}

/// Process-local cache, for tests and one-off runs
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str, max_age_days: u32) -> Result<Option<String>> {
        let cutoff = oldest_allowed(max_age_days);
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(key)
            .filter(|(_, at)| *at >= cutoff)
            .map(|(value, _)| value.clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), (value.to_string(), Utc::now()));
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_values_persist_after_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        let cache = SqliteCache::open(&path).unwrap();
        cache.set("k", "v").unwrap();
        assert_eq!(cache.get("k", 7).unwrap(), Some("v".to_string()));
        assert_eq!(cache.pending(), 1);
        cache.flush().unwrap();
        assert_eq!(cache.pending(), 0);
        drop(cache);

        let reopened = SqliteCache::open(&path).unwrap();
        assert_eq!(reopened.get("k", 7).unwrap(), Some("v".to_string()));
        assert_eq!(reopened.get("missing", 7).unwrap(), None);
    }

    #[test]
    fn test_unflushed_values_are_lost() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        let cache = SqliteCache::open(&path).unwrap();
        cache.set("k", "v").unwrap();
        drop(cache);

        let reopened = SqliteCache::open(&path).unwrap();
        assert_eq!(reopened.get("k", 7).unwrap(), None);
    }

    #[test]
    fn test_stale_entries_are_ignored() {
        let cache = SqliteCache::open_in_memory().unwrap();
        {
            let conn = cache.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO cache (key, value, timestamp) VALUES (?1, ?2, ?3)",
                params!["old", "v", timestamp(Utc::now() - Duration::days(30))],
            )
            .unwrap();
        }
        assert_eq!(cache.get("old", 7).unwrap(), None);
        assert_eq!(cache.get("old", 60).unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_failed_flush_keeps_pending_entries() {
        let cache = SqliteCache::open_in_memory().unwrap();
        cache.set("k", "v").unwrap();
        cache.conn.lock().unwrap().execute_batch("DROP TABLE cache").unwrap();

        assert!(cache.flush().is_err());
        assert_eq!(cache.pending(), 1);
        assert_eq!(cache.get("k", 7).unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::new();
        cache.set("a", "1").unwrap();
        cache.flush().unwrap();
        assert_eq!(cache.get("a", 1).unwrap(), Some("1".to_string()));
        assert_eq!(cache.len(), 1);
    }
}
