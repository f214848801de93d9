use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::app::ports::EntitySink;
use crate::domain::{Entity, EntityData};
use crate::error::{PipelineError, Result};

pub const OUTPUT_FILE: &str = "enriched.ndjson";

/// One line of sink output: the entity plus its emission flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmittedEntity {
    #[serde(flatten)]
    pub data: EntityData,
    pub target: bool,
    pub external: bool,
}

#[derive(Debug)]
struct Emission {
    entity: Entity,
    target: bool,
    external: bool,
}

/// Emissions of one run, merged by entity ID. An entity is `target` if any
/// emission was, and `external` only if every emission was.
#[derive(Debug, Default)]
pub struct Emissions {
    dataset: String,
    entries: BTreeMap<String, Emission>,
}

impl Emissions {
    pub fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            entries: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, entity: &Entity, target: bool, external: bool) -> Result<()> {
        let id = entity
            .id
            .clone()
            .ok_or_else(|| PipelineError::Config(format!("Cannot emit entity without ID: {}", entity)))?;
        match self.entries.get_mut(&id) {
            Some(existing) => {
                existing.entity.merge(entity);
                existing.target |= target;
                existing.external &= external;
            }
            None => {
                let mut entity = entity.clone();
                entity.datasets.insert(self.dataset.clone());
                self.entries.insert(
                    id,
                    Emission {
                        entity,
                        target,
                        external,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Emitted entities sorted by ID
    pub fn records(&self) -> Vec<EmittedEntity> {
        self.entries
            .values()
            .map(|e| EmittedEntity {
                data: e.entity.to_data(),
                target: e.target,
                external: e.external,
            })
            .collect()
    }
}

/// Writes the merged emissions of a run as sorted NDJSON on `finish`,
/// replacing the output of earlier runs.
pub struct FileEntitySink {
    path: PathBuf,
    emissions: Emissions,
}

impl FileEntitySink {
    pub fn new<P: AsRef<Path>>(path: P, dataset: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            emissions: Emissions::new(dataset),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EntitySink for FileEntitySink {
    fn emit(&mut self, entity: &Entity, target: bool, external: bool) -> Result<()> {
        self.emissions.record(entity, target, external)
    }

    fn finish(&mut self) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;

        let mut writer = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?,
        );
        let records = self.emissions.records();
        for record in &records {
            writeln!(writer, "{}", serde_json::to_string(record)?)?;
        }
        writer.flush()?;
        info!(path = %self.path.display(), entities = records.len(), "Wrote enrichment output");
        Ok(())
    }
}

/// Read back the output of a `FileEntitySink`
pub fn read_emitted(path: &Path) -> Result<Vec<EmittedEntity>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

/// Sink that keeps emissions in memory. Clones share the same state, so a
/// caller can hand one clone to a run and inspect the other afterwards.
#[derive(Clone)]
pub struct MemorySink {
    emissions: Arc<Mutex<Emissions>>,
    finished: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new(dataset: &str) -> Self {
        Self {
            emissions: Arc::new(Mutex::new(Emissions::new(dataset))),
            finished: Arc::new(Mutex::new(false)),
        }
    }

    pub fn records(&self) -> Vec<EmittedEntity> {
        self.emissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records()
    }

    pub fn get(&self, id: &str) -> Option<EmittedEntity> {
        self.records()
            .into_iter()
            .find(|r| r.data.id.as_deref() == Some(id))
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EntitySink for MemorySink {
    fn emit(&mut self, entity: &Entity, target: bool, external: bool) -> Result<()> {
        self.emissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(entity, target, external)
    }

    fn finish(&mut self) -> Result<()> {
        *self.finished.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn company(id: &str, name: &str) -> Entity {
        let mut entity = Entity::new("Company").unwrap().with_id(id);
        entity.add("name", name).unwrap();
        entity
    }

    #[test]
    fn test_repeated_emissions_merge() {
        let mut emissions = Emissions::new("enrich");
        emissions.record(&company("a", "Alpha"), false, true).unwrap();
        emissions.record(&company("a", "Alpha Ltd"), true, false).unwrap();
        emissions.record(&company("b", "Beta"), false, true).unwrap();

        let records = emissions.records();
        assert_eq!(records.len(), 2);
        let a = &records[0];
        assert!(a.target);
        assert!(!a.external);
        assert_eq!(a.data.properties["name"], vec!["Alpha", "Alpha Ltd"]);
        assert_eq!(a.data.datasets, vec!["enrich"]);
        assert!(records[1].external);
    }

    #[test]
    fn test_entity_without_id_rejected() {
        let mut emissions = Emissions::new("enrich");
        let entity = Entity::new("Company").unwrap();
        assert!(emissions.record(&entity, true, false).is_err());
    }

    #[test]
    fn test_finish_replaces_previous_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join(OUTPUT_FILE);

        let mut sink = FileEntitySink::new(&path, "enrich");
        sink.emit(&company("b", "Beta"), true, false).unwrap();
        sink.emit(&company("a", "Alpha"), false, true).unwrap();
        sink.finish().unwrap();
        let ids: Vec<_> = read_emitted(&path)
            .unwrap()
            .into_iter()
            .map(|r| r.data.id.unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        let mut sink = FileEntitySink::new(&path, "enrich");
        sink.emit(&company("c", "Gamma"), true, false).unwrap();
        sink.finish().unwrap();
        assert_eq!(read_emitted(&path).unwrap().len(), 1);
    }
}
