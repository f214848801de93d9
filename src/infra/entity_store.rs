use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app::ports::EntityView;
use crate::config::Settings;
use crate::domain::{Entity, EntityData};
use crate::error::{PipelineError, Result};

pub const ENTITIES_FILE: &str = "entities.ndjson";

/// Cleaned entities of one dataset, stored as NDJSON under
/// `<data>/datasets/<name>/entities.ndjson`.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    name: String,
    path: PathBuf,
}

impl DatasetStore {
    pub fn new(settings: &Settings, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: settings.dataset_path(name).join(ENTITIES_FILE),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Replace the stored entities, sorted by ID.
    pub fn write_all<'a, I>(&self, entities: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Entity>,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut records: Vec<EntityData> = entities.into_iter().map(Entity::to_data).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let mut writer = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?,
        );
        for record in &records {
            writeln!(writer, "{}", serde_json::to_string(record)?)?;
        }
        writer.flush()?;
        info!(dataset = %self.name, entities = records.len(), path = %self.path.display(), "Wrote dataset");
        Ok(records.len())
    }

    pub fn load_all(&self) -> Result<Vec<Entity>> {
        read_entities(&self.path).collect()
    }
}

/// Read-only view over several datasets, in configured order.
pub struct DatasetView {
    stores: Vec<DatasetStore>,
}

impl DatasetView {
    pub fn new(stores: Vec<DatasetStore>) -> Self {
        Self { stores }
    }

    pub fn for_datasets(settings: &Settings, names: &[String]) -> Result<Self> {
        let stores: Vec<DatasetStore> = names
            .iter()
            .map(|name| DatasetStore::new(settings, name))
            .collect();
        for store in &stores {
            if !store.exists() {
                return Err(PipelineError::Config(format!(
                    "Dataset {} has no entities at {}",
                    store.name,
                    store.path.display()
                )));
            }
        }
        Ok(Self::new(stores))
    }
}

impl EntityView for DatasetView {
    fn entities(&self) -> Result<Box<dyn Iterator<Item = Result<Entity>> + '_>> {
        Ok(Box::new(
            self.stores.iter().flat_map(|store| read_entities(&store.path)),
        ))
    }
}

/// A view over entities held in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryView {
    entities: Vec<Entity>,
}

impl MemoryView {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }
}

impl EntityView for MemoryView {
    fn entities(&self) -> Result<Box<dyn Iterator<Item = Result<Entity>> + '_>> {
        Ok(Box::new(self.entities.iter().cloned().map(Ok)))
    }
}

fn parse_line(line: &str) -> Result<Entity> {
    let data: EntityData = serde_json::from_str(line)?;
    Entity::from_data(&data)
}

/// Stream the entities of an NDJSON file. Values are trusted as cleaned.
pub fn read_entities(path: &Path) -> Box<dyn Iterator<Item = Result<Entity>>> {
    match File::open(path) {
        Ok(file) => Box::new(BufReader::new(file).lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(parse_line(&line)),
            Err(e) => Some(Err(PipelineError::Io(e))),
        })),
        Err(e) => Box::new(std::iter::once(Err(PipelineError::Io(e)))),
    }
}
