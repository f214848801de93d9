use serde::Serialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{info, info_span, warn};

use crate::config::{DatasetConfig, Settings};
use crate::domain::{Entity, EntityData};
use crate::error::Result;
use crate::idempotency::make_id;
use crate::infra::entity_store::DatasetStore;
use crate::pipeline::processing::cleaning::{Cleaner, CleaningIssueKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub records: usize,
    pub entities: usize,
    pub rejected: usize,
    pub identifier_fallbacks: usize,
    pub length_exceeded: usize,
}

/// Cleans raw records into a dataset's entity store. Records without an ID
/// get one derived from their schema and caption; records sharing an ID are
/// merged.
pub struct ImportUseCase {
    dataset: DatasetConfig,
    cleaner: Cleaner,
}

impl ImportUseCase {
    pub fn new(dataset: DatasetConfig) -> Self {
        let cleaner = Cleaner::new(dataset.lookups.clone());
        Self { dataset, cleaner }
    }

    pub fn run<R: BufRead>(&self, reader: R, store: &DatasetStore) -> Result<ImportSummary> {
        let span = info_span!("import", dataset = %self.dataset.name);
        let _entered = span.enter();
        let mut summary = ImportSummary::default();
        let mut entities: BTreeMap<String, Entity> = BTreeMap::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            summary.records += 1;
            let data: EntityData = serde_json::from_str(&line)?;
            let (mut entity, issues) = Entity::from_raw(&data, &self.cleaner)?;
            for issue in &issues {
                match issue.kind {
                    CleaningIssueKind::Rejected => summary.rejected += 1,
                    CleaningIssueKind::IdentifierFallback => summary.identifier_fallbacks += 1,
                    CleaningIssueKind::LengthExceeded => summary.length_exceeded += 1,
                }
            }

            if entity.id.is_none() {
                let caption = entity.caption().to_string();
                entity.id = make_id(self.dataset.prefix(), &[entity.schema().name, caption.as_str()]);
            }
            let id = match entity.id.clone() {
                Some(id) => id,
                None => {
                    warn!(record = summary.records, "Skipping record without ID");
                    continue;
                }
            };
            entity.datasets.insert(self.dataset.name.clone());
            match entities.get_mut(&id) {
                Some(existing) => existing.merge(&entity),
                None => {
                    entities.insert(id, entity);
                }
            }
        }

        summary.entities = store.write_all(entities.values())?;
        info!(
            records = summary.records,
            entities = summary.entities,
            rejected = summary.rejected,
            identifier_fallbacks = summary.identifier_fallbacks,
            length_exceeded = summary.length_exceeded,
            "Import complete"
        );
        Ok(summary)
    }
}

/// Import a raw NDJSON file into the dataset's store under `settings`.
pub fn run_import<R: BufRead>(
    settings: &Settings,
    dataset: &DatasetConfig,
    reader: R,
) -> Result<ImportSummary> {
    let store = DatasetStore::new(settings, &dataset.name);
    ImportUseCase::new(dataset.clone()).run(reader, &store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const RAW: &str = r#"
{"id": "osv-umbrella-corp", "schema": "Company", "properties": {"name": ["Umbrella Corp (aka Umbrella Pharmaceuticals)"], "incorporationDate": ["1968-05-01T09:00:00"], "country": ["United Kingdom"]}}
{"id": "osv-umbrella-corp", "schema": "LegalEntity", "properties": {"phone": ["call us"], "email": ["nope"]}}
{"schema": "Person", "properties": {"name": ["Oswell E. Spencer"]}}
"#;

    fn dataset() -> DatasetConfig {
        DatasetConfig::from_toml_str(
            r#"
            name = "registry"
            prefix = "osv"

            [[lookups."type.name".options]]
            match = "Umbrella Corp (aka Umbrella Pharmaceuticals)"
            targets = [
                { prop = "name", value = "Umbrella Corp" },
                { prop = "alias", value = "Umbrella Pharmaceuticals" },
            ]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_import_cleans_and_merges() {
        let dir = tempdir().unwrap();
        let settings = Settings::with_data_path(dir.path());
        let summary = run_import(&settings, &dataset(), RAW.as_bytes()).unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(summary.entities, 2);
        assert_eq!(summary.rejected, 1);

        let entities = DatasetStore::new(&settings, "registry").load_all().unwrap();
        let umbrella = entities
            .iter()
            .find(|e| e.id.as_deref() == Some("osv-umbrella-corp"))
            .unwrap();
        assert_eq!(umbrella.schema().name, "Company");
        assert_eq!(umbrella.get("name"), vec!["Umbrella Corp"]);
        assert_eq!(umbrella.get("alias"), vec!["Umbrella Pharmaceuticals"]);
        assert_eq!(umbrella.get("incorporationDate"), vec!["1968-05-01"]);
        assert_eq!(umbrella.get("country"), vec!["gb"]);
        assert_eq!(umbrella.get("phone"), vec!["call us"]);
        assert!(umbrella.get("email").is_empty());

        let person = entities.iter().find(|e| e.schema().name == "Person").unwrap();
        assert!(person.id.as_deref().unwrap().starts_with("osv-"));
    }

    #[test]
    fn test_import_is_repeatable() {
        let dir = tempdir().unwrap();
        let settings = Settings::with_data_path(dir.path());
        run_import(&settings, &dataset(), RAW.as_bytes()).unwrap();
        let first = std::fs::read_to_string(DatasetStore::new(&settings, "registry").path()).unwrap();
        run_import(&settings, &dataset(), RAW.as_bytes()).unwrap();
        let second = std::fs::read_to_string(DatasetStore::new(&settings, "registry").path()).unwrap();
        assert_eq!(first, second);
    }
}
