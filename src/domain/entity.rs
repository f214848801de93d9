use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::schema::{get_schema, Property, Schema};
use crate::domain::types::PropertyType;
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::cleaning::{CleanOptions, Cleaner, CleaningIssue};

/// Property names used to caption an entity and to compare names when matching
pub const NAME_PROPS: &[&str] = &["name", "alias", "previousName", "weakAlias"];

/// A typed record in the entity graph. Property values are kept in sorted
/// sets, so duplicates are suppressed and serialization is deterministic.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: Option<String>,
    schema: &'static Schema,
    properties: BTreeMap<String, BTreeSet<String>>,
    pub datasets: BTreeSet<String>,
}

/// Serialized form of an entity, as stored in NDJSON files and exchanged
/// with remote matching services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityData {
    pub id: Option<String>,
    pub schema: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<String>,
}

impl Entity {
    pub fn new(schema: &str) -> Result<Self> {
        let schema =
            get_schema(schema).ok_or_else(|| PipelineError::UnknownSchema(schema.to_string()))?;
        Ok(Self {
            id: None,
            schema,
            properties: BTreeMap::new(),
            datasets: BTreeSet::new(),
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn property(&self, name: &str) -> Result<&'static Property> {
        let schema: &'static Schema = self.schema;
        schema.get(name).ok_or_else(|| PipelineError::UnknownProperty {
            schema: schema.name.to_string(),
            prop: name.to_string(),
        })
    }

    /// Clean and add a raw value with default options and no lookups.
    pub fn add(&mut self, prop: &str, value: &str) -> Result<()> {
        self.add_with(&Cleaner::default(), prop, Some(value), CleanOptions::default())?;
        Ok(())
    }

    /// Clean a raw value through `cleaner` and store whatever it yields.
    /// Returns the issues raised while cleaning.
    pub fn add_with(
        &mut self,
        cleaner: &Cleaner,
        prop: &str,
        value: Option<&str>,
        options: CleanOptions<'_>,
    ) -> Result<Vec<CleaningIssue>> {
        let prop = self.property(prop)?;
        let cleaned = cleaner.clean(self, prop, value, options);
        for (target, value) in cleaned.values {
            self.insert(target, value);
        }
        Ok(cleaned.issues)
    }

    /// Store a value that was cleaned before, e.g. one read back from a store.
    pub fn add_cleaned(&mut self, prop: &str, value: &str) -> Result<()> {
        let prop = self.property(prop)?;
        self.insert(prop, value.to_string());
        Ok(())
    }

    fn insert(&mut self, prop: &Property, value: String) {
        self.properties
            .entry(prop.name.to_string())
            .or_default()
            .insert(value);
    }

    pub fn get(&self, prop: &str) -> Vec<&str> {
        self.properties
            .get(prop)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn first(&self, prop: &str) -> Option<&str> {
        self.properties
            .get(prop)
            .and_then(|values| values.iter().next())
            .map(String::as_str)
    }

    pub fn has(&self, prop: &str) -> bool {
        self.properties.get(prop).map_or(false, |v| !v.is_empty())
    }

    pub fn iter_props(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All values of properties with the given semantic type
    pub fn values_of_type(&self, prop_type: PropertyType) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|(name, _)| {
                self.schema
                    .get(name)
                    .map_or(false, |p| p.prop_type == prop_type)
            })
            .flat_map(|(_, values)| values.iter().map(String::as_str))
            .collect()
    }

    /// IDs of all entities this entity references
    pub fn references(&self) -> Vec<&str> {
        self.values_of_type(PropertyType::Entity)
    }

    pub fn names(&self) -> Vec<&str> {
        NAME_PROPS.iter().flat_map(|p| self.get(p)).collect()
    }

    pub fn caption(&self) -> &str {
        self.first("name")
            .or_else(|| self.id.as_deref())
            .unwrap_or(self.schema.name)
    }

    /// Merge another record of the same subject into this one. The more
    /// specific schema wins.
    pub fn merge(&mut self, other: &Entity) {
        if other.schema.is_a(self.schema) {
            self.schema = other.schema;
        }
        for (prop, values) in &other.properties {
            self.properties
                .entry(prop.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        self.datasets.extend(other.datasets.iter().cloned());
    }

    pub fn to_data(&self) -> EntityData {
        EntityData {
            id: self.id.clone(),
            schema: self.schema.name.to_string(),
            properties: self
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
                .collect(),
            datasets: self.datasets.iter().cloned().collect(),
        }
    }

    /// Build an entity from stored data whose values are already clean.
    pub fn from_data(data: &EntityData) -> Result<Self> {
        let mut entity = Entity::new(&data.schema)?;
        entity.id = data.id.clone();
        entity.datasets = data.datasets.iter().cloned().collect();
        for (prop, values) in &data.properties {
            for value in values {
                entity.add_cleaned(prop, value)?;
            }
        }
        Ok(entity)
    }

    /// Build an entity from untrusted data, passing every value through the
    /// cleaner. Unknown properties are an error.
    pub fn from_raw(data: &EntityData, cleaner: &Cleaner) -> Result<(Self, Vec<CleaningIssue>)> {
        let mut entity = Entity::new(&data.schema)?;
        entity.id = data.id.clone();
        entity.datasets = data.datasets.iter().cloned().collect();
        let mut issues = Vec::new();
        for (prop, values) in &data.properties {
            for value in values {
                issues.extend(entity.add_with(
                    cleaner,
                    prop,
                    Some(value.as_str()),
                    CleanOptions::default(),
                )?);
            }
        }
        Ok((entity, issues))
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.schema == other.schema
            && self.properties == other.properties
            && self.datasets == other.datasets
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}({:?}, {:?})>",
            self.schema.name,
            self.id.as_deref().unwrap_or(""),
            self.caption()
        )
    }
}
