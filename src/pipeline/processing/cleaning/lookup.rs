use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::schema::{Property, Schema};
use crate::domain::types::{collapse_spaces, PropertyType};

/// Dataset-configured value rewrites, applied before type cleaning. Keyed by
/// `type.<type name>`:
///
/// ```toml
/// [[lookups."type.name".options]]
/// match = "Umbrella Corp (a.k.a. Umbrella)"
/// value = "Umbrella Corp"
/// targets = [{ prop = "alias", value = "Umbrella" }]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Lookups {
    lookups: BTreeMap<String, Lookup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Lookup {
    #[serde(default)]
    pub options: Vec<LookupOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupOption {
    #[serde(default, rename = "match", deserialize_with = "one_or_many")]
    pub matches: Vec<String>,
    #[serde(default, deserialize_with = "optional_regex")]
    pub regex: Option<Regex>,
    pub value: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
    /// Redirect the values to another property of the same schema
    pub prop: Option<String>,
    /// Additional (property, value) assignments
    #[serde(default)]
    pub targets: Vec<LookupTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupTarget {
    pub prop: String,
    pub value: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

fn optional_regex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Regex>, D::Error> {
    let pattern: Option<String> = Option::deserialize(deserializer)?;
    pattern
        .map(|p| Regex::new(&p).map_err(serde::de::Error::custom))
        .transpose()
}

fn lookup_key(value: &str) -> String {
    collapse_spaces(value).to_lowercase()
}

impl LookupOption {
    fn matches(&self, value: &str) -> bool {
        let key = lookup_key(value);
        self.matches.iter().any(|m| lookup_key(m) == key)
            || self.regex.as_ref().map_or(false, |r| r.is_match(value))
    }
}

impl Lookup {
    pub fn find(&self, value: &str) -> Option<&LookupOption> {
        self.options.iter().find(|option| option.matches(value))
    }
}

impl Lookups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, lookup: Lookup) {
        self.lookups.insert(key.to_string(), lookup);
    }

    pub fn for_type(&self, prop_type: PropertyType) -> Option<&Lookup> {
        self.lookups.get(&format!("type.{}", prop_type.name()))
    }

    /// Expand a raw value into the (property, value) assignments it stands
    /// for. Without a matching lookup option the value maps to itself; an
    /// option that names no outputs drops the value.
    pub fn expand<'a>(
        &'a self,
        schema: &'static Schema,
        prop: &'static Property,
        value: &'a str,
    ) -> Box<dyn Iterator<Item = (&'static Property, String)> + 'a> {
        let option = match self.for_type(prop.prop_type).and_then(|l| l.find(value)) {
            Some(option) => option,
            None => return Box::new(std::iter::once((prop, value.to_string()))),
        };

        let target = match &option.prop {
            Some(name) => resolve(schema, name, value),
            None => Some(prop),
        };
        let direct = target.into_iter().flat_map(move |target| {
            option
                .value
                .iter()
                .chain(option.values.iter())
                .map(move |v| (target, v.clone()))
        });
        let extra = option.targets.iter().filter_map(move |t| {
            resolve(schema, &t.prop, value).map(|target| (target, t.value.clone()))
        });
        Box::new(direct.chain(extra))
    }
}

fn resolve(schema: &'static Schema, name: &str, value: &str) -> Option<&'static Property> {
    let found = schema.get(name);
    if found.is_none() {
        warn!(
            schema = schema.name,
            prop = name,
            value = value,
            "Lookup refers to a property the schema does not have"
        );
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::get_schema;

    fn lookups() -> Lookups {
        let table: toml::Table = toml::from_str(
            r#"
            [[lookups."type.name".options]]
            match = "Umbrella Corp (a.k.a. Umbrella)"
            value = "Umbrella Corp"
            targets = [{ prop = "alias", value = "Umbrella" }]

            [[lookups."type.name".options]]
            match = ["N/A", "unknown"]

            [[lookups."type.identifier".options]]
            regex = "^OGRN"
            prop = "ogrnCode"
            values = ["1027700132195"]
            "#,
        )
        .unwrap();
        table["lookups"].clone().try_into().unwrap()
    }

    fn expand(schema: &str, prop: &str, value: &str) -> Vec<(String, String)> {
        let schema = get_schema(schema).unwrap();
        let prop = schema.get(prop).unwrap();
        let lookups = lookups();
        let out: Vec<(String, String)> = lookups
            .expand(schema, prop, value)
            .map(|(p, v)| (p.name.to_string(), v))
            .collect();
        out
    }

    #[test]
    fn test_no_match_maps_to_itself() {
        assert_eq!(
            expand("Company", "name", "Acme Ltd"),
            vec![("name".to_string(), "Acme Ltd".to_string())]
        );
    }

    #[test]
    fn test_split_into_name_and_alias() {
        assert_eq!(
            expand("Company", "name", "umbrella  corp (a.k.a. umbrella)"),
            vec![
                ("name".to_string(), "Umbrella Corp".to_string()),
                ("alias".to_string(), "Umbrella".to_string()),
            ]
        );
    }

    #[test]
    fn test_option_without_outputs_drops_value() {
        assert!(expand("Person", "alias", "N/A").is_empty());
    }

    #[test]
    fn test_regex_redirects_property() {
        assert_eq!(
            expand("Company", "registrationNumber", "OGRN 1027700132195"),
            vec![("ogrnCode".to_string(), "1027700132195".to_string())]
        );
    }
}
