use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::types::PropertyType;

/// A property declared by exactly one schema.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: &'static str,
    /// Name of the schema that declares this property
    pub schema: &'static str,
    pub prop_type: PropertyType,
    /// Identifier sub-format, e.g. `iban` or `lei`
    pub format: Option<&'static str>,
    /// Range schema for entity references
    pub range: Option<&'static str>,
    pub max_length: usize,
}

impl Property {
    /// Qualified name, `Schema:prop`
    pub fn qname(&self) -> String {
        format!("{}:{}", self.schema, self.name)
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.name == other.name
    }
}

/// An entity type. Schemata form an inheritance tree; a schema carries its
/// own properties plus everything its parents declare.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub extends: &'static [&'static str],
    pub is_abstract: bool,
    pub matchable: bool,
    own: Vec<Property>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Schema {
    fn new(name: &'static str, extends: &'static [&'static str]) -> Self {
        Self {
            name,
            extends,
            is_abstract: false,
            matchable: false,
            own: Vec::new(),
        }
    }

    fn abstract_schema(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    fn matchable(mut self) -> Self {
        self.matchable = true;
        self
    }

    fn prop(mut self, name: &'static str, prop_type: PropertyType) -> Self {
        self.own.push(Property {
            name,
            schema: self.name,
            prop_type,
            format: None,
            range: None,
            max_length: prop_type.max_length(),
        });
        self
    }

    fn props(self, names: &[&'static str], prop_type: PropertyType) -> Self {
        names.iter().fold(self, |schema, name| schema.prop(*name, prop_type))
    }

    fn identifier(mut self, name: &'static str, format: &'static str) -> Self {
        self = self.prop(name, PropertyType::Identifier);
        if let Some(prop) = self.own.last_mut() {
            prop.format = Some(format);
        }
        self
    }

    fn reference(mut self, name: &'static str, range: &'static str) -> Self {
        self = self.prop(name, PropertyType::Entity);
        if let Some(prop) = self.own.last_mut() {
            prop.range = Some(range);
        }
        self
    }

    pub fn parents(&self) -> impl Iterator<Item = &'static Schema> + '_ {
        self.extends.iter().filter_map(|name| get_schema(name))
    }

    /// Look up a property declared by this schema or any ancestor
    pub fn get(&self, name: &str) -> Option<&Property> {
        if let Some(prop) = self.own.iter().find(|p| p.name == name) {
            return Some(prop);
        }
        self.extends
            .iter()
            .filter_map(|parent| get_schema(parent))
            .find_map(|parent| parent.get(name))
    }

    /// All properties, own first, then inherited
    pub fn properties(&self) -> Vec<&Property> {
        let mut props: Vec<&Property> = self.own.iter().collect();
        for parent in self.extends.iter().filter_map(|p| get_schema(p)) {
            for prop in parent.properties() {
                if !props.iter().any(|p| p.name == prop.name) {
                    props.push(prop);
                }
            }
        }
        props
    }

    pub fn is_a(&self, other: &Schema) -> bool {
        self.name == other.name || self.parents().any(|parent| parent.is_a(other))
    }

    /// Whether entities of the two schemata may describe the same subject
    pub fn can_match(&self, other: &Schema) -> bool {
        if !self.matchable || !other.matchable {
            return false;
        }
        if self.is_a(other) || other.is_a(self) {
            return true;
        }
        MODEL
            .values()
            .any(|s| s.matchable && s.is_a(self) && s.is_a(other))
    }
}

static MODEL: Lazy<BTreeMap<&'static str, Schema>> = Lazy::new(|| {
    use PropertyType::*;

    let schemata = vec![
        Schema::new("Thing", &[])
            .abstract_schema()
            .props(&["name", "alias", "previousName", "weakAlias"], Name)
            .props(&["summary", "description", "notes"], Text)
            .props(&["address", "program", "keywords"], String)
            .prop("country", Country)
            .prop("sourceUrl", Url)
            .prop("topics", Topic),
        Schema::new("LegalEntity", &["Thing"])
            .matchable()
            .prop("email", Email)
            .prop("phone", Phone)
            .prop("website", Url)
            .props(&["legalForm", "status", "sector"], String)
            .props(&["incorporationDate", "dissolutionDate"], Date)
            .props(&["jurisdiction", "mainCountry"], Country)
            .props(&["idNumber", "taxNumber", "registrationNumber"], Identifier)
            .identifier("leiCode", "lei")
            .identifier("innCode", "inn")
            .identifier("ogrnCode", "ogrn"),
        Schema::new("Organization", &["LegalEntity"]).matchable(),
        Schema::new("Company", &["Organization"])
            .matchable()
            .identifier("bicCode", "bic")
            .identifier("imoNumber", "imo")
            .prop("capital", String),
        Schema::new("PublicBody", &["Organization"]).matchable(),
        Schema::new("Person", &["LegalEntity"])
            .matchable()
            .props(
                &["firstName", "middleName", "lastName", "fatherName", "secondName"],
                Name,
            )
            .props(&["title", "position", "birthPlace", "religion"], String)
            .props(&["birthDate", "deathDate"], Date)
            .props(&["nationality", "citizenship"], Country)
            .prop("gender", Gender)
            .identifier("passportNumber", "passport"),
        Schema::new("BankAccount", &["Thing"])
            .matchable()
            .identifier("iban", "iban")
            .identifier("bic", "bic")
            .prop("accountNumber", Identifier)
            .prop("bankName", String)
            .reference("holder", "LegalEntity"),
        Schema::new("Security", &["Thing"])
            .matchable()
            .identifier("isin", "isin")
            .prop("ticker", String)
            .prop("issueDate", Date)
            .reference("issuer", "LegalEntity"),
        Schema::new("Vessel", &["Thing"])
            .matchable()
            .identifier("imoNumber", "imo")
            .identifier("mmsi", "mmsi")
            .prop("flag", Country)
            .props(&["callSign", "type"], String)
            .prop("buildDate", Date)
            .reference("owner", "LegalEntity"),
        Schema::new("Interval", &[])
            .abstract_schema()
            .props(&["startDate", "endDate", "date", "modifiedAt"], Date)
            .props(&["summary", "description"], Text)
            .prop("recordId", String)
            .prop("sourceUrl", Url),
        Schema::new("Sanction", &["Interval"])
            .reference("entity", "Thing")
            .props(&["authority", "program", "provisions", "status"], String)
            .prop("reason", Text)
            .prop("country", Country)
            .prop("listingDate", Date)
            .prop("authorityId", Identifier),
        Schema::new("Ownership", &["Interval"])
            .reference("owner", "LegalEntity")
            .reference("asset", "Thing")
            .props(&["percentage", "sharesCount", "ownershipType", "role"], String),
        Schema::new("Directorship", &["Interval"])
            .reference("director", "LegalEntity")
            .reference("organization", "Organization")
            .prop("role", String),
        Schema::new("Family", &["Interval"])
            .reference("person", "Person")
            .reference("relative", "Person")
            .prop("relationship", String),
        Schema::new("UnknownLink", &["Interval"])
            .reference("subject", "Thing")
            .reference("object", "Thing")
            .prop("role", String),
    ];

    schemata.into_iter().map(|s| (s.name, s)).collect()
});

pub fn get_schema(name: &str) -> Option<&'static Schema> {
    MODEL.get(name)
}

pub fn schemata() -> impl Iterator<Item = &'static Schema> {
    MODEL.values()
}
