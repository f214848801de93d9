//! Property value cleaning.
//!
//! A raw value is first expanded through the dataset lookups into one or more
//! (property, value) assignments, then each assignment is normalized for its
//! property's semantic type. Nothing here deduplicates; the entity's value
//! sets do.

pub mod identifiers;
pub mod lookup;

use serde::Serialize;
use tracing::warn;

use crate::domain::entity::Entity;
use crate::domain::schema::Property;
use crate::domain::types::PropertyType;
use crate::observability::metrics::cleaning as cleaning_metrics;
use identifiers::{get_identifier_format, VALIDATED_FORMATS};
use lookup::Lookups;

/// Length of an ISO date at day precision
const DAY_PRECISION: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanOptions<'a> {
    /// The value is already clean; skip normalization
    pub cleaned: bool,
    /// Relax exact-format requirements, e.g. for partial dates
    pub fuzzy: bool,
    /// strftime pattern for date values
    pub format: Option<&'a str>,
}

impl<'a> CleanOptions<'a> {
    pub fn cleaned() -> Self {
        Self {
            cleaned: true,
            ..Default::default()
        }
    }

    pub fn fuzzy() -> Self {
        Self {
            fuzzy: true,
            ..Default::default()
        }
    }

    pub fn with_format(format: &'a str) -> Self {
        Self {
            format: Some(format),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CleaningIssueKind {
    /// Normalization produced nothing; the value was dropped
    Rejected,
    /// Identifier failed its format check; the original value was kept
    IdentifierFallback,
    /// Value exceeds the property's maximum length; kept in full
    LengthExceeded,
}

/// A problem found while cleaning one value, kept for audit alongside the
/// log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningIssue {
    pub kind: CleaningIssueKind,
    pub entity_id: Option<String>,
    pub prop: String,
    pub value: String,
}

#[derive(Debug, Default)]
pub struct CleanedValues {
    pub values: Vec<(&'static Property, String)>,
    pub issues: Vec<CleaningIssue>,
}

/// Turns raw scraped values into schema-valid property values.
#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    lookups: Lookups,
}

impl Cleaner {
    pub fn new(lookups: Lookups) -> Self {
        Self { lookups }
    }

    pub fn lookups(&self) -> &Lookups {
        &self.lookups
    }

    /// Clean `value` for `prop` on `entity`. May yield zero, one or several
    /// (property, value) pairs, in lookup expansion order.
    pub fn clean(
        &self,
        entity: &Entity,
        prop: &'static Property,
        value: Option<&str>,
        options: CleanOptions<'_>,
    ) -> CleanedValues {
        let mut out = CleanedValues::default();
        let value = match value {
            Some(v) if !v.trim().is_empty() => v,
            _ => return out,
        };
        for (target, item) in self.lookups.expand(entity.schema(), prop, value) {
            if let Some(clean) = self.clean_one(entity, target, &item, value, options, &mut out.issues)
            {
                out.values.push((target, clean));
            }
        }
        out
    }

    fn clean_one(
        &self,
        entity: &Entity,
        prop: &'static Property,
        item: &str,
        raw: &str,
        options: CleanOptions<'_>,
        issues: &mut Vec<CleaningIssue>,
    ) -> Option<String> {
        let mut clean = Some(item.to_string());
        if !options.cleaned {
            clean = prop
                .prop_type
                .clean_text(item, Some(entity), options.fuzzy, options.format);
            if prop.prop_type == PropertyType::Identifier {
                clean = clean.map(|c| clean_identifier(entity, prop, c, issues));
            }
            if prop.prop_type == PropertyType::Date {
                // Nothing in this domain is time-critical
                clean = clean.map(|c| c.chars().take(DAY_PRECISION).collect());
            }
        }

        if let Some(clean) = clean {
            if clean.chars().count() > prop.max_length {
                warn!(
                    entity_id = entity.id.as_deref(),
                    prop = prop.name,
                    value = raw,
                    clean = %clean,
                    "Property value exceeds type length"
                );
                cleaning_metrics::length_exceeded();
                issues.push(issue(CleaningIssueKind::LengthExceeded, entity, prop, &clean));
            }
            return Some(clean);
        }

        if prop.prop_type == PropertyType::Phone {
            // No universal phone cleaner; keep a possibly broken number
            return Some(item.to_string());
        }

        warn!(
            entity_id = entity.id.as_deref(),
            prop = prop.name,
            value = raw,
            "Rejected property value"
        );
        cleaning_metrics::rejected();
        issues.push(issue(CleaningIssueKind::Rejected, entity, prop, raw));
        None
    }
}

/// Validate an identifier against its sub-format. Falls back to the
/// unvalidated value when the check fails.
fn clean_identifier(
    entity: &Entity,
    prop: &Property,
    value: String,
    issues: &mut Vec<CleaningIssue>,
) -> String {
    let format = match prop.format {
        Some(format) if VALIDATED_FORMATS.contains(&format) => format,
        _ => return value,
    };
    let normalized = get_identifier_format(format).and_then(|f| f.normalize(&value));
    match normalized {
        Some(normalized) => normalized,
        None => {
            warn!(
                entity_id = entity.id.as_deref(),
                format = format,
                prop = prop.name,
                value = %value,
                "Failed to validate identifier"
            );
            cleaning_metrics::identifier_fallback();
            issues.push(issue(CleaningIssueKind::IdentifierFallback, entity, prop, &value));
            value
        }
    }
}

fn issue(kind: CleaningIssueKind, entity: &Entity, prop: &Property, value: &str) -> CleaningIssue {
    CleaningIssue {
        kind,
        entity_id: entity.id.clone(),
        prop: prop.name.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(schema: &str, prop: &str, value: &str, options: CleanOptions<'_>) -> CleanedValues {
        let entity = Entity::new(schema).unwrap().with_id("test-1");
        let prop = entity.property(prop).unwrap();
        Cleaner::default().clean(&entity, prop, Some(value), options)
    }

    fn values(cleaned: &CleanedValues) -> Vec<&str> {
        cleaned.values.iter().map(|(_, v)| v.as_str()).collect()
    }

    #[test]
    fn test_date_truncated_to_day() {
        let out = clean("Person", "birthDate", "1982-06-13T14:22:05", CleanOptions::default());
        assert_eq!(values(&out), vec!["1982-06-13"]);
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_invalid_iban_falls_back_to_original() {
        let raw = "DE89 3704 0044 0532 0130 01";
        let out = clean("BankAccount", "iban", raw, CleanOptions::default());
        assert_eq!(values(&out), vec![raw]);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, CleaningIssueKind::IdentifierFallback);
        assert_eq!(out.issues[0].prop, "iban");
    }

    #[test]
    fn test_valid_iban_is_normalized() {
        let out = clean("BankAccount", "iban", "de89 3704 0044 0532 0130 00", CleanOptions::default());
        assert_eq!(values(&out), vec!["DE89370400440532013000"]);
    }

    #[test]
    fn test_unvalidated_identifier_format_passes_through() {
        let out = clean("Company", "innCode", "7707083893", CleanOptions::default());
        assert_eq!(values(&out), vec!["7707083893"]);
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_broken_phone_kept_unchanged() {
        let raw = "ext. 42 (ask for Bob)";
        let out = clean("Company", "phone", raw, CleanOptions::default());
        assert_eq!(values(&out), vec![raw]);
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_non_phone_failure_is_dropped() {
        let out = clean("Person", "birthDate", "sometime last spring", CleanOptions::default());
        assert!(out.values.is_empty());
        assert_eq!(out.issues[0].kind, CleaningIssueKind::Rejected);
    }

    #[test]
    fn test_over_length_value_kept_with_warning() {
        let long = "x".repeat(500);
        let out = clean("Company", "name", &long, CleanOptions::default());
        assert_eq!(values(&out), vec![long.as_str()]);
        assert_eq!(out.issues[0].kind, CleaningIssueKind::LengthExceeded);
    }

    #[test]
    fn test_already_cleaned_skips_normalization() {
        let out = clean("Person", "birthDate", "not a date", CleanOptions::cleaned());
        assert_eq!(values(&out), vec!["not a date"]);
    }

    #[test]
    fn test_fuzzy_and_format_flags_pass_through() {
        let out = clean("Person", "birthDate", "born 1970-01-02", CleanOptions::fuzzy());
        assert_eq!(values(&out), vec!["1970-01-02"]);
        let out = clean(
            "Person",
            "birthDate",
            "13.06.1982 14:22",
            CleanOptions::with_format("%d.%m.%Y %H:%M"),
        );
        assert_eq!(values(&out), vec!["1982-06-13"]);
    }

    #[test]
    fn test_missing_value_yields_nothing() {
        let entity = Entity::new("Company").unwrap();
        let prop = entity.property("name").unwrap();
        let out = Cleaner::default().clean(&entity, prop, None, CleanOptions::default());
        assert!(out.values.is_empty());
        assert!(out.issues.is_empty());
    }
}
