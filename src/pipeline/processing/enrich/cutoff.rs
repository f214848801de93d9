use chrono::NaiveDate;

use crate::domain::types::parse_iso_prefix;
use crate::domain::{get_schema, Entity};

/// Decides whether an expanded entity is out of scope for import.
pub trait PersonCutoff {
    fn is_cut_off(&self, entity: &Entity) -> bool;
}

/// Skips people whose latest death date is before `death_before`, or, when
/// `birth_before` is set, whose earliest birth date is before it. Other
/// schemata are never cut off.
#[derive(Debug, Clone)]
pub struct DateCutoff {
    pub death_before: NaiveDate,
    pub birth_before: Option<NaiveDate>,
}

impl Default for DateCutoff {
    fn default() -> Self {
        Self {
            death_before: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            birth_before: None,
        }
    }
}

fn days(entity: &Entity, prop: &str) -> Vec<NaiveDate> {
    entity.get(prop).into_iter().filter_map(earliest_day).collect()
}

/// The first day of a possibly partial ISO date: `1950` → 1950-01-01
fn earliest_day(value: &str) -> Option<NaiveDate> {
    let prefix = parse_iso_prefix(value)?;
    let mut parts = prefix.splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next().map_or(Some(1), |m| m.parse().ok())?;
    let day = parts
        .next()
        .map_or(Some(1), |d| d.get(..2).unwrap_or(d).parse().ok())?;
    NaiveDate::from_ymd_opt(year, month, day)
}

impl PersonCutoff for DateCutoff {
    fn is_cut_off(&self, entity: &Entity) -> bool {
        let is_person = get_schema("Person").map_or(false, |p| entity.schema().is_a(p));
        if !is_person {
            return false;
        }
        let died = days(entity, "deathDate").into_iter().max();
        if died.map_or(false, |day| day < self.death_before) {
            return true;
        }
        match self.birth_before {
            Some(limit) => days(entity, "birthDate").into_iter().min().map_or(false, |day| day < limit),
            None => false,
        }
    }
}
