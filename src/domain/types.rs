use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::entity::Entity;

/// Semantic type of a property. Decides how raw text is cleaned and how
/// long a stored value may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Name,
    String,
    Text,
    Date,
    Identifier,
    Phone,
    Country,
    Email,
    Url,
    Entity,
    Topic,
    Gender,
}

impl PropertyType {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyType::Name => "name",
            PropertyType::String => "string",
            PropertyType::Text => "text",
            PropertyType::Date => "date",
            PropertyType::Identifier => "identifier",
            PropertyType::Phone => "phone",
            PropertyType::Country => "country",
            PropertyType::Email => "email",
            PropertyType::Url => "url",
            PropertyType::Entity => "entity",
            PropertyType::Topic => "topic",
            PropertyType::Gender => "gender",
        }
    }

    /// Maximum length of a stored value of this type
    pub fn max_length(&self) -> usize {
        match self {
            PropertyType::Name => 384,
            PropertyType::String => 1024,
            PropertyType::Text => 65_000,
            PropertyType::Date => 32,
            PropertyType::Identifier => 64,
            PropertyType::Phone => 32,
            PropertyType::Country => 16,
            PropertyType::Email => 250,
            PropertyType::Url => 4096,
            PropertyType::Entity => 200,
            PropertyType::Topic => 64,
            PropertyType::Gender => 16,
        }
    }

    /// Normalize raw text into this type's canonical form. `None` means the
    /// text could not be made into a valid value.
    ///
    /// `entity` is the owning entity and gives context (e.g. the country used
    /// to complete a national phone number). `fuzzy` relaxes exact-format
    /// requirements for dates; `format` is a strftime pattern for dates.
    pub fn clean_text(
        &self,
        text: &str,
        entity: Option<&Entity>,
        fuzzy: bool,
        format: Option<&str>,
    ) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match self {
            PropertyType::Name => clean_name(text),
            PropertyType::String => non_empty(collapse_spaces(text)),
            PropertyType::Text => Some(text.to_string()),
            PropertyType::Date => clean_date(text, fuzzy, format),
            PropertyType::Identifier => non_empty(collapse_spaces(text)),
            PropertyType::Phone => clean_phone(text, entity),
            PropertyType::Country => clean_country(text),
            PropertyType::Email => clean_email(text),
            PropertyType::Url => clean_url(text),
            PropertyType::Entity => clean_entity_ref(text),
            PropertyType::Topic => clean_topic(text),
            PropertyType::Gender => clean_gender(text),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn clean_name(text: &str) -> Option<String> {
    let collapsed = collapse_spaces(text);
    let stripped = collapsed.trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '«' | '»'));
    non_empty(stripped.trim().to_string())
}

// Dates
//
// Values are stored as ISO 8601 prefixes: 2021, 2021-03, 2021-03-04,
// 2021-03-04T10:11:12. Shorter prefixes encode lower precision.

static ISO_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})(?:-(\d{1,2})(?:-(\d{1,2})(?:[T ](\d{1,2})(?::(\d{2})(?::(\d{2}))?)?)?)?)?")
        .expect("valid ISO prefix pattern")
});

static ISO_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?$").expect("valid ISO suffix pattern")
});

static FUZZY_DATES: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("valid day pattern"),
        Regex::new(r"\b\d{4}-\d{2}\b").expect("valid month pattern"),
        Regex::new(r"\b(?:1[5-9]|20)\d{2}\b").expect("valid year pattern"),
    ]
});

fn clean_date(text: &str, fuzzy: bool, format: Option<&str>) -> Option<String> {
    if let Some(format) = format {
        if let Some(parsed) = parse_date_format(text, format) {
            return Some(parsed);
        }
        if !fuzzy {
            return None;
        }
    }
    if let Some(parsed) = parse_iso_prefix(text) {
        return Some(parsed);
    }
    if fuzzy {
        for pattern in FUZZY_DATES.iter() {
            if let Some(found) = pattern.find(text) {
                if let Some(parsed) = parse_iso_prefix(found.as_str()) {
                    return Some(parsed);
                }
            }
        }
    }
    None
}

/// Parse an ISO prefix, validating each component against the calendar.
pub fn parse_iso_prefix(text: &str) -> Option<String> {
    let caps = ISO_PREFIX.captures(text)?;
    let whole = caps.get(0)?;
    if !ISO_SUFFIX.is_match(&text[whole.end()..]) {
        return None;
    }
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let mut out = format!("{:04}", year);

    let month = match caps.get(2) {
        Some(m) => m.as_str().parse::<u32>().ok()?,
        None => return Some(out),
    };
    if !(1..=12).contains(&month) {
        return None;
    }
    out.push_str(&format!("-{:02}", month));

    let day = match caps.get(3) {
        Some(d) => d.as_str().parse::<u32>().ok()?,
        None => return Some(out),
    };
    NaiveDate::from_ymd_opt(year, month, day)?;
    out.push_str(&format!("-{:02}", day));

    let hour = match caps.get(4) {
        Some(h) => h.as_str().parse::<u32>().ok()?,
        None => return Some(out),
    };
    if hour > 23 {
        return None;
    }
    out.push_str(&format!("T{:02}", hour));

    for part in [caps.get(5), caps.get(6)] {
        match part {
            Some(p) => {
                let value: u32 = p.as_str().parse().ok()?;
                if value > 59 {
                    return None;
                }
                out.push_str(&format!(":{:02}", value));
            }
            None => break,
        }
    }
    Some(out)
}

/// Parse a date with a strftime pattern. Patterns without a day (or month)
/// produce a month (or year) precision value.
fn parse_date_format(text: &str, format: &str) -> Option<String> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
        return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, format) {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    let has_day = ["%d", "%e", "%j"].iter().any(|d| format.contains(d));
    let has_month = ["%m", "%b", "%B"].iter().any(|m| format.contains(m));
    if has_day {
        return None;
    }
    if has_month {
        let date =
            NaiveDate::parse_from_str(&format!("{}|01", text), &format!("{}|%d", format)).ok()?;
        return Some(date.format("%Y-%m").to_string());
    }
    let date =
        NaiveDate::parse_from_str(&format!("{}|01|01", text), &format!("{}|%m|%d", format)).ok()?;
    Some(date.format("%Y").to_string())
}

// Phones

const CALLING_CODES: &[(&str, &str)] = &[
    ("us", "1"), ("ca", "1"), ("ru", "7"), ("kz", "7"), ("gb", "44"), ("de", "49"),
    ("fr", "33"), ("it", "39"), ("es", "34"), ("nl", "31"), ("be", "32"), ("ch", "41"),
    ("at", "43"), ("se", "46"), ("no", "47"), ("dk", "45"), ("fi", "358"), ("pl", "48"),
    ("ua", "380"), ("by", "375"), ("cn", "86"), ("in", "91"), ("ir", "98"), ("tr", "90"),
    ("ae", "971"), ("il", "972"), ("sy", "963"), ("kp", "850"), ("ve", "58"), ("br", "55"),
    ("mx", "52"), ("ng", "234"), ("za", "27"), ("au", "61"), ("jp", "81"), ("kr", "82"),
];

fn clean_phone(text: &str, entity: Option<&Entity>) -> Option<String> {
    let text = text.trim_start_matches("tel:");
    let mut digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')' | '/'))
        .collect();
    if stripped.chars().any(|c| !(c.is_ascii_digit() || c == '+')) {
        return None;
    }

    let international = if stripped.starts_with('+') {
        true
    } else if let Some(rest) = digits.strip_prefix("00") {
        digits = rest.to_string();
        true
    } else {
        false
    };

    if !international {
        let code = entity
            .map(|e| e.get("country"))
            .unwrap_or_default()
            .iter()
            .find_map(|country| {
                CALLING_CODES
                    .iter()
                    .find(|(c, _)| c == country)
                    .map(|(_, code)| *code)
            })?;
        let national = digits.trim_start_matches('0');
        digits = format!("{}{}", code, national);
    }

    if !(7..=15).contains(&digits.len()) {
        return None;
    }
    Some(format!("+{}", digits))
}

// Countries

const COUNTRIES: &[(&str, &str)] = &[
    ("af", "afghanistan"), ("al", "albania"), ("dz", "algeria"), ("ar", "argentina"),
    ("am", "armenia"), ("au", "australia"), ("at", "austria"), ("az", "azerbaijan"),
    ("bh", "bahrain"), ("by", "belarus"), ("be", "belgium"), ("ba", "bosnia and herzegovina"),
    ("br", "brazil"), ("bg", "bulgaria"), ("mm", "myanmar"), ("ca", "canada"),
    ("cf", "central african republic"), ("cl", "chile"), ("cn", "china"), ("co", "colombia"),
    ("cd", "democratic republic of the congo"), ("hr", "croatia"), ("cu", "cuba"),
    ("cy", "cyprus"), ("cz", "czech republic"), ("dk", "denmark"), ("eg", "egypt"),
    ("ee", "estonia"), ("er", "eritrea"), ("fi", "finland"), ("fr", "france"),
    ("ge", "georgia"), ("de", "germany"), ("gr", "greece"), ("hk", "hong kong"),
    ("hu", "hungary"), ("in", "india"), ("id", "indonesia"), ("ir", "iran"), ("iq", "iraq"),
    ("ie", "ireland"), ("il", "israel"), ("it", "italy"), ("jp", "japan"), ("jo", "jordan"),
    ("kz", "kazakhstan"), ("kp", "north korea"), ("kr", "south korea"), ("kw", "kuwait"),
    ("kg", "kyrgyzstan"), ("lv", "latvia"), ("lb", "lebanon"), ("ly", "libya"),
    ("lt", "lithuania"), ("lu", "luxembourg"), ("ml", "mali"), ("mt", "malta"),
    ("mx", "mexico"), ("md", "moldova"), ("me", "montenegro"), ("nl", "netherlands"),
    ("ni", "nicaragua"), ("ng", "nigeria"), ("no", "norway"), ("om", "oman"),
    ("pk", "pakistan"), ("pa", "panama"), ("pl", "poland"), ("pt", "portugal"), ("qa", "qatar"),
    ("ro", "romania"), ("ru", "russia"), ("sa", "saudi arabia"), ("rs", "serbia"),
    ("sg", "singapore"), ("sk", "slovakia"), ("si", "slovenia"), ("so", "somalia"),
    ("za", "south africa"), ("ss", "south sudan"), ("es", "spain"), ("sd", "sudan"),
    ("se", "sweden"), ("ch", "switzerland"), ("sy", "syria"), ("tw", "taiwan"),
    ("tj", "tajikistan"), ("th", "thailand"), ("tr", "turkey"), ("tm", "turkmenistan"),
    ("ua", "ukraine"), ("ae", "united arab emirates"), ("gb", "united kingdom"),
    ("us", "united states"), ("uz", "uzbekistan"), ("ve", "venezuela"), ("vn", "vietnam"),
    ("ye", "yemen"), ("zw", "zimbabwe"), ("eu", "european union"), ("zz", "global"),
];

const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("uk", "gb"), ("great britain", "gb"), ("usa", "us"), ("united states of america", "us"),
    ("russian federation", "ru"), ("islamic republic of iran", "ir"), ("burma", "mm"),
    ("dprk", "kp"), ("republic of korea", "kr"), ("syrian arab republic", "sy"),
    ("uae", "ae"), ("czechia", "cz"), ("türkiye", "tr"), ("turkiye", "tr"),
];

fn clean_country(text: &str) -> Option<String> {
    let key = collapse_spaces(text).to_lowercase();
    if key.len() == 2 {
        return COUNTRIES
            .iter()
            .find(|(code, _)| *code == key)
            .map(|(code, _)| code.to_string());
    }
    COUNTRIES
        .iter()
        .find(|(_, name)| *name == key)
        .map(|(code, _)| *code)
        .or_else(|| {
            COUNTRY_ALIASES
                .iter()
                .find(|(alias, _)| *alias == key)
                .map(|(_, code)| *code)
        })
        .map(str::to_string)
}

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

fn clean_email(text: &str) -> Option<String> {
    let text = text.trim_start_matches("mailto:").trim();
    if !EMAIL.is_match(text) {
        return None;
    }
    let (mailbox, domain) = text.rsplit_once('@')?;
    Some(format!("{}@{}", mailbox, domain.to_lowercase()))
}

fn clean_url(text: &str) -> Option<String> {
    let candidate = if text.contains("://") {
        text.to_string()
    } else {
        format!("http://{}", text)
    };
    let url = reqwest::Url::parse(&candidate).ok()?;
    match url.scheme() {
        "http" | "https" | "ftp" if url.host_str().is_some() => Some(url.to_string()),
        _ => None,
    }
}

fn clean_entity_ref(text: &str) -> Option<String> {
    if text.chars().any(char::is_whitespace) {
        return None;
    }
    Some(text.to_string())
}

const TOPICS: &[&str] = &[
    "crime", "crime.fraud", "crime.cyber", "crime.fin", "crime.terror", "crime.war",
    "corp.disqual", "debarment", "export.control", "fin.bank", "gov.soe", "poi",
    "reg.action", "reg.warn", "role.pep", "role.rca", "sanction", "sanction.linked",
    "sanction.counter", "asset.frozen",
];

fn clean_topic(text: &str) -> Option<String> {
    let key = text.to_lowercase();
    TOPICS.iter().find(|t| **t == key).map(|t| t.to_string())
}

fn clean_gender(text: &str) -> Option<String> {
    match text.to_lowercase().as_str() {
        "m" | "male" | "man" | "masculine" => Some("male".to_string()),
        "f" | "female" | "woman" | "feminine" => Some("female".to_string()),
        "other" | "diverse" | "x" => Some("other".to_string()),
        _ => None,
    }
}
