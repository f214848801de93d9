//! Structural validators for identifier sub-formats.
//!
//! Each format normalizes a value into its canonical compact form, or returns
//! `None` when the value is not structurally valid (wrong shape or checksum).

use once_cell::sync::Lazy;
use regex::Regex;

/// Sub-formats that are validated when cleaning identifier properties. Any
/// other sub-format passes through unchanged.
pub const VALIDATED_FORMATS: &[&str] = &["bic", "isin", "lei", "imo", "iban"];

pub trait IdentifierFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Canonical form of `value`, or `None` if it is invalid
    fn normalize(&self, value: &str) -> Option<String>;
}

pub fn get_identifier_format(name: &str) -> Option<&'static dyn IdentifierFormat> {
    match name {
        "bic" => Some(&Bic),
        "isin" => Some(&Isin),
        "lei" => Some(&Lei),
        "imo" => Some(&Imo),
        "iban" => Some(&Iban),
        _ => None,
    }
}

fn compact(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
        .collect::<String>()
        .to_uppercase()
}

/// Expand letters to two-digit numbers (A=10 .. Z=35), keeping digits.
fn alnum_to_digits(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len() * 2);
    for c in value.chars() {
        out.push_str(&c.to_digit(36)?.to_string());
    }
    Some(out)
}

/// ISO 7064 MOD 97-10 remainder of a digit string
fn mod97(digits: &str) -> Option<u32> {
    digits.chars().try_fold(0u32, |acc, c| {
        c.to_digit(10).map(|d| (acc * 10 + d) % 97)
    })
}

fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(mut d) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

static BIC_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{4}[A-Z]{2}[A-Z0-9]{2}(?:[A-Z0-9]{3})?$").expect("valid BIC pattern")
});
static ISIN_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}[A-Z0-9]{9}[0-9]$").expect("valid ISIN pattern"));
static LEI_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{18}[0-9]{2}$").expect("valid LEI pattern"));
static IBAN_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{2}[0-9]{2}[A-Z0-9]{11,30}$").expect("valid IBAN pattern")
});

/// SWIFT/BIC bank codes, 8 or 11 characters
pub struct Bic;

impl IdentifierFormat for Bic {
    fn name(&self) -> &'static str {
        "bic"
    }

    fn normalize(&self, value: &str) -> Option<String> {
        let value = compact(value);
        BIC_SHAPE.is_match(&value).then_some(value)
    }
}

/// International Securities Identification Number, Luhn check digit
pub struct Isin;

impl IdentifierFormat for Isin {
    fn name(&self) -> &'static str {
        "isin"
    }

    fn normalize(&self, value: &str) -> Option<String> {
        let value = compact(value);
        if !ISIN_SHAPE.is_match(&value) {
            return None;
        }
        let digits = alnum_to_digits(&value)?;
        luhn_valid(&digits).then_some(value)
    }
}

/// Legal Entity Identifier, ISO 17442 (MOD 97-10 check digits)
pub struct Lei;

impl IdentifierFormat for Lei {
    fn name(&self) -> &'static str {
        "lei"
    }

    fn normalize(&self, value: &str) -> Option<String> {
        let value = compact(value);
        if !LEI_SHAPE.is_match(&value) {
            return None;
        }
        let digits = alnum_to_digits(&value)?;
        (mod97(&digits)? == 1).then_some(value)
    }
}

/// IMO ship and company numbers: seven digits, the last one a weighted check digit
pub struct Imo;

impl IdentifierFormat for Imo {
    fn name(&self) -> &'static str {
        "imo"
    }

    fn normalize(&self, value: &str) -> Option<String> {
        let value = compact(value);
        let number = value.strip_prefix("IMO").unwrap_or(&value);
        if number.len() != 7 {
            return None;
        }
        let digits: Vec<u32> = number
            .chars()
            .map(|c| c.to_digit(10))
            .collect::<Option<Vec<_>>>()?;
        let checksum: u32 = digits[..6]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (7 - i as u32))
            .sum();
        (checksum % 10 == digits[6]).then(|| format!("IMO{}", number))
    }
}

/// International Bank Account Number, MOD 97-10 over the rearranged number
pub struct Iban;

impl IdentifierFormat for Iban {
    fn name(&self) -> &'static str {
        "iban"
    }

    fn normalize(&self, value: &str) -> Option<String> {
        let value = compact(value);
        if !IBAN_SHAPE.is_match(&value) {
            return None;
        }
        let rearranged = format!("{}{}", &value[4..], &value[..4]);
        let digits = alnum_to_digits(&rearranged)?;
        (mod97(&digits)? == 1).then_some(value)
    }
}
