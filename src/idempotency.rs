use sha2::{Digest, Sha256};

/// Hex length kept from the SHA-256 digest of an entity's key parts
const ID_HASH_LENGTH: usize = 40;

/// Stable entity ID from natural-key parts: `<prefix>-<hash>`. Empty parts
/// are skipped; with no usable parts there is no ID.
pub fn make_id(prefix: &str, parts: &[&str]) -> Option<String> {
    let parts: Vec<&str> = parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hex::encode(hasher.finalize());
    Some(format!("{}-{}", prefix, &digest[..ID_HASH_LENGTH]))
}

/// Readable entity ID: `<prefix>-<slug of parts>`
pub fn make_slug(prefix: &str, parts: &[&str]) -> Option<String> {
    let slug = slugify(&parts.join(" "));
    if slug.is_empty() {
        return None;
    }
    Some(format!("{}-{}", prefix, slug))
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Content fingerprint used as a cache key
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_id_is_stable() {
        let a = make_id("reg", &["Umbrella Corp", "12345"]).unwrap();
        let b = make_id("reg", &[" Umbrella Corp ", "12345", ""]).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("reg-"));
        assert_eq!(a.len(), "reg-".len() + ID_HASH_LENGTH);
        assert_ne!(a, make_id("reg", &["Umbrella Corp", "12346"]).unwrap());
        assert_eq!(make_id("reg", &["", "  "]), None);
    }

    #[test]
    fn test_make_slug() {
        assert_eq!(
            make_slug("osv", &["Umbrella Corp."]),
            Some("osv-umbrella-corp".to_string())
        );
        assert_eq!(make_slug("osv", &["--"]), None);
    }
}
