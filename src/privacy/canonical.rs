use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder used whenever an address is missing or malformed.
pub const UNKNOWN_ADDRESS: &str = "unknown@gravatar.com";

const MAX_LOCAL_PART_LEN: usize = 64;
const MAX_ADDRESS_LEN: usize = 254;

static LOCAL_PART_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*$")
        .expect("local part regex is valid")
});

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")
        .expect("domain regex is valid")
});

/// Converts domains to and from their ASCII-compatible (punycode) form.
///
/// `None` means the conversion is unavailable for this input; callers keep
/// the value unchanged in that case.
pub trait DomainEncoder: Send + Sync {
    fn to_ascii(&self, domain: &str) -> Option<String>;
    fn to_unicode(&self, domain: &str) -> Option<String>;
}

/// IDNA conversion through the `url` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdnaEncoder;

impl DomainEncoder for IdnaEncoder {
    fn to_ascii(&self, domain: &str) -> Option<String> {
        // The URL host parser percent-decodes; escapes are never part of a domain
        if domain.contains('%') {
            return None;
        }
        // quirks::domain_to_ascii returns an empty string on failure
        let ascii = url::quirks::domain_to_ascii(domain);
        if ascii.is_empty() {
            None
        } else {
            Some(ascii)
        }
    }

    fn to_unicode(&self, domain: &str) -> Option<String> {
        if domain.contains('%') {
            return None;
        }
        let unicode = url::quirks::domain_to_unicode(domain);
        if unicode.is_empty() {
            None
        } else {
            Some(unicode)
        }
    }
}

/// Encoder for deployments without IDN support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEncoder;

impl DomainEncoder for NoopEncoder {
    fn to_ascii(&self, _domain: &str) -> Option<String> {
        None
    }

    fn to_unicode(&self, _domain: &str) -> Option<String> {
        None
    }
}

/// Trim and lower-case. This is all removal needs.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn canonicalize_domain(raw: &str, encoder: &dyn DomainEncoder) -> String {
    let domain = normalize(raw);
    if domain.is_empty() {
        return domain;
    }
    encoder.to_ascii(&domain).unwrap_or(domain)
}

/// Canonical form of an address: trimmed, lower-cased, domain in ASCII form.
///
/// Input without exactly one `@` comes back normalized but otherwise
/// untouched, and will fail `is_valid_email`.
pub fn canonicalize_address(raw: &str, encoder: &dyn DomainEncoder) -> String {
    let address = normalize(raw);
    match split_address(&address) {
        Some((local, domain)) => {
            let domain = encoder
                .to_ascii(domain)
                .unwrap_or_else(|| domain.to_string());
            format!("{}@{}", local, domain)
        }
        None => address,
    }
}

/// Split on the single `@`. Returns `None` for zero or several separators.
pub fn split_address(address: &str) -> Option<(&str, &str)> {
    if address.matches('@').count() != 1 {
        return None;
    }
    address.split_once('@')
}

/// Domain part of a well-formed address.
pub fn domain_of(address: &str) -> Option<&str> {
    split_address(address).map(|(_, domain)| domain)
}

pub fn is_valid_email(address: &str) -> bool {
    if address.len() > MAX_ADDRESS_LEN {
        return false;
    }
    let (local, domain) = match split_address(address) {
        Some(v) => v,
        None => return false,
    };
    local.len() <= MAX_LOCAL_PART_LEN && LOCAL_PART_RE.is_match(local) && DOMAIN_RE.is_match(domain)
}

/// A domain is valid when some local part would turn it into a valid address.
pub fn is_valid_domain(domain: &str) -> bool {
    is_valid_email(&format!("user@{}", domain))
}

/// Display form of a stored domain. Never use the result for matching or hashing.
pub fn decanonicalize_domain(domain: &str, encoder: &dyn DomainEncoder) -> String {
    encoder
        .to_unicode(domain)
        .unwrap_or_else(|| domain.to_string())
}

/// Display form of a stored address.
pub fn decanonicalize_address(address: &str, encoder: &dyn DomainEncoder) -> String {
    match split_address(address) {
        Some((local, domain)) => format!("{}@{}", local, decanonicalize_domain(domain, encoder)),
        None => address.to_string(),
    }
}

/// Log-safe rendering of an address.
/// Example: `alice@example.org` -> `a***e@e***.org`.
pub fn mask_email(email: &str) -> String {
    let (local, domain) = match email.split_once('@') {
        Some(v) => v,
        None => return "<invalid-email>".to_string(),
    };

    let local_masked = match local.chars().count() {
        0 => "***".to_string(),
        1 => format!("{}***", local),
        _ => {
            let first = local.chars().next().unwrap_or('*');
            let last = local.chars().next_back().unwrap_or('*');
            format!("{first}***{last}")
        }
    };

    let domain_masked = match domain.rsplit_once('.') {
        Some((root, tld)) => {
            let first = root.chars().next().unwrap_or('*');
            format!("{first}***.{tld}")
        }
        None => "***".to_string(),
    };

    format!("{local_masked}@{domain_masked}")
}
