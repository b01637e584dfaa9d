//! Masking of sensitive value patterns inside free text.
//!
//! Every mask is a fixed point: running [`mask_text`] on its own output
//! changes nothing.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Placeholder substituted for hash-like hex strings.
pub const HASH_PLACEHOLDER: &str = "[hash]";

/// Placeholder substituted for the registrable part of a domain.
pub const DOMAIN_PLACEHOLDER: &str = "[domain]";

const OCTET: &str = r"(25[0-5]|2[0-4]\d|1?\d?\d)";

static IPV4: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"\b{OCTET}\.{OCTET}\.{OCTET}\.{OCTET}\b");
    Regex::new(&pattern).expect("invalid ipv4 pattern")
});

// MD5, SHA-1 and SHA-256 lengths only.
static HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[0-9a-fA-F]{64}|[0-9a-fA-F]{40}|[0-9a-fA-F]{32})\b")
        .expect("invalid hash pattern")
});

// Lower-case only, so STIX property paths such as `hashes.MD5` are left alone.
static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+([a-z]{2,63})\b")
        .expect("invalid domain pattern")
});

/// Keeps the first two octets of an IPv4 address.
pub fn mask_ipv4(input: &str) -> Cow<'_, str> {
    IPV4.replace_all(input, |caps: &Captures<'_>| format!("{}.{}.x.x", &caps[1], &caps[2]))
}

/// Replaces 32, 40 and 64 character hex strings.
pub fn mask_hashes(input: &str) -> Cow<'_, str> {
    HASH.replace_all(input, HASH_PLACEHOLDER)
}

/// Keeps only the top-level domain.
pub fn mask_domains(input: &str) -> Cow<'_, str> {
    DOMAIN.replace_all(input, |caps: &Captures<'_>| format!("{DOMAIN_PLACEHOLDER}.{}", &caps[1]))
}

/// Applies every mask in turn. Borrows when nothing matched.
pub fn mask_text(input: &str) -> Cow<'_, str> {
    let masks: [fn(&str) -> Cow<'_, str>; 3] = [mask_ipv4, mask_hashes, mask_domains];
    let mut result = Cow::Borrowed(input);
    for mask in masks {
        let masked = match mask(&result) {
            Cow::Owned(masked) => Some(masked),
            Cow::Borrowed(_) => None,
        };
        if let Some(masked) = masked {
            result = Cow::Owned(masked);
        }
    }
    result
}
