//! Anonymization strategies, one per level.
//!
//! Each level builds on the one below it: minimal drops attribution,
//! partial also masks sensitive values, full also strips everything but
//! the record's core fields. Strategies return a new record and leave the
//! input untouched.

use std::collections::BTreeMap;

use accord_types::AnonymizationLevel;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::AnonymizeError;
use crate::patterns::mask_text;

/// Replacement for creator references at every level above `none`.
pub const ANONYMOUS_IDENTITY: &str = "identity--anonymized";

/// Replacement used by the `mask` field action.
pub const MASKED: &str = "[MASKED]";

/// Keys a full anonymization keeps.
pub const FULL_RETAINED_KEYS: &[&str] = &["type", "pattern", "value", "name", "description"];

/// Longest description, in characters, a full anonymization keeps.
pub const MAX_DESCRIPTION_CHARS: usize = 100;

const ATTRIBUTION_FRAGMENTS: &[&str] = &["attribution", "contributor", "author"];

// Identifiers and discriminators that masking must never rewrite.
const UNMASKED_KEYS: &[&str] = &["type", "id", "spec_version"];

/// Transforms a record before it leaves the owning organization.
pub trait AnonymizationStrategy: Send + Sync {
    fn level(&self) -> AnonymizationLevel;

    fn anonymize(&self, record: &Map<String, Value>) -> Map<String, Value>;
}

/// Whether a key names the record's contributor.
pub fn is_attribution_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    ATTRIBUTION_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// Whether a key references the record's creator identity.
pub fn is_creator_key(key: &str) -> bool {
    key == "created_by" || key.ends_with("created_by_ref")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnonymization;

impl AnonymizationStrategy for NoAnonymization {
    fn level(&self) -> AnonymizationLevel {
        AnonymizationLevel::None
    }

    fn anonymize(&self, record: &Map<String, Value>) -> Map<String, Value> {
        record.clone()
    }
}

/// Drops attribution and replaces creator references, at any depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalAnonymization;

impl MinimalAnonymization {
    fn strip(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(Self::strip_map(map)),
            Value::Array(items) => Value::Array(items.iter().map(Self::strip).collect()),
            other => other.clone(),
        }
    }

    fn strip_map(map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .filter(|(k, _)| !is_attribution_key(k))
            .map(|(k, v)| {
                let v = if is_creator_key(k) {
                    Value::String(ANONYMOUS_IDENTITY.to_string())
                } else {
                    Self::strip(v)
                };
                (k.clone(), v)
            })
            .collect()
    }
}

impl AnonymizationStrategy for MinimalAnonymization {
    fn level(&self) -> AnonymizationLevel {
        AnonymizationLevel::Minimal
    }

    fn anonymize(&self, record: &Map<String, Value>) -> Map<String, Value> {
        Self::strip_map(record)
    }
}

/// Minimal, then masks IP addresses, domains and hashes in every string
/// value except identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialAnonymization;

impl PartialAnonymization {
    fn mask(value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(mask_text(s).into_owned()),
            Value::Array(items) => Value::Array(items.iter().map(Self::mask).collect()),
            Value::Object(map) => Value::Object(Self::mask_map(map)),
            other => other.clone(),
        }
    }

    fn mask_map(map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(k, v)| {
                let v = if UNMASKED_KEYS.contains(&k.as_str()) || is_creator_key(k) {
                    v.clone()
                } else {
                    Self::mask(v)
                };
                (k.clone(), v)
            })
            .collect()
    }
}

impl AnonymizationStrategy for PartialAnonymization {
    fn level(&self) -> AnonymizationLevel {
        AnonymizationLevel::Partial
    }

    fn anonymize(&self, record: &Map<String, Value>) -> Map<String, Value> {
        Self::mask_map(&MinimalAnonymization.anonymize(record))
    }
}

/// Partial, then keeps only the core fields and a short description.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullAnonymization;

impl AnonymizationStrategy for FullAnonymization {
    fn level(&self) -> AnonymizationLevel {
        AnonymizationLevel::Full
    }

    fn anonymize(&self, record: &Map<String, Value>) -> Map<String, Value> {
        let partial = PartialAnonymization.anonymize(record);
        partial
            .into_iter()
            .filter(|(k, _)| FULL_RETAINED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| match (k.as_str(), v) {
                ("description", Value::String(text)) => {
                    let short = truncate_words(&text, MAX_DESCRIPTION_CHARS);
                    (k, Value::String(short))
                }
                (_, v) => (k, v),
            })
            .collect()
    }
}

/// Shortens `text` to at most `max` characters ending in `...`.
///
/// The cut only falls on whitespace. A token split in half can match a mask
/// it escaped whole, which would make a second pass change the output.
fn truncate_words(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let end = text.char_indices().nth(keep).map_or(text.len(), |(i, _)| i);
    let (head, rest) = text.split_at(end);
    let head = if rest.starts_with(char::is_whitespace) {
        head
    } else {
        head.rfind(char::is_whitespace).map_or("", |i| &head[..i])
    };
    let mut short = head.trim_end().to_string();
    short.push_str("...");
    short
}

/// What a custom rule does to a named field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldAction {
    Remove,
    Hash,
    Mask,
}

impl std::str::FromStr for FieldAction {
    type Err = AnonymizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remove" => Ok(Self::Remove),
            "hash" => Ok(Self::Hash),
            "mask" => Ok(Self::Mask),
            other => Err(AnonymizeError::UnknownAction(other.to_string())),
        }
    }
}

/// Caller-supplied rules for `custom` anonymization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomRules {
    /// Level whose output the field rules are applied to.
    #[serde(default)]
    pub base: AnonymizationLevel,
    /// Top-level field name to action.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldAction>,
}

impl CustomRules {
    pub fn new(base: AnonymizationLevel) -> Self {
        Self {
            base,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: &str, action: FieldAction) -> Self {
        self.fields.insert(field.to_string(), action);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A base level's output with per-field rules applied on top. Fields the
/// rules do not name pass through from the base output unchanged.
pub struct CustomAnonymization {
    base: Box<dyn AnonymizationStrategy>,
    fields: BTreeMap<String, FieldAction>,
}

impl CustomAnonymization {
    pub fn new(rules: &CustomRules) -> Result<Self, AnonymizeError> {
        let base = builtin_strategy(rules.base)
            .ok_or_else(|| AnonymizeError::InvalidBase(rules.base.to_string()))?;
        Ok(Self {
            base,
            fields: rules.fields.clone(),
        })
    }
}

impl AnonymizationStrategy for CustomAnonymization {
    fn level(&self) -> AnonymizationLevel {
        AnonymizationLevel::Custom
    }

    fn anonymize(&self, record: &Map<String, Value>) -> Map<String, Value> {
        let mut out = self.base.anonymize(record);
        for (field, action) in &self.fields {
            match action {
                FieldAction::Remove => {
                    out.remove(field);
                }
                FieldAction::Hash => {
                    if let Some(v) = out.get_mut(field) {
                        *v = Value::String(digest(v));
                    }
                }
                FieldAction::Mask => {
                    if let Some(v) = out.get_mut(field) {
                        *v = Value::String(MASKED.to_string());
                    }
                }
            }
        }
        out
    }
}

/// Hex SHA-256 of a string value, or of the JSON text of anything else.
fn digest(value: &Value) -> String {
    let digest = match value {
        Value::String(s) => Sha256::digest(s.as_bytes()),
        other => Sha256::digest(other.to_string().as_bytes()),
    };
    hex::encode(digest)
}

/// The strategy for a fixed level; `None` for `custom`, which needs rules.
pub fn builtin_strategy(level: AnonymizationLevel) -> Option<Box<dyn AnonymizationStrategy>> {
    match level {
        AnonymizationLevel::None => Some(Box::new(NoAnonymization)),
        AnonymizationLevel::Minimal => Some(Box::new(MinimalAnonymization)),
        AnonymizationLevel::Partial => Some(Box::new(PartialAnonymization)),
        AnonymizationLevel::Full => Some(Box::new(FullAnonymization)),
        AnonymizationLevel::Custom => None,
    }
}
