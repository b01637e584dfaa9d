//! Access, anonymization, and trust-tier levels.

use crate::ParseLabelError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Capability tier granted by a trust relationship.
///
/// The derived ordering is the total order callers rely on:
/// `None < Read < Subscribe < Contribute < Full`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    None,
    Read,
    Subscribe,
    Contribute,
    Full,
}

impl AccessLevel {
    /// Returns the canonical lower-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Subscribe => "subscribe",
            Self::Contribute => "contribute",
            Self::Full => "full",
        }
    }

    /// Whether this level grants any access at all.
    pub fn grants_access(self) -> bool {
        self > Self::None
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "read" => Ok(Self::Read),
            "subscribe" => Ok(Self::Subscribe),
            "contribute" => Ok(Self::Contribute),
            "full" => Ok(Self::Full),
            _ => Err(ParseLabelError::new("access level", s)),
        }
    }
}

/// Degree to which identifying or sensitive fields are stripped before a
/// record crosses an organizational boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnonymizationLevel {
    None,
    Minimal,
    #[default]
    Partial,
    Full,
    Custom,
}

impl AnonymizationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minimal => "minimal",
            Self::Partial => "partial",
            Self::Full => "full",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for AnonymizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnonymizationLevel {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "minimal" => Ok(Self::Minimal),
            "partial" => Ok(Self::Partial),
            "full" => Ok(Self::Full),
            "custom" => Ok(Self::Custom),
            _ => Err(ParseLabelError::new("anonymization level", s)),
        }
    }
}

/// Ordinal tier of a trust level. Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    None,
    Low,
    Medium,
    High,
    Complete,
}

impl TrustTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustTier {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "complete" => Ok(Self::Complete),
            _ => Err(ParseLabelError::new("trust tier", s)),
        }
    }
}

/// Per-relationship override of a level normally inherited from the trust
/// level.
///
/// Stored as a single label: `"inherit"`, `"custom"`, or the level itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LevelOverride<L> {
    /// Use the trust level's default.
    #[default]
    Inherit,
    /// Marked custom without further configuration; degrades to the trust
    /// level's default.
    Custom,
    /// An explicit level for this relationship.
    Set(L),
}

impl<L: Copy> LevelOverride<L> {
    /// Resolves the override against the trust level's default.
    pub fn resolve(self, default: L) -> L {
        match self {
            Self::Set(level) => level,
            Self::Inherit | Self::Custom => default,
        }
    }
}

impl<L: fmt::Display> fmt::Display for LevelOverride<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => f.write_str("inherit"),
            Self::Custom => f.write_str("custom"),
            Self::Set(level) => level.fmt(f),
        }
    }
}

impl<L: FromStr<Err = ParseLabelError>> FromStr for LevelOverride<L> {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inherit" | "" => Ok(Self::Inherit),
            "custom" => Ok(Self::Custom),
            other => other.parse().map(Self::Set),
        }
    }
}

impl<L: fmt::Display> Serialize for LevelOverride<L> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, L: FromStr<Err = ParseLabelError>> Deserialize<'de> for LevelOverride<L> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}
