//! Shared types, error definitions, and constants for the Accord trust engine.
//!
//! This crate provides the foundational vocabulary used across all Accord
//! crates: access and anonymization levels, trust tiers, relationship and
//! group enumerations, and the sharing-policy map attached to trust levels.
//!
//! No crate in the workspace depends on anything *except* `accord-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod levels;
mod policy;

pub use levels::{AccessLevel, AnonymizationLevel, LevelOverride, TrustTier};
pub use policy::SharingPolicy;

/// Error returned when a stored or configured label does not name a known
/// variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseLabelError {
    /// What was being parsed (e.g. "access level").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseLabelError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// How a trust relationship was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    /// Two organizations agreed directly; both must approve.
    Bilateral,
    /// Trust granted through a community; the source or a group
    /// administrator approves.
    Community,
    /// Parent/child organizational trust; both must approve.
    Hierarchical,
}

impl RelationshipKind {
    /// Returns the canonical label stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bilateral => "bilateral",
            Self::Community => "community",
            Self::Hierarchical => "hierarchical",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bilateral" => Ok(Self::Bilateral),
            "community" => Ok(Self::Community),
            "hierarchical" => Ok(Self::Hierarchical),
            _ => Err(ParseLabelError::new("relationship kind", s)),
        }
    }
}

/// Stored lifecycle status of a trust relationship.
///
/// `Expired` is never written by the state machine; expiry is derived from
/// the validity window at read time. It exists so that derived status can be
/// reported and so that externally imported records round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    Pending,
    Active,
    Suspended,
    Revoked,
    Expired,
}

impl RelationshipStatus {
    /// Returns the canonical label stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Revoked | Self::Expired)
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            _ => Err(ParseLabelError::new("relationship status", s)),
        }
    }
}

/// Purpose of a trust group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Community,
    Sector,
    Geography,
    Purpose,
}

impl GroupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Community => "community",
            Self::Sector => "sector",
            Self::Geography => "geography",
            Self::Purpose => "purpose",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupKind {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "community" => Ok(Self::Community),
            "sector" => Ok(Self::Sector),
            "geography" => Ok(Self::Geography),
            "purpose" => Ok(Self::Purpose),
            _ => Err(ParseLabelError::new("group kind", s)),
        }
    }
}

/// Whether a group is discoverable and open to uninvited joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupVisibility {
    Public,
    Private,
}

impl GroupVisibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for GroupVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupVisibility {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            _ => Err(ParseLabelError::new("group visibility", s)),
        }
    }
}

/// Role of an organization inside a trust group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipKind {
    Administrator,
    Member,
}

impl MembershipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for MembershipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipKind {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "administrator" => Ok(Self::Administrator),
            "member" => Ok(Self::Member),
            _ => Err(ParseLabelError::new("membership kind", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_status_labels_round_trip() {
        for status in [
            RelationshipStatus::Pending,
            RelationshipStatus::Active,
            RelationshipStatus::Suspended,
            RelationshipStatus::Revoked,
            RelationshipStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<RelationshipStatus>(), Ok(status));
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(RelationshipStatus::Revoked.is_terminal());
        assert!(RelationshipStatus::Expired.is_terminal());
        assert!(!RelationshipStatus::Suspended.is_terminal());
        assert!(!RelationshipStatus::Pending.is_terminal());
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = "friendly".parse::<RelationshipKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown relationship kind: friendly");
        assert!("admin".parse::<MembershipKind>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_labels() {
        let json = serde_json::to_string(&GroupKind::Geography).unwrap();
        assert_eq!(json, "\"geography\"");
        let vis: GroupVisibility = serde_json::from_str("\"private\"").unwrap();
        assert_eq!(vis, GroupVisibility::Private);
    }
}
