//! The trust relationship record and the predicates derived from it.

use accord_types::{
    AccessLevel, AnonymizationLevel, LevelOverride, RelationshipKind, RelationshipStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::levels::TrustLevel;

/// A directed trust link from `source_org` to `target_org`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRelationship {
    pub id: String,
    pub source_org: String,
    pub target_org: String,
    pub kind: RelationshipKind,
    pub trust_level_id: String,
    /// Group through which a community relationship was established.
    pub group_id: Option<String>,
    pub status: RelationshipStatus,
    pub is_active: bool,
    pub access_level_override: LevelOverride<AccessLevel>,
    pub anonymization_level_override: LevelOverride<AnonymizationLevel>,
    pub source_approved: bool,
    pub target_approved: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub activated_by: Option<String>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub suspended_by: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub notes: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrustRelationship {
    /// Bilateral and hierarchical links need both sides; community links
    /// need only the source (or a group administrator acting for it).
    pub fn is_fully_approved(&self) -> bool {
        match self.kind {
            RelationshipKind::Community => self.source_approved,
            RelationshipKind::Bilateral | RelationshipKind::Hierarchical => {
                self.source_approved && self.target_approved
            }
        }
    }

    /// Whether `valid_until` lies strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| until < now)
    }

    /// Fully approved, `active`, and not expired.
    ///
    /// Access decisions consult this, never the raw status.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_fully_approved()
            && self.status == RelationshipStatus::Active
            && !self.is_expired(now)
    }

    /// The stored status, except that an active relationship past its
    /// validity window reports `expired`. Expiry is never written back.
    pub fn derived_status(&self, now: DateTime<Utc>) -> RelationshipStatus {
        if self.status == RelationshipStatus::Active && self.is_expired(now) {
            RelationshipStatus::Expired
        } else {
            self.status
        }
    }

    /// Whether `org` is the source or the target.
    pub fn involves(&self, org: &str) -> bool {
        self.source_org == org || self.target_org == org
    }

    /// The override if set, otherwise the level's default. A bare `custom`
    /// override falls back to the level's default.
    pub fn effective_access_level(&self, level: &TrustLevel) -> AccessLevel {
        self.access_level_override.resolve(level.default_access_level)
    }

    pub fn effective_anonymization_level(&self, level: &TrustLevel) -> AnonymizationLevel {
        self.anonymization_level_override.resolve(level.default_anonymization_level)
    }
}
