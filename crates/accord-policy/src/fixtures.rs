//! Hand-built trust records for unit tests.

use accord_trust::{GroupRef, ResolvedTrust, TrustLevel, TrustRelationship, GROUP_TRUST_PREFIX};
use accord_types::{
    AccessLevel, AnonymizationLevel, LevelOverride, RelationshipKind, RelationshipStatus,
    SharingPolicy, TrustTier,
};
use chrono::{Duration, Utc};

pub fn level(strength: u8) -> TrustLevel {
    let now = Utc::now();
    TrustLevel {
        id: format!("lvl-{strength}"),
        name: format!("level-{strength}"),
        description: String::new(),
        tier: TrustTier::Medium,
        strength,
        default_anonymization_level: AnonymizationLevel::Partial,
        default_access_level: AccessLevel::Subscribe,
        sharing_policy: SharingPolicy::default(),
        is_system_default: false,
        created_by: "admin".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn relationship(id: &str, kind: RelationshipKind, level_id: &str) -> TrustRelationship {
    let now = Utc::now();
    TrustRelationship {
        id: id.to_string(),
        source_org: "org-a".to_string(),
        target_org: "org-b".to_string(),
        kind,
        trust_level_id: level_id.to_string(),
        group_id: None,
        status: RelationshipStatus::Active,
        is_active: true,
        access_level_override: LevelOverride::Inherit,
        anonymization_level_override: LevelOverride::Inherit,
        source_approved: true,
        target_approved: true,
        valid_from: now - Duration::days(1),
        valid_until: None,
        activated_at: Some(now - Duration::days(1)),
        activated_by: Some("org-b".to_string()),
        suspended_at: None,
        suspended_by: None,
        revoked_at: None,
        revoked_by: None,
        notes: String::new(),
        created_by: "analyst@org-a".to_string(),
        created_at: now - Duration::days(1),
        updated_at: now,
    }
}

/// An active, fully approved direct relationship.
pub fn active_trust(strength: u8, kind: RelationshipKind) -> ResolvedTrust {
    let level = level(strength);
    ResolvedTrust {
        relationship: relationship("rel-direct", kind, &level.id),
        trust_level: level,
        group: None,
    }
}

/// A direct bilateral relationship nobody has approved yet.
pub fn pending_trust(strength: u8) -> ResolvedTrust {
    let mut trust = active_trust(strength, RelationshipKind::Bilateral);
    trust.relationship.status = RelationshipStatus::Pending;
    trust.relationship.is_active = false;
    trust.relationship.source_approved = false;
    trust.relationship.target_approved = false;
    trust.relationship.activated_at = None;
    trust
}

/// Trust derived from membership of the named group.
pub fn group_trust(name: &str, strength: u8) -> ResolvedTrust {
    let level = level(strength);
    let mut rel = relationship(
        &format!("{GROUP_TRUST_PREFIX}{name}"),
        RelationshipKind::Community,
        &level.id,
    );
    rel.group_id = Some(name.to_string());
    ResolvedTrust {
        relationship: rel,
        trust_level: level,
        group: Some(GroupRef {
            id: name.to_string(),
            name: name.to_string(),
        }),
    }
}
