//! Materializes the trust that holds between two organizations.
//!
//! Decision logic never queries storage. Everything it may consult, the
//! direct relationship and one synthesized community relationship per
//! shared group, is read here up front.

use accord_types::{
    AccessLevel, AnonymizationLevel, LevelOverride, RelationshipKind, RelationshipStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::TrustError;
use crate::groups::{get_group, get_membership, shared_groups};
use crate::levels::{get_trust_level, TrustLevel};
use crate::lifecycle::find_relationship;
use crate::relationship::TrustRelationship;

/// Identifies the group a trust was derived from or established in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: String,
    pub name: String,
}

/// A relationship together with the trust level it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTrust {
    pub relationship: TrustRelationship,
    pub trust_level: TrustLevel,
    pub group: Option<GroupRef>,
}

impl ResolvedTrust {
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.relationship.is_effective(now)
    }

    pub fn strength(&self) -> u8 {
        self.trust_level.strength
    }

    pub fn effective_access_level(&self) -> AccessLevel {
        self.relationship.effective_access_level(&self.trust_level)
    }

    pub fn effective_anonymization_level(&self) -> AnonymizationLevel {
        self.relationship
            .effective_anonymization_level(&self.trust_level)
    }

    /// Whether this trust comes from shared group membership rather than a
    /// stored relationship.
    pub fn is_group_derived(&self) -> bool {
        self.relationship.id.starts_with(GROUP_TRUST_PREFIX)
    }
}

/// Id prefix of relationships synthesized from group membership.
pub const GROUP_TRUST_PREFIX: &str = "group:";

/// All trust between a pair of organizations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustResolution {
    /// Newest non-terminal stored relationship, in either direction.
    pub direct: Option<ResolvedTrust>,
    /// One entry per group both organizations actively belong to.
    pub via_groups: Vec<ResolvedTrust>,
}

impl TrustResolution {
    pub fn is_empty(&self) -> bool {
        self.direct.is_none() && self.via_groups.is_empty()
    }

    /// Direct relationship first, then group-derived ones.
    pub fn candidates(&self) -> impl Iterator<Item = &ResolvedTrust> {
        self.direct.iter().chain(self.via_groups.iter())
    }

    /// The strongest effective candidate. Ties keep the direct
    /// relationship, then the earlier group.
    pub fn best_effective(&self, now: DateTime<Utc>) -> Option<&ResolvedTrust> {
        best_of(self.candidates(), now)
    }

    /// The relationship decisions are primarily made on.
    ///
    /// An effective direct relationship wins. Otherwise the strongest
    /// effective group-derived trust applies, so a pending or suspended
    /// proposal never hides trust the pair already has through a group.
    /// With nothing effective, the direct row is returned so its status can
    /// be reported.
    pub fn primary(&self, now: DateTime<Utc>) -> Option<&ResolvedTrust> {
        match &self.direct {
            Some(direct) if direct.is_effective(now) => Some(direct),
            direct => best_of(self.via_groups.iter(), now).or(direct.as_ref()),
        }
    }
}

/// Picks the strongest effective entry, keeping the first on ties.
pub fn best_of<'a, I>(candidates: I, now: DateTime<Utc>) -> Option<&'a ResolvedTrust>
where
    I: IntoIterator<Item = &'a ResolvedTrust>,
{
    let mut best: Option<&ResolvedTrust> = None;
    for candidate in candidates.into_iter().filter(|c| c.is_effective(now)) {
        match best {
            Some(current) if current.strength() >= candidate.strength() => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Reads the direct and group-derived trust between `org_a` and `org_b`.
pub fn resolve_trust(
    conn: &Connection,
    org_a: &str,
    org_b: &str,
) -> Result<TrustResolution, TrustError> {
    let direct = match find_relationship(conn, org_a, org_b)? {
        Some(rel) => Some(rel),
        None => find_relationship(conn, org_b, org_a)?,
    };

    let direct = match direct {
        Some(relationship) => {
            let trust_level = get_trust_level(conn, &relationship.trust_level_id)?;
            let group = match &relationship.group_id {
                Some(group_id) => {
                    let g = get_group(conn, group_id)?;
                    Some(GroupRef { id: g.id, name: g.name })
                }
                None => None,
            };
            Some(ResolvedTrust {
                relationship,
                trust_level,
                group,
            })
        }
        None => None,
    };

    let mut via_groups = Vec::new();
    for group in shared_groups(conn, org_a, org_b)? {
        let trust_level = get_trust_level(conn, &group.default_trust_level_id)?;

        // Trust holds from the moment the later of the two joined.
        let joined_a = get_membership(conn, &group.id, org_a)?.map(|m| m.joined_at);
        let joined_b = get_membership(conn, &group.id, org_b)?.map(|m| m.joined_at);
        let since = match (joined_a, joined_b) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => group.created_at,
        };

        let relationship = TrustRelationship {
            id: format!("{GROUP_TRUST_PREFIX}{}", group.id),
            source_org: org_a.to_string(),
            target_org: org_b.to_string(),
            kind: RelationshipKind::Community,
            trust_level_id: trust_level.id.clone(),
            group_id: Some(group.id.clone()),
            status: RelationshipStatus::Active,
            is_active: true,
            access_level_override: LevelOverride::Inherit,
            anonymization_level_override: LevelOverride::Inherit,
            source_approved: true,
            target_approved: true,
            valid_from: since,
            valid_until: None,
            activated_at: Some(since),
            activated_by: None,
            suspended_at: None,
            suspended_by: None,
            revoked_at: None,
            revoked_by: None,
            notes: String::new(),
            created_by: group.created_by.clone(),
            created_at: since,
            updated_at: since,
        };

        via_groups.push(ResolvedTrust {
            relationship,
            trust_level,
            group: Some(GroupRef {
                id: group.id,
                name: group.name,
            }),
        });
    }

    tracing::debug!(
        org_a = %org_a,
        org_b = %org_b,
        direct = direct.is_some(),
        via_groups = via_groups.len(),
        "trust resolved"
    );

    Ok(TrustResolution { direct, via_groups })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::OpenOrgDirectory;
    use crate::groups::{create_group, join_group, NewTrustGroup};
    use crate::levels::seed_system_levels;
    use crate::lifecycle::{approve_relationship, create_relationship, NewRelationship};
    use accord_observe::{AuditTrail, MemoryAuditSink};
    use accord_types::{GroupKind, GroupVisibility};

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        accord_db::run_migrations(&conn).unwrap();
        seed_system_levels(&conn).unwrap();
        conn
    }

    fn edunet(level: &str) -> NewTrustGroup {
        NewTrustGroup {
            name: format!("EduNet-{level}"),
            description: String::new(),
            kind: GroupKind::Community,
            visibility: GroupVisibility::Public,
            requires_approval: false,
            default_trust_level: level.to_string(),
        }
    }

    #[test]
    fn strangers_resolve_to_nothing() {
        let conn = setup_db();
        let resolution = resolve_trust(&conn, "org-x", "org-y").unwrap();
        assert!(resolution.is_empty());
        assert!(resolution.primary(Utc::now()).is_none());
    }

    #[test]
    fn shared_group_yields_synthesized_community_trust() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);

        let dir = OpenOrgDirectory;
        let g = create_group(&mut conn, &dir, &audit, &edunet("standard"), "org-x", "x").unwrap();
        join_group(&mut conn, &dir, &audit, &g.id, "org-y", None, "y").unwrap();

        let resolution = resolve_trust(&conn, "org-x", "org-y").unwrap();
        assert!(resolution.direct.is_none());
        assert_eq!(resolution.via_groups.len(), 1);

        let trust = &resolution.via_groups[0];
        assert!(trust.is_group_derived());
        assert_eq!(trust.relationship.kind, RelationshipKind::Community);
        assert!(trust.is_effective(Utc::now()));
        assert_eq!(trust.strength(), 50);
        assert_eq!(trust.group.as_ref().map(|g| g.id.as_str()), Some(g.id.as_str()));
        assert_eq!(resolution.primary(Utc::now()), Some(trust));
    }

    #[test]
    fn direct_relationship_found_in_either_direction() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);

        let rel = create_relationship(
            &mut conn,
            &OpenOrgDirectory,
            &audit,
            &NewRelationship::new("org-b", "org-a", "trusted", RelationshipKind::Bilateral),
            "b",
        )
        .unwrap();

        let resolution = resolve_trust(&conn, "org-a", "org-b").unwrap();
        let direct = resolution.direct.as_ref().unwrap();
        assert_eq!(direct.relationship.id, rel.id);
        assert_eq!(direct.trust_level.name, "trusted");
        assert!(!direct.is_effective(Utc::now()), "still pending");

        // With nothing effective, the direct row is still primary.
        assert_eq!(
            resolution.primary(Utc::now()).map(|r| &r.relationship.id),
            Some(&rel.id)
        );
        assert!(resolution.best_effective(Utc::now()).is_none());
    }

    #[test]
    fn best_effective_prefers_strength_then_direct() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);
        let dir = OpenOrgDirectory;

        let rel = create_relationship(
            &mut conn,
            &dir,
            &audit,
            &NewRelationship::new("org-x", "org-y", "standard", RelationshipKind::Bilateral),
            "x",
        )
        .unwrap();
        approve_relationship(&mut conn, &audit, &rel.id, "org-x", "x").unwrap();
        approve_relationship(&mut conn, &audit, &rel.id, "org-y", "y").unwrap();

        let same =
            create_group(&mut conn, &dir, &audit, &edunet("standard"), "org-x", "x").unwrap();
        join_group(&mut conn, &dir, &audit, &same.id, "org-y", None, "y").unwrap();

        let now = Utc::now();
        let resolution = resolve_trust(&conn, "org-x", "org-y").unwrap();
        assert_eq!(
            resolution.best_effective(now).map(|r| r.relationship.id.clone()),
            Some(rel.id.clone()),
            "ties keep the direct relationship"
        );

        let stronger =
            create_group(&mut conn, &dir, &audit, &edunet("trusted"), "org-x", "x").unwrap();
        join_group(&mut conn, &dir, &audit, &stronger.id, "org-y", None, "y").unwrap();

        let resolution = resolve_trust(&conn, "org-x", "org-y").unwrap();
        let best = resolution.best_effective(now).unwrap();
        assert_eq!(best.trust_level.name, "trusted");
        assert!(best.is_group_derived());
    }

    #[test]
    fn pending_proposal_does_not_hide_group_trust() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);
        let dir = OpenOrgDirectory;

        let g = create_group(&mut conn, &dir, &audit, &edunet("standard"), "org-x", "x").unwrap();
        join_group(&mut conn, &dir, &audit, &g.id, "org-y", None, "y").unwrap();
        let rel = create_relationship(
            &mut conn,
            &dir,
            &audit,
            &NewRelationship::new("org-x", "org-y", "basic", RelationshipKind::Bilateral),
            "x",
        )
        .unwrap();

        let now = Utc::now();
        let resolution = resolve_trust(&conn, "org-x", "org-y").unwrap();
        assert_eq!(resolution.direct.as_ref().map(|d| &d.relationship.id), Some(&rel.id));
        let primary = resolution.primary(now).unwrap();
        assert!(primary.is_group_derived());
        assert!(primary.is_effective(now));

        // Once approved, the direct relationship takes over.
        approve_relationship(&mut conn, &audit, &rel.id, "org-x", "x").unwrap();
        approve_relationship(&mut conn, &audit, &rel.id, "org-y", "y").unwrap();
        let resolution = resolve_trust(&conn, "org-x", "org-y").unwrap();
        assert_eq!(
            resolution.primary(Utc::now()).map(|r| &r.relationship.id),
            Some(&rel.id)
        );
    }
}
