//! Trust groups and their memberships.
//!
//! Any two active members of the same group trust each other at the group's
//! default level without a pairwise relationship row. Memberships are
//! deactivated on leave, never deleted.

use accord_db::{format_timestamp, now_timestamp, parse_optional_timestamp, parse_timestamp};
use accord_observe::{AuditTrail, LogDraft, TrustAction};
use accord_types::{GroupKind, GroupVisibility, MembershipKind};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::directory::OrgDirectory;
use crate::error::{label_error, TrustError};
use crate::levels::get_trust_level_by_name;

/// A stored trust group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: GroupKind,
    pub visibility: GroupVisibility,
    pub requires_approval: bool,
    pub default_trust_level_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl TrustGroup {
    /// Whether joining needs an invitation from an administrator.
    pub fn is_invite_only(&self) -> bool {
        self.requires_approval || self.visibility == GroupVisibility::Private
    }
}

/// Parameters for creating a trust group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrustGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: GroupKind,
    pub visibility: GroupVisibility,
    #[serde(default)]
    pub requires_approval: bool,
    /// Name of the trust level members extend to each other.
    pub default_trust_level: String,
}

/// An organization's membership in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub id: i64,
    pub group_id: String,
    pub organization_id: String,
    pub kind: MembershipKind,
    pub invited_by: Option<String>,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

const SELECT_GROUP: &str = "SELECT
        id, name, description, group_kind, visibility, requires_approval,
        default_trust_level_id, created_by, created_at
    FROM trust_groups";

const SELECT_MEMBERSHIP: &str = "SELECT
        id, group_id, organization_id, membership_kind, invited_by, active,
        joined_at, left_at
    FROM trust_group_memberships";

/// Creates a group and makes `creator_org` its first administrator.
pub fn create_group(
    conn: &mut Connection,
    directory: &dyn OrgDirectory,
    audit: &AuditTrail<'_>,
    params: &NewTrustGroup,
    creator_org: &str,
    actor: &str,
) -> Result<TrustGroup, TrustError> {
    let result = insert_group(conn, directory, params, creator_org, actor);
    match &result {
        Ok(group) => {
            tracing::info!(group_id = %group.id, name = %group.name, "trust group created");
            audit.record(
                LogDraft::new(TrustAction::GroupCreated, actor)
                    .source(creator_org)
                    .details(json!({ "group_id": group.id, "name": group.name })),
            );
        }
        Err(e) => {
            audit.record(
                LogDraft::new(TrustAction::GroupCreated, actor)
                    .source(creator_org)
                    .details(json!({ "name": params.name }))
                    .failed(e.to_string()),
            );
        }
    }
    result
}

fn insert_group(
    conn: &mut Connection,
    directory: &dyn OrgDirectory,
    params: &NewTrustGroup,
    creator_org: &str,
    actor: &str,
) -> Result<TrustGroup, TrustError> {
    let name = params.name.trim();
    if name.is_empty() {
        return Err(TrustError::InvalidArgument(
            "group name must not be empty".to_string(),
        ));
    }
    if !directory.org_exists(creator_org) {
        return Err(TrustError::NotFound(format!("organization {creator_org}")));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let level = get_trust_level_by_name(&tx, &params.default_trust_level)?;

    let taken: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM trust_groups WHERE name = ?1)",
        [name],
        |row| row.get(0),
    )?;
    if taken {
        return Err(TrustError::InvalidState(format!(
            "trust group '{name}' already exists"
        )));
    }

    let now = now_timestamp();
    let group = TrustGroup {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: params.description.clone(),
        kind: params.kind,
        visibility: params.visibility,
        requires_approval: params.requires_approval,
        default_trust_level_id: level.id,
        created_by: actor.to_string(),
        created_at: now,
    };

    tx.execute(
        "INSERT INTO trust_groups (
            id, name, description, group_kind, visibility, requires_approval,
            default_trust_level_id, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            group.id,
            group.name,
            group.description,
            group.kind.as_str(),
            group.visibility.as_str(),
            group.requires_approval,
            group.default_trust_level_id,
            group.created_by,
            format_timestamp(now),
        ],
    )?;
    tx.execute(
        "INSERT INTO trust_group_memberships
            (group_id, organization_id, membership_kind, invited_by, active, joined_at)
         VALUES (?1, ?2, 'administrator', NULL, 1, ?3)",
        params![group.id, creator_org, format_timestamp(now)],
    )?;
    tx.commit()?;

    Ok(group)
}

/// Retrieves a group by id.
pub fn get_group(conn: &Connection, group_id: &str) -> Result<TrustGroup, TrustError> {
    conn.query_row(
        &format!("{SELECT_GROUP} WHERE id = ?1"),
        [group_id],
        map_row_to_group,
    )
    .optional()?
    .ok_or_else(|| TrustError::NotFound(format!("trust group {group_id}")))
}

/// Lists groups by name, optionally only public ones.
pub fn list_groups(conn: &Connection, public_only: bool) -> Result<Vec<TrustGroup>, TrustError> {
    let sql = if public_only {
        format!("{SELECT_GROUP} WHERE visibility = 'public' ORDER BY name ASC")
    } else {
        format!("{SELECT_GROUP} ORDER BY name ASC")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], map_row_to_group)?;
    let mut groups = Vec::new();
    for row in rows {
        groups.push(row?);
    }
    Ok(groups)
}

/// Adds `org` to a group, or reactivates a previous membership.
///
/// Invite-only groups require `invited_by` to be an active administrator.
pub fn join_group(
    conn: &mut Connection,
    directory: &dyn OrgDirectory,
    audit: &AuditTrail<'_>,
    group_id: &str,
    org: &str,
    invited_by: Option<&str>,
    actor: &str,
) -> Result<GroupMembership, TrustError> {
    let result = insert_membership(conn, directory, group_id, org, invited_by);
    let draft = LogDraft::new(TrustAction::GroupJoined, actor)
        .source(org)
        .details(json!({ "group_id": group_id, "invited_by": invited_by }));
    match &result {
        Ok(_) => {
            tracing::info!(group_id = %group_id, org = %org, "organization joined trust group");
            audit.record(draft);
        }
        Err(e) => {
            tracing::warn!(group_id = %group_id, org = %org, error = %e, "group join refused");
            audit.record(draft.failed(e.to_string()));
        }
    }
    result
}

fn insert_membership(
    conn: &mut Connection,
    directory: &dyn OrgDirectory,
    group_id: &str,
    org: &str,
    invited_by: Option<&str>,
) -> Result<GroupMembership, TrustError> {
    if !directory.org_exists(org) {
        return Err(TrustError::NotFound(format!("organization {org}")));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let group = get_group(&tx, group_id)?;

    if group.is_invite_only() {
        let inviter_is_admin = match invited_by {
            Some(inviter) => is_group_admin(&tx, group_id, inviter)?,
            None => false,
        };
        if !inviter_is_admin {
            return Err(TrustError::PermissionDenied(format!(
                "group '{}' requires an invitation from an administrator",
                group.name
            )));
        }
    }

    let now = format_timestamp(now_timestamp());
    match get_membership(&tx, group_id, org)? {
        Some(existing) if existing.active => {
            return Err(TrustError::InvalidState(format!(
                "{org} is already a member of '{}'",
                group.name
            )));
        }
        Some(existing) => {
            tx.execute(
                "UPDATE trust_group_memberships
                 SET active = 1, membership_kind = 'member', invited_by = ?1,
                     joined_at = ?2, left_at = NULL
                 WHERE id = ?3",
                params![invited_by, now, existing.id],
            )?;
        }
        None => {
            tx.execute(
                "INSERT INTO trust_group_memberships
                    (group_id, organization_id, membership_kind, invited_by, active, joined_at)
                 VALUES (?1, ?2, 'member', ?3, 1, ?4)",
                params![group_id, org, invited_by, now],
            )?;
        }
    }

    let membership = get_membership(&tx, group_id, org)?
        .ok_or_else(|| TrustError::Internal("membership vanished after write".to_string()))?;
    tx.commit()?;
    Ok(membership)
}

/// Deactivates `org`'s membership.
///
/// The last active administrator cannot leave while other members remain.
pub fn leave_group(
    conn: &mut Connection,
    audit: &AuditTrail<'_>,
    group_id: &str,
    org: &str,
    actor: &str,
) -> Result<(), TrustError> {
    let result = deactivate_membership(conn, group_id, org);
    let draft = LogDraft::new(TrustAction::GroupLeft, actor)
        .source(org)
        .details(json!({ "group_id": group_id }));
    match &result {
        Ok(()) => {
            tracing::info!(group_id = %group_id, org = %org, "organization left trust group");
            audit.record(draft);
        }
        Err(e) => {
            audit.record(draft.failed(e.to_string()));
        }
    }
    result
}

fn deactivate_membership(
    conn: &mut Connection,
    group_id: &str,
    org: &str,
) -> Result<(), TrustError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    get_group(&tx, group_id)?;

    let membership = match get_membership(&tx, group_id, org)? {
        Some(m) if m.active => m,
        _ => {
            return Err(TrustError::NotFound(format!(
                "{org} is not an active member of group {group_id}"
            )))
        }
    };

    if membership.kind == MembershipKind::Administrator {
        let (admins, others): (i64, i64) = tx.query_row(
            "SELECT
                COALESCE(SUM(membership_kind = 'administrator'), 0),
                COALESCE(SUM(membership_kind = 'member'), 0)
             FROM trust_group_memberships
             WHERE group_id = ?1 AND active = 1",
            [group_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if admins <= 1 && others > 0 {
            return Err(TrustError::InvalidState(
                "the last administrator cannot leave while members remain".to_string(),
            ));
        }
    }

    tx.execute(
        "UPDATE trust_group_memberships SET active = 0, left_at = ?1 WHERE id = ?2",
        params![format_timestamp(now_timestamp()), membership.id],
    )?;
    tx.commit()?;
    Ok(())
}

/// Lists a group's memberships in join order.
pub fn list_group_members(
    conn: &Connection,
    group_id: &str,
    include_inactive: bool,
) -> Result<Vec<GroupMembership>, TrustError> {
    get_group(conn, group_id)?;
    let sql = if include_inactive {
        format!("{SELECT_MEMBERSHIP} WHERE group_id = ?1 ORDER BY id ASC")
    } else {
        format!("{SELECT_MEMBERSHIP} WHERE group_id = ?1 AND active = 1 ORDER BY id ASC")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([group_id], map_row_to_membership)?;
    let mut members = Vec::new();
    for row in rows {
        members.push(row?);
    }
    Ok(members)
}

/// Organization ids of the group's active administrators.
pub fn group_administrators(conn: &Connection, group_id: &str) -> Result<Vec<String>, TrustError> {
    let mut stmt = conn.prepare(
        "SELECT organization_id FROM trust_group_memberships
         WHERE group_id = ?1 AND active = 1 AND membership_kind = 'administrator'
         ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([group_id], |row| row.get(0))?;
    let mut admins = Vec::new();
    for row in rows {
        admins.push(row?);
    }
    Ok(admins)
}

pub fn is_group_admin(conn: &Connection, group_id: &str, org: &str) -> Result<bool, TrustError> {
    let exists = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM trust_group_memberships
            WHERE group_id = ?1 AND organization_id = ?2
              AND active = 1 AND membership_kind = 'administrator'
        )",
        params![group_id, org],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Groups in which both organizations are active members.
pub fn shared_groups(
    conn: &Connection,
    org_a: &str,
    org_b: &str,
) -> Result<Vec<TrustGroup>, TrustError> {
    let mut stmt = conn.prepare(
        "SELECT
            g.id, g.name, g.description, g.group_kind, g.visibility, g.requires_approval,
            g.default_trust_level_id, g.created_by, g.created_at
         FROM trust_groups g
         JOIN trust_group_memberships ma
           ON ma.group_id = g.id AND ma.organization_id = ?1 AND ma.active = 1
         JOIN trust_group_memberships mb
           ON mb.group_id = g.id AND mb.organization_id = ?2 AND mb.active = 1
         ORDER BY g.name ASC",
    )?;
    let rows = stmt.query_map(params![org_a, org_b], map_row_to_group)?;
    let mut groups = Vec::new();
    for row in rows {
        groups.push(row?);
    }
    Ok(groups)
}

pub(crate) fn get_membership(
    conn: &Connection,
    group_id: &str,
    org: &str,
) -> Result<Option<GroupMembership>, TrustError> {
    let membership = conn
        .query_row(
            &format!("{SELECT_MEMBERSHIP} WHERE group_id = ?1 AND organization_id = ?2"),
            params![group_id, org],
            map_row_to_membership,
        )
        .optional()?;
    Ok(membership)
}

fn map_row_to_group(row: &Row) -> rusqlite::Result<TrustGroup> {
    let kind: String = row.get(3)?;
    let visibility: String = row.get(4)?;
    let created_at: String = row.get(8)?;

    Ok(TrustGroup {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        kind: kind.parse().map_err(|e| label_error(3, e))?,
        visibility: visibility.parse().map_err(|e| label_error(4, e))?,
        requires_approval: row.get(5)?,
        default_trust_level_id: row.get(6)?,
        created_by: row.get(7)?,
        created_at: parse_timestamp(&created_at, 8)?,
    })
}

fn map_row_to_membership(row: &Row) -> rusqlite::Result<GroupMembership> {
    let kind: String = row.get(3)?;
    let joined_at: String = row.get(6)?;

    Ok(GroupMembership {
        id: row.get(0)?,
        group_id: row.get(1)?,
        organization_id: row.get(2)?,
        kind: kind.parse().map_err(|e| label_error(3, e))?,
        invited_by: row.get(4)?,
        active: row.get(5)?,
        joined_at: parse_timestamp(&joined_at, 6)?,
        left_at: parse_optional_timestamp(row.get(7)?, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{OpenOrgDirectory, StaticOrgDirectory};
    use crate::levels::seed_system_levels;
    use accord_observe::MemoryAuditSink;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        accord_db::run_migrations(&conn).unwrap();
        seed_system_levels(&conn).unwrap();
        conn
    }

    fn group(name: &str, visibility: GroupVisibility, requires_approval: bool) -> NewTrustGroup {
        NewTrustGroup {
            name: name.to_string(),
            description: String::new(),
            kind: GroupKind::Sector,
            visibility,
            requires_approval,
            default_trust_level: "standard".to_string(),
        }
    }

    #[test]
    fn creator_becomes_administrator() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);

        let g = create_group(
            &mut conn,
            &OpenOrgDirectory,
            &audit,
            &group("EduNet", GroupVisibility::Public, false),
            "org-x",
            "admin@org-x",
        )
        .unwrap();

        assert_eq!(group_administrators(&conn, &g.id).unwrap(), ["org-x"]);
        let members = list_group_members(&conn, &g.id, false).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].kind, MembershipKind::Administrator);
    }

    #[test]
    fn unknown_default_level_is_not_found() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);

        let mut params = group("EduNet", GroupVisibility::Public, false);
        params.default_trust_level = "legendary".to_string();
        let err = create_group(&mut conn, &OpenOrgDirectory, &audit, &params, "org-x", "a")
            .unwrap_err();
        assert!(matches!(err, TrustError::NotFound(_)));
        assert!(!sink.entries()[0].success);
    }

    #[test]
    fn invite_only_group_requires_admin_invitation() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);
        let dir = OpenOrgDirectory;

        let g = create_group(
            &mut conn,
            &dir,
            &audit,
            &group("FinSec", GroupVisibility::Private, true),
            "org-x",
            "a",
        )
        .unwrap();

        let err = join_group(&mut conn, &dir, &audit, &g.id, "org-y", None, "b").unwrap_err();
        assert!(matches!(err, TrustError::PermissionDenied(_)));

        let err = join_group(&mut conn, &dir, &audit, &g.id, "org-y", Some("org-z"), "b")
            .unwrap_err();
        assert!(matches!(err, TrustError::PermissionDenied(_)));

        let membership =
            join_group(&mut conn, &dir, &audit, &g.id, "org-y", Some("org-x"), "b").unwrap();
        assert_eq!(membership.invited_by.as_deref(), Some("org-x"));
        assert!(membership.active);
    }

    #[test]
    fn unknown_org_cannot_join() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);
        let dir = StaticOrgDirectory::new(["org-x"]);

        let g = create_group(
            &mut conn,
            &dir,
            &audit,
            &group("EduNet", GroupVisibility::Public, false),
            "org-x",
            "a",
        )
        .unwrap();
        let err = join_group(&mut conn, &dir, &audit, &g.id, "org-q", None, "q").unwrap_err();
        assert!(matches!(err, TrustError::NotFound(_)));
    }

    #[test]
    fn leave_and_rejoin_reuses_membership() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);
        let dir = OpenOrgDirectory;

        let g = create_group(
            &mut conn,
            &dir,
            &audit,
            &group("EduNet", GroupVisibility::Public, false),
            "org-x",
            "a",
        )
        .unwrap();
        let first = join_group(&mut conn, &dir, &audit, &g.id, "org-y", None, "b").unwrap();

        let err = join_group(&mut conn, &dir, &audit, &g.id, "org-y", None, "b").unwrap_err();
        assert!(matches!(err, TrustError::InvalidState(_)));

        leave_group(&mut conn, &audit, &g.id, "org-y", "b").unwrap();
        assert_eq!(list_group_members(&conn, &g.id, false).unwrap().len(), 1);
        let all = list_group_members(&conn, &g.id, true).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[1].left_at.is_some());

        let again = join_group(&mut conn, &dir, &audit, &g.id, "org-y", None, "b").unwrap();
        assert_eq!(again.id, first.id);
        assert!(again.active);
        assert!(again.left_at.is_none());
    }

    #[test]
    fn last_admin_cannot_abandon_members() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);
        let dir = OpenOrgDirectory;

        let g = create_group(
            &mut conn,
            &dir,
            &audit,
            &group("EduNet", GroupVisibility::Public, false),
            "org-x",
            "a",
        )
        .unwrap();
        join_group(&mut conn, &dir, &audit, &g.id, "org-y", None, "b").unwrap();

        let err = leave_group(&mut conn, &audit, &g.id, "org-x", "a").unwrap_err();
        assert!(matches!(err, TrustError::InvalidState(_)));

        leave_group(&mut conn, &audit, &g.id, "org-y", "b").unwrap();
        leave_group(&mut conn, &audit, &g.id, "org-x", "a").unwrap();
        assert!(list_group_members(&conn, &g.id, false).unwrap().is_empty());
    }

    #[test]
    fn shared_groups_only_counts_active_memberships() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);
        let dir = OpenOrgDirectory;

        let edu = create_group(
            &mut conn,
            &dir,
            &audit,
            &group("EduNet", GroupVisibility::Public, false),
            "org-x",
            "a",
        )
        .unwrap();
        join_group(&mut conn, &dir, &audit, &edu.id, "org-y", None, "b").unwrap();

        let shared = shared_groups(&conn, "org-x", "org-y").unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].name, "EduNet");

        leave_group(&mut conn, &audit, &edu.id, "org-y", "b").unwrap();
        assert!(shared_groups(&conn, "org-x", "org-y").unwrap().is_empty());
    }

    #[test]
    fn public_listing_hides_private_groups() {
        let mut conn = setup_db();
        let sink = MemoryAuditSink::new();
        let audit = AuditTrail::new(&sink);
        let dir = OpenOrgDirectory;

        let open = group("Open", GroupVisibility::Public, false);
        create_group(&mut conn, &dir, &audit, &open, "org-x", "a").unwrap();
        let closed = group("Closed", GroupVisibility::Private, false);
        create_group(&mut conn, &dir, &audit, &closed, "org-x", "a").unwrap();

        assert_eq!(list_groups(&conn, false).unwrap().len(), 2);
        let public = list_groups(&conn, true).unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].name, "Open");
    }
}
