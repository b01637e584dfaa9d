//! Trust relationship state machine.
//!
//! ```text
//!   create ──► pending ──approve (fully)──► active ◄──reinstate── suspended
//!                 │                           │                      ▲
//!                 ├──────────suspend──────────┴──────────suspend─────┘
//!                 └──────────revoke───────────┴──────────revoke──► revoked
//! ```
//!
//! Every transition runs in an immediate transaction so concurrent callers
//! serialize on the database write lock. The audit entry is written after
//! the transaction ends, for refused attempts as well as successful ones.

use accord_db::{
    format_timestamp, now_timestamp, parse_optional_timestamp, parse_timestamp, truncate_timestamp,
};
use accord_observe::{AuditTrail, LogDraft, TrustAction};
use accord_types::{
    AccessLevel, AnonymizationLevel, LevelOverride, RelationshipKind, RelationshipStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::directory::OrgDirectory;
use crate::error::{label_error, TrustError};
use crate::groups::{get_group, is_group_admin};
use crate::levels::get_trust_level_by_name;
use crate::relationship::TrustRelationship;

/// Parameters for proposing a relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationship {
    pub source_org: String,
    pub target_org: String,
    pub trust_level: String,
    pub kind: RelationshipKind,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub access_level_override: LevelOverride<AccessLevel>,
    #[serde(default)]
    pub anonymization_level_override: LevelOverride<AnonymizationLevel>,
    /// Defaults to the creation time.
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewRelationship {
    pub fn new(
        source_org: &str,
        target_org: &str,
        trust_level: &str,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            source_org: source_org.to_string(),
            target_org: target_org.to_string(),
            trust_level: trust_level.to_string(),
            kind,
            group_id: None,
            access_level_override: LevelOverride::Inherit,
            anonymization_level_override: LevelOverride::Inherit,
            valid_from: None,
            valid_until: None,
            notes: None,
        }
    }
}

const SELECT_RELATIONSHIP: &str = "SELECT
        id, source_org, target_org, relationship_kind, trust_level_id, group_id,
        status, is_active, access_level_override, anonymization_level_override,
        source_approved, target_approved, valid_from, valid_until,
        activated_at, activated_by, suspended_at, suspended_by, revoked_at, revoked_by,
        notes, created_by, created_at, updated_at
    FROM trust_relationships";

/// Proposes a relationship in `pending` status.
///
/// # Errors
///
/// - `InvalidArgument` if source and target are equal or the validity window
///   is inverted.
/// - `NotFound` for an unknown organization, trust level or group.
/// - `InvalidState` if a non-terminal relationship already exists for the
///   same ordered pair.
pub fn create_relationship(
    conn: &mut Connection,
    directory: &dyn OrgDirectory,
    audit: &AuditTrail<'_>,
    params: &NewRelationship,
    actor: &str,
) -> Result<TrustRelationship, TrustError> {
    let result = insert_relationship(conn, directory, params, actor);
    let draft = LogDraft::new(TrustAction::RelationshipCreated, actor)
        .orgs(&params.source_org, &params.target_org);
    match &result {
        Ok(rel) => {
            tracing::info!(
                relationship_id = %rel.id,
                source = %rel.source_org,
                target = %rel.target_org,
                kind = %rel.kind,
                "trust relationship proposed"
            );
            audit.record(draft.relationship(&rel.id).details(json!({
                "kind": rel.kind,
                "trust_level": params.trust_level,
                "group_id": rel.group_id,
            })));
        }
        Err(e) => {
            tracing::warn!(
                source = %params.source_org,
                target = %params.target_org,
                error = %e,
                "trust relationship creation refused"
            );
            audit.record(
                draft
                    .details(json!({ "kind": params.kind, "trust_level": params.trust_level }))
                    .failed(e.to_string()),
            );
        }
    }
    result
}

fn insert_relationship(
    conn: &mut Connection,
    directory: &dyn OrgDirectory,
    params: &NewRelationship,
    actor: &str,
) -> Result<TrustRelationship, TrustError> {
    if params.source_org.trim().is_empty() || params.target_org.trim().is_empty() {
        return Err(TrustError::InvalidArgument(
            "source and target organizations are required".to_string(),
        ));
    }
    if params.source_org == params.target_org {
        return Err(TrustError::InvalidArgument(
            "an organization cannot trust itself".to_string(),
        ));
    }

    let now = now_timestamp();
    let valid_from = params.valid_from.map(truncate_timestamp).unwrap_or(now);
    let valid_until = params.valid_until.map(truncate_timestamp);
    if let Some(until) = valid_until {
        if until < valid_from {
            return Err(TrustError::InvalidArgument(
                "valid_until must not precede valid_from".to_string(),
            ));
        }
    }

    for org in [&params.source_org, &params.target_org] {
        if !directory.org_exists(org) {
            return Err(TrustError::NotFound(format!("organization {org}")));
        }
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let level = get_trust_level_by_name(&tx, &params.trust_level)?;
    if let Some(group_id) = &params.group_id {
        get_group(&tx, group_id)?;
    }

    let open: bool = tx.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM trust_relationships
            WHERE source_org = ?1 AND target_org = ?2
              AND status IN ('pending', 'active', 'suspended')
        )",
        params![params.source_org, params.target_org],
        |row| row.get(0),
    )?;
    if open {
        return Err(TrustError::InvalidState(format!(
            "a relationship from {} to {} already exists",
            params.source_org, params.target_org
        )));
    }

    let rel = TrustRelationship {
        id: uuid::Uuid::new_v4().to_string(),
        source_org: params.source_org.clone(),
        target_org: params.target_org.clone(),
        kind: params.kind,
        trust_level_id: level.id,
        group_id: params.group_id.clone(),
        status: RelationshipStatus::Pending,
        is_active: false,
        access_level_override: params.access_level_override,
        anonymization_level_override: params.anonymization_level_override,
        source_approved: false,
        target_approved: false,
        valid_from,
        valid_until,
        activated_at: None,
        activated_by: None,
        suspended_at: None,
        suspended_by: None,
        revoked_at: None,
        revoked_by: None,
        notes: params.notes.clone().unwrap_or_default(),
        created_by: actor.to_string(),
        created_at: now,
        updated_at: now,
    };

    tx.execute(
        "INSERT INTO trust_relationships (
            id, source_org, target_org, relationship_kind, trust_level_id, group_id,
            status, is_active, access_level_override, anonymization_level_override,
            source_approved, target_approved, valid_from, valid_until,
            notes, created_by, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, 0, 0, ?10, ?11, ?12, ?13, ?14, ?14)",
        params![
            rel.id,
            rel.source_org,
            rel.target_org,
            rel.kind.as_str(),
            rel.trust_level_id,
            rel.group_id,
            rel.status.as_str(),
            rel.access_level_override.to_string(),
            rel.anonymization_level_override.to_string(),
            format_timestamp(rel.valid_from),
            rel.valid_until.map(format_timestamp),
            rel.notes,
            rel.created_by,
            format_timestamp(now),
        ],
    )?;
    tx.commit()?;

    Ok(rel)
}

/// Retrieves a relationship by id.
pub fn get_relationship(conn: &Connection, id: &str) -> Result<TrustRelationship, TrustError> {
    conn.query_row(
        &format!("{SELECT_RELATIONSHIP} WHERE id = ?1"),
        [id],
        map_row_to_relationship,
    )
    .optional()?
    .ok_or_else(|| TrustError::NotFound(format!("relationship {id}")))
}

/// Every relationship in which `org` is source or target, newest first.
pub fn list_relationships_for(
    conn: &Connection,
    org: &str,
) -> Result<Vec<TrustRelationship>, TrustError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_RELATIONSHIP} WHERE source_org = ?1 OR target_org = ?1
         ORDER BY created_at DESC, id ASC"
    ))?;
    let rows = stmt.query_map([org], map_row_to_relationship)?;
    let mut relationships = Vec::new();
    for row in rows {
        relationships.push(row?);
    }
    Ok(relationships)
}

/// The newest non-terminal relationship from `source` to `target`.
pub fn find_relationship(
    conn: &Connection,
    source: &str,
    target: &str,
) -> Result<Option<TrustRelationship>, TrustError> {
    let rel = conn
        .query_row(
            &format!(
                "{SELECT_RELATIONSHIP}
                 WHERE source_org = ?1 AND target_org = ?2
                   AND status IN ('pending', 'active', 'suspended')
                 ORDER BY created_at DESC
                 LIMIT 1"
            ),
            params![source, target],
            map_row_to_relationship,
        )
        .optional()?;
    Ok(rel)
}

/// Records `approving_org`'s approval and activates the relationship once
/// it is fully approved.
///
/// Returns `true` when the relationship is active afterwards.
///
/// # Errors
///
/// - `NotFound` if the relationship is missing or terminal.
/// - `PermissionDenied` if `approving_org` is not a party (or, for community
///   relationships, an administrator of the relationship's group).
pub fn approve_relationship(
    conn: &mut Connection,
    audit: &AuditTrail<'_>,
    relationship_id: &str,
    approving_org: &str,
    actor: &str,
) -> Result<bool, TrustError> {
    let result = apply_approval(conn, relationship_id, approving_org, actor);
    match &result {
        Ok((rel, outcome)) => {
            let action = match outcome {
                ApprovalOutcome::Activated => TrustAction::RelationshipActivated,
                ApprovalOutcome::AlreadyActive | ApprovalOutcome::Recorded => {
                    TrustAction::RelationshipApprovalPartial
                }
            };
            tracing::info!(
                relationship_id = %rel.id,
                approving_org = %approving_org,
                status = %rel.status,
                "relationship approval recorded"
            );
            audit.record(
                LogDraft::new(action, actor)
                    .orgs(&rel.source_org, &rel.target_org)
                    .relationship(&rel.id)
                    .details(json!({
                        "approving_org": approving_org,
                        "source_approved": rel.source_approved,
                        "target_approved": rel.target_approved,
                        "status": rel.status,
                    })),
            );
        }
        Err(e) => {
            tracing::warn!(
                relationship_id = %relationship_id,
                approving_org = %approving_org,
                error = %e,
                "relationship approval refused"
            );
            audit.record(
                LogDraft::new(TrustAction::RelationshipActivated, actor)
                    .relationship(relationship_id)
                    .details(json!({ "approving_org": approving_org }))
                    .failed(e.to_string()),
            );
        }
    }
    result.map(|(rel, _)| rel.status == RelationshipStatus::Active)
}

enum ApprovalOutcome {
    Activated,
    AlreadyActive,
    Recorded,
}

fn apply_approval(
    conn: &mut Connection,
    relationship_id: &str,
    approving_org: &str,
    actor: &str,
) -> Result<(TrustRelationship, ApprovalOutcome), TrustError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut rel = match get_relationship(&tx, relationship_id) {
        Ok(rel) if !rel.status.is_terminal() => rel,
        Ok(rel) => {
            return Err(TrustError::NotFound(format!(
                "relationship {relationship_id} is {}",
                rel.status
            )))
        }
        Err(e) => return Err(e),
    };

    if approving_org == rel.source_org {
        rel.source_approved = true;
    } else if approving_org == rel.target_org {
        rel.target_approved = true;
    } else if rel.kind == RelationshipKind::Community
        && match &rel.group_id {
            Some(group_id) => is_group_admin(&tx, group_id, approving_org)?,
            None => false,
        }
    {
        // A group administrator approves on the source's behalf.
        rel.source_approved = true;
    } else {
        return Err(TrustError::PermissionDenied(format!(
            "{approving_org} is not a party to relationship {relationship_id}"
        )));
    }

    let now = now_timestamp();
    let outcome = match rel.status {
        RelationshipStatus::Active => ApprovalOutcome::AlreadyActive,
        RelationshipStatus::Pending if rel.is_fully_approved() => {
            rel.status = RelationshipStatus::Active;
            rel.is_active = true;
            rel.activated_at = Some(now);
            rel.activated_by = Some(actor.to_string());
            ApprovalOutcome::Activated
        }
        // Suspended relationships keep the flag but stay suspended.
        _ => ApprovalOutcome::Recorded,
    };
    rel.updated_at = now;

    write_state(&tx, &rel)?;
    tx.commit()?;
    Ok((rel, outcome))
}

/// Suspends a pending or active relationship. Reversible with
/// [`reinstate_relationship`].
pub fn suspend_relationship(
    conn: &mut Connection,
    audit: &AuditTrail<'_>,
    relationship_id: &str,
    actor: &str,
    reason: &str,
) -> Result<TrustRelationship, TrustError> {
    transition(
        conn,
        audit,
        relationship_id,
        actor,
        reason,
        TrustAction::RelationshipSuspended,
        |rel, now| {
            match rel.status {
                RelationshipStatus::Pending | RelationshipStatus::Active => {}
                other => {
                    return Err(TrustError::InvalidState(format!(
                        "cannot suspend a {other} relationship"
                    )))
                }
            }
            rel.status = RelationshipStatus::Suspended;
            rel.is_active = false;
            rel.suspended_at = Some(now);
            rel.suspended_by = Some(actor.to_string());
            Ok("SUSPENDED")
        },
    )
}

/// Returns a suspended, fully approved relationship to `active`.
pub fn reinstate_relationship(
    conn: &mut Connection,
    audit: &AuditTrail<'_>,
    relationship_id: &str,
    actor: &str,
    reason: &str,
) -> Result<TrustRelationship, TrustError> {
    transition(
        conn,
        audit,
        relationship_id,
        actor,
        reason,
        TrustAction::RelationshipReinstated,
        |rel, now| {
            if rel.status != RelationshipStatus::Suspended {
                return Err(TrustError::InvalidState(format!(
                    "cannot reinstate a {} relationship",
                    rel.status
                )));
            }
            if !rel.is_fully_approved() {
                return Err(TrustError::InvalidState(
                    "relationship is not fully approved".to_string(),
                ));
            }
            rel.status = RelationshipStatus::Active;
            rel.is_active = true;
            rel.suspended_at = None;
            rel.suspended_by = None;
            if rel.activated_at.is_none() {
                rel.activated_at = Some(now);
                rel.activated_by = Some(actor.to_string());
            }
            Ok("REINSTATED")
        },
    )
}

/// Revokes a relationship permanently.
///
/// # Errors
///
/// `InvalidState` if it is already revoked or expired.
pub fn revoke_relationship(
    conn: &mut Connection,
    audit: &AuditTrail<'_>,
    relationship_id: &str,
    actor: &str,
    reason: &str,
) -> Result<TrustRelationship, TrustError> {
    transition(
        conn,
        audit,
        relationship_id,
        actor,
        reason,
        TrustAction::RelationshipRevoked,
        |rel, now| {
            if rel.status.is_terminal() {
                return Err(TrustError::InvalidState(format!(
                    "relationship is already {}",
                    rel.status
                )));
            }
            rel.status = RelationshipStatus::Revoked;
            rel.is_active = false;
            rel.revoked_at = Some(now);
            rel.revoked_by = Some(actor.to_string());
            Ok("REVOKED")
        },
    )
}

/// Shared read-modify-write for suspend, reinstate and revoke.
///
/// `apply` mutates the record or refuses; on success the reason is appended
/// to the notes under the returned label.
fn transition<F>(
    conn: &mut Connection,
    audit: &AuditTrail<'_>,
    relationship_id: &str,
    actor: &str,
    reason: &str,
    action: TrustAction,
    apply: F,
) -> Result<TrustRelationship, TrustError>
where
    F: FnOnce(&mut TrustRelationship, DateTime<Utc>) -> Result<&'static str, TrustError>,
{
    let result = (|| -> Result<TrustRelationship, TrustError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut rel = get_relationship(&tx, relationship_id)?;
        let now = now_timestamp();
        let label = apply(&mut rel, now)?;
        append_note(&mut rel.notes, now, label, actor, reason);
        rel.updated_at = now;
        write_state(&tx, &rel)?;
        tx.commit()?;
        Ok(rel)
    })();

    match &result {
        Ok(rel) => {
            tracing::info!(
                relationship_id = %rel.id,
                status = %rel.status,
                actor = %actor,
                "relationship transition applied"
            );
            audit.record(
                LogDraft::new(action, actor)
                    .orgs(&rel.source_org, &rel.target_org)
                    .relationship(&rel.id)
                    .details(json!({ "reason": reason, "status": rel.status })),
            );
        }
        Err(e) => {
            tracing::warn!(
                relationship_id = %relationship_id,
                action = %action,
                error = %e,
                "relationship transition refused"
            );
            audit.record(
                LogDraft::new(action, actor)
                    .relationship(relationship_id)
                    .details(json!({ "reason": reason }))
                    .failed(e.to_string()),
            );
        }
    }
    result
}

fn append_note(notes: &mut String, now: DateTime<Utc>, label: &str, actor: &str, reason: &str) {
    if !notes.is_empty() {
        notes.push('\n');
    }
    notes.push_str(&format!(
        "[{}] {label} by {actor}: {reason}",
        format_timestamp(now)
    ));
}

/// Persists the mutable columns of a relationship.
fn write_state(conn: &Connection, rel: &TrustRelationship) -> Result<(), TrustError> {
    conn.execute(
        "UPDATE trust_relationships SET
            status = ?1, is_active = ?2, source_approved = ?3, target_approved = ?4,
            activated_at = ?5, activated_by = ?6, suspended_at = ?7, suspended_by = ?8,
            revoked_at = ?9, revoked_by = ?10, notes = ?11, updated_at = ?12
         WHERE id = ?13",
        params![
            rel.status.as_str(),
            rel.is_active,
            rel.source_approved,
            rel.target_approved,
            rel.activated_at.map(format_timestamp),
            rel.activated_by,
            rel.suspended_at.map(format_timestamp),
            rel.suspended_by,
            rel.revoked_at.map(format_timestamp),
            rel.revoked_by,
            rel.notes,
            format_timestamp(rel.updated_at),
            rel.id,
        ],
    )?;
    Ok(())
}

pub(crate) fn map_row_to_relationship(row: &Row) -> rusqlite::Result<TrustRelationship> {
    let kind: String = row.get(3)?;
    let status: String = row.get(6)?;
    let access: String = row.get(8)?;
    let anon: String = row.get(9)?;
    let valid_from: String = row.get(12)?;
    let created_at: String = row.get(22)?;
    let updated_at: String = row.get(23)?;

    Ok(TrustRelationship {
        id: row.get(0)?,
        source_org: row.get(1)?,
        target_org: row.get(2)?,
        kind: kind.parse().map_err(|e| label_error(3, e))?,
        trust_level_id: row.get(4)?,
        group_id: row.get(5)?,
        status: status.parse().map_err(|e| label_error(6, e))?,
        is_active: row.get(7)?,
        access_level_override: access.parse().map_err(|e| label_error(8, e))?,
        anonymization_level_override: anon.parse().map_err(|e| label_error(9, e))?,
        source_approved: row.get(10)?,
        target_approved: row.get(11)?,
        valid_from: parse_timestamp(&valid_from, 12)?,
        valid_until: parse_optional_timestamp(row.get(13)?, 13)?,
        activated_at: parse_optional_timestamp(row.get(14)?, 14)?,
        activated_by: row.get(15)?,
        suspended_at: parse_optional_timestamp(row.get(16)?, 16)?,
        suspended_by: row.get(17)?,
        revoked_at: parse_optional_timestamp(row.get(18)?, 18)?,
        revoked_by: row.get(19)?,
        notes: row.get(20)?,
        created_by: row.get(21)?,
        created_at: parse_timestamp(&created_at, 22)?,
        updated_at: parse_timestamp(&updated_at, 23)?,
    })
}
