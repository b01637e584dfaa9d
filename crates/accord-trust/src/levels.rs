//! Trust level registry.
//!
//! A trust level is a named tier with a numerical strength and the default
//! access and anonymization settings that relationships inherit. Once an
//! active relationship references a level, only its descriptive fields may
//! change.

use accord_db::{format_timestamp, now_timestamp, parse_timestamp};
use accord_observe::{AuditTrail, LogDraft, TrustAction};
use accord_types::{AccessLevel, AnonymizationLevel, SharingPolicy, TrustTier};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{label_error, TrustError};

/// A stored trust level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustLevel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tier: TrustTier,
    /// Numerical strength in `[0, 100]`.
    pub strength: u8,
    pub default_anonymization_level: AnonymizationLevel,
    pub default_access_level: AccessLevel,
    pub sharing_policy: SharingPolicy,
    pub is_system_default: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a trust level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrustLevel {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tier: TrustTier,
    pub strength: i64,
    #[serde(default)]
    pub default_anonymization_level: AnonymizationLevel,
    #[serde(default)]
    pub default_access_level: AccessLevel,
    #[serde(default)]
    pub sharing_policy: SharingPolicy,
}

/// Policy fields that may only change while no active relationship uses
/// the level. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustLevelPolicyUpdate {
    #[serde(default)]
    pub tier: Option<TrustTier>,
    #[serde(default)]
    pub strength: Option<i64>,
    #[serde(default)]
    pub default_anonymization_level: Option<AnonymizationLevel>,
    #[serde(default)]
    pub default_access_level: Option<AccessLevel>,
    #[serde(default)]
    pub sharing_policy: Option<SharingPolicy>,
}

impl TrustLevelPolicyUpdate {
    fn is_empty(&self) -> bool {
        self.tier.is_none()
            && self.strength.is_none()
            && self.default_anonymization_level.is_none()
            && self.default_access_level.is_none()
            && self.sharing_policy.is_none()
    }
}

const SELECT_LEVEL: &str = "SELECT
        id, name, description, tier, strength, default_anonymization_level,
        default_access_level, sharing_policy_json, is_system_default,
        created_by, created_at, updated_at
    FROM trust_levels";

fn validate_strength(strength: i64) -> Result<u8, TrustError> {
    if (0..=100).contains(&strength) {
        Ok(strength as u8)
    } else {
        Err(TrustError::InvalidArgument(format!(
            "trust level strength must be between 0 and 100, got {strength}"
        )))
    }
}

/// Creates a trust level.
///
/// # Errors
///
/// `InvalidArgument` for an empty name or out-of-range strength,
/// `InvalidState` when the name is already taken.
pub fn create_trust_level(
    conn: &Connection,
    audit: &AuditTrail<'_>,
    params: &NewTrustLevel,
    actor: &str,
) -> Result<TrustLevel, TrustError> {
    let result = insert_level(conn, params, false, actor);
    match &result {
        Ok(level) => {
            tracing::info!(
                trust_level = %level.name,
                strength = level.strength,
                "trust level created"
            );
            audit.record(
                LogDraft::new(TrustAction::TrustLevelCreated, actor).details(json!({
                    "trust_level_id": level.id,
                    "name": level.name,
                    "strength": level.strength,
                })),
            );
        }
        Err(e) => {
            audit.record(
                LogDraft::new(TrustAction::TrustLevelCreated, actor)
                    .details(json!({ "name": params.name }))
                    .failed(e.to_string()),
            );
        }
    }
    result
}

fn insert_level(
    conn: &Connection,
    params: &NewTrustLevel,
    is_system_default: bool,
    actor: &str,
) -> Result<TrustLevel, TrustError> {
    let name = params.name.trim();
    if name.is_empty() {
        return Err(TrustError::InvalidArgument(
            "trust level name must not be empty".to_string(),
        ));
    }
    let strength = validate_strength(params.strength)?;

    if get_trust_level_by_name(conn, name).is_ok() {
        return Err(TrustError::InvalidState(format!(
            "trust level '{name}' already exists"
        )));
    }

    let now = now_timestamp();
    let level = TrustLevel {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: params.description.clone(),
        tier: params.tier,
        strength,
        default_anonymization_level: params.default_anonymization_level,
        default_access_level: params.default_access_level,
        sharing_policy: params.sharing_policy.clone(),
        is_system_default,
        created_by: actor.to_string(),
        created_at: now,
        updated_at: now,
    };
    let policy_json = serde_json::to_string(&level.sharing_policy)?;

    conn.execute(
        "INSERT INTO trust_levels (
            id, name, description, tier, strength, default_anonymization_level,
            default_access_level, sharing_policy_json, is_system_default,
            created_by, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            level.id,
            level.name,
            level.description,
            level.tier.as_str(),
            level.strength,
            level.default_anonymization_level.as_str(),
            level.default_access_level.as_str(),
            policy_json,
            level.is_system_default,
            level.created_by,
            format_timestamp(now),
        ],
    )?;

    Ok(level)
}

/// Retrieves a trust level by id.
pub fn get_trust_level(conn: &Connection, id: &str) -> Result<TrustLevel, TrustError> {
    conn.query_row(
        &format!("{SELECT_LEVEL} WHERE id = ?1"),
        [id],
        map_row_to_level,
    )
    .optional()?
    .ok_or_else(|| TrustError::NotFound(format!("trust level {id}")))
}

/// Retrieves a trust level by its unique name.
pub fn get_trust_level_by_name(conn: &Connection, name: &str) -> Result<TrustLevel, TrustError> {
    conn.query_row(
        &format!("{SELECT_LEVEL} WHERE name = ?1"),
        [name],
        map_row_to_level,
    )
    .optional()?
    .ok_or_else(|| TrustError::NotFound(format!("trust level '{name}'")))
}

/// Lists all trust levels, weakest first.
pub fn list_trust_levels(conn: &Connection) -> Result<Vec<TrustLevel>, TrustError> {
    let mut stmt = conn.prepare(&format!("{SELECT_LEVEL} ORDER BY strength ASC, name ASC"))?;
    let rows = stmt.query_map([], map_row_to_level)?;
    let mut levels = Vec::new();
    for row in rows {
        levels.push(row?);
    }
    Ok(levels)
}

/// Renames or re-describes a level. Always permitted.
pub fn update_trust_level_description(
    conn: &Connection,
    audit: &AuditTrail<'_>,
    id: &str,
    name: Option<&str>,
    description: Option<&str>,
    actor: &str,
) -> Result<TrustLevel, TrustError> {
    let mut level = get_trust_level(conn, id)?;

    if let Some(name) = name {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrustError::InvalidArgument(
                "trust level name must not be empty".to_string(),
            ));
        }
        if name != level.name && get_trust_level_by_name(conn, name).is_ok() {
            return Err(TrustError::InvalidState(format!(
                "trust level '{name}' already exists"
            )));
        }
        level.name = name.to_string();
    }
    if let Some(description) = description {
        level.description = description.to_string();
    }
    level.updated_at = now_timestamp();

    conn.execute(
        "UPDATE trust_levels SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            level.name,
            level.description,
            format_timestamp(level.updated_at),
            level.id
        ],
    )?;

    audit.record(
        LogDraft::new(TrustAction::TrustLevelUpdated, actor).details(json!({
            "trust_level_id": level.id,
            "fields": "description",
        })),
    );
    Ok(level)
}

/// Changes strength, tier, defaults or sharing policy.
///
/// # Errors
///
/// `InvalidState` if any active relationship references the level.
pub fn update_trust_level_policy(
    conn: &mut Connection,
    audit: &AuditTrail<'_>,
    id: &str,
    update: &TrustLevelPolicyUpdate,
    actor: &str,
) -> Result<TrustLevel, TrustError> {
    let result = apply_policy_update(conn, id, update);
    match &result {
        Ok(level) => {
            tracing::info!(trust_level = %level.name, "trust level policy updated");
            audit.record(
                LogDraft::new(TrustAction::TrustLevelUpdated, actor).details(json!({
                    "trust_level_id": level.id,
                    "fields": "policy",
                    "strength": level.strength,
                })),
            );
        }
        Err(e) => {
            tracing::warn!(trust_level_id = %id, error = %e, "trust level policy update refused");
            audit.record(
                LogDraft::new(TrustAction::TrustLevelUpdated, actor)
                    .details(json!({ "trust_level_id": id, "fields": "policy" }))
                    .failed(e.to_string()),
            );
        }
    }
    result
}

fn apply_policy_update(
    conn: &mut Connection,
    id: &str,
    update: &TrustLevelPolicyUpdate,
) -> Result<TrustLevel, TrustError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut level = get_trust_level(&tx, id)?;

    if update.is_empty() {
        return Ok(level);
    }

    let active_refs: i64 = tx.query_row(
        "SELECT COUNT(*) FROM trust_relationships
         WHERE trust_level_id = ?1 AND status = 'active'",
        [id],
        |row| row.get(0),
    )?;
    if active_refs > 0 {
        return Err(TrustError::InvalidState(format!(
            "trust level '{}' is referenced by {active_refs} active relationship(s)",
            level.name
        )));
    }

    if let Some(strength) = update.strength {
        level.strength = validate_strength(strength)?;
    }
    if let Some(tier) = update.tier {
        level.tier = tier;
    }
    if let Some(anon) = update.default_anonymization_level {
        level.default_anonymization_level = anon;
    }
    if let Some(access) = update.default_access_level {
        level.default_access_level = access;
    }
    if let Some(policy) = &update.sharing_policy {
        level.sharing_policy = policy.clone();
    }
    level.updated_at = now_timestamp();

    tx.execute(
        "UPDATE trust_levels SET
            tier = ?1, strength = ?2, default_anonymization_level = ?3,
            default_access_level = ?4, sharing_policy_json = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            level.tier.as_str(),
            level.strength,
            level.default_anonymization_level.as_str(),
            level.default_access_level.as_str(),
            serde_json::to_string(&level.sharing_policy)?,
            format_timestamp(level.updated_at),
            level.id,
        ],
    )?;
    tx.commit()?;

    Ok(level)
}

/// Deletes a trust level nothing references.
///
/// # Errors
///
/// `InvalidState` for system-default levels and for levels referenced by
/// any relationship (terminal ones included, since they are kept for audit)
/// or group.
pub fn delete_trust_level(
    conn: &mut Connection,
    audit: &AuditTrail<'_>,
    id: &str,
    actor: &str,
) -> Result<(), TrustError> {
    let result = remove_level(conn, id);
    match &result {
        Ok(name) => {
            tracing::info!(trust_level = %name, "trust level deleted");
            audit.record(
                LogDraft::new(TrustAction::TrustLevelDeleted, actor)
                    .details(json!({ "trust_level_id": id, "name": name })),
            );
        }
        Err(e) => {
            audit.record(
                LogDraft::new(TrustAction::TrustLevelDeleted, actor)
                    .details(json!({ "trust_level_id": id }))
                    .failed(e.to_string()),
            );
        }
    }
    result.map(|_| ())
}

fn remove_level(conn: &mut Connection, id: &str) -> Result<String, TrustError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let level = get_trust_level(&tx, id)?;

    if level.is_system_default {
        return Err(TrustError::InvalidState(format!(
            "trust level '{}' is a system default",
            level.name
        )));
    }

    let references: i64 = tx.query_row(
        "SELECT
            (SELECT COUNT(*) FROM trust_relationships WHERE trust_level_id = ?1)
          + (SELECT COUNT(*) FROM trust_groups WHERE default_trust_level_id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    if references > 0 {
        return Err(TrustError::InvalidState(format!(
            "trust level '{}' is still referenced",
            level.name
        )));
    }

    tx.execute("DELETE FROM trust_levels WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(level.name)
}

/// Installs the built-in levels, skipping any whose name already exists.
///
/// Returns the number of levels inserted.
pub fn seed_system_levels(conn: &Connection) -> Result<usize, TrustError> {
    let seeds = [
        (
            "untrusted",
            "No trust established; nothing is shared.",
            TrustTier::None,
            0,
            AnonymizationLevel::Full,
            AccessLevel::None,
        ),
        (
            "basic",
            "Limited trust; indicators only, heavily anonymized.",
            TrustTier::Low,
            25,
            AnonymizationLevel::Full,
            AccessLevel::Read,
        ),
        (
            "standard",
            "Routine sharing partners.",
            TrustTier::Medium,
            50,
            AnonymizationLevel::Partial,
            AccessLevel::Subscribe,
        ),
        (
            "trusted",
            "Close partners; attribution stripped only.",
            TrustTier::High,
            75,
            AnonymizationLevel::Minimal,
            AccessLevel::Contribute,
        ),
        (
            "complete",
            "Full trust; records shared as-is.",
            TrustTier::Complete,
            100,
            AnonymizationLevel::None,
            AccessLevel::Full,
        ),
    ];

    let mut inserted = 0;
    for (name, description, tier, strength, anon, access) in seeds {
        if get_trust_level_by_name(conn, name).is_ok() {
            continue;
        }
        insert_level(
            conn,
            &NewTrustLevel {
                name: name.to_string(),
                description: description.to_string(),
                tier,
                strength,
                default_anonymization_level: anon,
                default_access_level: access,
                sharing_policy: SharingPolicy::default(),
            },
            true,
            "system",
        )?;
        inserted += 1;
    }

    if inserted > 0 {
        tracing::info!(count = inserted, "seeded system trust levels");
    }
    Ok(inserted)
}

fn map_row_to_level(row: &Row) -> rusqlite::Result<TrustLevel> {
    let tier: String = row.get(3)?;
    let anon: String = row.get(5)?;
    let access: String = row.get(6)?;
    let policy_json: String = row.get(7)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(TrustLevel {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        tier: tier.parse().map_err(|e| label_error(3, e))?,
        strength: row.get(4)?,
        default_anonymization_level: anon.parse().map_err(|e| label_error(5, e))?,
        default_access_level: access.parse().map_err(|e| label_error(6, e))?,
        sharing_policy: serde_json::from_str(&policy_json).map_err(|e| label_error(7, e))?,
        is_system_default: row.get(8)?,
        created_by: row.get(9)?,
        created_at: parse_timestamp(&created_at, 10)?,
        updated_at: parse_timestamp(&updated_at, 11)?,
    })
}
