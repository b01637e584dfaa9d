//! Persistence operations for the trust log.
//!
//! All writes go through [`append_entry`], which serialises the details and
//! inserts a single row. Reads go through [`query_log`], which supports
//! filtering by action, organization, relationship, outcome, and time.

use accord_db::{format_timestamp, now_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Deserialize;

use crate::entry::{LogDraft, TrustAction, TrustLogEntry};
use crate::error::ObserveError;

/// Appends a single entry to the trust log.
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure or
/// `ObserveError::Serialization` if the details cannot be serialised.
pub fn append_entry(conn: &Connection, draft: &LogDraft) -> Result<TrustLogEntry, ObserveError> {
    let details_json = serde_json::to_string(&draft.details)?;
    let occurred_at = now_timestamp();

    let id = conn.query_row(
        "INSERT INTO trust_log
            (action, source_org, target_org, relationship_id, actor, success,
             failure_reason, details_json, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         RETURNING id",
        params![
            draft.action.as_str(),
            draft.source_org,
            draft.target_org,
            draft.relationship_id,
            draft.actor,
            draft.success,
            draft.failure_reason,
            details_json,
            format_timestamp(occurred_at),
        ],
        |row| row.get::<_, i64>(0),
    )?;

    Ok(TrustLogEntry {
        id,
        action: draft.action.as_str().to_string(),
        source_org: draft.source_org.clone(),
        target_org: draft.target_org.clone(),
        relationship_id: draft.relationship_id.clone(),
        actor: draft.actor.clone(),
        success: draft.success,
        failure_reason: draft.failure_reason.clone(),
        details: draft.details.clone(),
        occurred_at,
    })
}

/// Filter criteria for querying the trust log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    /// Filter by action.
    pub action: Option<TrustAction>,
    /// Match entries where this organization is source or target.
    pub organization: Option<String>,
    /// Filter by relationship reference.
    pub relationship_id: Option<String>,
    /// Filter by outcome.
    pub success: Option<bool>,
    /// Return entries that occurred at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of entries to return (default: 100).
    pub limit: Option<i64>,
}

/// Queries the trust log with optional filters.
///
/// Results are returned oldest first, bounded by `filter.limit`
/// (default 100).
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure.
pub fn query_log(
    conn: &Connection,
    filter: &LogFilter,
) -> Result<Vec<TrustLogEntry>, ObserveError> {
    // WHERE clauses and bind parameters are collected separately so nothing
    // is interpolated.
    let mut clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(action) = filter.action {
        clauses.push(format!("action = ?{idx}"));
        param_values.push(Box::new(action.as_str().to_string()));
        idx += 1;
    }

    if let Some(ref org) = filter.organization {
        clauses.push(format!("(source_org = ?{idx} OR target_org = ?{idx})"));
        param_values.push(Box::new(org.clone()));
        idx += 1;
    }

    if let Some(ref relationship_id) = filter.relationship_id {
        clauses.push(format!("relationship_id = ?{idx}"));
        param_values.push(Box::new(relationship_id.clone()));
        idx += 1;
    }

    if let Some(success) = filter.success {
        clauses.push(format!("success = ?{idx}"));
        param_values.push(Box::new(success));
        idx += 1;
    }

    if let Some(since) = filter.since {
        clauses.push(format!("occurred_at >= ?{idx}"));
        param_values.push(Box::new(format_timestamp(since)));
        idx += 1;
    }

    let where_clause = if clauses.is_empty() {
        "1 = 1".to_string()
    } else {
        clauses.join(" AND ")
    };
    let sql = format!(
        "SELECT id, action, source_org, target_org, relationship_id, actor, success,
                failure_reason, details_json, occurred_at
         FROM trust_log
         WHERE {where_clause}
         ORDER BY id ASC
         LIMIT ?{idx}"
    );

    param_values.push(Box::new(filter.limit.unwrap_or(100)));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), map_row_to_entry)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }

    Ok(entries)
}

fn map_row_to_entry(row: &Row) -> rusqlite::Result<TrustLogEntry> {
    let details_json: String = row.get(8)?;
    let details = serde_json::from_str(&details_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let occurred_at: String = row.get(9)?;

    Ok(TrustLogEntry {
        id: row.get(0)?,
        action: row.get(1)?,
        source_org: row.get(2)?,
        target_org: row.get(3)?,
        relationship_id: row.get(4)?,
        actor: row.get(5)?,
        success: row.get(6)?,
        failure_reason: row.get(7)?,
        details,
        occurred_at: parse_timestamp(&occurred_at, 9)?,
    })
}
