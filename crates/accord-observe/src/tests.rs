//! Unit tests for the trust log.

use chrono::{Duration, Utc};
use rusqlite::Connection;
use serde_json::json;

use crate::entry::{LogDraft, TrustAction};
use crate::error::ObserveError;
use crate::sink::{append_or_warn, AuditSink, AuditTrail, MemoryAuditSink};
use crate::store::{append_entry, query_log, LogFilter};

/// Creates an in-memory SQLite database with migrations applied.
fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    accord_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

fn created(source: &str, target: &str, rel: &str) -> LogDraft {
    LogDraft::new(TrustAction::RelationshipCreated, "analyst@org-a")
        .orgs(source, target)
        .relationship(rel)
}

// ── append_entry ─────────────────────────────────────────────────────

#[test]
fn append_entry_inserts_row() {
    let conn = test_db();

    let entry = append_entry(
        &conn,
        &created("org-a", "org-b", "rel-1").details(json!({"trust_level": "standard"})),
    )
    .expect("append should succeed");

    assert!(entry.id > 0, "returned row ID should be positive");
    assert_eq!(entry.action, "relationship_created");

    let (action, source, details): (String, String, String) = conn
        .query_row(
            "SELECT action, source_org, details_json FROM trust_log WHERE id = ?1",
            [entry.id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("should query inserted row");

    assert_eq!(action, "relationship_created");
    assert_eq!(source, "org-a");
    let details: serde_json::Value = serde_json::from_str(&details).unwrap();
    assert_eq!(details["trust_level"], "standard");
}

#[test]
fn append_entry_ids_increase() {
    let conn = test_db();
    let first = append_entry(&conn, &created("org-a", "org-b", "rel-1")).unwrap();
    let second = append_entry(&conn, &created("org-a", "org-c", "rel-2")).unwrap();
    assert!(second.id > first.id);
}

#[test]
fn entries_cannot_be_updated() {
    let conn = test_db();
    let entry = append_entry(&conn, &created("org-a", "org-b", "rel-1")).unwrap();

    let result = conn.execute(
        "UPDATE trust_log SET success = 0 WHERE id = ?1",
        [entry.id],
    );
    assert!(result.is_err(), "trust_log must refuse updates");
}

#[test]
fn failed_drafts_store_reason() {
    let conn = test_db();
    let draft = LogDraft::new(TrustAction::RelationshipActivated, "mallory@org-x")
        .orgs("org-a", "org-b")
        .relationship("rel-1")
        .failed("approver is not a party to the relationship");

    let entry = append_entry(&conn, &draft).unwrap();
    assert!(!entry.success);

    let stored = query_log(
        &conn,
        &LogFilter {
            success: Some(false),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].failure_reason.as_deref(),
        Some("approver is not a party to the relationship")
    );
}

// ── query_log ────────────────────────────────────────────────────────

#[test]
fn query_without_filters_returns_everything_oldest_first() {
    let conn = test_db();
    append_entry(&conn, &created("org-a", "org-b", "rel-1")).unwrap();
    append_entry(&conn, &created("org-c", "org-d", "rel-2")).unwrap();

    let entries = query_log(&conn, &LogFilter::default()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].relationship_id.as_deref(), Some("rel-1"));
    assert_eq!(entries[1].relationship_id.as_deref(), Some("rel-2"));
}

#[test]
fn query_by_organization_matches_either_side() {
    let conn = test_db();
    append_entry(&conn, &created("org-a", "org-b", "rel-1")).unwrap();
    append_entry(&conn, &created("org-c", "org-a", "rel-2")).unwrap();
    append_entry(&conn, &created("org-c", "org-d", "rel-3")).unwrap();

    let entries = query_log(
        &conn,
        &LogFilter {
            organization: Some("org-a".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(entries.len(), 2);
}

#[test]
fn query_by_action_and_relationship() {
    let conn = test_db();
    append_entry(&conn, &created("org-a", "org-b", "rel-1")).unwrap();
    append_entry(
        &conn,
        &LogDraft::new(TrustAction::RelationshipActivated, "ops@org-b")
            .orgs("org-a", "org-b")
            .relationship("rel-1"),
    )
    .unwrap();
    append_entry(
        &conn,
        &LogDraft::new(TrustAction::RelationshipActivated, "ops@org-d")
            .orgs("org-c", "org-d")
            .relationship("rel-2"),
    )
    .unwrap();

    let entries = query_log(
        &conn,
        &LogFilter {
            action: Some(TrustAction::RelationshipActivated),
            relationship_id: Some("rel-1".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor, "ops@org-b");
}

#[test]
fn query_respects_limit_and_since() {
    let conn = test_db();
    for i in 0..5 {
        append_entry(&conn, &created("org-a", "org-b", &format!("rel-{i}"))).unwrap();
    }

    let limited = query_log(
        &conn,
        &LogFilter {
            limit: Some(2),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(limited.len(), 2);

    let future = query_log(
        &conn,
        &LogFilter {
            since: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        },
    )
    .unwrap();
    assert!(future.is_empty());

    let past = query_log(
        &conn,
        &LogFilter {
            since: Some(Utc::now() - Duration::hours(1)),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(past.len(), 5);
}

// ── sinks ────────────────────────────────────────────────────────────

#[test]
fn memory_sink_assigns_sequential_ids() {
    let sink = MemoryAuditSink::new();
    let a = sink.append(&created("org-a", "org-b", "rel-1")).unwrap();
    let b = sink.append(&created("org-a", "org-b", "rel-1")).unwrap();
    assert_eq!(a.id, 1);
    assert_eq!(b.id, 2);
    assert_eq!(sink.entries().len(), 2);
}

struct BrokenSink;

impl AuditSink for BrokenSink {
    fn append(&self, _draft: &LogDraft) -> Result<crate::TrustLogEntry, ObserveError> {
        Err(ObserveError::Unavailable("disk full".to_string()))
    }
}

#[test]
fn append_or_warn_swallows_failures() {
    assert!(append_or_warn(&BrokenSink, created("org-a", "org-b", "rel-1")).is_none());

    let sink = MemoryAuditSink::new();
    let entry = append_or_warn(&sink, created("org-a", "org-b", "rel-1"));
    assert_eq!(entry.map(|e| e.id), Some(1));
}

#[test]
fn audit_trail_flags_degraded_appends() {
    let healthy = MemoryAuditSink::new();
    let trail = AuditTrail::new(&healthy);
    assert!(trail.record(created("org-a", "org-b", "rel-1")).is_some());
    assert!(!trail.degraded());

    let trail = AuditTrail::new(&BrokenSink);
    assert!(trail.record(created("org-a", "org-b", "rel-1")).is_none());
    assert!(trail.record(created("org-a", "org-b", "rel-1")).is_none());
    assert!(trail.degraded());
}

#[test]
fn deferred_trail_writes_on_flush() {
    let sink = MemoryAuditSink::new();
    let trail = AuditTrail::deferred(&sink);
    assert!(trail.record(created("org-a", "org-b", "rel-1")).is_none());
    assert!(trail.record(created("org-a", "org-c", "rel-2")).is_none());
    assert!(sink.entries().is_empty());

    assert_eq!(trail.flush(), 2);
    let entries = sink.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].relationship_id.as_deref(), Some("rel-1"));
    assert_eq!(entries[1].relationship_id.as_deref(), Some("rel-2"));
    assert!(!trail.degraded());

    // Already drained.
    assert_eq!(trail.flush(), 0);
    drop(trail);
    assert_eq!(sink.entries().len(), 2);
}

#[test]
fn deferred_trail_flushes_on_drop() {
    let sink = MemoryAuditSink::new();
    {
        let trail = AuditTrail::deferred(&sink);
        trail.record(created("org-a", "org-b", "rel-1"));
    }
    assert_eq!(sink.entries().len(), 1);
}

#[test]
fn deferred_trail_flags_failed_flush() {
    let trail = AuditTrail::deferred(&BrokenSink);
    trail.record(created("org-a", "org-b", "rel-1"));
    assert!(!trail.degraded());
    assert_eq!(trail.flush(), 0);
    assert!(trail.degraded());
}

#[test]
fn action_labels_round_trip() {
    for action in [
        TrustAction::TrustLevelCreated,
        TrustAction::RelationshipApprovalPartial,
        TrustAction::GroupLeft,
        TrustAction::RecordAnonymized,
    ] {
        assert_eq!(action.as_str().parse::<TrustAction>().unwrap(), action);
    }
    assert!("relationship_exploded".parse::<TrustAction>().is_err());
}
