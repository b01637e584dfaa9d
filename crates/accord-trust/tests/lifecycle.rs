//! Relationship lifecycle scenarios against a migrated in-memory database.

use accord_observe::{AuditTrail, MemoryAuditSink};
use accord_trust::{
    approve_relationship, create_relationship, create_trust_level, get_relationship,
    resolve_trust, revoke_relationship, update_trust_level_policy, NewRelationship,
    NewTrustLevel, OpenOrgDirectory, TrustError, TrustLevelPolicyUpdate,
};
use accord_types::{
    AccessLevel, AnonymizationLevel, RelationshipKind, RelationshipStatus, SharingPolicy,
    TrustTier,
};
use chrono::{Duration, Utc};
use rusqlite::Connection;

fn setup() -> Connection {
    let conn = Connection::open_in_memory().expect("open");
    accord_db::run_migrations(&conn).expect("migrations");
    conn
}

fn standard() -> NewTrustLevel {
    NewTrustLevel {
        name: "Standard".to_string(),
        description: "routine partners".to_string(),
        tier: TrustTier::Medium,
        strength: 50,
        default_anonymization_level: AnonymizationLevel::Partial,
        default_access_level: AccessLevel::Read,
        sharing_policy: SharingPolicy::default(),
    }
}

#[test]
fn standard_bilateral_scenario() {
    let mut conn = setup();
    let sink = MemoryAuditSink::new();
    let audit = AuditTrail::new(&sink);

    create_trust_level(&conn, &audit, &standard(), "admin").expect("level");
    let rel = create_relationship(
        &mut conn,
        &OpenOrgDirectory,
        &audit,
        &NewRelationship::new("org-a", "org-b", "Standard", RelationshipKind::Bilateral),
        "analyst@org-a",
    )
    .expect("create");

    assert!(!approve_relationship(&mut conn, &audit, &rel.id, "org-a", "a").expect("approve a"));
    assert!(approve_relationship(&mut conn, &audit, &rel.id, "org-b", "b").expect("approve b"));

    let stored = get_relationship(&conn, &rel.id).expect("fetch");
    assert_eq!(stored.status, RelationshipStatus::Active);
    assert!(stored.is_effective(Utc::now()));
    assert!(stored.activated_at.is_some());
}

#[test]
fn referenced_level_policy_is_frozen() {
    let mut conn = setup();
    let sink = MemoryAuditSink::new();
    let audit = AuditTrail::new(&sink);

    let level = create_trust_level(&conn, &audit, &standard(), "admin").expect("level");
    let rel = create_relationship(
        &mut conn,
        &OpenOrgDirectory,
        &audit,
        &NewRelationship::new("org-a", "org-b", "Standard", RelationshipKind::Bilateral),
        "a",
    )
    .expect("create");
    approve_relationship(&mut conn, &audit, &rel.id, "org-a", "a").expect("approve a");
    approve_relationship(&mut conn, &audit, &rel.id, "org-b", "b").expect("approve b");

    let update = TrustLevelPolicyUpdate {
        strength: Some(10),
        ..Default::default()
    };
    let err = update_trust_level_policy(&mut conn, &audit, &level.id, &update, "admin")
        .expect_err("active reference freezes policy");
    assert!(matches!(err, TrustError::InvalidState(_)));

    revoke_relationship(&mut conn, &audit, &rel.id, "admin", "wind down").expect("revoke");
    let updated = update_trust_level_policy(&mut conn, &audit, &level.id, &update, "admin")
        .expect("unfrozen after revoke");
    assert_eq!(updated.strength, 10);
}

#[test]
fn expired_direct_relationship_reports_expired() {
    let mut conn = setup();
    let sink = MemoryAuditSink::new();
    let audit = AuditTrail::new(&sink);

    create_trust_level(&conn, &audit, &standard(), "admin").expect("level");
    let mut params =
        NewRelationship::new("org-a", "org-b", "Standard", RelationshipKind::Bilateral);
    params.valid_from = Some(Utc::now() - Duration::days(10));
    params.valid_until = Some(Utc::now() - Duration::days(1));
    let rel =
        create_relationship(&mut conn, &OpenOrgDirectory, &audit, &params, "a").expect("create");
    approve_relationship(&mut conn, &audit, &rel.id, "org-a", "a").expect("approve a");
    approve_relationship(&mut conn, &audit, &rel.id, "org-b", "b").expect("approve b");

    let resolution = resolve_trust(&conn, "org-a", "org-b").expect("resolve");
    let direct = resolution.direct.expect("direct relationship");
    let now = Utc::now();
    assert_eq!(direct.relationship.status, RelationshipStatus::Active);
    assert_eq!(direct.relationship.derived_status(now), RelationshipStatus::Expired);
    assert!(!direct.is_effective(now));
}
