//! The decision API.

use std::sync::Arc;

use accord_anonymize::{anonymize_record, CustomRules};
use accord_db::{
    create_pool, run_migrations, schema_version, DbPool, DbRuntimeSettings, PooledConnection,
};
use accord_observe::{
    query_log, AuditSink, AuditTrail, LogDraft, LogFilter, PoolAuditSink, TrustAction,
    TrustLogEntry,
};
use accord_policy::{
    with_audit, with_security, AccessContext, AccessStrategy, CommunityAccessStrategy,
    ComplianceDecorator, Decision, Evaluator, PolicyContext, TimeBasedAccessStrategy,
    TrustLevelAccessStrategy,
};
use accord_trust::{
    best_of, GroupMembership, NewRelationship, NewTrustGroup, NewTrustLevel, OpenOrgDirectory,
    OrgDirectory, RelationshipLocks, ResolvedTrust, StaticOrgDirectory, TrustGroup, TrustLevel,
    TrustLevelPolicyUpdate, TrustRelationship, TrustResolution,
};
use accord_types::AnonymizationLevel;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::{Config, StrategyName};
use crate::error::EngineError;

/// A mutation's result plus whether its audit entry was lost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub audit_degraded: bool,
}

/// The result of [`TrustEngine::share_record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedRecord {
    pub decision: Decision,
    /// The anonymized record; `None` when access was denied.
    pub record: Option<Value>,
    /// The level the record was anonymized at.
    pub anonymization_level: Option<AnonymizationLevel>,
}

/// Long-lived service owning the pool, audit sink, identity directory and
/// relationship locks.
///
/// Every method checks out its own connection, so a `TrustEngine` can be
/// shared across threads behind an `Arc`.
pub struct TrustEngine {
    pool: DbPool,
    sink: Arc<dyn AuditSink>,
    directory: Arc<dyn OrgDirectory>,
    locks: RelationshipLocks,
    config: Config,
}

impl TrustEngine {
    /// Opens the database named in `config`, applies migrations and, when
    /// configured, seeds the system trust levels.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Internal` if the configuration is invalid or
    /// the database cannot be prepared.
    pub fn open(config: Config) -> Result<Self, EngineError> {
        config.validate()?;
        let pool = create_pool(
            &config.database.path,
            DbRuntimeSettings {
                busy_timeout_ms: config.database.busy_timeout_ms,
                pool_max_size: config.database.pool_max_size,
            },
        )?;

        {
            let conn = pool.get()?;
            let applied = run_migrations(&conn)?;
            let version = schema_version(&conn)?;
            tracing::info!(
                applied,
                version,
                path = %config.database.path,
                "database schema ready"
            );
            if config.policy.seed_system_levels {
                let seeded = accord_trust::seed_system_levels(&conn)?;
                if seeded > 0 {
                    tracing::info!(count = seeded, "seeded system trust levels");
                }
            }
        }

        let directory: Arc<dyn OrgDirectory> = if config.identity.organizations.is_empty() {
            Arc::new(OpenOrgDirectory)
        } else {
            Arc::new(StaticOrgDirectory::new(config.identity.organizations.iter().cloned()))
        };
        let sink = Arc::new(PoolAuditSink::new(pool.clone()));
        Ok(Self::new(pool, sink, directory, config))
    }

    /// Assembles an engine from parts. The pool must already be migrated.
    pub fn new(
        pool: DbPool,
        sink: Arc<dyn AuditSink>,
        directory: Arc<dyn OrgDirectory>,
        config: Config,
    ) -> Self {
        Self {
            pool,
            sink,
            directory,
            locks: RelationshipLocks::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn conn(&self) -> Result<PooledConnection, EngineError> {
        Ok(self.pool.get()?)
    }

    fn require_org(&self, org: &str, role: &str) -> Result<(), EngineError> {
        if org.trim().is_empty() {
            return Err(EngineError::InvalidArgument(format!("{role} is required")));
        }
        if !self.directory.org_exists(org) {
            return Err(EngineError::NotFound(format!("organization {org}")));
        }
        Ok(())
    }

    // ── Decisions ──────────────────────────────────────────────────────

    fn strategies(&self) -> PolicyContext {
        let mut policy = PolicyContext::new();
        for name in &self.config.policy.strategies {
            let strategy: Box<dyn AccessStrategy> = match name {
                StrategyName::TrustLevel => Box::new(TrustLevelAccessStrategy::new(
                    self.config.policy.minimum_trust_strength,
                )),
                StrategyName::Community => Box::new(CommunityAccessStrategy),
                StrategyName::TimeBased => Box::new(TimeBasedAccessStrategy),
            };
            policy.add_strategy(strategy);
        }
        policy
    }

    /// The configured decorator chain around the configured strategies.
    /// Audit is always outermost so it records the final decision.
    fn evaluator(&self) -> Box<dyn Evaluator> {
        let mut chain: Box<dyn Evaluator> = Box::new(self.strategies());
        if self.config.security.enabled {
            chain = with_security(chain, self.config.security.settings());
        }
        if self.config.compliance.enabled {
            chain = Box::new(ComplianceDecorator::with_thresholds(
                chain,
                &self.config.compliance.framework,
                &self.config.compliance.retention_thresholds,
            ));
        }
        with_audit(chain, self.sink.clone(), self.config.audit.level)
    }

    /// Materializes the trust between two organizations.
    pub fn resolve(&self, org_a: &str, org_b: &str) -> Result<TrustResolution, EngineError> {
        let conn = self.conn()?;
        Ok(accord_trust::resolve_trust(&conn, org_a, org_b)?)
    }

    fn access_context(
        &self,
        requesting_org: &str,
        target_org: &str,
        resource_kind: &str,
        hints: Map<String, Value>,
    ) -> Result<AccessContext, EngineError> {
        self.require_org(requesting_org, "requesting organization")?;
        self.require_org(target_org, "target organization")?;
        if requesting_org == target_org {
            return Err(EngineError::InvalidArgument(
                "requesting and target organization must differ".to_string(),
            ));
        }
        let resolution = self.resolve(requesting_org, target_org)?;
        Ok(AccessContext::new(requesting_org, target_org, resource_kind)
            .with_resolution(resolution)
            .with_hints(hints))
    }

    /// Decides whether `requesting_org` may access `target_org`'s data.
    ///
    /// Denial is a normal result. Errors are reserved for malformed
    /// requests and infrastructure failure.
    pub fn evaluate_access(
        &self,
        requesting_org: &str,
        target_org: &str,
        resource_kind: &str,
        hints: Map<String, Value>,
    ) -> Result<Decision, EngineError> {
        let ctx = self.access_context(requesting_org, target_org, resource_kind, hints)?;
        let decision = self.evaluator().evaluate(&ctx);
        log_decision(&ctx, &decision);
        Ok(decision)
    }

    /// Anonymizes a record at `level` without any access check.
    pub fn anonymize_record(
        &self,
        record: &Value,
        level: AnonymizationLevel,
        rules: Option<&CustomRules>,
    ) -> Result<Value, EngineError> {
        Ok(anonymize_record(
            record,
            level,
            rules,
            self.config.anonymization.custom_fallback,
        )?)
    }

    /// Evaluates access and, when allowed, returns the record anonymized at
    /// the governing relationship's effective level.
    pub fn share_record(
        &self,
        requesting_org: &str,
        target_org: &str,
        resource_kind: &str,
        record: &Value,
        hints: Map<String, Value>,
        rules: Option<&CustomRules>,
    ) -> Result<SharedRecord, EngineError> {
        let ctx = self.access_context(requesting_org, target_org, resource_kind, hints)?;
        let mut decision = self.evaluator().evaluate(&ctx);
        log_decision(&ctx, &decision);

        if !decision.allowed {
            return Ok(SharedRecord {
                decision,
                record: None,
                anonymization_level: None,
            });
        }

        let level = governing_trust(&ctx)
            .map(ResolvedTrust::effective_anonymization_level)
            .unwrap_or(AnonymizationLevel::Full);
        let shared = self.anonymize_record(record, level, rules)?;

        let mut draft = LogDraft::new(TrustAction::RecordAnonymized, requesting_org)
            .orgs(requesting_org, target_org)
            .details(json!({
                "resource_kind": resource_kind,
                "anonymization_level": level,
                "custom_rules": rules.is_some(),
            }));
        if let Some(trust) = governing_trust(&ctx) {
            draft = draft.relationship(&trust.relationship.id);
        }
        let audit = AuditTrail::new(self.sink.as_ref());
        audit.record(draft);
        decision.audit_degraded |= audit.degraded();

        Ok(SharedRecord {
            decision,
            record: Some(shared),
            anonymization_level: Some(level),
        })
    }

    // ── Relationships ──────────────────────────────────────────────────

    pub fn create_relationship(
        &self,
        params: &NewRelationship,
        actor: &str,
    ) -> Result<Outcome<TrustRelationship>, EngineError> {
        let audit = AuditTrail::deferred(self.sink.as_ref());
        let mut conn = self.conn()?;
        let rel = accord_trust::create_relationship(
            &mut conn,
            self.directory.as_ref(),
            &audit,
            params,
            actor,
        )?;
        Ok(settle(rel, conn, &audit))
    }

    /// Records `approving_org`'s approval. The value is whether the
    /// relationship is now active.
    pub fn approve_relationship(
        &self,
        relationship_id: &str,
        approving_org: &str,
        actor: &str,
    ) -> Result<Outcome<bool>, EngineError> {
        let handle = self.locks.handle(relationship_id);
        let _guard = RelationshipLocks::acquire(&handle);
        let audit = AuditTrail::deferred(self.sink.as_ref());
        let mut conn = self.conn()?;
        let activated = accord_trust::approve_relationship(
            &mut conn,
            &audit,
            relationship_id,
            approving_org,
            actor,
        )?;
        Ok(settle(activated, conn, &audit))
    }

    pub fn suspend_relationship(
        &self,
        relationship_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<Outcome<TrustRelationship>, EngineError> {
        self.transition(relationship_id, |conn, audit| {
            accord_trust::suspend_relationship(conn, audit, relationship_id, actor, reason)
        })
    }

    pub fn reinstate_relationship(
        &self,
        relationship_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<Outcome<TrustRelationship>, EngineError> {
        self.transition(relationship_id, |conn, audit| {
            accord_trust::reinstate_relationship(conn, audit, relationship_id, actor, reason)
        })
    }

    pub fn revoke_relationship(
        &self,
        relationship_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<Outcome<TrustRelationship>, EngineError> {
        self.transition(relationship_id, |conn, audit| {
            accord_trust::revoke_relationship(conn, audit, relationship_id, actor, reason)
        })
    }

    /// Runs a state transition while holding the relationship's lock.
    fn transition<F>(
        &self,
        relationship_id: &str,
        apply: F,
    ) -> Result<Outcome<TrustRelationship>, EngineError>
    where
        F: FnOnce(
            &mut rusqlite::Connection,
            &AuditTrail<'_>,
        ) -> Result<TrustRelationship, accord_trust::TrustError>,
    {
        let handle = self.locks.handle(relationship_id);
        let _guard = RelationshipLocks::acquire(&handle);
        let audit = AuditTrail::deferred(self.sink.as_ref());
        let mut conn = self.conn()?;
        let rel = apply(&mut conn, &audit)?;
        Ok(settle(rel, conn, &audit))
    }

    pub fn get_relationship(
        &self,
        relationship_id: &str,
    ) -> Result<TrustRelationship, EngineError> {
        let conn = self.conn()?;
        Ok(accord_trust::get_relationship(&conn, relationship_id)?)
    }

    /// Every relationship `org` is a party to, newest first.
    pub fn list_relationships(&self, org: &str) -> Result<Vec<TrustRelationship>, EngineError> {
        let conn = self.conn()?;
        Ok(accord_trust::list_relationships_for(&conn, org)?)
    }

    // ── Groups ─────────────────────────────────────────────────────────

    pub fn create_group(
        &self,
        params: &NewTrustGroup,
        creator_org: &str,
        actor: &str,
    ) -> Result<Outcome<TrustGroup>, EngineError> {
        let audit = AuditTrail::deferred(self.sink.as_ref());
        let mut conn = self.conn()?;
        let group = accord_trust::create_group(
            &mut conn,
            self.directory.as_ref(),
            &audit,
            params,
            creator_org,
            actor,
        )?;
        Ok(settle(group, conn, &audit))
    }

    pub fn join_group(
        &self,
        group_id: &str,
        org: &str,
        invited_by: Option<&str>,
        actor: &str,
    ) -> Result<Outcome<GroupMembership>, EngineError> {
        let audit = AuditTrail::deferred(self.sink.as_ref());
        let mut conn = self.conn()?;
        let membership = accord_trust::join_group(
            &mut conn,
            self.directory.as_ref(),
            &audit,
            group_id,
            org,
            invited_by,
            actor,
        )?;
        Ok(settle(membership, conn, &audit))
    }

    pub fn leave_group(
        &self,
        group_id: &str,
        org: &str,
        actor: &str,
    ) -> Result<Outcome<()>, EngineError> {
        let audit = AuditTrail::deferred(self.sink.as_ref());
        let mut conn = self.conn()?;
        accord_trust::leave_group(&mut conn, &audit, group_id, org, actor)?;
        Ok(settle((), conn, &audit))
    }

    pub fn list_group_members(
        &self,
        group_id: &str,
        include_inactive: bool,
    ) -> Result<Vec<GroupMembership>, EngineError> {
        let conn = self.conn()?;
        Ok(accord_trust::list_group_members(&conn, group_id, include_inactive)?)
    }

    pub fn list_groups(&self, public_only: bool) -> Result<Vec<TrustGroup>, EngineError> {
        let conn = self.conn()?;
        Ok(accord_trust::list_groups(&conn, public_only)?)
    }

    // ── Trust levels ───────────────────────────────────────────────────

    pub fn create_trust_level(
        &self,
        params: &NewTrustLevel,
        actor: &str,
    ) -> Result<Outcome<TrustLevel>, EngineError> {
        let audit = AuditTrail::deferred(self.sink.as_ref());
        let conn = self.conn()?;
        let level = accord_trust::create_trust_level(&conn, &audit, params, actor)?;
        Ok(settle(level, conn, &audit))
    }

    pub fn list_trust_levels(&self) -> Result<Vec<TrustLevel>, EngineError> {
        let conn = self.conn()?;
        Ok(accord_trust::list_trust_levels(&conn)?)
    }

    pub fn get_trust_level_by_name(&self, name: &str) -> Result<TrustLevel, EngineError> {
        let conn = self.conn()?;
        Ok(accord_trust::get_trust_level_by_name(&conn, name)?)
    }

    pub fn update_trust_level_description(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
        actor: &str,
    ) -> Result<Outcome<TrustLevel>, EngineError> {
        let audit = AuditTrail::deferred(self.sink.as_ref());
        let conn = self.conn()?;
        let level = accord_trust::update_trust_level_description(
            &conn,
            &audit,
            id,
            name,
            description,
            actor,
        )?;
        Ok(settle(level, conn, &audit))
    }

    pub fn update_trust_level_policy(
        &self,
        id: &str,
        update: &TrustLevelPolicyUpdate,
        actor: &str,
    ) -> Result<Outcome<TrustLevel>, EngineError> {
        let audit = AuditTrail::deferred(self.sink.as_ref());
        let mut conn = self.conn()?;
        let level = accord_trust::update_trust_level_policy(&mut conn, &audit, id, update, actor)?;
        Ok(settle(level, conn, &audit))
    }

    pub fn delete_trust_level(&self, id: &str, actor: &str) -> Result<Outcome<()>, EngineError> {
        let audit = AuditTrail::deferred(self.sink.as_ref());
        let mut conn = self.conn()?;
        accord_trust::delete_trust_level(&mut conn, &audit, id, actor)?;
        Ok(settle((), conn, &audit))
    }

    // ── Audit ──────────────────────────────────────────────────────────

    pub fn query_audit_log(&self, filter: &LogFilter) -> Result<Vec<TrustLogEntry>, EngineError> {
        let conn = self.conn()?;
        Ok(query_log(&conn, filter)?)
    }
}

/// Returns the connection to the pool, then writes the queued audit
/// entries. The sink checks out a connection of its own, so appending while
/// `conn` is held can exhaust a small pool.
fn settle<T>(value: T, conn: PooledConnection, audit: &AuditTrail<'_>) -> Outcome<T> {
    drop(conn);
    audit.flush();
    Outcome {
        value,
        audit_degraded: audit.degraded(),
    }
}

/// The relationship whose anonymization level applies: the primary one
/// when effective, otherwise the strongest effective candidate.
fn governing_trust(ctx: &AccessContext) -> Option<&ResolvedTrust> {
    match &ctx.relationship {
        Some(trust) if trust.is_effective(ctx.now) => Some(trust),
        _ => best_of(ctx.candidates(), ctx.now),
    }
}

fn log_decision(ctx: &AccessContext, decision: &Decision) {
    if decision.allowed {
        tracing::info!(
            requesting_org = %ctx.requesting_org,
            target_org = %ctx.target_org,
            resource_kind = %ctx.resource_kind,
            access_level = %decision.access_level,
            "access granted"
        );
    } else {
        tracing::warn!(
            requesting_org = %ctx.requesting_org,
            target_org = %ctx.target_org,
            resource_kind = %ctx.resource_kind,
            reasons = ?decision.reasons,
            "access denied"
        );
    }
    if decision.audit_degraded {
        tracing::warn!(
            requesting_org = %ctx.requesting_org,
            target_org = %ctx.target_org,
            "access decision returned without an audit entry"
        );
    }
}
