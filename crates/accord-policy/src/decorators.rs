//! Decision enhancement chain.
//!
//! Decorators wrap an inner [`Evaluator`] and only ever add keys to
//! [`Decision::extra`]. None of them widens `allowed` or `access_level`.
//! Chains are built by successive wrapping:
//!
//! ```rust,ignore
//! let chain = with_audit(
//!     with_compliance(with_security(Box::new(policy), SecuritySettings::default()), "gdpr"),
//!     sink,
//!     AuditLevel::Basic,
//! );
//! let decision = chain.evaluate(&ctx);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use accord_observe::{append_or_warn, AuditSink, LogDraft, TrustAction};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::context::AccessContext;
use crate::evaluation::{Decision, Evaluator};

/// Marker written in place of sensitive values.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEY_FRAGMENTS: &[&str] = &["password", "token", "key", "secret"];

/// Normal working hours, in whole UTC hours. `start > end` wraps midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    pub level: String,
    pub normal_hours_start: u32,
    pub normal_hours_end: u32,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            level: "standard".to_string(),
            normal_hours_start: 8,
            normal_hours_end: 18,
        }
    }
}

impl SecuritySettings {
    pub fn within_normal_hours(&self, hour: u32) -> bool {
        let (start, end) = (self.normal_hours_start, self.normal_hours_end);
        if start == end {
            return true;
        }
        if start < end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}

/// Flags access requested outside normal hours. Never denies.
pub struct SecurityEnhancementDecorator {
    inner: Box<dyn Evaluator>,
    settings: SecuritySettings,
}

impl SecurityEnhancementDecorator {
    pub fn new(inner: Box<dyn Evaluator>, settings: SecuritySettings) -> Self {
        Self { inner, settings }
    }
}

impl Evaluator for SecurityEnhancementDecorator {
    fn evaluate(&self, ctx: &AccessContext) -> Decision {
        let mut decision = self.inner.evaluate(ctx);
        let hour = ctx.now.hour();
        if !self.settings.within_normal_hours(hour) {
            tracing::warn!(
                requesting_org = %ctx.requesting_org,
                target_org = %ctx.target_org,
                hour,
                "access requested outside normal hours"
            );
            decision.annotate(
                "security_warning",
                format!(
                    "access requested at {hour:02}:00 UTC, outside normal hours {:02}:00-{:02}:00",
                    self.settings.normal_hours_start, self.settings.normal_hours_end
                ),
            );
        }
        decision.annotate("security_enhanced", true);
        decision.annotate("security_level", self.settings.level.clone());
        decision
    }
}

/// Built-in retention limits in days, keyed by framework name.
pub fn default_retention_thresholds() -> HashMap<String, i64> {
    [("gdpr", 365), ("hipaa", 2190), ("sox", 2555), ("pci_dss", 365)]
        .into_iter()
        .map(|(name, days)| (name.to_string(), days))
        .collect()
}

/// Compares the `data_retention_days` hint against the framework limit.
/// Informational only.
pub struct ComplianceDecorator {
    inner: Box<dyn Evaluator>,
    framework: String,
    threshold_days: Option<i64>,
}

impl ComplianceDecorator {
    /// Uses the built-in threshold for `framework`, if there is one.
    pub fn new(inner: Box<dyn Evaluator>, framework: &str) -> Self {
        let threshold_days = default_retention_thresholds()
            .get(&framework.to_ascii_lowercase())
            .copied();
        Self {
            inner,
            framework: framework.to_string(),
            threshold_days,
        }
    }

    /// Looks `framework` up in `thresholds` first, then in the built-ins.
    pub fn with_thresholds(
        inner: Box<dyn Evaluator>,
        framework: &str,
        thresholds: &HashMap<String, i64>,
    ) -> Self {
        let key = framework.to_ascii_lowercase();
        let mut decorator = Self::new(inner, framework);
        if let Some(days) = thresholds.get(&key).or_else(|| thresholds.get(framework)) {
            decorator.threshold_days = Some(*days);
        }
        decorator
    }
}

impl Evaluator for ComplianceDecorator {
    fn evaluate(&self, ctx: &AccessContext) -> Decision {
        let mut decision = self.inner.evaluate(ctx);
        let retention = ctx.numeric_hint("data_retention_days");
        if let (Some(limit), Some(days)) = (self.threshold_days, retention) {
            if days > limit {
                decision.annotate(
                    "compliance_warning",
                    format!(
                        "data retention of {days} days exceeds the {} limit of {limit} days",
                        self.framework
                    ),
                );
            }
        }
        decision.annotate("compliance_validated", true);
        decision.annotate("compliance_framework", self.framework.clone());
        decision
    }
}

/// How much of the context the audit entry captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    #[default]
    Basic,
    Detailed,
}

/// Records every decision in the audit log.
pub struct AuditDecorator {
    inner: Box<dyn Evaluator>,
    sink: Arc<dyn AuditSink>,
    level: AuditLevel,
}

impl AuditDecorator {
    pub fn new(inner: Box<dyn Evaluator>, sink: Arc<dyn AuditSink>, level: AuditLevel) -> Self {
        Self { inner, sink, level }
    }

    fn details(&self, ctx: &AccessContext, decision: &Decision) -> Value {
        let mut details = json!({
            "resource_kind": ctx.resource_kind,
            "access_level": decision.access_level,
            "hints": redact_sensitive(&Value::Object(ctx.hints.clone())),
        });
        if self.level == AuditLevel::Detailed {
            details["reasons"] = json!(decision.reasons);
            details["extra"] = redact_sensitive(&Value::Object(decision.extra.clone()));
            details["evaluated_at"] = json!(ctx.now);
            if let Some(trust) = &ctx.relationship {
                details["trust_level"] = json!(trust.trust_level.name);
                details["trust_strength"] = json!(trust.strength());
            }
            details["group_trust"] = json!(ctx
                .group_trust
                .iter()
                .map(|t| t.relationship.id.as_str())
                .collect::<Vec<_>>());
        }
        details
    }
}

impl Evaluator for AuditDecorator {
    fn evaluate(&self, ctx: &AccessContext) -> Decision {
        let mut decision = self.inner.evaluate(ctx);

        let mut draft = LogDraft::new(TrustAction::AccessEvaluated, &ctx.requesting_org)
            .orgs(&ctx.requesting_org, &ctx.target_org)
            .details(self.details(ctx, &decision));
        if let Some(trust) = &ctx.relationship {
            draft = draft.relationship(&trust.relationship.id);
        }
        if !decision.allowed {
            draft = draft.failed(decision.reasons.join("; "));
        }

        match append_or_warn(self.sink.as_ref(), draft) {
            Some(entry) => {
                decision.annotate("audit_logged", true);
                decision.annotate("audit_reference", entry.id);
            }
            None => {
                decision.annotate("audit_logged", false);
                decision.audit_degraded = true;
            }
        }
        decision
    }
}

pub fn with_security(inner: Box<dyn Evaluator>, settings: SecuritySettings) -> Box<dyn Evaluator> {
    Box::new(SecurityEnhancementDecorator::new(inner, settings))
}

pub fn with_compliance(inner: Box<dyn Evaluator>, framework: &str) -> Box<dyn Evaluator> {
    Box::new(ComplianceDecorator::new(inner, framework))
}

pub fn with_audit(
    inner: Box<dyn Evaluator>,
    sink: Arc<dyn AuditSink>,
    level: AuditLevel,
) -> Box<dyn Evaluator> {
    Box::new(AuditDecorator::new(inner, sink, level))
}

/// Whether a key names a credential-like value.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// Returns a copy of `value` with every sensitive key's value replaced by
/// [`REDACTED`], recursing through objects and arrays.
pub fn redact_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted: Map<String, Value> = map
                .iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_sensitive(v)
                    };
                    (k.clone(), v)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive).collect()),
        other => other.clone(),
    }
}
