//! Strategy composition and the decision type.

use accord_types::AccessLevel;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::AccessContext;
use crate::strategy::AccessStrategy;

/// Result of an access evaluation.
///
/// Core fields are typed; `extra` carries decorator metadata only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub access_level: AccessLevel,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub extra: Map<String, Value>,
    /// Set when an audit append failed while producing this decision.
    #[serde(default)]
    pub audit_degraded: bool,
}

impl Decision {
    pub fn denied(reasons: Vec<String>) -> Self {
        Self {
            allowed: false,
            access_level: AccessLevel::None,
            reasons,
            extra: Map::new(),
            audit_degraded: false,
        }
    }

    /// Adds a metadata key. Core fields are untouched.
    pub fn annotate(&mut self, key: &str, value: impl Into<Value>) {
        self.extra.insert(key.to_string(), value.into());
    }
}

/// Anything that turns a context into a decision.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, ctx: &AccessContext) -> Decision;
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn evaluate(&self, ctx: &AccessContext) -> Decision {
        (**self).evaluate(ctx)
    }
}

/// An ordered set of strategies combined with AND semantics.
///
/// Adding a strategy can only narrow access: the context allows a request
/// only when every strategy does, and grants the lowest level any of them
/// reports.
#[derive(Default)]
pub struct PolicyContext {
    strategies: Vec<Box<dyn AccessStrategy>>,
}

impl PolicyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn AccessStrategy>) {
        self.strategies.push(strategy);
    }

    /// Builder form of [`Self::add_strategy`].
    pub fn with_strategy(mut self, strategy: impl AccessStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Evaluates every strategy and collects all reasons, passing or not.
    pub fn can_access(&self, ctx: &AccessContext) -> (bool, Vec<String>) {
        if self.strategies.is_empty() {
            return (false, vec!["no strategies configured".to_string()]);
        }

        let mut allowed = true;
        let mut reasons = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let verdict = strategy.can_access(ctx);
            tracing::debug!(
                strategy = strategy.name(),
                allowed = verdict.allowed,
                reason = %verdict.reason,
                "strategy verdict"
            );
            allowed &= verdict.allowed;
            reasons.push(format!("{}: {}", strategy.name(), verdict.reason));
        }
        (allowed, reasons)
    }

    /// `none` unless allowed; otherwise the minimum across strategies.
    pub fn access_level(&self, ctx: &AccessContext) -> AccessLevel {
        let (allowed, _) = self.can_access(ctx);
        if !allowed {
            return AccessLevel::None;
        }
        self.strategies
            .iter()
            .map(|s| s.access_level(ctx))
            .min()
            .unwrap_or(AccessLevel::None)
    }
}

/// Reason added when every strategy allows but the minimum level is `none`.
pub const NO_ACCESS_GRANTED: &str = "granted access level is none";

impl Evaluator for PolicyContext {
    fn evaluate(&self, ctx: &AccessContext) -> Decision {
        let (allowed, mut reasons) = self.can_access(ctx);
        if !allowed {
            return Decision::denied(reasons);
        }
        let access_level = self
            .strategies
            .iter()
            .map(|s| s.access_level(ctx))
            .min()
            .unwrap_or(AccessLevel::None);

        // A strategy that allows but grants `none` grants nothing.
        let allowed = access_level.grants_access();
        if !allowed {
            reasons.push(NO_ACCESS_GRANTED.to_string());
        }
        Decision {
            allowed,
            access_level,
            reasons,
            extra: Map::new(),
            audit_degraded: false,
        }
    }
}
