//! Destinations for trust log entries.

use std::cell::{Cell, RefCell};
use std::sync::Mutex;

use accord_db::DbPool;
use chrono::Utc;

use crate::entry::{LogDraft, TrustLogEntry};
use crate::error::ObserveError;
use crate::store::append_entry;

/// Somewhere trust log entries can be written.
pub trait AuditSink: Send + Sync {
    /// Persists a draft and returns the stored entry.
    fn append(&self, draft: &LogDraft) -> Result<TrustLogEntry, ObserveError>;
}

/// Writes entries to the `trust_log` table through a connection pool.
#[derive(Clone)]
pub struct PoolAuditSink {
    pool: DbPool,
}

impl PoolAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl AuditSink for PoolAuditSink {
    fn append(&self, draft: &LogDraft) -> Result<TrustLogEntry, ObserveError> {
        let conn = self.pool.get()?;
        append_entry(&conn, draft)
    }
}

/// Keeps entries in memory. Used by tests and by callers that only need the
/// decision flow without persistence.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<TrustLogEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything appended so far.
    pub fn entries(&self) -> Vec<TrustLogEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, draft: &LogDraft) -> Result<TrustLogEntry, ObserveError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| ObserveError::Unavailable("memory sink lock poisoned".to_string()))?;
        let entry = TrustLogEntry {
            id: guard.len() as i64 + 1,
            action: draft.action.as_str().to_string(),
            source_org: draft.source_org.clone(),
            target_org: draft.target_org.clone(),
            relationship_id: draft.relationship_id.clone(),
            actor: draft.actor.clone(),
            success: draft.success,
            failure_reason: draft.failure_reason.clone(),
            details: draft.details.clone(),
            occurred_at: Utc::now(),
        };
        guard.push(entry.clone());
        Ok(entry)
    }
}

/// Appends an entry, logging and swallowing any failure.
///
/// The audit trail must never block the operation being audited. Returns
/// `None` when the write failed so callers can surface a degraded flag.
pub fn append_or_warn(sink: &dyn AuditSink, draft: LogDraft) -> Option<TrustLogEntry> {
    match sink.append(&draft) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(
                action = %draft.action,
                actor = %draft.actor,
                relationship_id = ?draft.relationship_id,
                error = %e,
                "failed to append trust log entry"
            );
            None
        }
    }
}

/// Per-call view of a sink that remembers whether any append failed.
///
/// Operations record through an `AuditTrail` so the caller can report a
/// degraded audit flag alongside an otherwise successful result.
///
/// A deferred trail queues drafts instead of writing them. Pooled callers
/// use it while they hold a connection, then [`flush`](Self::flush) once the
/// connection is back in the pool, since the sink checks out its own. Any
/// drafts still queued are flushed on drop.
pub struct AuditTrail<'a> {
    sink: &'a dyn AuditSink,
    degraded: Cell<bool>,
    pending: Option<RefCell<Vec<LogDraft>>>,
}

impl<'a> AuditTrail<'a> {
    /// A trail that appends each draft as it is recorded.
    pub fn new(sink: &'a dyn AuditSink) -> Self {
        Self {
            sink,
            degraded: Cell::new(false),
            pending: None,
        }
    }

    /// A trail that holds drafts until [`flush`](Self::flush) or drop.
    pub fn deferred(sink: &'a dyn AuditSink) -> Self {
        Self {
            sink,
            degraded: Cell::new(false),
            pending: Some(RefCell::new(Vec::new())),
        }
    }

    /// Appends via [`append_or_warn`], flagging the trail on failure.
    ///
    /// Deferred trails queue the draft and return `None`.
    pub fn record(&self, draft: LogDraft) -> Option<TrustLogEntry> {
        if let Some(pending) = &self.pending {
            pending.borrow_mut().push(draft);
            return None;
        }
        self.append(draft)
    }

    /// Writes every queued draft in recording order and returns how many
    /// were stored. A no-op for immediate trails.
    pub fn flush(&self) -> usize {
        let drafts = match &self.pending {
            Some(pending) => std::mem::take(&mut *pending.borrow_mut()),
            None => return 0,
        };
        drafts
            .into_iter()
            .filter_map(|draft| self.append(draft))
            .count()
    }

    /// Whether at least one append failed.
    pub fn degraded(&self) -> bool {
        self.degraded.get()
    }

    fn append(&self, draft: LogDraft) -> Option<TrustLogEntry> {
        let entry = append_or_warn(self.sink, draft);
        if entry.is_none() {
            self.degraded.set(true);
        }
        entry
    }
}

impl Drop for AuditTrail<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}
