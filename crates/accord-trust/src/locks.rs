//! Per-relationship mutual exclusion.
//!
//! Approval, suspension and revocation are read-modify-write cycles on a
//! single row. Two parties approving at the same moment must not lose each
//! other's flag, so every transition on a relationship runs while holding
//! that relationship's lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Registry of one lock per relationship id.
#[derive(Clone, Debug, Default)]
pub struct RelationshipLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl RelationshipLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock handle for a relationship, creating it on first use.
    ///
    /// Callers hold the handle and then lock it:
    ///
    /// ```rust,ignore
    /// let handle = locks.handle(&relationship_id);
    /// let _guard = RelationshipLocks::acquire(&handle);
    /// ```
    pub fn handle(&self, relationship_id: &str) -> Arc<Mutex<()>> {
        let mut map = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("relationship lock registry poisoned, recovering");
                poisoned.into_inner()
            }
        };

        // Drop handles nobody holds once the map grows large.
        if map.len() > 10_000 {
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        map.entry(relationship_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Locks a handle, recovering from poisoning.
    ///
    /// The guarded value is `()`, so a panic in another holder leaves no
    /// state to repair.
    pub fn acquire(handle: &Arc<Mutex<()>>) -> MutexGuard<'_, ()> {
        match handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of relationships with a registered lock.
    pub fn len(&self) -> usize {
        match self.locks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
