//! Advisory operation locks.
//!
//! Operations that rewrite an activity's offline data (creating an attempt,
//! saving tracks, renumbering) register themselves here for the duration of
//! the write. A sync pass checks [`OperationLocks::is_blocked`] before it
//! starts. Locks are counted, so the same operation may be held more than
//! once, and they never block the holder.

use std::collections::HashMap;
use std::sync::Arc;

use cmisync_model::ScormId;
use parking_lot::Mutex;
use tracing::debug;

/// Component name used for SCORM activities.
pub const COMPONENT: &str = "mod_scorm";

/// Operation held while an offline attempt is created.
pub const CREATE_NEW_ATTEMPT: &str = "createNewAttempt";
/// Operation held while tracks are written offline.
pub const SAVE_TRACKS_OFFLINE: &str = "saveTracksOffline";
/// Operation held while an attempt is renumbered.
pub const CHANGE_ATTEMPT_NUMBER: &str = "changeAttemptNumber";

type LockKey = (&'static str, ScormId);

/// Registry of in-progress operations per (component, activity).
#[derive(Debug, Default)]
pub struct OperationLocks {
    held: Mutex<HashMap<LockKey, HashMap<&'static str, usize>>>,
}

impl OperationLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `operation` until the returned guard is dropped.
    pub fn acquire(
        self: &Arc<Self>,
        component: &'static str,
        scorm_id: ScormId,
        operation: &'static str,
    ) -> OperationGuard {
        *self
            .held
            .lock()
            .entry((component, scorm_id))
            .or_default()
            .entry(operation)
            .or_insert(0) += 1;
        debug!(component, scorm_id, operation, "operation lock acquired");

        OperationGuard {
            locks: Arc::clone(self),
            key: (component, scorm_id),
            operation,
        }
    }

    /// Returns true if any operation is held for the activity.
    pub fn is_blocked(&self, component: &'static str, scorm_id: ScormId) -> bool {
        self.held
            .lock()
            .get(&(component, scorm_id))
            .is_some_and(|ops| !ops.is_empty())
    }

    /// Returns the operations currently held for the activity, sorted.
    pub fn operations(&self, component: &'static str, scorm_id: ScormId) -> Vec<&'static str> {
        let mut ops: Vec<&'static str> = self
            .held
            .lock()
            .get(&(component, scorm_id))
            .map(|ops| ops.keys().copied().collect())
            .unwrap_or_default();
        ops.sort_unstable();
        ops
    }

    fn release(&self, key: LockKey, operation: &'static str) {
        let mut held = self.held.lock();
        let Some(ops) = held.get_mut(&key) else {
            return;
        };
        if let Some(count) = ops.get_mut(operation) {
            *count -= 1;
            if *count == 0 {
                ops.remove(operation);
            }
        }
        if ops.is_empty() {
            held.remove(&key);
        }
        debug!(component = key.0, scorm_id = key.1, operation, "operation lock released");
    }
}

/// Releases its operation when dropped.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct OperationGuard {
    locks: Arc<OperationLocks>,
    key: LockKey,
    operation: &'static str,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.locks.release(self.key, self.operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let locks = Arc::new(OperationLocks::new());
        {
            let _guard = locks.acquire(COMPONENT, 5, CREATE_NEW_ATTEMPT);
            assert!(locks.is_blocked(COMPONENT, 5));
            assert!(!locks.is_blocked(COMPONENT, 6));
        }
        assert!(!locks.is_blocked(COMPONENT, 5));
    }

    #[test]
    fn same_operation_is_counted() {
        let locks = Arc::new(OperationLocks::new());
        let first = locks.acquire(COMPONENT, 1, SAVE_TRACKS_OFFLINE);
        let second = locks.acquire(COMPONENT, 1, SAVE_TRACKS_OFFLINE);
        drop(first);
        assert!(locks.is_blocked(COMPONENT, 1));
        drop(second);
        assert!(!locks.is_blocked(COMPONENT, 1));
    }

    #[test]
    fn lists_held_operations() {
        let locks = Arc::new(OperationLocks::new());
        let _a = locks.acquire(COMPONENT, 1, SAVE_TRACKS_OFFLINE);
        let _b = locks.acquire(COMPONENT, 1, CHANGE_ATTEMPT_NUMBER);
        assert_eq!(
            locks.operations(COMPONENT, 1),
            vec![CHANGE_ATTEMPT_NUMBER, SAVE_TRACKS_OFFLINE]
        );
    }
}
