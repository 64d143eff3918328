//! Tracks which journals are currently being refreshed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of journal uids with a refresh in progress.
///
/// Cloning shares the same set. [`RefreshTracker::try_begin`] hands out a
/// guard that releases the uid when dropped, so a failed or panicking
/// refresh never leaves a journal marked busy.
#[derive(Debug, Clone, Default)]
pub struct RefreshTracker {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RefreshTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `uid` as refreshing. Returns `None` if it already is.
    pub fn try_begin(&self, uid: &str) -> Option<RefreshGuard> {
        if !self.lock().insert(uid.to_string()) {
            tracing::debug!(uid, "refresh already in progress");
            return None;
        }
        Some(RefreshGuard {
            tracker: self.clone(),
            uid: uid.to_string(),
        })
    }

    pub fn is_refreshing(&self, uid: &str) -> bool {
        self.lock().contains(uid)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Releases its uid from the tracker on drop.
#[derive(Debug)]
pub struct RefreshGuard {
    tracker: RefreshTracker,
    uid: String,
}

impl RefreshGuard {
    pub fn uid(&self) -> &str {
        &self.uid
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.tracker.lock().remove(&self.uid);
    }
}
