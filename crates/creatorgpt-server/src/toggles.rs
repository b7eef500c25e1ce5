//! Like toggles in flight across requests

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::trace;

/// The `(uid, subject)` pairs with a toggle in progress. Each request builds
/// its own counter, so this is what keeps one user from running two toggles
/// on the same subject at once.
#[derive(Debug, Default)]
pub struct PendingToggles {
    keys: Mutex<HashSet<(String, String)>>,
}

impl PendingToggles {
    /// Claim the pair, or `None` when a toggle for it is already running.
    /// The claim is released when the returned guard drops.
    pub fn begin(&self, uid: &str, subject: &str) -> Option<PendingToggle<'_>> {
        let key = (uid.to_owned(), subject.to_owned());
        if !self.keys.lock().insert(key.clone()) {
            return None;
        }
        trace!(uid, subject, "Toggle claimed");
        Some(PendingToggle { owner: self, key })
    }

    /// Number of toggles in flight
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether no toggle is in flight
    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

/// A claimed `(uid, subject)` pair
#[derive(Debug)]
pub struct PendingToggle<'a> {
    owner: &'a PendingToggles,
    key: (String, String),
}

impl Drop for PendingToggle<'_> {
    fn drop(&mut self) {
        self.owner.keys.lock().remove(&self.key);
    }
}
