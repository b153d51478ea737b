//! Change notifications for the document tree.
//!
//! The provider addresses notifications by a logical resource: the root
//! listing, or the child listing of one document. Notifications are
//! coalesced: one per committed state change, never one per storage. They
//! always fire after the corresponding mutation has been committed, and
//! subscribers must tolerate duplicates.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::store::DocumentId;

/// Logical resource a change notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ChangeResource {
    /// The root listing changed (device/storage added, removed, or updated).
    Roots,
    /// The child listing of one document changed.
    Children { parent: DocumentId },
}

impl ChangeResource {
    /// Returns the resource path, for example "roots" or "document/3/children".
    pub fn path(&self) -> String {
        match self {
            Self::Roots => "roots".to_string(),
            Self::Children { parent } => format!("document/{parent}/children"),
        }
    }
}

/// Receiver for change notifications.
pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, resource: &ChangeResource);
}

/// Notifier that drops every notification.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn notify(&self, _resource: &ChangeResource) {}
}

/// Notifier that records per-resource counts, with a blocking wait.
///
/// The test-side counterpart of a real notification dispatcher: tests ask
/// "how many times did the root listing change" and can block until an
/// expected count arrives from the scanner thread.
#[derive(Default)]
pub struct RecordingNotifier {
    counts: Mutex<HashMap<ChangeResource, usize>>,
    cond: Condvar,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications recorded for the resource so far.
    pub fn count(&self, resource: &ChangeResource) -> usize {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.get(resource).copied().unwrap_or(0)
    }

    /// Blocks until at least `expected` notifications arrived for the
    /// resource, or the timeout elapses. Returns whether the count was met.
    #[must_use]
    pub fn wait_for(&self, resource: &ChangeResource, expected: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if counts.get(resource).copied().unwrap_or(0) >= expected {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(counts, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            counts = guard;
        }
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn notify(&self, resource: &ChangeResource) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry(*resource).or_insert(0) += 1;
        self.cond.notify_all();
    }
}
