//! Shared actor directory.
//!
//! The directory is the cluster's single piece of cross-worker mutable
//! state: a capacity-bounded map from actor path to owning worker id. It is
//! created exactly once by the bootstrap, before any worker starts, and
//! every worker receives a cloned handle over the same table.
//!
//! Entries are written lazily on first reference to a path and stay pinned
//! to their worker until the owning worker explicitly stops the actor.

use std::sync::Arc;

use dashmap::DashMap;

use crate::WorkerId;

/// Cluster-wide map from actor path to owning worker.
///
/// Handles are cheap to clone and safe to use from every worker thread
/// concurrently; row-level updates are atomic and promptly visible to all
/// other workers.
#[derive(Clone)]
pub struct SharedDirectory {
    inner: Arc<DirectoryInner>,
}

struct DirectoryInner {
    entries: DashMap<String, WorkerId>,
    capacity: usize,
}

impl SharedDirectory {
    /// Create a directory with room for `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(DirectoryInner {
                entries: DashMap::with_capacity(capacity),
                capacity,
            }),
        }
    }

    /// Record `path` as owned by `worker`.
    ///
    /// Idempotent for repeated writes of the same pair; a rewrite with a
    /// different worker takes the last value. When the table is full, new
    /// registrations are logged and dropped: the cluster keeps running in a
    /// degraded mode where lookups for the dropped path miss and callers
    /// fall back to the ring.
    pub fn register(&self, path: &str, worker: WorkerId) {
        if !self.inner.entries.contains_key(path) && self.len() >= self.inner.capacity {
            tracing::warn!(
                path,
                worker,
                capacity = self.inner.capacity,
                "directory at capacity; dropping registration"
            );
            return;
        }
        self.inner.entries.insert(path.to_string(), worker);
    }

    /// Look up the owner of `path`.
    pub fn lookup(&self, path: &str) -> Option<WorkerId> {
        self.inner.entries.get(path).map(|entry| *entry.value())
    }

    /// Whether `path` has a registered owner.
    pub fn has(&self, path: &str) -> bool {
        self.inner.entries.contains_key(path)
    }

    /// Remove the entry for `path`, if any.
    pub fn remove(&self, path: &str) {
        self.inner.entries.remove(path);
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the directory holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}
