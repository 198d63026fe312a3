//! Consistent-hash placement ring.
//!
//! The ring is the pure placement function of the cluster: it maps an actor
//! path to the worker that should own it. Every worker builds an identical
//! ring at startup, so any worker can answer "who owns this path" without
//! talking to anyone.

use std::hash::Hasher;

use fnv::FnvHasher;

use crate::WorkerId;

/// Virtual nodes placed on the circle per worker.
///
/// Higher counts smooth the distribution of paths across workers at the cost
/// of a larger (still tiny) lookup table.
pub const DEFAULT_REPLICAS: usize = 160;

/// Consistent-hash ring mapping actor paths to worker ids.
///
/// Construction places `replicas` virtual nodes per worker on a 64-bit hash
/// circle, keyed `"{worker}:{replica}"`. Lookup hashes the path and walks
/// clockwise to the nearest virtual node. The hash is FNV-1a 64-bit, which is
/// stable across processes and runs, so every worker resolves every path to
/// the same owner.
///
/// The ring is immutable after construction and lookups are total: any path
/// resolves to a worker in `[0, worker_count)`.
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Virtual nodes sorted by (hash, worker id).
    points: Vec<(u64, WorkerId)>,
    workers: u32,
}

impl HashRing {
    /// Build a ring for `workers` workers with `replicas` virtual nodes each.
    ///
    /// # Panics
    ///
    /// Panics if `workers` or `replicas` is zero; an empty circle has no
    /// meaningful owner for any path.
    pub fn new(workers: u32, replicas: usize) -> Self {
        assert!(workers > 0, "ring requires at least one worker");
        assert!(replicas > 0, "ring requires at least one replica per worker");

        let mut points = Vec::with_capacity(workers as usize * replicas);
        for worker in 0..workers {
            for replica in 0..replicas {
                points.push((hash_str(&format!("{worker}:{replica}")), worker));
            }
        }
        // Sorting by (hash, worker) makes the smaller worker id win when two
        // virtual nodes collide on the same hash.
        points.sort_unstable();

        Self { points, workers }
    }

    /// Resolve the worker that owns `path`.
    pub fn node_for(&self, path: &str) -> WorkerId {
        let hash = hash_str(path);
        let idx = self.points.partition_point(|&(point, _)| point < hash);
        // Wrap past the highest virtual node back to the start of the circle.
        let idx = if idx == self.points.len() { 0 } else { idx };
        self.points[idx].1
    }

    /// Number of workers the ring was built for.
    pub fn worker_count(&self) -> u32 {
        self.workers
    }

    /// Number of virtual nodes on the circle.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the ring has no virtual nodes. Always false for a constructed
    /// ring; present for API completeness.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// FNV-1a 64-bit over the raw bytes of `s`.
fn hash_str(s: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(s.as_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::Rng;

    use super::*;

    #[test]
    fn lookup_is_deterministic_across_constructions() {
        let a = HashRing::new(4, DEFAULT_REPLICAS);
        let b = HashRing::new(4, DEFAULT_REPLICAS);

        for i in 0..1_000 {
            let path = format!("actor/{i}");
            assert_eq!(a.node_for(&path), b.node_for(&path));
        }

        // A specific path must land on the same worker in both rings.
        let owner = a.node_for("orders/42");
        assert_eq!(b.node_for("orders/42"), owner);
        assert!(owner < 4);
    }

    #[test]
    fn every_path_maps_into_worker_range() {
        for workers in [1u32, 2, 5, 9] {
            let ring = HashRing::new(workers, DEFAULT_REPLICAS);
            let mut rng = rand::rng();
            for _ in 0..5_000 {
                let path = format!("entity-{}", rng.random::<u64>());
                assert!(ring.node_for(&path) < workers);
            }
        }
    }

    #[test]
    fn distribution_stays_balanced() {
        for workers in [4u32, 16, 64] {
            let ring = HashRing::new(workers, DEFAULT_REPLICAS);
            let mut rng = rand::rng();
            let mut buckets: HashMap<WorkerId, usize> = HashMap::new();

            const PATHS: usize = 100_000;
            for _ in 0..PATHS {
                let path = format!("actor-{}", rng.random::<u64>());
                *buckets.entry(ring.node_for(&path)).or_insert(0) += 1;
            }

            let max = buckets.values().copied().max().unwrap_or(0) as f64;
            let mean = PATHS as f64 / workers as f64;
            let ratio = max / mean;
            assert!(
                ratio <= 1.5,
                "workers={workers}: max/mean ratio {ratio:.3} exceeds 1.5"
            );
        }
    }

    #[test]
    fn ring_holds_one_point_per_virtual_node() {
        let ring = HashRing::new(8, 32);
        assert_eq!(ring.len(), 8 * 32);
        assert_eq!(ring.worker_count(), 8);
        assert!(!ring.is_empty());
    }

    #[test]
    fn single_worker_owns_everything() {
        let ring = HashRing::new(1, DEFAULT_REPLICAS);
        for path in ["a", "b", "orders/42", ""] {
            assert_eq!(ring.node_for(path), 0);
        }
    }
}
