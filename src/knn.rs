//! k-nearest-neighbor search: best-first cell expansion plus a thread-safe
//! LRU result cache keyed by `(cell, k, max_dist, version)` (spec.md §4.6).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::num::NonZeroUsize;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;

use crate::entity::EntityId;
use crate::key::{SpatialKey, Vec3};
use crate::node_map::NodeMap;

/// Wraps an `f64` distance so it can sit in a `BinaryHeap`; distances here
/// are always finite (callers clamp `max_dist`), so `total_cmp` is safe.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Dist(f64);
impl Eq for Dist {}
impl Ord for Dist {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}
impl PartialOrd for Dist {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cell frontier entry, popped smallest-distance-first.
struct CellEntry<K> {
    dist: Dist,
    key: K,
}
impl<K: Eq> Eq for CellEntry<K> {}
impl<K: Eq> PartialEq for CellEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}
impl<K: Eq> Ord for CellEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want smallest distance first.
        other.dist.cmp(&self.dist)
    }
}
impl<K: Eq> PartialOrd for CellEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Candidate entity, kept in a bounded max-heap of size `k`; ties broken by
/// ascending id so results are a total function of `(state, p, k, max_dist)`.
struct Candidate {
    dist: Dist,
    id: EntityId,
}
impl Eq for Candidate {}
impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.id == other.id
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.cmp(&other.dist).then(self.id.cmp(&other.id))
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Best-first k-NN search over occupied cells, per spec.md §4.6. `position_of`
/// looks up an entity's current position; callers supply it rather than this
/// module depending on `EntityStore`'s content type parameter.
pub fn k_nearest<K: SpatialKey>(
    node_map: &NodeMap<K>,
    position_of: impl Fn(EntityId) -> Vec3,
    p: Vec3,
    k: usize,
    max_dist: f64,
) -> Vec<(EntityId, f64)> {
    if k == 0 || node_map.is_empty() {
        return Vec::new();
    }
    let levels = node_map.occupied_levels();
    let max_level = levels.last().copied().unwrap_or(0);

    let mut frontier: BinaryHeap<CellEntry<K>> = BinaryHeap::new();
    frontier.push(CellEntry { dist: Dist(K::root().min_dist_to_point(p)), key: K::root() });

    let mut best: BinaryHeap<Candidate> = BinaryHeap::new();

    while let Some(CellEntry { dist: cell_dist, key }) = frontier.pop() {
        if cell_dist.0 > max_dist {
            break;
        }
        if best.len() >= k {
            if let Some(worst) = best.peek() {
                if cell_dist.0 > worst.dist.0 {
                    break;
                }
            }
        }

        if let Some(ids) = node_map.get(&key) {
            for &id in ids {
                let pos = position_of(id);
                let d = euclidean(p, pos);
                if d > max_dist {
                    continue;
                }
                best.push(Candidate { dist: Dist(d), id });
                if best.len() > k {
                    best.pop();
                }
            }
        }

        if key.level() < max_level {
            if let Ok(children) = key.children() {
                for child in children {
                    // Skip subtrees with no occupied descendant at all —
                    // otherwise a `k` at or beyond the entity count, or an
                    // unbounded `max_dist`, never lets either prune above
                    // fire and the frontier enumerates the whole implicit
                    // tree down to `max_level`.
                    if !node_map.subtree_occupied(&child, &levels) {
                        continue;
                    }
                    let d = child.min_dist_to_point(p);
                    if d <= max_dist {
                        frontier.push(CellEntry { dist: Dist(d), key: child });
                    }
                }
            }
        }
    }

    let mut result: Vec<(EntityId, f64)> = best.into_sorted_vec().into_iter().map(|c| (c.id, c.dist.0)).collect();
    // `into_sorted_vec` on a max-heap of `Candidate` sorts ascending by our
    // `Ord` (distance, then id), which is exactly the order spec.md §4.6 asks
    // for, so no further reordering is needed.
    result.truncate(k);
    result
}

fn euclidean(a: Vec3, b: Vec3) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// `(cell, k, max_dist)`; `max_dist` is stored via its bit pattern so the
/// key can implement `Eq`/`Hash`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey<K> {
    pub cell: K,
    pub k: usize,
    max_dist_bits: u64,
}

impl<K> CacheKey<K> {
    pub fn new(cell: K, k: usize, max_dist: f64) -> Self {
        CacheKey { cell, k, max_dist_bits: max_dist.to_bits() }
    }
}

struct CacheEntry {
    result: Vec<(EntityId, f64)>,
    version: u64,
    #[allow(dead_code)]
    recorded_at: Instant,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub size: usize,
    pub max_size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe LRU cache of k-NN results keyed by `(cell, k, max_dist)`,
/// valid only at the `version` it was computed for (spec.md §4.6, §9).
pub struct KnnCache<K: std::hash::Hash + Eq> {
    inner: Mutex<LruCache<CacheKey<K>, CacheEntry>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
    invalidations: std::sync::atomic::AtomicU64,
    max_size: usize,
}

impl<K: std::hash::Hash + Eq + Copy> KnnCache<K> {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap();
        KnnCache {
            inner: Mutex::new(LruCache::new(cap)),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
            invalidations: std::sync::atomic::AtomicU64::new(0),
            max_size: max_entries,
        }
    }

    /// Returns the cached result iff present and computed at `current_version`.
    pub fn get(&self, key: &CacheKey<K>, current_version: u64) -> Option<Vec<(EntityId, f64)>> {
        use std::sync::atomic::Ordering as O;
        let mut guard = self.inner.lock();
        match guard.get(key) {
            Some(entry) if entry.version == current_version => {
                self.hits.fetch_add(1, O::Relaxed);
                Some(entry.result.clone())
            }
            _ => {
                self.misses.fetch_add(1, O::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: CacheKey<K>, result: Vec<(EntityId, f64)>, version: u64) {
        let mut guard = self.inner.lock();
        guard.put(key, CacheEntry { result, version, recorded_at: Instant::now() });
    }

    /// Removes every entry whose cell equals `key` (a structural mutation
    /// at that cell invalidates any cached query rooted there).
    pub fn invalidate_position(&self, key: &K) {
        use std::sync::atomic::Ordering as O;
        let mut guard = self.inner.lock();
        let stale: Vec<CacheKey<K>> = guard.iter().filter(|(k, _)| &k.cell == key).map(|(k, _)| *k).collect();
        for k in &stale {
            guard.pop(k);
        }
        if !stale.is_empty() {
            self.invalidations.fetch_add(stale.len() as u64, O::Relaxed);
        }
    }

    pub fn invalidate_all(&self) {
        use std::sync::atomic::Ordering as O;
        let mut guard = self.inner.lock();
        let count = guard.len();
        guard.clear();
        self.invalidations.fetch_add(count as u64, O::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        use std::sync::atomic::Ordering as O;
        CacheStats {
            hits: self.hits.load(O::Relaxed),
            misses: self.misses.load(O::Relaxed),
            invalidations: self.invalidations.load(O::Relaxed),
            size: self.inner.lock().len(),
            max_size: self.max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::MortonKey;

    #[test]
    fn k_nearest_orders_by_distance_then_id() {
        let mut map: NodeMap<MortonKey> = NodeMap::new();
        let key = MortonKey::encode(1, 1, 1, 4).unwrap();
        map.insert(key, 1);
        map.insert(key, 2);
        let positions = |id: EntityId| -> Vec3 {
            match id {
                1 => [0.0, 0.0, 0.0],
                2 => [10.0, 0.0, 0.0],
                _ => unreachable!(),
            }
        };
        let result = k_nearest(&map, positions, [0.0, 0.0, 0.0], 2, f64::INFINITY);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, 1);
        assert_eq!(result[1].0, 2);
        assert!(result[0].1 <= result[1].1);
    }

    #[test]
    fn k_at_least_entity_count_with_unbounded_max_dist_terminates() {
        // Regression test: before pruning empty subtrees, `k >= #entities`
        // combined with `max_dist = INFINITY` disabled both frontier-prune
        // checks, so a deep occupied cell forced the search to enumerate
        // the whole implicit tree down to `max_level` instead of stopping
        // once the occupied cells were exhausted.
        let mut map: NodeMap<MortonKey> = NodeMap::new();
        let deep = MortonKey::encode(7, 7, 7, 14).unwrap();
        map.insert(deep, 1);
        let result = k_nearest(&map, |_| [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 5, f64::INFINITY);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0, 1);
    }

    #[test]
    fn k_zero_returns_empty() {
        let map: NodeMap<MortonKey> = NodeMap::new();
        let result = k_nearest(&map, |_| [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 0, f64::INFINITY);
        assert!(result.is_empty());
    }

    #[test]
    fn cache_hit_after_put_at_same_version() {
        let cache: KnnCache<MortonKey> = KnnCache::new(16);
        let key = CacheKey::new(MortonKey::encode(0, 0, 0, 2).unwrap(), 3, 10.0);
        assert!(cache.get(&key, 1).is_none());
        cache.put(key, vec![(1, 0.5)], 1);
        assert_eq!(cache.get(&key, 1).unwrap(), vec![(1, 0.5)]);
        assert!(cache.get(&key, 2).is_none());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn invalidate_position_drops_matching_entries() {
        let cache: KnnCache<MortonKey> = KnnCache::new(16);
        let cell = MortonKey::encode(0, 0, 0, 2).unwrap();
        let key = CacheKey::new(cell, 3, 10.0);
        cache.put(key, vec![], 1);
        cache.invalidate_position(&cell);
        assert!(cache.get(&key, 1).is_none());
    }
}
