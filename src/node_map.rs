//! Node map: `spatial-key -> set of entity ids` backing a hierarchical
//! index's occupied cells (spec.md §4.4). Ordered by key so the range
//! engine (`crate::range_query`) can scan contiguous intervals directly.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use crate::entity::EntityId;
use crate::key::SpatialKey;

#[derive(Debug)]
pub struct NodeMap<K: SpatialKey> {
    nodes: BTreeMap<K, BTreeSet<EntityId>>,
}

impl<K: SpatialKey> Default for NodeMap<K> {
    fn default() -> Self {
        NodeMap { nodes: BTreeMap::new() }
    }
}

impl<K: SpatialKey> NodeMap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: K, id: EntityId) {
        self.nodes.entry(key).or_default().insert(id);
    }

    /// Removes `id` from `key`'s entity set; drops the node entirely if it
    /// becomes empty. Returns `true` iff `id` was present.
    pub fn remove(&mut self, key: &K, id: EntityId) -> bool {
        let Some(set) = self.nodes.get_mut(key) else {
            return false;
        };
        let removed = set.remove(&id);
        if set.is_empty() {
            self.nodes.remove(key);
        }
        removed
    }

    pub fn get(&self, key: &K) -> Option<&BTreeSet<EntityId>> {
        self.nodes.get(key)
    }

    pub fn contains_node(&self, key: &K) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest level among occupied nodes, or `0` if empty. Bounds how far
    /// the k-NN engine needs to descend: no node deeper than this can hold
    /// an entity.
    pub fn max_level(&self) -> u8 {
        self.nodes.keys().map(|k| k.level()).max().unwrap_or(0)
    }

    /// Sorted, deduplicated levels that have at least one occupied node.
    /// `BTreeMap<K, _>`'s iteration order is level-major (see `K::Ord`), so
    /// every same-level run is contiguous and a plain `dedup()` suffices —
    /// no need to route through a `BTreeSet`. Callers that probe
    /// `subtree_occupied` repeatedly during one traversal should compute
    /// this once and reuse it rather than recomputing it per node.
    pub fn occupied_levels(&self) -> Vec<u8> {
        let mut levels: Vec<u8> = self.nodes.keys().map(|k| k.level()).collect();
        levels.dedup();
        levels
    }

    /// Does `key` itself, or any occupied descendant of it, exist in the
    /// map? `levels` must be this map's own `occupied_levels()`. Used to
    /// prune traversal and k-NN search away from subtrees the implicit
    /// hierarchy defines but that hold no entities, instead of blindly
    /// enumerating every cell down to the deepest level.
    pub fn subtree_occupied(&self, key: &K, levels: &[u8]) -> bool {
        if self.nodes.contains_key(key) {
            return true;
        }
        for &level in levels {
            if level <= key.level() {
                continue;
            }
            let lo = descendant_at(*key, level, 0);
            let hi = descendant_at(*key, level, 7);
            if self.nodes.range((Bound::Included(lo), Bound::Included(hi))).next().is_some() {
                return true;
            }
        }
        false
    }

    pub fn entity_count_at(&self, key: &K) -> usize {
        self.nodes.get(key).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.nodes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &BTreeSet<EntityId>)> {
        self.nodes.iter()
    }

    /// Inclusive scan of all occupied nodes whose key falls in `[lo, hi]`,
    /// used by the SFC range engine once it has computed disjoint key
    /// intervals.
    pub fn range_inclusive<'a>(&'a self, lo: &K, hi: &K) -> impl Iterator<Item = (&'a K, &'a BTreeSet<EntityId>)> {
        self.nodes.range((Bound::Included(*lo), Bound::Included(*hi)))
    }
}

/// The leftmost (`child_index = 0`) or rightmost (`child_index = 7`)
/// descendant of `cur` at `target_level`, found by repeated descent — the
/// same technique `range_query`'s own `leftmost_descendant`/
/// `rightmost_descendant` use to bound a subtree's key interval.
fn descendant_at<K: SpatialKey>(mut cur: K, target_level: u8, child_index: u8) -> K {
    while cur.level() < target_level {
        cur = cur.child(child_index).expect("descending within max_depth");
    }
    cur
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::MortonKey;

    #[test]
    fn insert_then_get() {
        let mut map: NodeMap<MortonKey> = NodeMap::new();
        let key = MortonKey::encode(1, 2, 3, 4).unwrap();
        map.insert(key, 10);
        map.insert(key, 11);
        assert_eq!(map.entity_count_at(&key), 2);
        assert!(map.get(&key).unwrap().contains(&10));
    }

    #[test]
    fn remove_drops_empty_node() {
        let mut map: NodeMap<MortonKey> = NodeMap::new();
        let key = MortonKey::encode(1, 2, 3, 4).unwrap();
        map.insert(key, 10);
        assert!(map.remove(&key, 10));
        assert!(!map.contains_node(&key));
        assert!(!map.remove(&key, 10));
    }

    #[test]
    fn range_inclusive_respects_bounds() {
        let mut map: NodeMap<MortonKey> = NodeMap::new();
        let a = MortonKey::encode(0, 0, 0, 4).unwrap();
        let b = MortonKey::encode(1, 0, 0, 4).unwrap();
        let c = MortonKey::encode(15, 15, 15, 4).unwrap();
        map.insert(a, 1);
        map.insert(b, 2);
        map.insert(c, 3);
        let scanned: Vec<_> = map.range_inclusive(&a, &b).map(|(k, _)| *k).collect();
        assert_eq!(scanned.len(), 2);
        assert!(scanned.contains(&a));
        assert!(scanned.contains(&b));
        assert!(!scanned.contains(&c));
    }

    #[test]
    fn subtree_occupied_finds_deep_descendant_without_descending_every_level() {
        let mut map: NodeMap<MortonKey> = NodeMap::new();
        let deep = MortonKey::encode(0, 0, 0, 15).unwrap();
        map.insert(deep, 1);
        let levels = map.occupied_levels();
        assert_eq!(levels, vec![15]);

        let ancestor = MortonKey::encode(0, 0, 0, 2).unwrap();
        assert!(map.subtree_occupied(&ancestor, &levels));

        let unrelated = MortonKey::encode(3, 3, 3, 2).unwrap();
        assert!(!map.subtree_occupied(&unrelated, &levels));
    }

    #[test]
    fn occupied_levels_deduplicates_across_mixed_depths() {
        let mut map: NodeMap<MortonKey> = NodeMap::new();
        map.insert(MortonKey::encode(0, 0, 0, 10).unwrap(), 1);
        map.insert(MortonKey::encode(1, 0, 0, 10).unwrap(), 2);
        map.insert(MortonKey::encode(0, 0, 0, 12).unwrap(), 3);
        assert_eq!(map.occupied_levels(), vec![10, 12]);
    }
}
