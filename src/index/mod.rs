//! The unified hierarchical index: composes the entity store, node map,
//! and subdivision policy behind the single-writer/many-reader contract of
//! spec.md §4.4 and §5. Generic over `K: SpatialKey` so `octree::Octree<T>`
//! and `tetree::Tetree<T>` are thin instantiations of the same code
//! (spec.md §9's "implement once, instantiate twice").

pub mod octree;
pub mod tetree;

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::config::IndexConfig;
use crate::entity::{Aabb, EntityId, EntityStore, SpanSet};
use crate::error::{LucienError, Result};
use crate::key::{SpatialKey, Vec3};
use crate::knn::{self, CacheKey, KnnCache};
use crate::node_map::NodeMap;
use crate::policy::{Context, Decision, SubdivisionPolicy};
use crate::range_query::range_query;
use crate::visitor::{self, Strategy, Visitor};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub node_count: usize,
    pub entity_count: usize,
    pub total_refs: usize,
    pub max_depth: u8,
    pub version: u64,
}

struct State<K: SpatialKey, T> {
    entities: EntityStore<T, K>,
    nodes: NodeMap<K>,
}

/// Hierarchical multi-entity spatial index, generic over the spatial key
/// family. One `RwLock` guards entity store + node map together so a reader
/// never observes a torn `(node, entity)` pair (spec.md §5); the k-NN cache
/// has its own lock and is read before, and written after, the index lock
/// is held, to avoid nested-lock ordering deadlocks.
pub struct Index<K: SpatialKey, T> {
    state: RwLock<State<K, T>>,
    version: AtomicU64,
    policy: SubdivisionPolicy,
    config: IndexConfig,
    cache: KnnCache<K>,
    poisoned: std::sync::atomic::AtomicBool,
}

impl<K: SpatialKey, T: Clone> Index<K, T> {
    pub fn new(config: IndexConfig) -> Self {
        let policy = config.subdivision_preset.policy();
        let cache = KnnCache::new(config.knn_cache_max_entries);
        Index {
            state: RwLock::new(State { entities: EntityStore::new(), nodes: NodeMap::new() }),
            version: AtomicU64::new(0),
            policy,
            config,
            cache,
            poisoned: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(AtomicOrdering::Acquire)
    }

    fn check_not_poisoned(&self) -> Result<()> {
        if self.poisoned.load(AtomicOrdering::Acquire) {
            Err(LucienError::CorruptedState("index poisoned by a prior invariant violation".into()))
        } else {
            Ok(())
        }
    }

    fn poison(&self, reason: impl Into<String>) -> LucienError {
        let reason = reason.into();
        self.poisoned.store(true, AtomicOrdering::Release);
        warn!(%reason, "index poisoned");
        LucienError::CorruptedState(reason)
    }

    /// Walks the subdivision policy from `start` downward until it settles
    /// on a concrete target cell for a bounds-less point insert (spec.md
    /// §4.3 rule evaluation, §4.4 "consults the policy; on split...").
    fn resolve_target(&self, nodes: &NodeMap<K>, start: K, pos: Vec3, max_depth: u8) -> K {
        let mut current = start;
        loop {
            if current.level() >= max_depth {
                return current;
            }
            let count = nodes.entity_count_at(&current);
            let ctx = Context {
                level: current.level(),
                current_entity_count: count,
                target_capacity: self.config.max_entities_per_node,
                bulk_mode: false,
                entity_bounds: None,
                existing_entities: &[],
                max_depth,
            };
            let outcome = self.policy.decide(&ctx, [0.0, 0.0, 0.0]);
            match outcome.decision {
                Decision::InsertInParent | Decision::DeferSubdivision => return current,
                Decision::CreateSingleChild(_) | Decision::ForceSubdivision => {
                    match K::cell_for_point(pos, current.level() + 1) {
                        Ok(deeper) => current = deeper,
                        Err(_) => return current,
                    }
                }
                Decision::SplitToChildren(_) => return current,
            }
        }
    }

    /// `insert(pos, level, content) -> id` (spec.md §6).
    pub fn insert(&self, pos: Vec3, level: u8, content: T) -> Result<EntityId> {
        self.check_not_poisoned()?;
        let key = K::cell_for_point(pos, level)?;
        let mut state = self.state.write();
        let id = state.entities.allocate_id();
        state.entities.put(id, content, pos, None);
        let target = self.resolve_target(&state.nodes, key, pos, self.config.max_depth);
        state.nodes.insert(target, id);
        state.entities.set_span(id, SpanSet::from_slice(&[target]))?;
        self.version.fetch_add(1, AtomicOrdering::AcqRel);
        drop(state);
        self.cache.invalidate_position(&target);
        trace!(?id, "inserted entity");
        Ok(id)
    }

    /// `insert_with_bounds(id?, pos, level, content, bounds) -> id`
    /// (spec.md §6). Computes every cell at `level` the bounds intersect and
    /// inserts the entity into each, per the spanning model of spec.md §9.
    pub fn insert_with_bounds(
        &self,
        id: Option<EntityId>,
        pos: Vec3,
        level: u8,
        content: T,
        bounds: (Vec3, Vec3),
    ) -> Result<EntityId> {
        self.check_not_poisoned()?;
        K::cell_for_point(pos, level)?;
        let cells = self.cells_intersecting(bounds, level)?;

        let mut state = self.state.write();
        let id = id.unwrap_or_else(|| state.entities.allocate_id());
        state.entities.put(id, content, pos, Some(Aabb::new(bounds.0, bounds.1)));
        for &cell in &cells {
            state.nodes.insert(cell, id);
        }
        let span: SpanSet<K> = cells.iter().copied().collect();
        state.entities.set_span(id, span)?;
        self.version.fetch_add(1, AtomicOrdering::AcqRel);
        drop(state);
        for cell in &cells {
            self.cache.invalidate_position(cell);
        }
        Ok(id)
    }

    fn cells_intersecting(&self, bounds: (Vec3, Vec3), level: u8) -> Result<Vec<K>> {
        use crate::key::geometry::round_to_grid;
        let (lo, hi) = bounds;
        let (x0, y0, z0) = round_to_grid(lo, level)?;
        let (x1, y1, z1) = round_to_grid(hi, level)?;
        let mut cells = Vec::new();
        for x in x0..=x1 {
            for y in y0..=y1 {
                for z in z0..=z1 {
                    cells.push(K::from_grid(x, y, z, level)?);
                }
            }
        }
        cells.sort();
        cells.dedup();
        Ok(cells)
    }

    /// `lookup(pos, level) -> [id]` (spec.md §6). No distance filtering.
    pub fn lookup(&self, pos: Vec3, level: u8) -> Result<Vec<EntityId>> {
        let key = K::cell_for_point(pos, level)?;
        let state = self.state.read();
        Ok(state.nodes.get(&key).map(|s| s.iter().copied().collect()).unwrap_or_default())
    }

    /// `entities_in_region(aabb) -> [id]` (spec.md §6, §4.5).
    ///
    /// `MortonKey`/`TetreeKey`'s `Ord` is level-major, so a single
    /// `range_query` at one fixed level can never match a node at any other
    /// level — entities inserted at a shallower level than the deepest
    /// occupied one would silently be skipped. Scanning the range engine
    /// once per occupied level (rather than once at `max_level()`) keeps
    /// every level's nodes reachable.
    pub fn entities_in_region(&self, bounds: (Vec3, Vec3)) -> Vec<EntityId> {
        let state = self.state.read();
        let mut out: std::collections::BTreeSet<EntityId> = std::collections::BTreeSet::new();
        for level in state.nodes.occupied_levels() {
            let intervals = range_query::<K>(bounds.0, bounds.1, level);
            for iv in intervals {
                for (_, ids) in state.nodes.range_inclusive(&iv.lo, &iv.hi) {
                    out.extend(ids.iter().copied());
                }
            }
        }
        out.into_iter()
            .filter(|&id| {
                let pos = state.entities.position(id);
                let aabb = state.entities.bounds(id);
                match (pos, aabb) {
                    (Some(_), Some(b)) => b.intersects(&Aabb::new(bounds.0, bounds.1)),
                    (Some(p), None) => (0..3).all(|i| p[i] >= bounds.0[i] && p[i] <= bounds.1[i]),
                    _ => false,
                }
            })
            .collect()
    }

    /// `k_nearest(pos, k, max_dist) -> [(id, distance)]` (spec.md §4.6, §6).
    pub fn k_nearest(&self, pos: Vec3, k: usize, max_dist: f64) -> Result<Vec<(EntityId, f64)>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let cache_level = self.config.max_depth;
        let cache_cell = K::cell_for_point(pos, cache_level)?;
        let cache_key = CacheKey::new(cache_cell, k, max_dist);

        let current_version = self.version();
        if let Some(cached) = self.cache.get(&cache_key, current_version) {
            return Ok(cached);
        }

        let state = self.state.read();
        let version_at_read = self.version();
        let result = knn::k_nearest(
            &state.nodes,
            |id| state.entities.position(id).unwrap_or([0.0, 0.0, 0.0]),
            pos,
            k,
            max_dist,
        );
        drop(state);
        self.cache.put(cache_key, result.clone(), version_at_read);
        Ok(result)
    }

    /// `update(id, new_pos, level) -> Result<(), IdUnknown>` (spec.md §6).
    pub fn update(&self, id: EntityId, new_pos: Vec3, level: u8) -> Result<()> {
        self.check_not_poisoned()?;
        let new_key = K::cell_for_point(new_pos, level)?;
        let mut state = self.state.write();
        if !state.entities.contains(id) {
            return Err(LucienError::IdUnknown(id));
        }
        let old_span: Vec<K> = state.entities.span(id).map(|s| s.to_vec()).unwrap_or_default();

        if old_span.len() == 1 && old_span[0] == new_key {
            state.entities.set_position(id, new_pos)?;
            return Ok(());
        }

        for key in &old_span {
            state.nodes.remove(key, id);
        }
        let target = self.resolve_target(&state.nodes, new_key, new_pos, self.config.max_depth);
        state.nodes.insert(target, id);
        state.entities.set_position(id, new_pos)?;
        state.entities.set_span(id, SpanSet::from_slice(&[target]))?;
        self.version.fetch_add(1, AtomicOrdering::AcqRel);
        drop(state);
        for key in old_span.iter().chain(std::iter::once(&target)) {
            self.cache.invalidate_position(key);
        }
        Ok(())
    }

    /// `remove(id) -> bool` (spec.md §6).
    pub fn remove(&self, id: EntityId) -> bool {
        let mut state = self.state.write();
        if !state.entities.contains(id) {
            return false;
        }
        let span: Vec<K> = state.entities.span(id).map(|s| s.to_vec()).unwrap_or_default();
        for key in &span {
            state.nodes.remove(key, id);
        }
        state.entities.remove(id);
        self.version.fetch_add(1, AtomicOrdering::AcqRel);
        drop(state);
        for key in &span {
            self.cache.invalidate_position(key);
        }
        true
    }

    /// `enclosing(point, level)`: smallest materialized node containing the
    /// point, walking parents from the cell at `level` (spec.md §6).
    pub fn enclosing_point(&self, pos: Vec3, level: u8) -> Result<Option<K>> {
        let mut key = K::cell_for_point(pos, level)?;
        let state = self.state.read();
        loop {
            if state.nodes.contains_node(&key) {
                return Ok(Some(key));
            }
            match key.parent() {
                Some(p) => key = p,
                None => return Ok(None),
            }
        }
    }

    /// `enclosing(volume)`: same walk starting from the cell containing the
    /// volume's minimum corner at the index's configured max depth.
    pub fn enclosing_volume(&self, bounds: (Vec3, Vec3)) -> Result<Option<K>> {
        self.enclosing_point(bounds.0, self.config.max_depth)
    }

    pub fn traverse(&self, strategy: Strategy, region: Option<(Vec3, Vec3)>, visitor: &mut impl Visitor<K, T>) {
        let state = self.state.read();
        visitor::traverse(
            K::root(),
            strategy,
            &state.nodes,
            |id| state.entities.get(id).cloned(),
            region,
            self.config.max_depth,
            visitor,
        );
    }

    pub fn stats(&self) -> Stats {
        let state = self.state.read();
        let total_refs: usize = state.nodes.iter().map(|(_, ids)| ids.len()).sum();
        Stats {
            node_count: state.nodes.node_count(),
            entity_count: state.entities.len(),
            total_refs,
            max_depth: self.config.max_depth,
            version: self.version(),
        }
    }

    pub fn cache_stats(&self) -> crate::knn::CacheStats {
        self.cache.stats()
    }

    /// Poisons the index from outside a normal mutator, for callers that
    /// detect an invariant violation while holding a borrowed view (spec.md
    /// §7: internal inconsistencies leave the index refusing further writes).
    pub fn mark_corrupted(&self, reason: impl Into<String>) -> LucienError {
        self.poison(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::MortonKey;

    fn cfg() -> IndexConfig {
        IndexConfig { max_depth: 21, max_entities_per_node: 10, ..Default::default() }
    }

    #[test]
    fn scenario_a_three_entities_same_cell() {
        let index: Index<MortonKey, &str> = Index::new(cfg());
        let e1 = index.insert([100.0, 100.0, 100.0], 10, "E1").unwrap();
        let e2 = index.insert([100.0, 100.0, 100.0], 10, "E2").unwrap();
        let e3 = index.insert([100.0, 100.0, 100.0], 10, "E3").unwrap();
        let found = index.lookup([100.0, 100.0, 100.0], 10).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.contains(&e1) && found.contains(&e2) && found.contains(&e3));
        let stats = index.stats();
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.node_count, 1);
    }

    #[test]
    fn scenario_b_remove_one_of_three() {
        let index: Index<MortonKey, &str> = Index::new(cfg());
        let e1 = index.insert([100.0, 100.0, 100.0], 10, "E1").unwrap();
        let e2 = index.insert([100.0, 100.0, 100.0], 10, "E2").unwrap();
        let e3 = index.insert([100.0, 100.0, 100.0], 10, "E3").unwrap();
        assert!(index.remove(e2));
        let found = index.lookup([100.0, 100.0, 100.0], 10).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&e1) && found.contains(&e3));
        assert!(!index.remove(e2));
    }

    #[test]
    fn scenario_c_update_across_cells() {
        let index: Index<MortonKey, &str> = Index::new(cfg());
        let m = index.insert([300.0, 300.0, 300.0], 10, "M").unwrap();
        index.update(m, [3000.0, 3000.0, 3000.0], 10).unwrap();
        assert!(index.lookup([300.0, 300.0, 300.0], 10).unwrap().is_empty());
        let found = index.lookup([3000.0, 3000.0, 3000.0], 10).unwrap();
        assert_eq!(found, vec![m]);
    }

    #[test]
    fn scenario_e_negative_coords_rejected() {
        let index: Index<MortonKey, &str> = Index::new(cfg());
        let result = index.insert([-10.0, 50.0, 50.0], 10, "x");
        assert!(matches!(result, Err(LucienError::NegativeCoord(_))));
        assert_eq!(index.stats().entity_count, 0);
    }

    #[test]
    fn update_unknown_id_errors() {
        let index: Index<MortonKey, &str> = Index::new(cfg());
        let result = index.update(999, [1.0, 1.0, 1.0], 5);
        assert!(matches!(result, Err(LucienError::IdUnknown(999))));
    }

    #[test]
    fn version_increases_on_structural_mutation_only() {
        let index: Index<MortonKey, &str> = Index::new(cfg());
        let before = index.version();
        let id = index.insert([1.0, 1.0, 1.0], 5, "a").unwrap();
        assert!(index.version() > before);
        let after_insert = index.version();
        index.lookup([1.0, 1.0, 1.0], 5).unwrap();
        assert_eq!(index.version(), after_insert);
        index.update(id, [1.0, 1.0, 1.0], 5).unwrap();
        assert_eq!(index.version(), after_insert, "same-cell update must not bump version");
    }

    #[test]
    fn entities_in_region_finds_entities_at_every_occupied_level() {
        // Regression test: a single fixed scan level silently dropped any
        // entity inserted at a shallower level than the deepest occupied one.
        let index: Index<MortonKey, &str> = Index::new(cfg());
        let shallow = index.insert([50.0, 50.0, 50.0], 10, "shallow").unwrap();
        let deep = index.insert([60.0, 60.0, 60.0], 12, "deep").unwrap();
        let found = index.entities_in_region(([0.0, 0.0, 0.0], [1000.0, 1000.0, 1000.0]));
        assert!(found.contains(&shallow));
        assert!(found.contains(&deep));
    }
}
