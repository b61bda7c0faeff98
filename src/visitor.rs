//! Visitor traversal: DFS/BFS/level-order walk over occupied nodes with
//! cooperative cancellation and an optional depth limit (spec.md §4.4, §4.9).

use std::collections::VecDeque;

use crate::entity::EntityId;
use crate::key::{SpatialKey, Vec3};
use crate::node_map::NodeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    DepthFirst,
    BreadthFirst,
    LevelOrder,
}

/// Callbacks for a traversal. Default bodies are no-ops so callers only
/// override what they need, matching the way the teacher's tree test
/// fixtures use minimal helper closures rather than full objects.
pub trait Visitor<K, T> {
    fn begin(&mut self) {}
    /// Return `false` to cancel this node's subtree; traversal continues
    /// with the next sibling.
    fn visit_node(&mut self, _key: K, _level: u8, _parent: Option<K>) -> bool {
        true
    }
    fn visit_entity(&mut self, _id: EntityId, _content: &T, _key: K, _level: u8) {}
    fn leave_node(&mut self, _key: K) {}
    fn end(&mut self) {}
}

fn region_excludes<K: SpatialKey>(key: &K, region: Option<(Vec3, Vec3)>) -> bool {
    match region {
        Some((lo, hi)) => !key.intersects_box(lo, hi),
        None => false,
    }
}

fn visit_one<K: SpatialKey, T>(
    key: K,
    node_map: &NodeMap<K>,
    content_of: &impl Fn(EntityId) -> Option<T>,
    visitor: &mut impl Visitor<K, T>,
) -> bool
where
    T: Clone,
{
    let Some(ids) = node_map.get(&key) else {
        return true;
    };
    let cont = visitor.visit_node(key, key.level(), key.parent());
    if cont {
        for &id in ids {
            if let Some(content) = content_of(id) {
                visitor.visit_entity(id, &content, key, key.level());
            }
        }
    }
    visitor.leave_node(key);
    cont
}

/// Walks the hierarchy from `root`, calling `visitor`'s callbacks for every
/// occupied node reachable within `max_depth`, honoring `region` as a
/// pre-filter and `Visitor::visit_node`'s cancellation. `content_of` looks
/// up an entity's content by id (decoupling this module from the entity
/// store's content type parameter).
pub fn traverse<K: SpatialKey, T: Clone>(
    root: K,
    strategy: Strategy,
    node_map: &NodeMap<K>,
    content_of: impl Fn(EntityId) -> Option<T>,
    region: Option<(Vec3, Vec3)>,
    max_depth: u8,
    visitor: &mut impl Visitor<K, T>,
) {
    visitor.begin();
    // Computed once per traversal and threaded through the recursion so
    // pruning (`NodeMap::subtree_occupied`) never re-scans the map per node.
    let levels = node_map.occupied_levels();
    match strategy {
        Strategy::DepthFirst => depth_first(root, node_map, &content_of, region, max_depth, &levels, visitor),
        // A single-rooted traversal's breadth-first and level-order visits
        // coincide (both are level-major from the root); both are
        // implemented with the same queue-based walk.
        Strategy::BreadthFirst | Strategy::LevelOrder => {
            breadth_first(root, node_map, &content_of, region, max_depth, &levels, visitor)
        }
    }
    visitor.end();
}

fn depth_first<K: SpatialKey, T: Clone>(
    key: K,
    node_map: &NodeMap<K>,
    content_of: &impl Fn(EntityId) -> Option<T>,
    region: Option<(Vec3, Vec3)>,
    max_depth: u8,
    levels: &[u8],
    visitor: &mut impl Visitor<K, T>,
) {
    if key.level() > max_depth || region_excludes(&key, region) {
        return;
    }
    let continued = visit_one(key, node_map, content_of, visitor);
    if !continued {
        return;
    }
    let deepest = levels.last().copied().unwrap_or(0);
    if key.level() >= deepest {
        return;
    }
    if let Ok(children) = key.children() {
        for child in children {
            // Only descend where an occupied node actually lives; the
            // implicit tree below an empty subtree is never enumerated.
            if node_map.subtree_occupied(&child, levels) {
                depth_first(child, node_map, content_of, region, max_depth, levels, visitor);
            }
        }
    }
}

fn breadth_first<K: SpatialKey, T: Clone>(
    root: K,
    node_map: &NodeMap<K>,
    content_of: &impl Fn(EntityId) -> Option<T>,
    region: Option<(Vec3, Vec3)>,
    max_depth: u8,
    levels: &[u8],
    visitor: &mut impl Visitor<K, T>,
) {
    let deepest = levels.last().copied().unwrap_or(0);
    let mut queue: VecDeque<K> = VecDeque::new();
    queue.push_back(root);
    while let Some(key) = queue.pop_front() {
        if key.level() > max_depth || region_excludes(&key, region) {
            continue;
        }
        let continued = visit_one(key, node_map, content_of, visitor);
        if !continued || key.level() >= deepest {
            continue;
        }
        if let Ok(children) = key.children() {
            for child in children {
                if node_map.subtree_occupied(&child, levels) {
                    queue.push_back(child);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::MortonKey;

    #[derive(Default)]
    struct Collector {
        visited_nodes: Vec<MortonKey>,
        visited_entities: Vec<EntityId>,
    }

    impl Visitor<MortonKey, &'static str> for Collector {
        fn visit_node(&mut self, key: MortonKey, _level: u8, _parent: Option<MortonKey>) -> bool {
            self.visited_nodes.push(key);
            true
        }
        fn visit_entity(&mut self, id: EntityId, _content: &&'static str, _key: MortonKey, _level: u8) {
            self.visited_entities.push(id);
        }
    }

    #[test]
    fn depth_first_visits_every_occupied_node() {
        let mut map: NodeMap<MortonKey> = NodeMap::new();
        let a = MortonKey::encode(0, 0, 0, 2).unwrap();
        let b = MortonKey::encode(3, 3, 3, 2).unwrap();
        map.insert(a, 1);
        map.insert(b, 2);
        let mut collector = Collector::default();
        traverse(MortonKey::root(), Strategy::DepthFirst, &map, |id| Some(if id == 1 { "a" } else { "b" }), None, 21, &mut collector);
        assert_eq!(collector.visited_nodes.len(), 2);
        assert!(collector.visited_entities.contains(&1));
        assert!(collector.visited_entities.contains(&2));
    }

    #[derive(Default)]
    struct Canceler {
        node_visits: usize,
    }
    impl Visitor<MortonKey, &'static str> for Canceler {
        fn visit_node(&mut self, _key: MortonKey, _level: u8, _parent: Option<MortonKey>) -> bool {
            self.node_visits += 1;
            false
        }
    }

    #[test]
    fn cancelling_root_skips_descendants() {
        let mut map: NodeMap<MortonKey> = NodeMap::new();
        let deep = MortonKey::encode(0, 0, 0, 3).unwrap();
        map.insert(deep, 1);
        map.insert(MortonKey::root(), 2);
        let mut canceler = Canceler::default();
        traverse(MortonKey::root(), Strategy::DepthFirst, &map, |_| Some("x"), None, 21, &mut canceler);
        assert_eq!(canceler.node_visits, 1, "cancelling the root must skip its whole subtree");
    }

    #[test]
    fn deep_single_entity_traversal_stays_bounded_to_occupied_path() {
        // Regression test: before pruning by occupied descendants, both
        // strategies would enumerate the full implicit tree down to the
        // deepest occupied level (8^15 cells here) instead of just the one
        // real node.
        let mut map: NodeMap<MortonKey> = NodeMap::new();
        let deep = MortonKey::encode(12, 34, 56, 15).unwrap();
        map.insert(deep, 1);

        let mut dfs = Collector::default();
        traverse(MortonKey::root(), Strategy::DepthFirst, &map, |_| Some("x"), None, 21, &mut dfs);
        assert_eq!(dfs.visited_nodes, vec![deep]);

        let mut bfs = Collector::default();
        traverse(MortonKey::root(), Strategy::BreadthFirst, &map, |_| Some("x"), None, 21, &mut bfs);
        assert_eq!(bfs.visited_nodes, vec![deep]);
    }
}
