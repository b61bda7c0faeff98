//! Entity store: `id -> {content, position, bounds, span-set}` (spec.md §4.2).
//!
//! Spanning as "arena + span-set" per spec.md §9: entities live in a dense
//! `HashMap` keyed by a small sequential id (mirroring the teacher's `Point`,
//! which already carries a `global_idx` alongside its coordinate), and each
//! entity owns only the *keys* of the nodes that reference it — never the
//! nodes themselves, breaking the node/entity reference cycle the design
//! notes call out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use smallvec::SmallVec;

use crate::error::{LucienError, Result};
use crate::key::Vec3;

pub type EntityId = u64;

/// Axis-aligned bounding box, used when an entity spans multiple cells.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }
}

/// Typical span size before falling back to heap growth (spec.md §9).
pub type SpanSet<K> = SmallVec<[K; 8]>;

pub struct Entity<T, K> {
    pub content: T,
    pub position: Vec3,
    pub bounds: Option<Aabb>,
    pub span: SpanSet<K>,
}

/// Holds `id -> entity`. All operations are serialized under the
/// hierarchical index's single write-lock (spec.md §4.2); this type itself
/// has no internal locking.
pub struct EntityStore<T, K> {
    next_id: AtomicU64,
    entities: HashMap<EntityId, Entity<T, K>>,
}

impl<T, K: Clone> Default for EntityStore<T, K> {
    fn default() -> Self {
        EntityStore {
            next_id: AtomicU64::new(1),
            entities: HashMap::new(),
        }
    }
}

impl<T, K: Clone> EntityStore<T, K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&self) -> EntityId {
        self.next_id.fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// Idempotent overwrite of `content`/`position`/`bounds`; does not touch
    /// the span-set.
    pub fn put(&mut self, id: EntityId, content: T, position: Vec3, bounds: Option<Aabb>) {
        match self.entities.get_mut(&id) {
            Some(e) => {
                e.content = content;
                e.position = position;
                e.bounds = bounds;
            }
            None => {
                self.entities.insert(
                    id,
                    Entity {
                        content,
                        position,
                        bounds,
                        span: SpanSet::new(),
                    },
                );
            }
        }
    }

    pub fn set_span(&mut self, id: EntityId, keys: SpanSet<K>) -> Result<()> {
        let e = self
            .entities
            .get_mut(&id)
            .ok_or(LucienError::IdUnknown(id))?;
        e.span = keys;
        Ok(())
    }

    pub fn span(&self, id: EntityId) -> Option<&SpanSet<K>> {
        self.entities.get(&id).map(|e| &e.span)
    }

    pub fn span_count(&self, id: EntityId) -> usize {
        self.entities.get(&id).map(|e| e.span.len()).unwrap_or(0)
    }

    /// Removes the entity. Returns `true` iff it was present. Callers must
    /// have already detached the entity's node references.
    pub fn remove(&mut self, id: EntityId) -> bool {
        self.entities.remove(&id).is_some()
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id).map(|e| &e.content)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id).map(|e| &mut e.content)
    }

    pub fn position(&self, id: EntityId) -> Option<Vec3> {
        self.entities.get(&id).map(|e| e.position)
    }

    pub fn set_position(&mut self, id: EntityId, pos: Vec3) -> Result<()> {
        let e = self
            .entities
            .get_mut(&id)
            .ok_or(LucienError::IdUnknown(id))?;
        e.position = pos;
        Ok(())
    }

    pub fn bounds(&self, id: EntityId) -> Option<Aabb> {
        self.entities.get(&id).and_then(|e| e.bounds)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Entity<T, K>)> {
        self.entities.iter()
    }
}
