//! Ghost layer: non-local neighbor elements kept by owner rank, plus the
//! dual set of local entities that are ghosts on other ranks, and the
//! batch wire format used to exchange both (spec.md §4.8, §6).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::{LucienError, Result};
use crate::key::{SpatialKey, Vec3};

/// A non-local element replicated into this rank's ghost layer.
#[derive(Clone, Debug, PartialEq)]
pub struct GhostElement<K, T> {
    pub key: K,
    pub entity_id: EntityId,
    pub content: T,
    pub position: Vec3,
    pub owner_rank: i32,
    pub owner_tree_id: i64,
}

/// A local entity that is a ghost on some other rank.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteElement<K> {
    pub key: K,
    pub entity_id: EntityId,
    pub remote_rank: i32,
}

/// Content (de)serialization strategy for the opaque `content` payload in
/// the wire format; the default is JSON via `serde_json`, matching the
/// teacher's existing use of `serde` elsewhere in the crate.
pub trait ContentCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

pub struct JsonCodec;

impl<T: Serialize + for<'de> Deserialize<'de>> ContentCodec<T> for JsonCodec {
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| LucienError::CodecError(e.to_string()))
    }
    fn decode(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| LucienError::CodecError(e.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

/// Wire-format ghost element, per spec.md §6: spatial key as a `(low, high)`
/// pair plus level, opaque entity id bytes, `f32` position, ownership, and
/// opaque content bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GhostElementMsg {
    pub key_low: u64,
    pub key_high: u64,
    pub level: u8,
    pub entity_id: u64,
    pub position: [f32; 3],
    pub owner_rank: i32,
    pub owner_tree_id: i64,
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub source_rank: i32,
    pub source_tree_id: i64,
    pub timestamp: Timestamp,
    pub elements: Vec<GhostElementMsg>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_ghost_elements: usize,
    pub total_remote_elements: usize,
    /// `(owner_rank, ghost_count)` pairs, one per rank with at least one
    /// ghost element.
    pub ghost_histogram: Vec<(i32, usize)>,
    /// `(remote_rank, remote_count)` pairs.
    pub remote_histogram: Vec<(i32, usize)>,
}

struct Inner<K, T> {
    ghosts_by_key: BTreeMap<K, Vec<GhostElement<K, T>>>,
    remotes_by_rank: BTreeMap<i32, Vec<RemoteElement<K>>>,
}

/// `{local-key -> ghosts}` plus `{owner-rank -> remotes}`, under independent
/// read/write locking from the hierarchical index (spec.md §5, §4.8).
pub struct GhostLayer<K: SpatialKey, T> {
    inner: RwLock<Inner<K, T>>,
    num_ghost_elements: AtomicU64,
    num_remote_elements: AtomicU64,
}

impl<K: SpatialKey, T: Clone> Default for GhostLayer<K, T> {
    fn default() -> Self {
        GhostLayer {
            inner: RwLock::new(Inner { ghosts_by_key: BTreeMap::new(), remotes_by_rank: BTreeMap::new() }),
            num_ghost_elements: AtomicU64::new(0),
            num_remote_elements: AtomicU64::new(0),
        }
    }
}

impl<K: SpatialKey, T: Clone> GhostLayer<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ghost(&self, element: GhostElement<K, T>) {
        let mut inner = self.inner.write();
        inner.ghosts_by_key.entry(element.key).or_default().push(element);
        self.num_ghost_elements.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub fn add_remote(&self, element: RemoteElement<K>) {
        let mut inner = self.inner.write();
        inner.remotes_by_rank.entry(element.remote_rank).or_default().push(element);
        self.num_remote_elements.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub fn get_ghosts(&self, key: &K) -> Vec<GhostElement<K, T>> {
        self.inner.read().ghosts_by_key.get(key).cloned().unwrap_or_default()
    }

    pub fn get_ghosts_in_range(&self, lo: &K, hi: &K) -> Vec<GhostElement<K, T>> {
        self.inner
            .read()
            .ghosts_by_key
            .range(lo.clone()..=hi.clone())
            .flat_map(|(_, v)| v.clone())
            .collect()
    }

    pub fn get_all_ghosts(&self) -> Vec<GhostElement<K, T>> {
        self.inner.read().ghosts_by_key.values().flatten().cloned().collect()
    }

    pub fn get_remotes(&self, rank: i32) -> Vec<RemoteElement<K>> {
        self.inner.read().remotes_by_rank.get(&rank).cloned().unwrap_or_default()
    }

    pub fn remote_ranks(&self) -> Vec<i32> {
        self.inner.read().remotes_by_rank.keys().copied().collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.ghosts_by_key.clear();
        inner.remotes_by_rank.clear();
        self.num_ghost_elements.store(0, AtomicOrdering::Relaxed);
        self.num_remote_elements.store(0, AtomicOrdering::Relaxed);
    }

    pub fn num_ghost_elements(&self) -> u64 {
        self.num_ghost_elements.load(AtomicOrdering::Relaxed)
    }

    pub fn num_remote_elements(&self) -> u64 {
        self.num_remote_elements.load(AtomicOrdering::Relaxed)
    }

    pub fn stats(&self) -> StatsResponse {
        let inner = self.inner.read();
        let ghost_histogram: Vec<(i32, usize)> = {
            let mut by_rank: BTreeMap<i32, usize> = BTreeMap::new();
            for elements in inner.ghosts_by_key.values() {
                for e in elements {
                    *by_rank.entry(e.owner_rank).or_default() += 1;
                }
            }
            by_rank.into_iter().collect()
        };
        let remote_histogram: Vec<(i32, usize)> =
            inner.remotes_by_rank.iter().map(|(rank, v)| (*rank, v.len())).collect();
        StatsResponse {
            total_ghost_elements: self.num_ghost_elements() as usize,
            total_remote_elements: self.num_remote_elements() as usize,
            ghost_histogram,
            remote_histogram,
        }
    }

    pub fn to_batch(&self, source_rank: i32, source_tree_id: i64, timestamp: Timestamp, codec: &impl ContentCodec<T>) -> Result<Batch> {
        let inner = self.inner.read();
        let mut elements = Vec::with_capacity(self.num_ghost_elements() as usize);
        for ghosts in inner.ghosts_by_key.values() {
            for g in ghosts {
                let (key_low, key_high) = g.key.to_wire();
                elements.push(GhostElementMsg {
                    key_low,
                    key_high,
                    level: g.key.level(),
                    entity_id: g.entity_id,
                    position: [g.position[0] as f32, g.position[1] as f32, g.position[2] as f32],
                    owner_rank: g.owner_rank,
                    owner_tree_id: g.owner_tree_id,
                    content: codec.encode(&g.content)?,
                });
            }
        }
        Ok(Batch { source_rank, source_tree_id, timestamp, elements })
    }

    /// Decodes each element independently; a bad element is reported via
    /// `GhostDecodeError` and skipped, the rest of the batch still loads
    /// (spec.md §7).
    pub fn add_from_batch(&self, batch: &Batch, codec: &impl ContentCodec<T>) -> Vec<LucienError> {
        let mut errors = Vec::new();
        for (index, msg) in batch.elements.iter().enumerate() {
            match codec.decode(&msg.content) {
                Ok(content) => {
                    let key = K::from_wire(msg.key_low, msg.key_high, msg.level);
                    self.add_ghost(GhostElement {
                        key,
                        entity_id: msg.entity_id,
                        content,
                        position: [msg.position[0] as f64, msg.position[1] as f64, msg.position[2] as f64],
                        owner_rank: msg.owner_rank,
                        owner_tree_id: msg.owner_tree_id,
                    });
                }
                Err(e) => errors.push(LucienError::GhostDecodeError { index, reason: e.to_string() }),
            }
        }
        errors
    }

    pub fn from_batch(batch: &Batch, codec: &impl ContentCodec<T>) -> (Self, Vec<LucienError>) {
        let layer = Self::new();
        let errors = layer.add_from_batch(batch, codec);
        (layer, errors)
    }
}
