//! Octree instantiation of the hierarchical index over `MortonKey`
//! (spec.md §9: "implement once, instantiate twice").

use crate::key::MortonKey;

pub type Octree<T> = super::Index<MortonKey, T>;
