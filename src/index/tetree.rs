//! Tetree instantiation of the hierarchical index over `TetreeKey`
//! (spec.md §9: "implement once, instantiate twice").

use crate::key::TetreeKey;

pub type Tetree<T> = super::Index<TetreeKey, T>;
