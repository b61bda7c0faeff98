//! Spatial key abstraction: the `SpatialKey` capability set both `MortonKey`
//! (octree) and `TetreeKey` (tetree) implement, so the hierarchical index in
//! `crate::index` is written once and instantiated twice (spec.md §9).

pub mod geometry;
pub mod morton;
pub mod tet_tables;
pub mod tetree;

pub use geometry::Vec3;
pub use morton::MortonKey;
pub use tetree::TetreeKey;

use crate::error::Result;

/// Capability set a hierarchical index needs from its spatial key type.
/// Both `MortonKey` and `TetreeKey` have exactly 8 children per spec.md
/// (octree octants; tetree Bey children), so `children()` returns a fixed
/// `[Self; 8]` rather than a `Vec`.
pub trait SpatialKey: Copy + Eq + Ord + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static {
    fn root() -> Self;
    fn level(&self) -> u8;
    fn parent(&self) -> Option<Self>;
    fn child(&self, index: u8) -> Result<Self>;
    fn children(&self) -> Result<[Self; 8]>;
    fn child_index(&self) -> Option<u8>;
    fn is_ancestor_of(&self, other: &Self) -> bool;

    /// Round `pos` onto the grid at `level` and locate the cell containing
    /// it (spec.md §4.1 `locateTet`/Morton equivalent).
    fn cell_for_point(pos: Vec3, level: u8) -> Result<Self>;
    /// Locate the cell at already-rounded integer grid coordinates, used by
    /// the entity store when redistributing spanning entities across a
    /// known coordinate range (spec.md §4.2 spanning).
    fn from_grid(x: u32, y: u32, z: u32, level: u8) -> Result<Self>;
    fn contains_point(&self, pos: Vec3) -> bool;
    fn min_dist_to_point(&self, pos: Vec3) -> f64;

    /// Does this cell's geometry overlap the axis-aligned box `[lo, hi]`?
    /// Used by the SFC range engine to prune subtrees (spec.md §4.5).
    fn intersects_box(&self, lo: Vec3, hi: Vec3) -> bool;
    /// Is this cell's geometry entirely contained in `[lo, hi]`? When true
    /// the range engine can emit the whole subtree as one interval.
    fn inside_box(&self, lo: Vec3, hi: Vec3) -> bool;

    /// `(low, high)` 64-bit pair for the ghost-batch wire format (spec.md
    /// §6); `high` is always `0` for `MortonKey`.
    fn to_wire(&self) -> (u64, u64);
    fn from_wire(low: u64, high: u64, level: u8) -> Self;
}

impl SpatialKey for MortonKey {
    fn root() -> Self {
        morton::ROOT
    }
    fn level(&self) -> u8 {
        MortonKey::level(self)
    }
    fn parent(&self) -> Option<Self> {
        MortonKey::parent(self)
    }
    fn child(&self, index: u8) -> Result<Self> {
        MortonKey::child(self, index)
    }
    fn children(&self) -> Result<[Self; 8]> {
        MortonKey::children(self)
    }
    fn child_index(&self) -> Option<u8> {
        MortonKey::child_index(self)
    }
    fn is_ancestor_of(&self, other: &Self) -> bool {
        MortonKey::is_ancestor_of(self, other)
    }
    fn cell_for_point(pos: Vec3, level: u8) -> Result<Self> {
        let (x, y, z) = geometry::round_to_grid(pos, level)?;
        MortonKey::encode(x, y, z, level)
    }
    fn from_grid(x: u32, y: u32, z: u32, level: u8) -> Result<Self> {
        MortonKey::encode(x, y, z, level)
    }
    fn contains_point(&self, pos: Vec3) -> bool {
        geometry::cube_contains_point(self, pos)
    }
    fn min_dist_to_point(&self, pos: Vec3) -> f64 {
        geometry::min_dist_point_to_cube(pos, self)
    }
    fn intersects_box(&self, lo: Vec3, hi: Vec3) -> bool {
        geometry::cube_intersects_box(self, lo, hi)
    }
    fn inside_box(&self, lo: Vec3, hi: Vec3) -> bool {
        geometry::cube_inside_box(self, lo, hi)
    }
    fn to_wire(&self) -> (u64, u64) {
        MortonKey::low_high(self)
    }
    fn from_wire(low: u64, high: u64, level: u8) -> Self {
        MortonKey::from_low_high(low, high, level)
    }
}

impl SpatialKey for TetreeKey {
    fn root() -> Self {
        tetree::ROOT
    }
    fn level(&self) -> u8 {
        TetreeKey::level(self)
    }
    fn parent(&self) -> Option<Self> {
        TetreeKey::parent(self)
    }
    fn child(&self, index: u8) -> Result<Self> {
        TetreeKey::child(self, index)
    }
    fn children(&self) -> Result<[Self; 8]> {
        TetreeKey::children(self)
    }
    fn child_index(&self) -> Option<u8> {
        TetreeKey::child_index(self)
    }
    fn is_ancestor_of(&self, other: &Self) -> bool {
        TetreeKey::is_ancestor_of(self, other)
    }
    fn cell_for_point(pos: Vec3, level: u8) -> Result<Self> {
        let (x, y, z) = geometry::round_to_grid(pos, level)?;
        geometry::locate_tet(x, y, z, level)
    }
    fn from_grid(x: u32, y: u32, z: u32, level: u8) -> Result<Self> {
        geometry::locate_tet(x, y, z, level)
    }
    fn contains_point(&self, pos: Vec3) -> bool {
        geometry::tet_contains_point(self, pos)
    }
    fn min_dist_to_point(&self, pos: Vec3) -> f64 {
        geometry::min_dist_point_to_tet(pos, self)
    }
    fn intersects_box(&self, lo: Vec3, hi: Vec3) -> bool {
        geometry::tet_intersects_box(self, lo, hi)
    }
    fn inside_box(&self, lo: Vec3, hi: Vec3) -> bool {
        geometry::tet_inside_box(self, lo, hi)
    }
    fn to_wire(&self) -> (u64, u64) {
        TetreeKey::low_high(self)
    }
    fn from_wire(low: u64, high: u64, level: u8) -> Self {
        TetreeKey::from_low_high(low, high, level)
    }
}
