//! The TM-index: a 128-bit interleaved `(coordinate, type)` code identifying
//! a tetrahedron in the Bey-refinement hierarchy (spec.md §3, §4.1).

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::config::MAX_LEVEL;
use crate::error::{Coords, LucienError};
use crate::key::tet_tables::type_transition;

pub type Result<T> = std::result::Result<T, LucienError>;

/// `TetreeKey { code, level }`. `code` packs, per level from the root down,
/// 6 bits: the 3-bit Bey child index (coordinate bits, Morton order) and the
/// 3-bit tetrahedron type produced by walking `T` from the root. Bits for
/// level 1 occupy the low 6 bits of `code`; later levels shift left.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TetreeKey {
    code: u128,
    level: u8,
}

pub const ROOT: TetreeKey = TetreeKey { code: 0, level: 0 };

impl TetreeKey {
    pub fn level(&self) -> u8 {
        self.level
    }

    /// The raw 128-bit code, split into a `(low, high)` 64-bit pair for
    /// interop with the ghost-batch wire format (spec.md §6).
    pub fn low_high(&self) -> (u64, u64) {
        (self.code as u64, (self.code >> 64) as u64)
    }

    pub fn from_low_high(low: u64, high: u64, level: u8) -> TetreeKey {
        TetreeKey {
            code: (low as u128) | ((high as u128) << 64),
            level,
        }
    }

    /// This key's type: the tetrahedron type at its own level, `0..6`.
    pub fn tet_type(&self) -> u8 {
        if self.level == 0 {
            return 0;
        }
        (self.code & 0b111) as u8
    }

    fn child_index_at(&self, level: u8) -> u8 {
        debug_assert!(level >= 1 && level <= self.level);
        let shift = 6 * (self.level - level) + 3;
        ((self.code >> shift) & 0b111) as u8
    }

    /// Encode `(x, y, z)` at `level` by walking the refinement path from the
    /// root, computing the child index from coordinate bits at each level and
    /// advancing the type through `T` (spec.md §4.1, §4.3).
    pub fn encode(x: u32, y: u32, z: u32, level: u8) -> Result<TetreeKey> {
        if level > MAX_LEVEL {
            return Err(LucienError::InvalidLevel(level as i16));
        }
        let bound = 1u64 << level;
        if x as u64 >= bound || y as u64 >= bound || z as u64 >= bound {
            return Err(LucienError::OutOfDomain {
                coords: Coords::new(x as i64, y as i64, z as i64),
                level,
            });
        }

        let mut code: u128 = 0;
        let mut type_ = 0u8;
        for l in 1..=level {
            let bit = level - l;
            let cx = (x >> bit) & 1;
            let cy = (y >> bit) & 1;
            let cz = (z >> bit) & 1;
            let child_index = (cz * 4 + cy * 2 + cx) as u8;
            type_ = type_transition(type_, child_index);
            let six_bits = ((child_index as u128) << 3) | type_ as u128;
            code = (code << 6) | six_bits;
        }
        Ok(TetreeKey { code, level })
    }

    /// Inverse of `encode`, also returning the reconstructed type at every
    /// level implicitly via re-walking `T` (spec.md §8 property 1).
    pub fn decode(&self) -> (u32, u32, u32) {
        let mut x: u32 = 0;
        let mut y: u32 = 0;
        let mut z: u32 = 0;
        let mut type_ = 0u8;
        for l in 1..=self.level {
            let shift = 6 * (self.level - l) as u32;
            let six_bits = (self.code >> shift) & 0b111111;
            let child_index = ((six_bits >> 3) & 0b111) as u8;
            let encoded_type = (six_bits & 0b111) as u8;
            // Recomputing rather than trusting `encoded_type` enforces
            // invariant §3.4: the type bits must match the path.
            type_ = type_transition(type_, child_index);
            debug_assert_eq!(type_, encoded_type);
            let bit = self.level - l;
            x |= ((child_index & 1) as u32) << bit;
            y |= (((child_index >> 1) & 1) as u32) << bit;
            z |= (((child_index >> 2) & 1) as u32) << bit;
        }
        (x, y, z)
    }

    pub fn parent(&self) -> Option<TetreeKey> {
        if self.level == 0 {
            return None;
        }
        Some(TetreeKey {
            code: self.code >> 6,
            level: self.level - 1,
        })
    }

    pub fn child(&self, child_index: u8) -> Result<TetreeKey> {
        if child_index >= 8 {
            return Err(LucienError::InvalidType(child_index as i16));
        }
        if self.level >= MAX_LEVEL {
            return Err(LucienError::InvalidLevel(self.level as i16 + 1));
        }
        let child_type = type_transition(self.tet_type(), child_index);
        let six_bits = ((child_index as u128) << 3) | child_type as u128;
        Ok(TetreeKey {
            code: (self.code << 6) | six_bits,
            level: self.level + 1,
        })
    }

    pub fn children(&self) -> Result<[TetreeKey; 8]> {
        let mut out = [ROOT; 8];
        for i in 0..8u8 {
            out[i as usize] = self.child(i)?;
        }
        Ok(out)
    }

    pub fn child_index(&self) -> Option<u8> {
        if self.level == 0 {
            None
        } else {
            Some(self.child_index_at(self.level))
        }
    }

    pub fn is_ancestor_of(&self, other: &TetreeKey) -> bool {
        if self.level >= other.level {
            return false;
        }
        let shift = 6 * (other.level - self.level);
        other.code >> shift == self.code
    }
}

impl PartialEq for TetreeKey {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.code == other.code
    }
}
impl Eq for TetreeKey {}

impl Ord for TetreeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.level, self.code).cmp(&(other.level, other.code))
    }
}
impl PartialOrd for TetreeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Hash for TetreeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.level.hash(state);
        self.code.hash(state);
    }
}
