//! Morton (Z-order) spatial key: a 63-bit interleaved code plus refinement level.
//!
//! The interleave itself follows the teacher crate's `encode_anchor`/`decode_key`
//! split-apart-by-coordinate shape, generalized from its fixed 16-bit-per-axis
//! byte-lookup tables to a level-parametrized bit loop so it covers the full
//! `[0, 21]` level range spec.md asks for without a 21-bit lookup table.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::config::MAX_LEVEL;
use crate::error::{Coords, LucienError};

pub type Result<T> = std::result::Result<T, LucienError>;

/// A Z-order-curve key: the interleaved bits of `(x, y, z)` at a refinement
/// `level`, plus the level itself so total order is well defined across
/// mixed-level key sets (spec.md §3, §4.1).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MortonKey {
    code: u64,
    level: u8,
}

pub const ROOT: MortonKey = MortonKey { code: 0, level: 0 };

impl MortonKey {
    pub fn code(&self) -> u64 {
        self.code
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Encode `(x, y, z)` at `level`. Fails with `InvalidLevel` or
    /// `OutOfDomain` per spec.md §4.1.
    pub fn encode(x: u32, y: u32, z: u32, level: u8) -> Result<MortonKey> {
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
        Ok(MortonKey {
            code: interleave(x, y, z, level),
            level,
        })
    }

    /// Inverse of `encode`: recovers `(x, y, z)` at this key's level.
    pub fn decode(&self) -> (u32, u32, u32) {
        deinterleave(self.code, self.level)
    }

    /// Side length (in grid cells at `MAX_LEVEL`) of the cube this key denotes.
    pub fn cell_size(&self) -> u64 {
        1u64 << (MAX_LEVEL - self.level)
    }

    /// World-space origin of the cube, in the integer grid at `MAX_LEVEL`.
    pub fn origin(&self) -> (u64, u64, u64) {
        let (x, y, z) = self.decode();
        let scale = self.cell_size();
        (x as u64 * scale, y as u64 * scale, z as u64 * scale)
    }

    /// The raw code, split into a `(low, high)` pair with `high` always `0`
    /// — mirrors `TetreeKey::low_high` so the ghost-batch wire format can
    /// treat both key families uniformly (spec.md §6).
    pub fn low_high(&self) -> (u64, u64) {
        (self.code, 0)
    }

    pub fn from_low_high(low: u64, _high: u64, level: u8) -> MortonKey {
        MortonKey { code: low, level }
    }

    pub fn parent(&self) -> Option<MortonKey> {
        if self.level == 0 {
            return None;
        }
        Some(MortonKey {
            code: self.code >> 3,
            level: self.level - 1,
        })
    }

    /// Child `i` (`i` in `[0, 8)`, Morton order) at `level + 1`.
    pub fn child(&self, i: u8) -> Result<MortonKey> {
        if i >= 8 {
            return Err(LucienError::InvalidType(i as i16));
        }
        if self.level >= MAX_LEVEL {
            return Err(LucienError::InvalidLevel(self.level as i16 + 1));
        }
        Ok(MortonKey {
            code: (self.code << 3) | i as u64,
            level: self.level + 1,
        })
    }

    pub fn children(&self) -> Result<[MortonKey; 8]> {
        let mut out = [ROOT; 8];
        for i in 0..8u8 {
            out[i as usize] = self.child(i)?;
        }
        Ok(out)
    }

    /// This key's index among its parent's children, `None` at the root.
    pub fn child_index(&self) -> Option<u8> {
        if self.level == 0 {
            None
        } else {
            Some((self.code & 0b111) as u8)
        }
    }

    pub fn is_ancestor_of(&self, other: &MortonKey) -> bool {
        if self.level >= other.level {
            return false;
        }
        let shift = (other.level - self.level) * 3;
        other.code >> shift == self.code
    }

    pub fn ancestors(&self) -> Vec<MortonKey> {
        let mut out = Vec::with_capacity(self.level as usize);
        let mut cur = *self;
        while let Some(p) = cur.parent() {
            out.push(p);
            cur = p;
        }
        out
    }
}

impl PartialEq for MortonKey {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.code == other.code
    }
}
impl Eq for MortonKey {}

impl Ord for MortonKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.level, self.code).cmp(&(other.level, other.code))
    }
}
impl PartialOrd for MortonKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Hash for MortonKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.level.hash(state);
        self.code.hash(state);
    }
}

fn spread_bits(v: u32, level: u8) -> u64 {
    let mut out: u64 = 0;
    for bit in 0..level {
        let b = ((v >> bit) & 1) as u64;
        out |= b << (3 * bit as u64);
    }
    out
}

fn interleave(x: u32, y: u32, z: u32, level: u8) -> u64 {
    spread_bits(x, level) | (spread_bits(y, level) << 1) | (spread_bits(z, level) << 2)
}

fn gather_bits(code: u64, level: u8, axis: u64) -> u32 {
    let mut out: u32 = 0;
    for bit in 0..level as u64 {
        let b = (code >> (3 * bit + axis)) & 1;
        out |= (b as u32) << bit;
    }
    out
}

fn deinterleave(code: u64, level: u8) -> (u32, u32, u32) {
    (
        gather_bits(code, level, 0),
        gather_bits(code, level, 1),
        gather_bits(code, level, 2),
    )
}
