//! Grid ↔ world coordinate mapping.
//!
//! The whole scene shares one `grid_size` (set by `setup_board`).  Grid `x`
//! and `z` are scaled by it; height (`y`) passes through untouched.

use crate::types::{GridPosition, Vec3};

/// `(x * s, y, z * s)`.
pub fn grid_to_world(pos: GridPosition, grid_size: f64) -> Vec3 {
    Vec3::new(pos.x as f64 * grid_size, pos.y, pos.z as f64 * grid_size)
}

/// Snap a world position to the nearest grid cell.
///
/// Lossy when `world.x`/`world.z` are not multiples of `grid_size`: the
/// result is the nearest cell, ties rounding away from zero.  `y` is kept
/// unrounded and `facing` is reset.
pub fn world_to_grid(world: Vec3, grid_size: f64) -> GridPosition {
    GridPosition {
        x: (world.x / grid_size).round() as i32,
        z: (world.z / grid_size).round() as i32,
        y: world.y,
        facing: 0.0,
    }
}

/// Manhattan distance between two cells, ignoring height.
pub fn manhattan(a: GridPosition, b: GridPosition) -> i32 {
    (a.x - b.x).abs() + (a.z - b.z).abs()
}
