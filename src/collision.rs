//! Collision probe: axis-aligned box overlap plus board bounds.
//!
//! Every entity is treated as a box centered on its position with
//! half-extents `0.5 * |scale|` per axis, which is exact for the renderer's
//! unit primitives and a fair stand-in for models.  Boxes that only touch
//! faces do not collide, so walls of unit cubes are legal.  Board tiles
//! (`tile_*`) are the table surface, not obstacles.

use crate::types::{BoardSpec, Vec3};
use serde::{Deserialize, Serialize};

/// Overlap smaller than this is treated as touching.
const EPSILON: f64 = 1e-6;

/// Entities created by `setup_board` to draw the table.
pub const TILE_PREFIX: &str = "tile_";

/// Minimal view of an entity the probe needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint<'a> {
    pub name: &'a str,
    pub position: Vec3,
    pub scale: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn around(center: Vec3, scale: Vec3) -> Self {
        let h = Vec3::new(scale.x.abs() / 2.0, scale.y.abs() / 2.0, scale.z.abs() / 2.0);
        Self {
            min: Vec3::new(center.x - h.x, center.y - h.y, center.z - h.z),
            max: Vec3::new(center.x + h.x, center.y + h.y, center.z + h.z),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x - EPSILON
            && other.min.x < self.max.x - EPSILON
            && self.min.y < other.max.y - EPSILON
            && other.min.y < self.max.y - EPSILON
            && self.min.z < other.max.z - EPSILON
            && other.min.z < self.max.z - EPSILON
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collision {
    pub name: String,
    pub position: Vec3,
}

/// Result of probing one position.  Serializes as
/// `{"collisions": [...], "onTable": bool}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollisionReport {
    pub collisions: Vec<Collision>,
    #[serde(rename = "onTable")]
    pub on_table: bool,
}

impl CollisionReport {
    /// No overlaps and on the board.
    pub fn is_clear(&self) -> bool {
        self.collisions.is_empty() && self.on_table
    }

    pub fn names(&self) -> Vec<&str> {
        self.collisions.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Probe `name` placed at `position` with `scale` against `others`.
///
/// `others` may include `name` itself; it is skipped, as are board tiles.
/// With no board the probe is always on the table.  Collisions are reported
/// sorted by name.
pub fn probe<'a>(
    name: &str,
    position: Vec3,
    scale: Vec3,
    others: impl IntoIterator<Item = Footprint<'a>>,
    board: Option<&BoardSpec>,
) -> CollisionReport {
    let probe_box = Aabb::around(position, scale);

    let mut collisions: Vec<Collision> = others
        .into_iter()
        .filter(|o| o.name != name && !o.name.starts_with(TILE_PREFIX))
        .filter(|o| probe_box.overlaps(&Aabb::around(o.position, o.scale)))
        .map(|o| Collision {
            name: o.name.to_string(),
            position: o.position,
        })
        .collect();
    collisions.sort_by(|a, b| a.name.cmp(&b.name));

    let on_table = board.map_or(true, |b| within_board(&probe_box, b));

    CollisionReport {
        collisions,
        on_table,
    }
}

fn within_board(footprint: &Aabb, board: &BoardSpec) -> bool {
    let (min_x, max_x, min_z, max_z) = board.bounds();
    footprint.min.x >= min_x - EPSILON
        && footprint.max.x <= max_x + EPSILON
        && footprint.min.z >= min_z - EPSILON
        && footprint.max.z <= max_z + EPSILON
}
