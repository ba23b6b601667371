//! Core scene types shared across all modules.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

/// A world-space vector.  Crosses the wire as a bare `[x, y, z]` array.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub const fn one() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        v.to_array()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Grid positions
// ---------------------------------------------------------------------------

/// Integer tabletop coordinate.  Scaled to world space by the session's
/// grid size (see [`crate::grid`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct GridPosition {
    pub x: i32,
    pub z: i32,
    /// Height above the board, carried through unscaled.
    #[serde(default)]
    pub y: f64,
    /// Facing in degrees.
    #[serde(default)]
    pub facing: f64,
}

impl GridPosition {
    pub fn new(x: i32, z: i32) -> Self {
        Self {
            x,
            z,
            y: 0.0,
            facing: 0.0,
        }
    }

    pub fn with_height(mut self, y: f64) -> Self {
        self.y = y;
        self
    }

    pub fn facing(mut self, degrees: f64) -> Self {
        self.facing = degrees;
        self
    }
}

impl std::fmt::Display for GridPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.x, self.z)
    }
}

/// Where to put an entity: either a grid cell or a raw world position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    Grid(GridPosition),
    World(Vec3),
}

impl From<GridPosition> for Placement {
    fn from(pos: GridPosition) -> Self {
        Placement::Grid(pos)
    }
}

impl From<Vec3> for Placement {
    fn from(pos: Vec3) -> Self {
        Placement::World(pos)
    }
}

// ---------------------------------------------------------------------------
// Entity naming
// ---------------------------------------------------------------------------

/// Role prefixes the renderer understands.  Advisory only: the server does
/// not reject names outside this list.
pub const ENTITY_PREFIXES: [&str; 6] = ["mini_", "prop_", "tile_", "cam_", "effect_", "env_"];

// ---------------------------------------------------------------------------
// Entities & snapshots
// ---------------------------------------------------------------------------

fn unit_scale() -> Vec3 {
    Vec3::one()
}

/// Server-authoritative entity record, as carried in `game_state` pushes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    /// Filled from the snapshot key when the server omits it.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl EntityRecord {
    pub fn new(name: impl Into<String>, template: impl Into<String>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            position,
            rotation: Vec3::zero(),
            scale: Vec3::one(),
            owner: None,
            properties: serde_json::Map::new(),
        }
    }
}

/// Full entity set pushed by the server at one point in time.
///
/// Unknown top-level keys (board info, camera, ...) are kept verbatim in
/// `extra` so nothing the renderer sends is lost.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameState {
    #[serde(default)]
    pub entities: HashMap<String, EntityRecord>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GameState {
    /// Parse a snapshot payload, back-filling each record's `name` from its
    /// map key.
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        let mut state: GameState = serde_json::from_value(value)?;
        for (name, record) in state.entities.iter_mut() {
            if record.name.is_empty() {
                record.name = name.clone();
            }
        }
        Ok(state)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoardType {
    #[default]
    Square,
    Hex,
}

impl BoardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardType::Square => "square",
            BoardType::Hex => "hex",
        }
    }
}

/// Board footprint requested through `setup_board`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoardSpec {
    pub board_type: BoardType,
    /// Edge length of one grid cell in world units.
    pub size: f64,
    /// Width in grid cells.
    pub width: u32,
    /// Height (depth) in grid cells.
    pub height: u32,
    pub create_tiles: bool,
}

impl Default for BoardSpec {
    fn default() -> Self {
        Self {
            board_type: BoardType::Square,
            size: 1.0,
            width: 10,
            height: 10,
            create_tiles: true,
        }
    }
}

impl BoardSpec {
    /// World-space rectangle covered by the board:
    /// `(min_x, max_x, min_z, max_z)`.
    ///
    /// Cells run from `0` to `width - 1` (and `height - 1`), each centered on
    /// `cell * size`, so the rectangle starts half a cell before the origin.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let half = self.size / 2.0;
        let max_x = self.width as f64 * self.size - half;
        let max_z = self.height as f64 * self.size - half;
        (-half, max_x, -half, max_z)
    }
}
