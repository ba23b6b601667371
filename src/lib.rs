//! VTTL client
//!
//! Drives the browser-hosted 3D tabletop renderer ("VTTL server") over a
//! single WebSocket: create, move, rotate and delete entities, set up the
//! board, steer the camera, capture screenshots.
//!
//! ## Architecture
//!
//! ```text
//! SceneController  (scene.rs)    ← local registry, arrangements, walls
//!   └── VttlClient  (client.rs)  ← command API, grid size, board
//!         ├── MessageChannel  (channel.rs)   ← socket + receive task
//!         │     └── GameStateCache (cache.rs) ← last pushed snapshot
//!         ├── ScreenshotStore (screenshot.rs)
//!         └── collision.rs / grid.rs / layout.rs  (pure math)
//! ```
//!
//! Commands go out as `{"action": ..., "data": {...}}` envelopes (see
//! [`protocol`]).  The server pushes `game_state` snapshots, which replace
//! the cache wholesale.  By default nothing is acknowledged and the client
//! waits fixed delays (see [`config::Timings`]); [`config::SyncMode`]
//! switches to request-id acknowledgement instead.

pub mod cache;
pub mod channel;
pub mod client;
pub mod collision;
pub mod config;
pub mod error;
pub mod grid;
pub mod layout;
pub mod protocol;
pub mod scene;
pub mod screenshot;
pub mod types;

pub use cache::GameStateCache;
pub use client::{EntitySpec, VttlClient};
pub use collision::{Collision, CollisionReport};
pub use config::{ClientConfig, SyncMode, Timings};
pub use error::{ClientError, Result};
pub use layout::LineAxis;
pub use protocol::{Command, Envelope, ServerMessage};
pub use scene::{SceneController, SceneEntity};
pub use screenshot::ScreenshotStore;
pub use types::{
    BoardSpec, BoardType, EntityRecord, GameState, GridPosition, Placement, Vec3,
};
