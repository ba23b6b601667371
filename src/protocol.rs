//! VTTL control-channel wire protocol.
//!
//! This module owns **every message that crosses the WebSocket** between
//! the client and the renderer's server.
//!
//! ## Shapes
//!
//! | Direction        | JSON                                                  |
//! |------------------|-------------------------------------------------------|
//! | client → server  | `{"action": "<verb>", "data": {...}}`                 |
//! | server → client  | `{"type": "<kind>", ...}`                             |
//!
//! ## Rules
//!
//! 1. Positions, rotations and scales are bare `[x, y, z]` arrays.
//! 2. `request_id` is only attached in acknowledged mode; servers that do not
//!    echo it simply never complete those requests.
//! 3. Unknown inbound kinds are passed through, never rejected.

use crate::error::{ClientError, Result};
use crate::types::{GameState, Vec3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Empty {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateEntity {
    pub name: String,
    pub template: String,
    pub position: Vec3,
    /// Sent as `null` for neutral props.
    pub owner: Option<String>,
    pub properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveEntity {
    pub name: String,
    pub to: Vec3,
    pub animate: bool,
}

/// Same shape as [`MoveEntity`]; `to` holds Euler angles in degrees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RotateEntity {
    pub name: String,
    pub to: Vec3,
    pub animate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteEntity {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetupBoard {
    #[serde(rename = "type")]
    pub board_type: String,
    pub size: f64,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "createTiles")]
    pub create_tiles: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckCollisions {
    pub name: String,
    pub position: Vec3,
}

/// `set_camera` accepts either an orbit description or an explicit
/// position/target pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SetCamera {
    Orbit {
        #[serde(rename = "angleX")]
        angle_x: f64,
        #[serde(rename = "angleY")]
        angle_y: f64,
        distance: f64,
    },
    LookAt {
        position: Vec3,
        target: Vec3,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteJavascript {
    pub code: String,
}

/// Every command the server accepts.  Serializes to `{action, data}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum Command {
    CreateEntity(CreateEntity),
    MoveEntity(MoveEntity),
    RotateEntity(RotateEntity),
    DeleteEntity(DeleteEntity),
    SetupBoard(SetupBoard),
    GetGameState(Empty),
    CheckCollisions(CheckCollisions),
    GetScreenshot(Empty),
    SetCamera(SetCamera),
    ExecuteJavascript(ExecuteJavascript),
}

impl Command {
    /// The `action` string this command is sent under.
    pub fn action(&self) -> &'static str {
        match self {
            Command::CreateEntity(_) => actions::CREATE_ENTITY,
            Command::MoveEntity(_) => actions::MOVE_ENTITY,
            Command::RotateEntity(_) => actions::ROTATE_ENTITY,
            Command::DeleteEntity(_) => actions::DELETE_ENTITY,
            Command::SetupBoard(_) => actions::SETUP_BOARD,
            Command::GetGameState(_) => actions::GET_GAME_STATE,
            Command::CheckCollisions(_) => actions::CHECK_COLLISIONS,
            Command::GetScreenshot(_) => actions::GET_SCREENSHOT,
            Command::SetCamera(_) => actions::SET_CAMERA,
            Command::ExecuteJavascript(_) => actions::EXECUTE_JAVASCRIPT,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A command plus the optional correlation id used in acknowledged mode.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub command: Command,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl Envelope {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: u64) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<Command> for Envelope {
    fn from(command: Command) -> Self {
        Envelope::new(command)
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A decoded server push.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// `game_state` / `game_state_update` – full snapshot, replaces the cache.
    GameState {
        request_id: Option<u64>,
        state: GameState,
    },
    /// `error` – logged, never merged into the cache.
    Error {
        request_id: Option<u64>,
        message: String,
    },
    /// `screenshot` – optional base64 PNG under `data`.
    Screenshot {
        request_id: Option<u64>,
        data: Option<String>,
    },
    /// Anything else (acks, console relays, ...), passed through untouched.
    Other {
        kind: String,
        request_id: Option<u64>,
        raw: Value,
    },
}

impl ServerMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let v: Value = serde_json::from_str(text)?;
        Self::from_value(v)
    }

    pub fn from_value(v: Value) -> Result<Self> {
        if !v.is_object() {
            return Err(ClientError::Protocol(format!(
                "expected a JSON object, got {}",
                json_kind(&v)
            )));
        }

        let kind = v
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ClientError::Protocol("message has no `type`".into()))?
            .to_string();
        let request_id = v.get("request_id").and_then(|id| id.as_u64());

        let msg = match kind.as_str() {
            kinds::GAME_STATE | kinds::GAME_STATE_UPDATE => {
                let data = v.get("data").cloned().ok_or_else(|| {
                    ClientError::Protocol(format!("`{kind}` message has no `data`"))
                })?;
                ServerMessage::GameState {
                    request_id,
                    state: GameState::from_value(data)?,
                }
            }
            kinds::ERROR => ServerMessage::Error {
                request_id,
                message: v
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown server error")
                    .to_string(),
            },
            kinds::SCREENSHOT => ServerMessage::Screenshot {
                request_id,
                data: v
                    .get("data")
                    .and_then(|d| d.as_str())
                    .map(str::to_string),
            },
            _ => ServerMessage::Other {
                kind,
                request_id,
                raw: v,
            },
        };

        Ok(msg)
    }

    pub fn kind(&self) -> &str {
        match self {
            ServerMessage::GameState { .. } => kinds::GAME_STATE,
            ServerMessage::Error { .. } => kinds::ERROR,
            ServerMessage::Screenshot { .. } => kinds::SCREENSHOT,
            ServerMessage::Other { kind, .. } => kind,
        }
    }

    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::GameState { request_id, .. }
            | ServerMessage::Error { request_id, .. }
            | ServerMessage::Screenshot { request_id, .. }
            | ServerMessage::Other { request_id, .. } => *request_id,
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Name constants
// ---------------------------------------------------------------------------

/// Outbound `action` verbs.
pub mod actions {
    pub const CREATE_ENTITY: &str = "create_entity";
    pub const MOVE_ENTITY: &str = "move_entity";
    pub const ROTATE_ENTITY: &str = "rotate_entity";
    pub const DELETE_ENTITY: &str = "delete_entity";
    pub const SETUP_BOARD: &str = "setup_board";
    pub const GET_GAME_STATE: &str = "get_game_state";
    pub const CHECK_COLLISIONS: &str = "check_collisions";
    pub const GET_SCREENSHOT: &str = "get_screenshot";
    pub const SET_CAMERA: &str = "set_camera";
    pub const EXECUTE_JAVASCRIPT: &str = "execute_javascript";
}

/// Inbound `type` values.
pub mod kinds {
    pub const GAME_STATE: &str = "game_state";
    pub const GAME_STATE_UPDATE: &str = "game_state_update";
    pub const ERROR: &str = "error";
    pub const SCREENSHOT: &str = "screenshot";
}
