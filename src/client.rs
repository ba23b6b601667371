//! `VttlClient` – the command API.
//!
//! Each verb builds a [`Command`] and pushes it through the
//! [`MessageChannel`].  In the default [`SyncMode::FixedDelay`] nothing waits
//! for the server except the handful of calls that pause on purpose
//! (`get_game_state`, `clear_scene`, `take_screenshot`, `set_camera_angle`).
//! With [`SyncMode::Acknowledged`] every command instead waits for the
//! server to echo its `request_id`.
//!
//! The client value *is* the session: it owns the grid size, the board
//! footprint and the game-state cache.  Nothing is global.

use crate::cache::GameStateCache;
use crate::channel::MessageChannel;
use crate::collision::{self, CollisionReport, Footprint, TILE_PREFIX};
use crate::config::{ClientConfig, SyncMode};
use crate::error::{ClientError, Result};
use crate::grid;
use crate::protocol::{
    CheckCollisions, Command, CreateEntity, DeleteEntity, Empty, ExecuteJavascript, MoveEntity,
    RotateEntity, ServerMessage, SetCamera, SetupBoard,
};
use crate::screenshot::ScreenshotStore;
use crate::types::{
    BoardSpec, EntityRecord, GameState, GridPosition, Placement, Vec3, ENTITY_PREFIXES,
};
use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

/// Renderer limits for the orbit camera.
pub const CAMERA_PITCH_RANGE: (f64, f64) = (0.0, 85.0);
pub const CAMERA_DISTANCE_RANGE: (f64, f64) = (5.0, 50.0);

// ---------------------------------------------------------------------------
// Entity creation request
// ---------------------------------------------------------------------------

/// Everything `create_entity` needs.  A placement is mandatory.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpec {
    pub name: String,
    pub template: String,
    pub placement: Option<Placement>,
    pub owner: Option<String>,
    pub properties: Map<String, Value>,
}

impl EntitySpec {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            placement: None,
            owner: None,
            properties: Map::new(),
        }
    }

    pub fn at(mut self, placement: impl Into<Placement>) -> Self {
        self.placement = Some(placement.into());
        self
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties.extend(properties);
        self
    }
}

// ---------------------------------------------------------------------------
// VttlClient
// ---------------------------------------------------------------------------

pub struct VttlClient {
    config: ClientConfig,
    channel: MessageChannel,
    grid_size: f64,
    board: Option<BoardSpec>,
    screenshots: ScreenshotStore,
    entity_counter: AtomicU64,
}

impl VttlClient {
    /// Connect to `config.server_url`.  Connection failure is fatal.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let channel = MessageChannel::connect(&config.server_url, GameStateCache::new()).await?;
        if let SyncMode::Acknowledged { timeout_ms } = config.sync {
            info!("Acknowledged mode: waiting up to {}ms per command", timeout_ms);
        }

        Ok(Self {
            screenshots: ScreenshotStore::new(config.screenshot_dir.clone()),
            config,
            channel,
            grid_size: 1.0,
            board: None,
            entity_counter: AtomicU64::new(0),
        })
    }

    pub async fn disconnect(&self) {
        self.channel.disconnect().await;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &GameStateCache {
        self.channel.cache()
    }

    pub fn grid_size(&self) -> f64 {
        self.grid_size
    }

    pub fn board(&self) -> Option<&BoardSpec> {
        self.board.as_ref()
    }

    pub fn screenshots(&self) -> &ScreenshotStore {
        &self.screenshots
    }

    /// Raw inbound messages, for callers that want more than the cache.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.channel.subscribe()
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Send `command` in the configured sync mode.  Returns the server's
    /// reply in acknowledged mode, `None` otherwise.
    async fn issue(&self, command: Command) -> Result<Option<ServerMessage>> {
        match self.config.sync.ack_timeout() {
            None => {
                self.channel.send_command(command).await?;
                Ok(None)
            }
            Some(timeout) => self.channel.request(command, timeout).await.map(Some),
        }
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    fn resolve(&self, name: &str, placement: Option<Placement>) -> Result<Vec3> {
        match placement {
            Some(Placement::Grid(pos)) => Ok(self.grid_to_world(pos)),
            Some(Placement::World(pos)) => Ok(pos),
            None => Err(ClientError::MissingPlacement {
                name: name.to_string(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Entity verbs
    // -----------------------------------------------------------------------

    /// Create (or silently overwrite) the named entity.
    pub async fn create_entity(&self, spec: EntitySpec) -> Result<bool> {
        let position = self.resolve(&spec.name, spec.placement)?;
        debug!("Creating {} ({}) at {}", spec.name, spec.template, position);

        self.issue(Command::CreateEntity(CreateEntity {
            name: spec.name,
            template: spec.template,
            position,
            owner: spec.owner,
            properties: spec.properties,
        }))
        .await?;
        Ok(true)
    }

    /// Move `name` to a grid cell or world position.  `animate` asks the
    /// renderer for a smooth transition; it settles eventually.
    pub async fn move_entity(
        &self,
        name: &str,
        target: Option<Placement>,
        animate: bool,
    ) -> Result<bool> {
        let to = self.resolve(name, target)?;
        self.issue(Command::MoveEntity(MoveEntity {
            name: name.to_string(),
            to,
            animate,
        }))
        .await?;
        Ok(true)
    }

    /// Rotate `name` to Euler angles in degrees.
    pub async fn rotate_entity(&self, name: &str, rotation: Vec3, animate: bool) -> Result<bool> {
        self.issue(Command::RotateEntity(RotateEntity {
            name: name.to_string(),
            to: rotation,
            animate,
        }))
        .await?;
        Ok(true)
    }

    /// Delete `name`.  Unknown names are skipped with a warning and `false`;
    /// nothing is sent for them.
    pub async fn delete_entity(&self, name: &str) -> Result<bool> {
        if !self.entity_exists(name) {
            warn!("Entity '{}' does not exist, skipping deletion", name);
            return Ok(false);
        }

        self.issue(Command::DeleteEntity(DeleteEntity {
            name: name.to_string(),
        }))
        .await?;
        debug!("Deleted entity: {}", name);
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Board & scene
    // -----------------------------------------------------------------------

    /// (Re)build the board.  `board.size` becomes the grid size for every
    /// later grid conversion.
    pub async fn setup_board(&mut self, board: BoardSpec) -> Result<bool> {
        if board.size.is_nan() || board.size <= 0.0 {
            return Err(ClientError::InvalidArgument(format!(
                "grid size must be positive, got {}",
                board.size
            )));
        }

        self.grid_size = board.size;
        self.board = Some(board);

        self.issue(Command::SetupBoard(SetupBoard {
            board_type: board.board_type.as_str().to_string(),
            size: board.size,
            width: board.width,
            height: board.height,
            create_tiles: board.create_tiles,
        }))
        .await?;
        info!(
            "Board set up: {}x{} {} cells of {}",
            board.width,
            board.height,
            board.board_type.as_str(),
            board.size
        );
        Ok(true)
    }

    /// Ask for a fresh snapshot and return the cache.
    ///
    /// In fixed-delay mode this is best effort: the push may not have
    /// arrived when the pause ends.
    pub async fn get_game_state(&self) -> Result<GameState> {
        if self.issue(Command::GetGameState(Empty {})).await?.is_none() {
            self.pause(self.config.timings.state_wait()).await;
        }
        Ok(self.cache().snapshot())
    }

    /// Delete every entity whose name does not start with one of
    /// `exclude_prefixes`, one at a time.  Returns how many were deleted.
    pub async fn clear_scene(&self, exclude_prefixes: &[&str]) -> Result<usize> {
        self.get_game_state().await?;
        self.pause(self.config.timings.clear_settle()).await;

        let doomed: Vec<String> = self
            .cache()
            .names()
            .into_iter()
            .filter(|name| !exclude_prefixes.iter().any(|p| name.starts_with(p)))
            .collect();

        let mut deleted = 0;
        for name in doomed {
            match self.delete_entity(&name).await {
                Ok(true) => {
                    deleted += 1;
                    self.pause(self.config.timings.delete_pause()).await;
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to delete entity {}: {}", name, e),
            }
        }

        info!("Cleared {} entities from scene", deleted);
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Collisions
    // -----------------------------------------------------------------------

    /// Probe `name` at `position` against the cached entities and the board.
    ///
    /// The probe is also forwarded to the renderer (never awaited) so it can
    /// highlight overlaps.
    pub async fn check_collisions(&self, name: &str, position: Vec3) -> Result<CollisionReport> {
        self.channel
            .send_command(Command::CheckCollisions(CheckCollisions {
                name: name.to_string(),
                position,
            }))
            .await?;

        let scale = self.cache().get(name).map_or(Vec3::one(), |e| e.scale);
        let report = self.cache().with_state(|state| {
            collision::probe(
                name,
                position,
                scale,
                state.entities.values().map(|e| Footprint {
                    name: &e.name,
                    position: e.position,
                    scale: e.scale,
                }),
                self.board.as_ref(),
            )
        });
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Screenshots
    // -----------------------------------------------------------------------

    /// Capture the current view.
    ///
    /// If the server replies with image data it is written through the
    /// [`ScreenshotStore`]; otherwise the server is expected to write the
    /// file itself during the wait.  `None` when no file exists afterwards.
    pub async fn take_screenshot(&self) -> Result<Option<PathBuf>> {
        let command = Command::GetScreenshot(Empty {});
        let reply = match self.config.sync.ack_timeout() {
            Some(timeout) => Some(self.channel.request(command, timeout).await?),
            None => {
                let mut events = self.channel.subscribe();
                self.channel.send_command(command).await?;
                wait_for_screenshot(&mut events, self.config.timings.screenshot_wait()).await
            }
        };

        if let Some(ServerMessage::Screenshot {
            data: Some(encoded),
            ..
        }) = reply
        {
            if let Err(e) = self.screenshots.store_base64(&encoded) {
                error!("Failed to store screenshot: {}", e);
                return Ok(None);
            }
        }

        match self.screenshots.latest() {
            Some(path) => Ok(Some(path)),
            None => {
                error!("Screenshot file not found after capture");
                Ok(None)
            }
        }
    }

    pub fn latest_screenshot_path(&self) -> Option<PathBuf> {
        self.screenshots.latest()
    }

    // -----------------------------------------------------------------------
    // Camera & scripting
    // -----------------------------------------------------------------------

    /// Orbit camera: pitch (clamped to 0..=85°), yaw, distance (5..=50).
    pub async fn set_camera_angle(&self, pitch: f64, yaw: f64, distance: f64) -> Result<bool> {
        self.issue(Command::SetCamera(SetCamera::Orbit {
            angle_x: pitch.clamp(CAMERA_PITCH_RANGE.0, CAMERA_PITCH_RANGE.1),
            angle_y: yaw,
            distance: distance.clamp(CAMERA_DISTANCE_RANGE.0, CAMERA_DISTANCE_RANGE.1),
        }))
        .await?;
        self.pause(self.config.timings.camera_settle()).await;
        Ok(true)
    }

    /// Place the camera at `position` looking at `target` (origin if `None`).
    pub async fn set_camera(&self, position: Vec3, target: Option<Vec3>) -> Result<bool> {
        self.issue(Command::SetCamera(SetCamera::LookAt {
            position,
            target: target.unwrap_or_default(),
        }))
        .await?;
        Ok(true)
    }

    /// Run a snippet in the renderer's page.
    pub async fn execute_javascript(&self, code: impl Into<String>) -> Result<bool> {
        self.issue(Command::ExecuteJavascript(ExecuteJavascript { code: code.into() }))
            .await?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Naming helpers
    // -----------------------------------------------------------------------

    /// `"{prefix}{kind}_{n}_{t}"`, `t` being the last four digits of the
    /// millisecond clock.
    pub fn generate_unique_name(&self, prefix: &str, kind: Option<&str>) -> String {
        let n = self.entity_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        format!("{}{}_{}_{}", prefix, kind.unwrap_or("entity"), n, millis % 10_000)
    }

    /// True when `name` carries one of the known role prefixes.
    pub fn validate_entity_name(name: &str) -> bool {
        ENTITY_PREFIXES.iter().any(|p| name.starts_with(p))
    }

    pub fn entity_exists(&self, name: &str) -> bool {
        self.cache().contains(name)
    }

    pub fn entities_by_prefix(&self, prefix: &str) -> Vec<EntityRecord> {
        self.cache().entities_with_prefix(prefix)
    }

    // -----------------------------------------------------------------------
    // Grid helpers
    // -----------------------------------------------------------------------

    pub fn grid_to_world(&self, pos: GridPosition) -> Vec3 {
        grid::grid_to_world(pos, self.grid_size)
    }

    pub fn world_to_grid(&self, pos: Vec3) -> GridPosition {
        grid::world_to_grid(pos, self.grid_size)
    }

    /// Unoccupied cells in the square of `radius` around `center`.
    pub fn available_positions_near(&self, center: GridPosition, radius: i32) -> Vec<GridPosition> {
        let occupied: HashSet<(i32, i32)> = self.cache().with_state(|state| {
            state
                .entities
                .values()
                .filter(|e| !e.name.starts_with(TILE_PREFIX))
                .map(|e| {
                    let g = self.world_to_grid(e.position);
                    (g.x, g.z)
                })
                .collect()
        });

        let mut available = Vec::new();
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let (x, z) = (center.x + dx, center.z + dz);
                if !occupied.contains(&(x, z)) {
                    available.push(GridPosition::new(x, z));
                }
            }
        }
        available
    }

    /// Names within Manhattan distance `radius` of `center`, sorted.
    pub fn entities_in_range(&self, center: GridPosition, radius: i32) -> Vec<String> {
        let mut names: Vec<String> = self.cache().with_state(|state| {
            state
                .entities
                .iter()
                .filter(|(_, e)| grid::manhattan(self.world_to_grid(e.position), center) <= radius)
                .map(|(name, _)| name.clone())
                .collect()
        });
        names.sort();
        names
    }

    // -----------------------------------------------------------------------
    // Tabletop helpers
    // -----------------------------------------------------------------------

    /// `mini_{kind}_{player}`, owned by `player`.
    pub async fn create_mini(&self, player: &str, kind: &str, at: GridPosition) -> Result<String> {
        let name = format!("mini_{kind}_{player}");
        self.create_entity(EntitySpec::new(&name, kind).at(at).owned_by(player))
            .await?;
        Ok(name)
    }

    /// `prop_{kind}_{n}`, `n` being one past the cached prop count.
    pub async fn create_prop(
        &self,
        kind: &str,
        at: GridPosition,
        properties: Option<Map<String, Value>>,
    ) -> Result<String> {
        let n = self.entities_by_prefix("prop_").len() + 1;
        let name = format!("prop_{kind}_{n}");
        self.create_entity(
            EntitySpec::new(&name, kind)
                .at(at)
                .with_properties(properties.unwrap_or_default()),
        )
        .await?;
        Ok(name)
    }

    /// Move a miniature by grid cell.  `check_path` is reserved for a
    /// pathfinding hook and currently has no effect.
    pub async fn move_mini(&self, name: &str, to: GridPosition, check_path: bool) -> Result<bool> {
        if check_path {
            debug!("Path check requested for {} (not implemented)", name);
        }
        self.move_entity(name, Some(to.into()), true).await
    }
}

/// Wait up to `wait` for a `screenshot` push.  Other traffic is ignored.
async fn wait_for_screenshot(
    events: &mut broadcast::Receiver<ServerMessage>,
    wait: Duration,
) -> Option<ServerMessage> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(msg @ ServerMessage::Screenshot { .. })) => return Some(msg),
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                debug!("Screenshot wait skipped {} messages", skipped);
                continue;
            }
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
        }
    }
}
