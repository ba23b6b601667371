//! `SceneController` – multi-step scene building on top of [`VttlClient`].
//!
//! The controller keeps its own registry of the entities it has created or
//! synced.  The registry is updated optimistically after every successful
//! send and is only reconciled with the server on [`sync_entities`], so it
//! may drift if something else edits the scene.
//!
//! Batch helpers (arrangements, walls, colouring) never abort half way: a
//! failing step is logged and the batch carries on.
//!
//! [`sync_entities`]: SceneController::sync_entities

use crate::client::{EntitySpec, VttlClient};
use crate::collision::{self, CollisionReport, Footprint};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::layout::{self, LineAxis};
use crate::types::{Placement, Vec3};
use log::{debug, error, info, warn};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Colour used when a primitive is created without one.
pub const DEFAULT_COLOR: [f64; 3] = [0.7, 0.7, 0.7];

/// A locally tracked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneEntity {
    pub name: String,
    /// Primitive kind (`cube`, `sphere`, ...) or `model`.
    pub kind: String,
    pub position: Vec3,
    pub rotation: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub properties: Map<String, Value>,
}

impl SceneEntity {
    fn footprint(&self) -> Footprint<'_> {
        Footprint {
            name: &self.name,
            position: self.position,
            scale: self.scale.unwrap_or(Vec3::one()),
        }
    }

    pub fn color(&self) -> Option<[f64; 3]> {
        self.properties
            .get("color")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

pub struct SceneController {
    client: VttlClient,
    entities: HashMap<String, SceneEntity>,
}

impl SceneController {
    /// Connect and pull the current scene into the registry.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = VttlClient::connect(config).await?;
        let mut scene = Self::new(client);
        scene.sync_entities().await;
        Ok(scene)
    }

    /// Wrap an existing client with an empty registry.
    pub fn new(client: VttlClient) -> Self {
        Self {
            client,
            entities: HashMap::new(),
        }
    }

    pub fn client(&self) -> &VttlClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut VttlClient {
        &mut self.client
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }

    /// Rebuild the registry from a fresh server snapshot.
    ///
    /// On failure the registry is left as it was.
    pub async fn sync_entities(&mut self) {
        let state = match self.client.get_game_state().await {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to sync entities: {}", e);
                return;
            }
        };

        self.entities = state
            .entities
            .into_values()
            .map(|record| {
                let kind = if record.template.is_empty() {
                    "unknown".to_string()
                } else {
                    record.template
                };
                let entity = SceneEntity {
                    name: record.name,
                    kind,
                    position: record.position,
                    rotation: Some(record.rotation),
                    scale: Some(record.scale),
                    properties: record.properties,
                };
                (entity.name.clone(), entity)
            })
            .collect();
        info!("Synced {} entities from server", self.entities.len());
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    async fn create_primitive(
        &mut self,
        name: &str,
        kind: &str,
        position: Vec3,
        color: Option<[f64; 3]>,
    ) -> Result<SceneEntity> {
        let mut properties = Map::new();
        properties.insert("type".into(), json!(kind));
        properties.insert("color".into(), json!(color.unwrap_or(DEFAULT_COLOR)));

        self.client
            .create_entity(
                EntitySpec::new(name, kind)
                    .at(Placement::World(position))
                    .with_properties(properties.clone()),
            )
            .await?;

        let entity = SceneEntity {
            name: name.to_string(),
            kind: kind.to_string(),
            position,
            rotation: None,
            scale: None,
            properties,
        };
        self.entities.insert(entity.name.clone(), entity.clone());
        debug!("Created {} '{}' at {}", kind, name, position);
        Ok(entity)
    }

    pub async fn create_cube(
        &mut self,
        name: &str,
        position: Vec3,
        color: Option<[f64; 3]>,
    ) -> Result<SceneEntity> {
        self.create_primitive(name, "cube", position, color).await
    }

    pub async fn create_sphere(
        &mut self,
        name: &str,
        position: Vec3,
        color: Option<[f64; 3]>,
    ) -> Result<SceneEntity> {
        self.create_primitive(name, "sphere", position, color).await
    }

    pub async fn create_cylinder(
        &mut self,
        name: &str,
        position: Vec3,
        color: Option<[f64; 3]>,
    ) -> Result<SceneEntity> {
        self.create_primitive(name, "cylinder", position, color).await
    }

    /// Load a model file.  `scale` travels in the entity properties and is
    /// recorded locally for collision checks.
    pub async fn create_model(
        &mut self,
        name: &str,
        model_path: &str,
        position: Vec3,
        color: Option<[f64; 3]>,
        scale: Option<Vec3>,
    ) -> Result<SceneEntity> {
        let mut properties = Map::new();
        properties.insert("type".into(), json!("model"));
        properties.insert("model_path".into(), json!(model_path));
        properties.insert("color".into(), json!(color.unwrap_or([1.0, 1.0, 1.0])));
        if let Some(scale) = scale {
            properties.insert("scale".into(), json!(scale));
        }

        self.client
            .create_entity(
                EntitySpec::new(name, model_path)
                    .at(Placement::World(position))
                    .with_properties(properties.clone()),
            )
            .await?;

        let entity = SceneEntity {
            name: name.to_string(),
            kind: "model".to_string(),
            position,
            rotation: None,
            scale,
            properties,
        };
        self.entities.insert(entity.name.clone(), entity.clone());
        Ok(entity)
    }

    // -----------------------------------------------------------------------
    // Per-entity edits
    // -----------------------------------------------------------------------

    fn require(&self, name: &str) -> Result<&SceneEntity> {
        self.entities
            .get(name)
            .ok_or_else(|| ClientError::UnknownEntity(name.to_string()))
    }

    /// Move a registered entity.  With `check_collisions` the target is
    /// probed first; problems are logged but do not stop the move.
    pub async fn move_entity(
        &mut self,
        name: &str,
        position: Vec3,
        animate: bool,
        check_collisions: bool,
    ) -> Result<bool> {
        self.require(name)?;

        if check_collisions {
            let report = self.check_collisions(name, position);
            if !report.collisions.is_empty() {
                warn!("Moving {} will collide with: {:?}", name, report.names());
            }
            if !report.on_table {
                warn!("Moving {} to {} would place it off the board", name, position);
            }
        }

        self.client
            .move_entity(name, Some(Placement::World(position)), animate)
            .await?;
        if let Some(entity) = self.entities.get_mut(name) {
            entity.position = position;
        }
        Ok(true)
    }

    pub async fn rotate_entity(&mut self, name: &str, rotation: Vec3, animate: bool) -> Result<bool> {
        self.require(name)?;
        self.client.rotate_entity(name, rotation, animate).await?;
        if let Some(entity) = self.entities.get_mut(name) {
            entity.rotation = Some(rotation);
        }
        Ok(true)
    }

    /// Delete a registered entity and forget it locally.
    pub async fn delete_entity(&mut self, name: &str) -> Result<bool> {
        self.require(name)?;
        if !self.client.entity_exists(name) {
            // Created since the last snapshot; the client only deletes
            // entities it has seen.
            self.client.get_game_state().await?;
        }
        let deleted = self.client.delete_entity(name).await?;
        // The server may have lost it already; either way it is gone.
        self.entities.remove(name);
        Ok(deleted)
    }

    /// Recolour through a renderer-side script.  Script failures return
    /// `false`.
    pub async fn update_entity_color(&mut self, name: &str, color: [f64; 3]) -> Result<bool> {
        self.require(name)?;

        let code = color_script(name, color)?;

        if let Err(e) = self.client.execute_javascript(code).await {
            error!("Failed to update color for {}: {}", name, e);
            return Ok(false);
        }
        if let Some(entity) = self.entities.get_mut(name) {
            entity.properties.insert("color".into(), json!(color));
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Arrangements
    // -----------------------------------------------------------------------

    async fn apply_layout<S: AsRef<str>>(
        &mut self,
        names: &[S],
        positions: Vec<Vec3>,
        animate: bool,
    ) -> bool {
        if names.is_empty() {
            warn!("Nothing to arrange");
            return false;
        }
        let stagger = self.stagger(animate);
        let mut all_ok = true;

        for (name, position) in names.iter().zip(positions) {
            let name = name.as_ref();
            if let Err(e) = self.move_entity(name, position, animate, false).await {
                error!("Failed to move {} into place: {}", name, e);
                all_ok = false;
                continue;
            }
            if let Some(pause) = stagger {
                tokio::time::sleep(pause).await;
            }
        }
        all_ok
    }

    fn stagger(&self, animate: bool) -> Option<Duration> {
        let pause = self.client.config().timings.arrange_stagger();
        (animate && !pause.is_zero()).then_some(pause)
    }

    /// Space `names` evenly along `axis`.  `false` if any move failed.
    pub async fn arrange_in_line<S: AsRef<str>>(
        &mut self,
        names: &[S],
        spacing: f64,
        start: Option<Vec3>,
        axis: LineAxis,
        animate: bool,
    ) -> bool {
        let positions = layout::line_positions(names.len(), spacing, start, axis);
        self.apply_layout(names, positions, animate).await
    }

    pub async fn arrange_in_circle<S: AsRef<str>>(
        &mut self,
        names: &[S],
        radius: f64,
        center: Option<Vec3>,
        animate: bool,
    ) -> bool {
        let positions = layout::circle_positions(names.len(), radius, center);
        self.apply_layout(names, positions, animate).await
    }

    /// Row-major grid.  `false` without moving anything when `rows * cols`
    /// is too small for `names`.
    pub async fn arrange_in_grid<S: AsRef<str>>(
        &mut self,
        names: &[S],
        rows: usize,
        cols: usize,
        spacing: f64,
        start: Option<Vec3>,
        animate: bool,
    ) -> bool {
        match layout::grid_positions(names.len(), rows, cols, spacing, start) {
            Some(positions) => self.apply_layout(names, positions, animate).await,
            None => {
                error!(
                    "Grid {}x{} too small for {} entities",
                    rows,
                    cols,
                    names.len()
                );
                false
            }
        }
    }

    /// Build a `rows` x `cols` wall of touching unit cubes named
    /// `{prefix}_{row}_{col}`, rising from `start` in +x and +y.
    /// Returns the names actually created.
    pub async fn create_solid_wall(
        &mut self,
        prefix: &str,
        rows: usize,
        cols: usize,
        start: Vec3,
        color: Option<[f64; 3]>,
    ) -> Vec<String> {
        let mut created = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let name = format!("{prefix}_{row}_{col}");
                let position = start + Vec3::new(col as f64, row as f64, 0.0);
                match self.create_cube(&name, position, color).await {
                    Ok(_) => created.push(name),
                    Err(e) => error!("Failed to create wall block {}: {}", name, e),
                }
            }
        }
        info!("Built wall '{}' from {} cubes", prefix, created.len());
        created
    }

    /// Recolour `names` with `colors`, or a rainbow when `None`.  Colours
    /// are reused cyclically when there are fewer colours than names.
    pub async fn colorize_entities<S: AsRef<str>>(
        &mut self,
        names: &[S],
        colors: Option<&[[f64; 3]]>,
    ) -> bool {
        let palette = match colors {
            Some(colors) if !colors.is_empty() => colors.to_vec(),
            Some(_) => {
                error!("colorize_entities needs at least one colour");
                return false;
            }
            None => layout::rainbow_palette(names.len()),
        };

        let mut all_ok = true;
        for (i, name) in names.iter().enumerate() {
            let name = name.as_ref();
            match self.update_entity_color(name, palette[i % palette.len()]).await {
                Ok(true) => {}
                Ok(false) => all_ok = false,
                Err(e) => {
                    error!("Failed to colour {}: {}", name, e);
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    // -----------------------------------------------------------------------
    // Spatial queries
    // -----------------------------------------------------------------------

    /// Probe against the local registry and the client's board.
    pub fn check_collisions(&self, name: &str, position: Vec3) -> CollisionReport {
        let scale = self
            .entities
            .get(name)
            .and_then(|e| e.scale)
            .unwrap_or(Vec3::one());
        collision::probe(
            name,
            position,
            scale,
            self.entities.values().map(SceneEntity::footprint),
            self.client.board(),
        )
    }

    /// First clear spot, trying `preferred` then widening rings out to
    /// `search_radius`.
    pub fn find_safe_position(&self, name: &str, preferred: Vec3, search_radius: f64) -> Option<Vec3> {
        let found = layout::spiral_candidates(preferred, search_radius)
            .into_iter()
            .find(|candidate| self.check_collisions(name, *candidate).is_clear());
        if found.is_none() {
            warn!("No safe position for {} within {} of {}", name, search_radius, preferred);
        }
        found
    }

    // -----------------------------------------------------------------------
    // Whole-scene operations
    // -----------------------------------------------------------------------

    pub async fn take_screenshot(&self) -> bool {
        match self.client.take_screenshot().await {
            Ok(path) => path.is_some(),
            Err(e) => {
                error!("Failed to take screenshot: {}", e);
                false
            }
        }
    }

    /// Delete every registered entity except those named in `keep`.
    /// Returns how many deletes reached the server; entities it had already
    /// dropped are forgotten locally but not counted.
    pub async fn clear_scene(&mut self, keep: &[&str]) -> usize {
        let mut doomed: Vec<String> = self
            .entities
            .keys()
            .filter(|name| !keep.contains(&name.as_str()))
            .cloned()
            .collect();
        doomed.sort();

        let mut deleted = 0;
        for name in doomed {
            match self.delete_entity(&name).await {
                Ok(true) => deleted += 1,
                Ok(false) => debug!("{} was already gone from the server", name),
                Err(e) => error!("Failed to delete {}: {}", name, e),
            }
        }
        info!("Cleared {} entities", deleted);
        deleted
    }

    pub fn get_entity(&self, name: &str) -> Option<&SceneEntity> {
        self.entities.get(name)
    }

    /// Registered entities, sorted by name.
    pub fn list_entities(&self) -> Vec<&SceneEntity> {
        let mut out: Vec<&SceneEntity> = self.entities.values().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn count_entities(&self) -> usize {
        self.entities.len()
    }

    pub async fn set_camera(&self, position: Vec3, target: Option<Vec3>) -> bool {
        match self.client.set_camera(position, target).await {
            Ok(ok) => ok,
            Err(e) => {
                error!("Failed to set camera: {}", e);
                false
            }
        }
    }
}

/// Renderer-side snippet: patch the mirrored game state and the PlayCanvas
/// material, then force a redraw.
fn color_script(name: &str, color: [f64; 3]) -> Result<String> {
    let key = serde_json::to_string(name)?;
    let [r, g, b] = color;
    Ok(format!(
        r#"const entities = window.vttlGameState?.entities || {{}};
if (entities[{key}]) {{
  entities[{key}].properties = entities[{key}].properties || {{}};
  entities[{key}].properties.color = [{r}, {g}, {b}];
  const node = window.app?.root?.findByName({key});
  const material = node?.render?.material;
  if (material) {{
    material.diffuse.set({r}, {g}, {b});
    material.update();
  }}
  if (window.app) {{
    window.app.render();
  }}
}} else {{
  console.error('Entity ' + {key} + ' not found');
}}"#
    ))
}
