//! Client configuration.
//!
//! ## Sources (later wins)
//!
//! 1. [`ClientConfig::default`]
//! 2. optional TOML file
//! 3. `VTTL_*` environment variables, `__` for nesting
//!
//! | Key                          | Default               |
//! |------------------------------|-----------------------|
//! | `VTTL_SERVER_URL`            | `ws://localhost:8080` |
//! | `VTTL_SCREENSHOT_DIR`        | `screenshots`         |
//! | `VTTL_SYNC__MODE`            | `fixed_delay`         |
//! | `VTTL_SYNC__TIMEOUT_MS`      | *(acknowledged only)* |
//! | `VTTL_TIMINGS__STATE_WAIT_MS`| `100`                 |

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the client decides a command has taken effect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SyncMode {
    /// Fire, pause for a fixed time, read the cache.
    #[default]
    FixedDelay,
    /// Tag each envelope with a `request_id` and wait for the server to echo
    /// it, failing after `timeout_ms`.
    Acknowledged { timeout_ms: u64 },
}

impl SyncMode {
    pub fn acknowledged(timeout: Duration) -> Self {
        SyncMode::Acknowledged {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        match self {
            SyncMode::FixedDelay => None,
            SyncMode::Acknowledged { timeout_ms } => Some(Duration::from_millis(*timeout_ms)),
        }
    }
}

/// Fixed pauses used in place of acknowledgement, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timings {
    /// After `get_game_state`, before reading the cache.
    pub state_wait_ms: u64,
    /// Extra settle time before `clear_scene` reads the refreshed state.
    pub clear_settle_ms: u64,
    /// Between consecutive deletions in `clear_scene`.
    pub delete_pause_ms: u64,
    /// For the renderer to write the screenshot file.
    pub screenshot_wait_ms: u64,
    /// After `set_camera_angle`.
    pub camera_settle_ms: u64,
    /// Between animated moves in the arrangement helpers.
    pub arrange_stagger_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            state_wait_ms: 100,
            clear_settle_ms: 200,
            delete_pause_ms: 100,
            screenshot_wait_ms: 3000,
            camera_settle_ms: 500,
            arrange_stagger_ms: 100,
        }
    }
}

impl Timings {
    /// All pauses zeroed except the state wait, which is kept short.
    /// Useful for scripted runs against a fast local server.
    pub fn fast() -> Self {
        Self {
            state_wait_ms: 20,
            clear_settle_ms: 0,
            delete_pause_ms: 0,
            screenshot_wait_ms: 50,
            camera_settle_ms: 0,
            arrange_stagger_ms: 0,
        }
    }

    pub fn state_wait(&self) -> Duration {
        Duration::from_millis(self.state_wait_ms)
    }

    pub fn clear_settle(&self) -> Duration {
        Duration::from_millis(self.clear_settle_ms)
    }

    pub fn delete_pause(&self) -> Duration {
        Duration::from_millis(self.delete_pause_ms)
    }

    pub fn screenshot_wait(&self) -> Duration {
        Duration::from_millis(self.screenshot_wait_ms)
    }

    pub fn camera_settle(&self) -> Duration {
        Duration::from_millis(self.camera_settle_ms)
    }

    pub fn arrange_stagger(&self) -> Duration {
        Duration::from_millis(self.arrange_stagger_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the VTTL server.
    pub server_url: String,
    /// Where `latest_screenshot.png` / `previous_screenshot.png` live.
    pub screenshot_dir: PathBuf,
    pub sync: SyncMode,
    pub timings: Timings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8080".into(),
            screenshot_dir: PathBuf::from("screenshots"),
            sync: SyncMode::FixedDelay,
            timings: Timings::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            server_url: url.into(),
            ..Default::default()
        }
    }

    /// Layer defaults, an optional TOML file and `VTTL_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ClientConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VTTL")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: ClientConfig = builder.build()?.try_deserialize()?;
        log::debug!("Loaded client config: {:?}", cfg);
        Ok(cfg)
    }
}
