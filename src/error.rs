//! Client error taxonomy.
//!
//! Connection and transport faults surface to the immediate caller.  Usage
//! errors are raised before any network I/O.  Soft failures (deleting an
//! unknown entity, a missing screenshot, no safe position) are *not* errors:
//! those operations return `false` / `None` instead.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not connected to server")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Either a grid position or a world position must be provided for '{name}'")]
    MissingPlacement { name: String },

    #[error("Entity '{0}' not found")]
    UnknownEntity(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No reply to '{action}' after {after:?}")]
    Timeout { action: String, after: Duration },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ClientError {
    /// Usage errors are the caller's fault and never touch the network.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            ClientError::MissingPlacement { .. }
                | ClientError::UnknownEntity(_)
                | ClientError::InvalidArgument(_)
        )
    }
}
