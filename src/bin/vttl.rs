//! vttl – operator CLI for a running VTTL server.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                  | Default               | Description                      |
//! |----------------------|-----------------------|----------------------------------|
//! | `VTTL_SERVER_URL`    | `ws://localhost:8080` | WebSocket endpoint               |
//! | `VTTL_CONFIG`        | *(none)*              | Optional TOML config file        |
//! | `VTTL_ACKNOWLEDGED`  | `false`               | Wait for request-id echoes       |
//! | `VTTL_TIMEOUT_MS`    | `2000`                | Per-command ack timeout          |
//!
//! Flags override the file, the file overrides built-in defaults.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use vttl_client::{
    layout, BoardSpec, BoardType, ClientConfig, LineAxis, SceneController, SyncMode, VttlClient,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "vttl", about = "Control a VTTL tabletop renderer", version)]
struct Args {
    /// WebSocket endpoint of the VTTL server
    #[arg(long, global = true, env = "VTTL_SERVER_URL")]
    server: Option<String>,

    /// TOML config file
    #[arg(long, global = true, env = "VTTL_CONFIG")]
    config: Option<PathBuf>,

    /// Wait for the server to acknowledge every command
    #[arg(long, global = true, env = "VTTL_ACKNOWLEDGED")]
    acknowledged: bool,

    /// Acknowledgement timeout in milliseconds
    #[arg(long, global = true, env = "VTTL_TIMEOUT_MS", default_value_t = 2000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    #[command(flatten)]
    Client(ClientCmd),

    /// Three cubes in a circle, then a screenshot
    Demo,
}

/// Single commands against the client, no scene bookkeeping.
#[derive(Subcommand, Debug)]
enum ClientCmd {
    /// Print the entities in the current game state
    State,

    /// Delete every entity except those matching a kept prefix
    Clear {
        /// Name prefixes to keep (repeatable)
        #[arg(long = "keep", value_name = "PREFIX")]
        keep: Vec<String>,
    },

    /// Capture a screenshot into the configured directory
    Screenshot,

    /// Orbit the camera
    Camera {
        #[arg(long, default_value_t = 45.0)]
        pitch: f64,
        #[arg(long, default_value_t = 0.0)]
        yaw: f64,
        #[arg(long, default_value_t = 20.0)]
        distance: f64,
    },

    /// Set up a square board
    Board {
        /// Cell edge length in world units
        #[arg(long, default_value_t = 1.0)]
        size: f64,
        #[arg(long, default_value_t = 10)]
        width: u32,
        #[arg(long, default_value_t = 10)]
        height: u32,
        /// Skip creating tile entities
        #[arg(long)]
        no_tiles: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vttl_client=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(server) = args.server {
        config.server_url = server;
    }
    if args.acknowledged {
        config.sync = SyncMode::acknowledged(Duration::from_millis(args.timeout_ms));
    }

    log::info!(
        "Connecting to {} ({:?})",
        config.server_url,
        config.sync
    );

    let client = VttlClient::connect(config)
        .await
        .context("connecting to VTTL server")?;

    match args.command {
        Cmd::Demo => demo(SceneController::new(client)).await,
        Cmd::Client(cmd) => {
            let mut client = client;
            let outcome = run(&mut client, cmd).await;
            client.disconnect().await;
            outcome
        }
    }
}

async fn run(client: &mut VttlClient, cmd: ClientCmd) -> Result<()> {
    match cmd {
        ClientCmd::State => {
            let state = client.get_game_state().await.context("fetching game state")?;
            let mut entities: Vec<_> = state.entities.values().collect();
            entities.sort_by(|a, b| a.name.cmp(&b.name));
            println!("{} entities", entities.len());
            for e in entities {
                println!("  {:<24} {:<12} {}", e.name, e.template, e.position);
            }
        }
        ClientCmd::Clear { keep } => {
            let keep: Vec<&str> = keep.iter().map(String::as_str).collect();
            let deleted = client.clear_scene(&keep).await.context("clearing scene")?;
            println!("deleted {deleted} entities");
        }
        ClientCmd::Screenshot => {
            match client.take_screenshot().await.context("taking screenshot")? {
                Some(path) => println!("{}", path.display()),
                None => anyhow::bail!("no screenshot was written"),
            }
        }
        ClientCmd::Camera {
            pitch,
            yaw,
            distance,
        } => {
            client
                .set_camera_angle(pitch, yaw, distance)
                .await
                .context("setting camera")?;
        }
        ClientCmd::Board {
            size,
            width,
            height,
            no_tiles,
        } => {
            client
                .setup_board(BoardSpec {
                    board_type: BoardType::Square,
                    size,
                    width,
                    height,
                    create_tiles: !no_tiles,
                })
                .await
                .context("setting up board")?;
        }
    }
    Ok(())
}

/// Three coloured cubes laid out in a line, swung into a circle, then
/// photographed.
async fn demo(mut scene: SceneController) -> Result<()> {
    scene.sync_entities().await;

    let names = ["prop_demo_red", "prop_demo_green", "prop_demo_blue"];
    let colors = [[1.0, 0.2, 0.2], [0.2, 1.0, 0.2], [0.2, 0.2, 1.0]];
    let line = layout::line_positions(names.len(), 2.0, None, LineAxis::X);
    for ((name, color), at) in names.iter().zip(colors).zip(line) {
        scene
            .create_cube(name, at, Some(color))
            .await
            .with_context(|| format!("creating {name}"))?;
    }

    if !scene.arrange_in_circle(&names, 3.0, None, true).await {
        log::warn!("Some cubes did not reach the circle");
    }

    if scene.take_screenshot().await {
        log::info!("Demo screenshot captured");
    }
    scene.disconnect().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_and_client_commands_parse_apart() {
        let args = Args::try_parse_from(["vttl", "demo"]).unwrap();
        assert!(matches!(args.command, Cmd::Demo));

        let args = Args::try_parse_from(["vttl", "clear", "--keep", "cam_"]).unwrap();
        match args.command {
            Cmd::Client(ClientCmd::Clear { keep }) => assert_eq!(keep, vec!["cam_"]),
            other => panic!("unexpected {other:?}"),
        }

        let args = Args::try_parse_from(["vttl", "board", "--width", "8", "--no-tiles"]).unwrap();
        assert!(matches!(
            args.command,
            Cmd::Client(ClientCmd::Board { width: 8, no_tiles: true, .. })
        ));
    }
}
