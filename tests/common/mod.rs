//! In-process stand-in for the VTTL server.
//!
//! Listens on a loopback port, records every envelope it receives and keeps
//! a tiny entity table so `get_game_state` answers reflect earlier commands.
//! Frames carrying a `request_id` are answered with an `ack` (or the
//! requested reply) echoing it, unless the server is muted.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use vttl_client::{ClientConfig, SyncMode, Timings};

#[derive(Default)]
struct Shared {
    received: Vec<Value>,
    entities: Map<String, Value>,
    screenshots: u32,
    failing: Vec<String>,
    muted: bool,
    noisy: bool,
    hanging_up: bool,
}

#[derive(Clone)]
pub struct FakeServer {
    pub url: String,
    shared: Arc<Mutex<Shared>>,
}

impl FakeServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Mutex::new(Shared::default()));

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                tokio::spawn(serve(tcp, accept_shared.clone()));
            }
        });

        Self {
            url: format!("ws://{addr}"),
            shared,
        }
    }

    /// Pretend an entity already exists on the table.
    pub fn seed(&self, name: &str, template: &str, position: [f64; 3]) {
        self.shared.lock().entities.insert(
            name.to_string(),
            json!({ "template": template, "position": position }),
        );
    }

    /// Drop an entity without telling the client.
    pub fn forget(&self, name: &str) {
        self.shared.lock().entities.remove(name);
    }

    /// Answer `action` with an `error` push from now on.
    pub fn fail(&self, action: &str) {
        self.shared.lock().failing.push(action.to_string());
    }

    /// Stop replying to anything.
    pub fn mute(&self) {
        self.shared.lock().muted = true;
    }

    /// Precede every reply with a non-JSON frame and an untyped object.
    pub fn noisy(&self) {
        self.shared.lock().noisy = true;
    }

    /// Close the socket after the next frame received.
    pub fn hang_up(&self) {
        self.shared.lock().hanging_up = true;
    }

    pub fn received(&self) -> Vec<Value> {
        self.shared.lock().received.clone()
    }

    /// `data` payloads of every received `action`, in arrival order.
    pub fn payloads(&self, action: &str) -> Vec<Value> {
        self.shared
            .lock()
            .received
            .iter()
            .filter(|v| v["action"] == action)
            .map(|v| v["data"].clone())
            .collect()
    }

    pub fn count(&self, action: &str) -> usize {
        self.payloads(action).len()
    }

    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.lock().entities.keys().cloned().collect();
        names.sort();
        names
    }

    /// Poll until `count` `action` frames have arrived (fire-and-forget
    /// sends land asynchronously).  Panics after a second.
    pub async fn wait_for(&self, action: &str, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while self.count(action) < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} x {action}, got {}",
                self.count(action)
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Fixed-delay config with short pauses, writing screenshots to `dir`.
    pub fn config(&self, dir: &Path) -> ClientConfig {
        ClientConfig {
            server_url: self.url.clone(),
            screenshot_dir: dir.to_path_buf(),
            sync: SyncMode::FixedDelay,
            timings: Timings {
                state_wait_ms: 150,
                screenshot_wait_ms: 1000,
                ..Timings::fast()
            },
        }
    }

    pub fn acknowledged_config(&self, dir: &Path) -> ClientConfig {
        ClientConfig {
            sync: SyncMode::acknowledged(Duration::from_millis(500)),
            ..self.config(dir)
        }
    }
}

async fn serve(tcp: TcpStream, shared: Arc<Mutex<Shared>>) {
    let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
        return;
    };
    let (mut tx, mut rx) = ws.split();

    while let Some(Ok(frame)) = rx.next().await {
        let Message::Text(text) = frame else {
            continue;
        };
        let Ok(envelope) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let replies = handle(&shared, envelope);
        let (noisy, hanging_up) = {
            let s = shared.lock();
            (noisy_frames(s.noisy && !replies.is_empty()), s.hanging_up)
        };
        let frames = noisy
            .into_iter()
            .chain(replies.iter().map(Value::to_string));
        for text in frames {
            if tx.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        if hanging_up {
            let _ = tx.send(Message::Close(None)).await;
            return;
        }
    }
}

fn noisy_frames(on: bool) -> Vec<String> {
    if !on {
        return vec![];
    }
    vec!["not json at all".to_string(), json!({ "hello": "world" }).to_string()]
}

fn handle(shared: &Mutex<Shared>, envelope: Value) -> Vec<Value> {
    let mut s = shared.lock();
    s.received.push(envelope.clone());
    if s.muted {
        return vec![];
    }

    let action = envelope["action"].as_str().unwrap_or_default().to_string();
    let data = &envelope["data"];
    let request_id = envelope.get("request_id").cloned();
    let tag = |mut reply: Value| {
        if let Some(id) = &request_id {
            reply["request_id"] = id.clone();
        }
        reply
    };

    if s.failing.contains(&action) {
        return vec![tag(json!({ "type": "error", "message": format!("{action} failed") }))];
    }

    let name = data["name"].as_str().unwrap_or_default().to_string();
    match action.as_str() {
        "create_entity" => {
            s.entities.insert(
                name,
                json!({
                    "template": data["template"],
                    "position": data["position"],
                    "properties": data["properties"],
                }),
            );
        }
        "move_entity" => {
            if let Some(e) = s.entities.get_mut(&name) {
                e["position"] = data["to"].clone();
            }
        }
        "rotate_entity" => {
            if let Some(e) = s.entities.get_mut(&name) {
                e["rotation"] = data["to"].clone();
            }
        }
        "delete_entity" => {
            s.entities.remove(&name);
        }
        "get_game_state" => {
            return vec![tag(json!({
                "type": "game_state",
                "data": { "entities": s.entities },
            }))];
        }
        "get_screenshot" => {
            s.screenshots += 1;
            let png = format!("png-{}", s.screenshots);
            return vec![tag(json!({ "type": "screenshot", "data": STANDARD.encode(png) }))];
        }
        _ => {}
    }

    request_id
        .as_ref()
        .map(|_| tag(json!({ "type": "ack" })))
        .into_iter()
        .collect()
}
