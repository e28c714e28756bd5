/*!
WebSocket server implementation.
*/

use axum::{
  extract::{
    ws::{Message, WebSocket, WebSocketUpgrade},
    State,
  },
  response::Response,
  routing::get,
  Router,
};
use deskshell::host::LoopHost;
use deskshell::{BusEvent, Shell};
use log::error;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tower_http::cors::{Any, CorsLayer};

/// Default WebSocket server port.
pub const DEFAULT_WS_PORT: u16 = 3030;
const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
/// Topic of the first message every client receives.
pub const SYNC_INIT_TOPIC: &str = "sync:init";

/// Handler for app-specific RPC methods.
pub type CustomRpcHandler = Arc<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

/// Drives a [`LoopHost`] with wall-clock time.
#[derive(Debug, Clone)]
struct Pump {
  host: Arc<LoopHost>,
  frame: Duration,
}

/// WebSocket state.
#[derive(Clone)]
pub struct WebSocketState {
  shell: Shell,
  json_sender: Arc<broadcast::Sender<String>>,
  custom_handler: Option<CustomRpcHandler>,
  pump: Option<Pump>,
  port: u16,
}

impl std::fmt::Debug for WebSocketState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WebSocketState")
      .field("port", &self.port)
      .field("pump", &self.pump.as_ref().map(|p| p.frame))
      .finish_non_exhaustive()
  }
}

impl WebSocketState {
  /// Create with default port.
  pub fn new(shell: Shell) -> Self {
    Self::with_port(shell, DEFAULT_WS_PORT)
  }

  /// Create with custom port.
  pub fn with_port(shell: Shell, port: u16) -> Self {
    let (json_tx, _) = broadcast::channel::<String>(DEFAULT_CHANNEL_CAPACITY);
    Self {
      shell,
      json_sender: Arc::new(json_tx),
      custom_handler: None,
      pump: None,
      port,
    }
  }

  /// Add a custom RPC handler. It sees every request first; returning
  /// `None` falls through to the built-in methods.
  #[must_use]
  pub fn with_custom_handler(mut self, handler: CustomRpcHandler) -> Self {
    self.custom_handler = Some(handler);
    self
  }

  /// Advance `host` by the elapsed wall-clock time once per `frame` while
  /// the server runs. Use when the shell was built on a [`LoopHost`].
  #[must_use]
  pub fn with_loop_host(mut self, host: Arc<LoopHost>, frame: Duration) -> Self {
    self.pump = Some(Pump { host, frame });
    self
  }
}

/// Start the WebSocket server. Resolves when the server stops.
pub async fn start_server(ws_state: WebSocketState) -> std::io::Result<()> {
  let port = ws_state.port;
  let sender = ws_state.json_sender.clone();
  let mut rx = ws_state.shell.subscribe();
  tokio::spawn(async move {
    loop {
      match rx.recv().await {
        Ok(event) => {
          if let Ok(json) = serde_json::to_string(&event) {
            drop(sender.send(json));
          }
        }
        Err(async_broadcast::RecvError::Overflowed(n)) => {
          log::warn!("[ws] Bus stream overflowed, dropped {n} events");
        }
        Err(async_broadcast::RecvError::Closed) => break,
      }
    }
  });

  if let Some(pump) = ws_state.pump.clone() {
    tokio::spawn(run_pump(pump));
  }

  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods(Any)
    .allow_headers(Any);

  let app = Router::new()
    .route("/ws", get(websocket_handler))
    .layer(cors)
    .with_state(ws_state);

  let addr = format!("127.0.0.1:{port}");
  let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
    error!("Failed to bind WebSocket server to {addr}: {e}");
    e
  })?;

  log::info!("WebSocket server: ws://{addr}/ws");

  axum::serve(listener, app).await.map_err(|e| {
    error!("WebSocket server failed: {e}");
    e
  })
}

async fn run_pump(pump: Pump) {
  let mut ticker = tokio::time::interval(pump.frame);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
  let mut last = Instant::now();
  loop {
    ticker.tick().await;
    let now = Instant::now();
    pump.host.pump(now - last);
    last = now;
  }
}

async fn websocket_handler(
  ws: WebSocketUpgrade,
  State(ws_state): State<WebSocketState>,
) -> Response {
  ws.on_upgrade(|socket| handle_websocket(socket, ws_state))
}

fn sync_init(shell: &Shell) -> Option<String> {
  let event = BusEvent {
    topic: SYNC_INIT_TOPIC.to_string(),
    data: serde_json::to_value(shell.snapshot()).ok()?,
  };
  serde_json::to_string(&event).ok()
}

async fn handle_websocket(mut socket: WebSocket, ws_state: WebSocketState) {
  let mut rx = ws_state.json_sender.subscribe();

  if let Some(msg) = sync_init(&ws_state.shell) {
    if socket.send(Message::Text(msg)).await.is_err() {
      return;
    }
  }

  loop {
    tokio::select! {
        msg = socket.recv() => {
            match msg {
                Some(Ok(Message::Text(text))) => {
                    let response = handle_request(&text, &ws_state).await;
                    while let Ok(event_json) = rx.try_recv() {
                        drop(socket.send(Message::Text(event_json)).await);
                    }
                    drop(socket.send(Message::Text(response)).await);
                }
                Some(Ok(Message::Close(_))) => {
                    log::debug!("[client] closed connection");
                    break;
                }
                Some(Err(e)) => {
                    log::warn!("WebSocket error: {e}");
                    break;
                }
                None => {
                    log::debug!("[client] disconnected");
                    break;
                }
                _ => {}
            }
        }

        broadcast = rx.recv() => {
            match broadcast {
                Ok(event_json) => {
                    if socket.send(Message::Text(event_json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("[ws] Client lagged, dropped {n} events - client needs resync");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
  }
}

async fn handle_request(request: &str, ws_state: &WebSocketState) -> String {
  let parsed: Result<Value, _> = serde_json::from_str(request);

  let req = match parsed {
    Ok(v) => v,
    Err(e) => return json!({ "error": format!("Invalid JSON: {}", e) }).to_string(),
  };

  let id = req.get("id").cloned().unwrap_or(Value::Null);
  let method = req
    .get("method")
    .and_then(Value::as_str)
    .unwrap_or("")
    .to_string();
  let args = req.get("args").cloned().unwrap_or(Value::Null);

  if let Some(ref handler) = ws_state.custom_handler {
    if let Some(mut response) = handler(&method, &args) {
      if let Some(obj) = response.as_object_mut() {
        obj.insert("id".to_string(), id);
      }
      return response.to_string();
    }
  }

  let mut response = crate::rpc::dispatch_json(&ws_state.shell, &method, &args).await;
  if let Some(obj) = response.as_object_mut() {
    obj.insert("id".to_string(), id);
  }
  response.to_string()
}
