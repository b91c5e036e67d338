/*!
WebSocket transport for the desktop: JSON events out, JSON-RPC in.

Every client starts from a `sync:init` snapshot and then applies incremental
events. A client that falls behind the fan-out channel is handed a fresh
snapshot instead of a gap, so its view can always be rebuilt from what it
actually received.
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
use daemonos::{Desktop, Event};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

/// Default WebSocket server port.
pub const DEFAULT_WS_PORT: u16 = 3040;
const EVENT_FANOUT_CAPACITY: usize = 1000;

/// Handler for host-specific RPC methods, tried before the built-in dispatch.
pub type CustomRpcHandler = Arc<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

/// Shared state behind every client connection.
#[derive(Clone)]
pub struct WebSocketState {
  desktop: Desktop,
  json_sender: Arc<broadcast::Sender<String>>,
  custom_handler: Option<CustomRpcHandler>,
  port: u16,
}

impl std::fmt::Debug for WebSocketState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WebSocketState")
      .field("port", &self.port)
      .finish_non_exhaustive()
  }
}

impl WebSocketState {
  /// Create with default port.
  pub fn new(desktop: Desktop) -> Self {
    Self::with_port(desktop, DEFAULT_WS_PORT)
  }

  /// Create with custom port.
  pub fn with_port(desktop: Desktop, port: u16) -> Self {
    let (json_tx, _) = broadcast::channel::<String>(EVENT_FANOUT_CAPACITY);
    Self {
      desktop,
      json_sender: Arc::new(json_tx),
      custom_handler: None,
      port,
    }
  }

  /// Add a custom RPC handler.
  #[must_use]
  pub fn with_custom_handler(mut self, handler: CustomRpcHandler) -> Self {
    self.custom_handler = Some(handler);
    self
  }
}

/// One incoming frame: an optional correlation id, a method and its args.
#[derive(Deserialize)]
struct RpcEnvelope {
  #[serde(default)]
  id: Value,
  method: String,
  #[serde(default)]
  args: Value,
}

/// Serve the desktop on loopback until the listener fails.
pub async fn start_server(ws_state: WebSocketState) -> std::io::Result<()> {
  let sender = Arc::clone(&ws_state.json_sender);
  let mut events = ws_state.desktop.subscribe();
  tokio::spawn(async move {
    while let Ok(event) = events.recv().await {
      match serde_json::to_string(&event) {
        Ok(json) => drop(sender.send(json)),
        Err(e) => log::error!("Unserializable event: {e}"),
      }
    }
  });

  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods(Any)
    .allow_headers(Any);

  let addr = format!("127.0.0.1:{}", ws_state.port);
  let app = Router::new()
    .route("/ws", get(websocket_handler))
    .layer(cors)
    .with_state(ws_state);

  let listener = tokio::net::TcpListener::bind(&addr).await?;
  log::info!("Desktop available at ws://{addr}/ws");
  axum::serve(listener, app).await
}

async fn websocket_handler(
  ws: WebSocketUpgrade,
  State(ws_state): State<WebSocketState>,
) -> Response {
  ws.on_upgrade(|socket| handle_websocket(socket, ws_state))
}

async fn handle_websocket(mut socket: WebSocket, ws_state: WebSocketState) {
  let mut events = ws_state.json_sender.subscribe();
  if !send_snapshot(&mut socket, &ws_state.desktop).await {
    return;
  }

  loop {
    tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(text))) => {
          let response = answer(&text, &ws_state).await;
          if socket.send(Message::Text(response)).await.is_err() {
            break;
          }
        }
        Some(Ok(Message::Close(_))) | None => {
          log::debug!("Client disconnected");
          break;
        }
        Some(Err(e)) => {
          log::warn!("WebSocket error: {e}");
          break;
        }
        Some(Ok(_)) => {}
      },

      event = events.recv() => match event {
        Ok(json) => {
          if socket.send(Message::Text(json)).await.is_err() {
            break;
          }
        }
        Err(broadcast::error::RecvError::Lagged(n)) => {
          // The client missed events it can never replay. Jump to the tail
          // of the channel and rebase it on a fresh snapshot.
          log::warn!("Client lagged by {n} events, resyncing");
          events = events.resubscribe();
          if !send_snapshot(&mut socket, &ws_state.desktop).await {
            break;
          }
        }
        Err(broadcast::error::RecvError::Closed) => break,
      },
    }
  }
}

/// Send a `sync:init` snapshot; returns whether the socket is still usable.
async fn send_snapshot(socket: &mut WebSocket, desktop: &Desktop) -> bool {
  let desktop = desktop.clone();
  let Ok(snapshot) = tokio::task::spawn_blocking(move || desktop.snapshot()).await else {
    return false;
  };
  match serde_json::to_string(&Event::SyncInit(Box::new(snapshot))) {
    Ok(msg) => socket.send(Message::Text(msg)).await.is_ok(),
    Err(e) => {
      log::error!("Unserializable snapshot: {e}");
      false
    }
  }
}

async fn answer(request: &str, ws_state: &WebSocketState) -> String {
  let envelope: RpcEnvelope = match serde_json::from_str(request) {
    Ok(envelope) => envelope,
    Err(e) => return json!({ "error": format!("Invalid request: {e}") }).to_string(),
  };
  let RpcEnvelope { id, method, args } = envelope;

  if let Some(handler) = &ws_state.custom_handler {
    if let Some(mut response) = handler(&method, &args) {
      return with_id(&mut response, id);
    }
  }

  let desktop = ws_state.desktop.clone();
  let dispatched =
    tokio::task::spawn_blocking(move || crate::rpc::dispatch_json(&desktop, &method, &args)).await;
  let mut response = dispatched.unwrap_or_else(|_| json!({ "error": "RPC task panicked" }));
  with_id(&mut response, id)
}

fn with_id(response: &mut Value, id: Value) -> String {
  if let Some(obj) = response.as_object_mut() {
    obj.insert("id".to_owned(), id);
  }
  response.to_string()
}
