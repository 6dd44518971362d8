//! HTTP and WebSocket front-end
//!
//! Thin glue over [`SimulationManager`]: JSON endpoints to list topology
//! files, (re)configure, list nodes and inject messages, plus a WebSocket
//! endpoint that streams every event to the browser. The raw topology
//! files are served under `/topo-files`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

use meshsim_core::{MeshError, NodeId, RunConfig, Topology, list_topology_files};

use crate::simulation::SimulationManager;

/// Where and what to serve
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Directory scanned by `GET /topologies` and used by `POST /configure`
    pub topology_dir: PathBuf,
    /// Optional directory of static assets served at `/`
    pub static_dir: Option<PathBuf>,
}

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SimulationManager>,
    pub topology_dir: Arc<PathBuf>,
}

/// Error response: 400 for caller mistakes, 500 for engine failures
#[derive(Debug)]
pub struct ApiError(pub MeshError);

impl From<MeshError> for ApiError {
    fn from(e: MeshError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            MeshError::NodeStopped(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Body of `POST /configure`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    /// File name inside the topology directory
    #[serde(default)]
    pub topology: Option<String>,
    /// Inline JSON, TOML or YAML topology; wins when non-blank
    #[serde(default, alias = "customYaml")]
    pub custom_topology: Option<String>,
    pub drop_rate: f64,
    pub ttl: i32,
}

/// Body of `POST /send`
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub from: String,
    pub to: String,
}

/// Build the router
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/topologies", get(list_topologies))
        .route("/configure", post(configure))
        .route("/nodes", get(nodes))
        .route("/send", post(send))
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .nest_service("/topo-files", ServeDir::new(state.topology_dir.as_path()));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl-C, then tear the simulation down
pub async fn serve(config: ServerConfig, manager: Arc<SimulationManager>) -> Result<()> {
    let state = AppState {
        manager: Arc::clone(&manager),
        topology_dir: Arc::new(config.topology_dir.clone()),
    };
    let app = router(state, config.static_dir.as_deref());

    let listener = TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, topology_dir = %config.topology_dir.display(), "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    manager.shutdown().await;
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

async fn list_topologies(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let files = list_topology_files(state.topology_dir.as_path()).map_err(MeshError::from)?;
    Ok(Json(files))
}

async fn configure(
    State(state): State<AppState>,
    Json(request): Json<ConfigureRequest>,
) -> Result<Json<Value>, ApiError> {
    let topology = resolve_topology(&state.topology_dir, &request)?;
    let summary = state
        .manager
        .configure(topology, RunConfig::new(request.drop_rate, request.ttl))
        .await?;

    Ok(Json(json!({
        "status": "configured",
        "generation": summary.generation,
        "nodes": summary.nodes,
    })))
}

/// Pick the inline topology if given, else load the named file
fn resolve_topology(dir: &Path, request: &ConfigureRequest) -> Result<Topology, MeshError> {
    if let Some(custom) = request.custom_topology.as_deref().filter(|t| !t.trim().is_empty()) {
        return Ok(Topology::from_str_auto(custom)?);
    }

    let name = request
        .topology
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| MeshError::Config("no topology selected".to_string()))?;

    // Only bare file names inside the topology directory
    let file_name = Path::new(name)
        .file_name()
        .filter(|f| f.to_str() == Some(name))
        .ok_or_else(|| MeshError::Config(format!("invalid topology name: {name}")))?;

    Ok(Topology::load(dir.join(file_name))?)
}

async fn nodes(State(state): State<AppState>) -> Json<Vec<NodeId>> {
    Json(state.manager.node_ids().await)
}

async fn send(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.manager.send(&request.from, &request.to).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "message queued" }))))
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.manager))
}

/// Stream events to one browser until either side goes away
async fn handle_socket(socket: WebSocket, manager: Arc<SimulationManager>) {
    let mut observer = match manager.subscribe().await {
        Ok(observer) => observer,
        Err(e) => {
            warn!(error = %e, "Cannot subscribe WebSocket observer");
            return;
        }
    };
    let id = observer.id();
    info!(observer = %id, "WebSocket observer connected");

    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = observer.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                return;
            }
        }
        // Evicted or hub closed
        let _ = sink.send(WsMessage::Close(None)).await;
    });

    // Inbound frames are ignored; only close and errors matter
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    manager.unsubscribe(id).await;
    debug!(observer = %id, "WebSocket observer disconnected");
}
