use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use clap::Parser;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::catalog::CatalogEntry;
use crate::codec::{CanvasDocument, LoadReport};
use crate::controller::{EditorMode, InputEvent};
use crate::editor::CanvasEditor;
use crate::error::CanvasError;
use crate::geometry::{Alignment, AnchorSide, Point, Position, Rect, Size};
use crate::model::{Attributes, EdgeId, EdgeKind, NodeId};
use crate::notify::Notice;
use crate::routing::Route;
use crate::templates::builtin_templates;
use crate::{Catalog, EditorConfig, FileStore};

const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Arguments for running the archdraw editor backend
#[derive(Debug, Clone, Parser)]
#[command(name = "archdraw serve", about = "Start the archdraw canvas editor API server.")]
pub struct ServeArgs {
    /// Directory holding persisted canvases. Defaults to the platform data dir.
    #[arg(long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Storage key of the canvas to edit.
    #[arg(long = "storage-key")]
    pub storage_key: Option<String>,

    /// JSON node catalog replacing the built-in one.
    #[arg(long = "catalog")]
    pub catalog: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5151)]
    pub port: u16,

    /// Background color for rendered SVG previews.
    #[arg(long = "background-color", default_value = "white")]
    pub background_color: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

pub struct AppState {
    editor: Mutex<CanvasEditor>,
    background: String,
}

impl AppState {
    pub fn new(editor: CanvasEditor, background: impl Into<String>) -> Self {
        Self {
            editor: Mutex::new(editor),
            background: background.into(),
        }
    }

    /// Runs due deferred work (debounced saves, throttled re-routing).
    pub async fn tick(&self) {
        self.editor.lock().await.tick();
    }

    pub async fn flush(&self) -> Result<()> {
        self.editor
            .lock()
            .await
            .flush()
            .context("failed to write canvas on shutdown")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CanvasPayload {
    theme: String,
    mode: EditorMode,
    interaction: &'static str,
    nodes: Vec<NodePayload>,
    edges: Vec<EdgePayload>,
    selection: BTreeSet<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    highlighted: Option<BTreeSet<NodeId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rubber_band: Option<Rect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview_line: Option<(Point, Point)>,
    #[serde(skip_serializing_if = "Alignment::is_empty")]
    guides: Alignment,
    can_undo: bool,
    can_redo: bool,
    notices: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodePayload {
    id: NodeId,
    kind: String,
    name: String,
    icon: String,
    category: crate::catalog::NodeCategory,
    fixed: bool,
    position: Position,
    size: Size,
    attributes: Attributes,
    selected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EdgePayload {
    id: EdgeId,
    from: NodeId,
    to: NodeId,
    kind: EdgeKind,
    routing: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_anchor: Option<AnchorSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_anchor: Option<AnchorSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<Route>,
}

#[derive(Debug, Deserialize)]
struct CreateNodeRequest {
    kind: String,
    #[serde(default)]
    x: Option<i32>,
    #[serde(default)]
    y: Option<i32>,
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Debug, Deserialize)]
struct UpdateNodeRequest {
    #[serde(default)]
    x: Option<i32>,
    #[serde(default)]
    y: Option<i32>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEdgeRequest {
    from: NodeId,
    to: NodeId,
    #[serde(default)]
    from_anchor: Option<AnchorSide>,
    #[serde(default)]
    to_anchor: Option<AnchorSide>,
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: EditorMode,
}

#[derive(Debug, Serialize)]
struct CreatedPayload<T: Serialize> {
    id: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedNodePayload {
    removed_edges: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPayload {
    applied: bool,
    can_undo: bool,
    can_redo: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload {
    handled: bool,
    interaction: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateSummary {
    name: String,
    description: String,
    items: usize,
    connections: usize,
}

fn canvas_payload(editor: &CanvasEditor) -> CanvasPayload {
    let store = editor.store();
    let catalog = editor.catalog();
    let nodes = store
        .nodes()
        .map(|node| {
            let entry = catalog.resolve(&node.kind);
            NodePayload {
                id: node.id.clone(),
                kind: node.kind.clone(),
                name: node.name().to_string(),
                icon: entry.icon,
                category: entry.category,
                fixed: entry.fixed,
                position: node.position,
                size: node.size,
                attributes: node.attributes.clone(),
                selected: store.is_selected(&node.id),
            }
        })
        .collect();
    let edges = store
        .edges()
        .iter()
        .map(|edge| {
            let (from_anchor, to_anchor) = edge.routing.anchors();
            EdgePayload {
                id: edge.id.clone(),
                from: edge.from.clone(),
                to: edge.to.clone(),
                kind: edge.kind,
                routing: edge.routing.as_str(),
                from_anchor,
                to_anchor,
                route: editor.route(&edge.id).cloned(),
            }
        })
        .collect();

    CanvasPayload {
        theme: editor.theme().to_string(),
        mode: editor.mode(),
        interaction: editor.interaction().name(),
        nodes,
        edges,
        selection: editor.selection().clone(),
        highlighted: editor.highlighted().cloned(),
        rubber_band: editor.rubber_band(),
        preview_line: editor.preview_line(),
        guides: editor.guides(),
        can_undo: editor.history().can_undo(),
        can_redo: editor.history().can_redo(),
        notices: editor.notices().cloned().collect(),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/canvas", get(get_canvas))
        .route("/api/canvas/document", get(get_document).put(put_document))
        .route("/api/canvas/svg", get(get_svg))
        .route("/api/canvas/nodes", post(post_node))
        .route("/api/canvas/nodes/:id", put(put_node).delete(delete_node))
        .route("/api/canvas/nodes/:id/attributes", patch(patch_attributes))
        .route("/api/canvas/edges", post(post_edge))
        .route("/api/canvas/edges/:id", axum::routing::delete(delete_edge))
        .route("/api/canvas/undo", post(post_undo))
        .route("/api/canvas/redo", post(post_redo))
        .route("/api/canvas/mode", put(put_mode))
        .route("/api/canvas/events", post(post_event))
        .route("/api/canvas/resize", post(post_resize))
        .route("/api/catalog", get(get_catalog))
        .route("/api/templates", get(get_templates))
        .route("/api/templates/:name", post(post_template))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let root = match args.data_dir.clone() {
        Some(dir) => dir,
        None => FileStore::default_root()
            .ok_or_else(|| anyhow!("could not determine a data directory; pass --data-dir"))?,
    };
    fs::create_dir_all(&root)
        .with_context(|| format!("failed to create data directory '{}'", root.display()))?;

    let catalog = match &args.catalog {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read catalog '{}'", path.display()))?;
            Catalog::from_json(&contents)
                .with_context(|| format!("invalid catalog '{}'", path.display()))?
        }
        None => Catalog::builtin(),
    };

    let mut config = EditorConfig::default();
    if let Some(key) = &args.storage_key {
        config = config.with_storage_key(key.clone());
    }
    let storage_key = config.storage_key.clone();

    let mut editor = CanvasEditor::new(config, catalog, FileStore::new(root.clone()));
    match editor.restore() {
        Ok(Some(report)) => info!(
            items = report.nodes_created,
            connections = report.edges_created,
            warnings = report.warnings.len();
            "Restored canvas"
        ),
        Ok(None) => info!(key = storage_key.as_str(); "Starting with an empty canvas"),
        Err(err) => return Err(err).context("failed to restore canvas"),
    }

    let state = Arc::new(AppState::new(editor, args.background_color.clone()));

    let ticker = {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                state.tick().await;
            }
        })
    };

    let app = router(Arc::clone(&state));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    info!(
        addr = addr.as_str(),
        data_dir:% = root.display(),
        key = storage_key.as_str();
        "archdraw server listening"
    );
    println!("archdraw server listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    ticker.abort();
    if let Err(err) = state.flush().await {
        error!(err:%; "Final save failed");
        return Err(err);
    }
    info!("Canvas saved, shutting down");
    Ok(())
}

async fn get_canvas(State(state): State<Arc<AppState>>) -> Json<CanvasPayload> {
    let editor = state.editor.lock().await;
    Json(canvas_payload(&editor))
}

async fn get_document(State(state): State<Arc<AppState>>) -> Json<CanvasDocument> {
    Json(state.editor.lock().await.export_document())
}

async fn put_document(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<LoadReport>, (StatusCode, String)> {
    let report = state
        .editor
        .lock()
        .await
        .import_json(&body)
        .map_err(canvas_error)?;
    Ok(Json(report))
}

async fn get_svg(State(state): State<Arc<AppState>>) -> Result<Response, (StatusCode, String)> {
    let svg = state.editor.lock().await.render_svg(&state.background);
    let mut response = Response::new(Body::from(svg));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("image/svg+xml"),
    );
    Ok(response)
}

async fn post_node(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateNodeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let kind = request.kind.trim();
    if kind.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "node kind cannot be empty".to_string()));
    }
    let mut editor = state.editor.lock().await;
    let position = match (request.x, request.y) {
        (Some(x), Some(y)) => Position::new(x, y),
        (None, None) => editor.free_spot(kind),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "both x and y are required to position a node".to_string(),
            ));
        }
    };
    let id = editor.add_node(kind, position, request.attributes);
    Ok((StatusCode::CREATED, Json(CreatedPayload { id })))
}

async fn put_node(
    State(state): State<Arc<AppState>>,
    AxumPath(node_id): AxumPath<String>,
    Json(request): Json<UpdateNodeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let id = NodeId::from(node_id);
    let position = match (request.x, request.y) {
        (Some(x), Some(y)) => Some(Position::new(x, y)),
        (None, None) => None,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "both x and y are required to move a node".to_string(),
            ));
        }
    };
    let mut editor = state.editor.lock().await;
    editor
        .update_node(&id, position, request.name.as_deref())
        .map_err(canvas_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_node(
    State(state): State<Arc<AppState>>,
    AxumPath(node_id): AxumPath<String>,
) -> Result<Json<DeletedNodePayload>, (StatusCode, String)> {
    let removed_edges = state
        .editor
        .lock()
        .await
        .delete_node(&NodeId::from(node_id))
        .map_err(canvas_error)?;
    Ok(Json(DeletedNodePayload { removed_edges }))
}

async fn patch_attributes(
    State(state): State<Arc<AppState>>,
    AxumPath(node_id): AxumPath<String>,
    Json(patch): Json<BTreeMap<String, Option<String>>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .editor
        .lock()
        .await
        .update_attributes(&NodeId::from(node_id), patch)
        .map_err(canvas_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_edge(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateEdgeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut editor = state.editor.lock().await;
    let id = match (request.from_anchor, request.to_anchor) {
        (None, None) => editor.connect(&request.from, &request.to),
        (Some(from_side), Some(to_side)) => {
            editor.connect_manual(&request.from, from_side, &request.to, to_side)
        }
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "manual connections need both fromAnchor and toAnchor".to_string(),
            ));
        }
    }
    .map_err(canvas_error)?;
    Ok((StatusCode::CREATED, Json(CreatedPayload { id })))
}

async fn delete_edge(
    State(state): State<Arc<AppState>>,
    AxumPath(edge_id): AxumPath<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .editor
        .lock()
        .await
        .delete_edge(&EdgeId::from(edge_id))
        .map_err(canvas_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_undo(State(state): State<Arc<AppState>>) -> Json<HistoryPayload> {
    let mut editor = state.editor.lock().await;
    let applied = editor.undo();
    Json(history_payload(&editor, applied))
}

async fn post_redo(State(state): State<Arc<AppState>>) -> Json<HistoryPayload> {
    let mut editor = state.editor.lock().await;
    let applied = editor.redo();
    Json(history_payload(&editor, applied))
}

fn history_payload(editor: &CanvasEditor, applied: bool) -> HistoryPayload {
    HistoryPayload {
        applied,
        can_undo: editor.history().can_undo(),
        can_redo: editor.history().can_redo(),
    }
}

async fn put_mode(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModeRequest>,
) -> StatusCode {
    state.editor.lock().await.set_mode(request.mode);
    StatusCode::NO_CONTENT
}

async fn post_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<InputEvent>,
) -> Json<EventPayload> {
    let mut editor = state.editor.lock().await;
    let handled = editor.handle_event(event);
    Json(EventPayload {
        handled,
        interaction: editor.interaction().name(),
    })
}

async fn post_resize(State(state): State<Arc<AppState>>) -> StatusCode {
    state.editor.lock().await.notify_resize();
    StatusCode::ACCEPTED
}

async fn get_catalog(State(state): State<Arc<AppState>>) -> Json<Vec<CatalogEntry>> {
    let editor = state.editor.lock().await;
    Json(editor.catalog().entries().into_iter().cloned().collect())
}

async fn get_templates() -> Json<Vec<TemplateSummary>> {
    Json(
        builtin_templates()
            .into_iter()
            .map(|template| TemplateSummary {
                items: template.items.len(),
                connections: template.connections.len(),
                name: template.name,
                description: template.description,
            })
            .collect(),
    )
}

async fn post_template(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
) -> Result<Json<LoadReport>, (StatusCode, String)> {
    let report = state
        .editor
        .lock()
        .await
        .load_template(&name)
        .map_err(canvas_error)?;
    Ok(Json(report))
}

fn canvas_error(err: CanvasError) -> (StatusCode, String) {
    let status = match &err {
        CanvasError::UnknownNode(_)
        | CanvasError::UnknownEdge(_)
        | CanvasError::UnknownTemplate(_) => StatusCode::NOT_FOUND,
        CanvasError::SelfLoopRejected(_)
        | CanvasError::DuplicateEdgeRejected { .. }
        | CanvasError::UnknownEndpoint(_) => StatusCode::CONFLICT,
        CanvasError::MalformedDocument(_)
        | CanvasError::EmptyId
        | CanvasError::DuplicateNodeId(_) => StatusCode::BAD_REQUEST,
    };
    if status == StatusCode::BAD_REQUEST {
        warn!(err:%; "Rejected request");
    }
    (status, err.to_string())
}
