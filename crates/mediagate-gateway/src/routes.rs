//! HTTP surface of the gateway.
//!
//! Routing, in priority order:
//! 1. `GET /` answered locally with gateway info.
//! 2. `POST /restart-worker` answered locally; the restart runs in the background.
//! 3. `ANY /api/*` forwarded to the worker.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::proxy::{ErrorEnvelope, ProxyRequest, WorkerClient};
use crate::supervisor::WorkerSupervisor;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: WorkerSupervisor,
    pub client: Arc<WorkerClient>,
}

impl AppState {
    pub fn new(supervisor: WorkerSupervisor, client: WorkerClient) -> Self {
        Self {
            supervisor,
            client: Arc::new(client),
        }
    }
}

/// Build the gateway router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/restart-worker", post(restart_worker))
        .route("/api/", any(proxy))
        .route("/api/{*path}", any(proxy))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /`: static description of the gateway and the worker it fronts.
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "MediaGate - worker API gateway",
        "worker_api": state.client.base_url(),
        "endpoints": {
            "health": "/api/health",
            "search": "/api/search",
            "mp3_download": "/api/download/mp3",
            "audio_download": "/api/download/audio",
            "mp4_download": "/api/download/mp4",
            "download": "/api/download",
            "status": "/api/status/:id",
            "downloads": "/api/downloads",
            "cancel": "/api/cancel/:id",
            "clear": "/api/clear",
            "restart_worker": "/restart-worker",
        },
        "features": {
            "mp3_conversion": "MP3 conversion via FFmpeg",
            "audio_download": "Audio download without FFmpeg",
            "mp4_download": "Video download in several qualities",
            "search": "Video search and download by URL",
        },
        "worker": state.supervisor.status(),
    }))
}

/// `POST /restart-worker`: replace the worker process.
///
/// Responds immediately. The old worker is stopped and a new one spawned on
/// a detached task, so a client disconnect cannot interrupt the restart.
pub async fn restart_worker(State(state): State<AppState>) -> Json<Value> {
    drop(state.supervisor.request_restart());
    info!("Worker restart requested");
    Json(json!({ "message": "restarting" }))
}

/// `ANY /api/*`: forward to the worker and relay its JSON response.
pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    let request = ProxyRequest {
        method: method.clone(),
        path_and_query,
        headers,
        body,
    };
    let path = request.path().to_string();
    let started = Instant::now();

    match state.client.forward(request).await {
        Ok(resp) => {
            info!(
                %method,
                path = %path,
                status = resp.status.as_u16(),
                elapsed_ms = started.elapsed().as_millis(),
                "Proxied request"
            );
            (resp.status, Json(resp.body)).into_response()
        }
        Err(e) => {
            warn!(
                %method,
                path = %path,
                error = %e,
                elapsed_ms = started.elapsed().as_millis(),
                "Proxy request failed"
            );
            e.into_response()
        }
    }
}

async fn not_found(method: Method, uri: Uri) -> (StatusCode, Json<ErrorEnvelope>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorEnvelope {
            error: "Not found".to_string(),
            message: format!("No route for {method} {}", uri.path()),
        }),
    )
}
