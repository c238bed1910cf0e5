use crate::config::Listener as ListenerConfig;
use crate::importer::{ImportError, ImportOutcome, Importer};
use crate::store::{SegmentationStore, StoreError};
use crate::types::{RecordOrigin, StoredSegmentation};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("segment not found")]
    NotFound,
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("failed to read segmentation data: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Import(ImportError::InProgress) => StatusCode::CONFLICT,
            ApiError::Import(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// Shared handles for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    importer: Arc<Importer>,
    store: Arc<dyn SegmentationStore>,
}

impl AppState {
    pub fn new(importer: Arc<Importer>, store: Arc<dyn SegmentationStore>) -> Self {
        AppState { importer, store }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/segmentation", get(list_segments))
        .route("/api/segmentation/import", post(trigger_import))
        .route("/api/segmentation/{id}", get(get_segment))
        .route("/api/health", get(health))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves. In-flight requests are allowed to finish.
pub async fn serve<F>(listener: ListenerConfig, state: AppState, shutdown: F) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", listener.host, listener.port);

    let tcp = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "segmentation api listening");

    axum::serve(tcp, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn list_segments(
    State(state): State<AppState>,
) -> Result<Json<Vec<StoredSegmentation>>, ApiError> {
    Ok(Json(state.store.get_all().await?))
}

async fn get_segment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredSegmentation>, ApiError> {
    state
        .store
        .get_by_address_key(&id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[derive(Serialize)]
struct ImportResponse {
    message: &'static str,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<RecordOrigin>,
}

impl From<ImportOutcome> for ImportResponse {
    fn from(outcome: ImportOutcome) -> Self {
        match outcome {
            ImportOutcome::NothingToImport => ImportResponse {
                message: "no segmentation data to import",
                count: 0,
                origin: None,
            },
            ImportOutcome::Imported { count, origin } => ImportResponse {
                message: "import completed successfully",
                count,
                origin: Some(origin),
            },
        }
    }
}

async fn trigger_import(State(state): State<AppState>) -> Result<Json<ImportResponse>, ApiError> {
    let outcome = state.importer.run_once().await?;
    Ok(Json(outcome.into()))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}
