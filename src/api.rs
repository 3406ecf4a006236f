//! HTTP surface for the dashboard.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use log::error;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::{
    db::{Database, ProductionRecord},
    export::{records_to_csv, EXPORT_FILE_NAME},
    machine::{MachineController, MachineError, MachineSnapshot, ProductionReport},
};

/// Shared server state.
pub struct AppState {
    pub controller: MachineController,
    pub db: Database,
    pub history_limit: usize,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Rejections come back as `{ "message": .. }`, failures as `{ "error": .. }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Result<MessageResponse, ErrorResponse>,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: Err(ErrorResponse {
                error: message.into(),
            }),
        }
    }
}

impl From<MachineError> for ApiError {
    fn from(err: MachineError) -> Self {
        if err.is_rejection() {
            Self {
                status: StatusCode::BAD_REQUEST,
                body: Ok(MessageResponse {
                    message: err.to_string(),
                }),
            }
        } else {
            error!("machine state fault: {err}");
            Self::internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.body {
            Ok(message) => (self.status, Json(message)).into_response(),
            Err(error) => (self.status, Json(error)).into_response(),
        }
    }
}

async fn handle_machine(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MachineSnapshot>, ApiError> {
    Ok(Json(state.controller.get_snapshot().await?))
}

async fn handle_production(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProductionReport>, ApiError> {
    Ok(Json(state.controller.get_report().await?))
}

async fn handle_start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.controller.start().await?;
    Ok(MessageResponse::new("Production started"))
}

async fn handle_pause(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.controller.pause().await?;
    Ok(MessageResponse::new("Production paused"))
}

async fn handle_reset(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    state.controller.reset().await;
    MessageResponse::new("Production reset successfully")
}

async fn handle_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProductionRecord>>, ApiError> {
    state
        .db
        .list_recent_production(state.history_limit)
        .await
        .map(Json)
        .map_err(|err| {
            error!("Error fetching historical data: {err:?}");
            ApiError::internal("An error occurred while fetching historical data")
        })
}

async fn handle_download(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let records = state.db.list_all_production().await.map_err(|err| {
        error!("Error fetching data for download: {err:?}");
        ApiError::internal("An error occurred while fetching data")
    })?;

    let body = records_to_csv(&records, state.controller.zone());
    let disposition = format!("attachment; filename=\"{EXPORT_FILE_NAME}\"");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn handle_index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "packline",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /api/machine": "Machine identity, run state and running/stop seconds",
            "GET /api/production": "Rolling sample window with actual/expected totals",
            "POST /api/start": "Start or resume production",
            "POST /api/pause": "Pause production",
            "POST /api/reset": "Reset run state and clear the sample window",
            "GET /api/historical-data": "Most recent stored samples, newest first",
            "GET /api/download-data": "All stored samples as CSV",
        }
    }))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/api/machine", get(handle_machine))
        .route("/api/production", get(handle_production))
        .route("/api/start", post(handle_start))
        .route("/api/pause", post(handle_pause))
        .route("/api/reset", post(handle_reset))
        .route("/api/historical-data", get(handle_history))
        .route("/api/download-data", get(handle_download))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
