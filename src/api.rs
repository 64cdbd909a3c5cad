// REST API over a reconciliation session (Axum)
//
// The session sits behind one mutex: every merge and selection runs to
// completion under the lock, so requests never observe a partial write.

use crate::error::ReconError;
use crate::period::Period;
use crate::projection::Table;
use crate::resolver::{CellDetails, SelectionCommand, SelectionEvent, SelectionResult};
use crate::session::{BatchOutcome, ReconciliationSession};
use crate::wire::ExtractionResponse;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<ReconciliationSession>>,
}

impl AppState {
    pub fn new(session: ReconciliationSession) -> Self {
        AppState {
            session: Arc::new(Mutex::new(session)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ReconciliationSession>, ApiError> {
        self.session.lock().map_err(|_| ApiError::Poisoned)
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub metric_key: String,
    pub year: i32,
    pub month: u8,
    pub index: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectionResponse {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<SelectionEvent>,
}

impl From<SelectionResult> for SelectionResponse {
    fn from(result: SelectionResult) -> Self {
        match result {
            SelectionResult::Changed(event) => Self {
                changed: true,
                event: Some(event),
            },
            SelectionResult::Unchanged => Self {
                changed: false,
                event: None,
            },
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Recon(ReconError),
    BadRequest(String),

    /// Extractor rejection (malformed path or body), keeps axum's status
    Rejected(StatusCode, String),
    Poisoned,
}

impl From<ReconError> for ApiError {
    fn from(e: ReconError) -> Self {
        ApiError::Recon(e)
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            // Stale view of the ledger on the client side
            ApiError::Recon(e) if e.is_addressing() => {
                let status = match &e {
                    ReconError::UnknownCell { .. } => StatusCode::NOT_FOUND,
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, e.to_string())
            }
            ApiError::Recon(e @ ReconError::Wire(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Recon(e) => {
                error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Rejected(status, message) => (status, message),
            ApiError::Poisoned => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "session lock poisoned".to_string(),
            ),
        };

        (status, Json(ApiResponse::<()>::err(message))).into_response()
    }
}

fn period_from(year: i32, month: u8) -> Result<Period, ApiError> {
    Period::new(year, month).ok_or_else(|| ApiError::BadRequest(format!("month {} outside 1..=12", month)))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/table - Current projection
async fn get_table(State(state): State<AppState>) -> Result<Json<ApiResponse<Table>>, ApiError> {
    let session = state.lock()?;
    Ok(Json(ApiResponse::ok(session.project())))
}

/// POST /api/batches - Merge one extraction response
async fn post_batch(
    State(state): State<AppState>,
    batch: Result<Json<ExtractionResponse>, JsonRejection>,
) -> Result<Json<ApiResponse<BatchOutcome>>, ApiError> {
    let Json(batch) = batch?;
    let mut session = state.lock()?;
    Ok(Json(ApiResponse::ok(session.ingest(&batch))))
}

/// GET /api/cells/:metric/:year/:month - Candidates and status of one cell
async fn get_cell(
    State(state): State<AppState>,
    path: Result<Path<(String, i32, u8)>, PathRejection>,
) -> Result<Json<ApiResponse<CellDetails>>, ApiError> {
    let Path((metric_key, year, month)) = path?;
    let period = period_from(year, month)?;
    let session = state.lock()?;
    Ok(Json(ApiResponse::ok(session.cell_details(&metric_key, period)?)))
}

/// POST /api/selections - Pick the authoritative observation of a cell
async fn post_selection(
    State(state): State<AppState>,
    request: Result<Json<SelectionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<SelectionResponse>>, ApiError> {
    let Json(request) = request?;
    let period = period_from(request.year, request.month)?;
    let command = SelectionCommand::new(request.metric_key, period, request.index);
    let mut session = state.lock()?;
    let result = session.select(&command)?;
    Ok(Json(ApiResponse::ok(result.into())))
}

/// POST /api/projects/:id - Discard the ledger and start a new project
async fn switch_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    let mut session = state.lock()?;
    session.switch_project(project_id.clone());
    Ok(Json(ApiResponse::ok(project_id)))
}

/// GET /api/export.csv - Spreadsheet export of the current projection
async fn export_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let session = state.lock()?;
    let bytes = session.export()?;
    let name = session.project_id().unwrap_or("metrics");
    let disposition = format!(
        "attachment; filename=\"metrics.csv\"; filename*=UTF-8''{}.csv",
        urlencoding::encode(name)
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/table", get(get_table))
        .route("/batches", post(post_batch))
        .route("/cells/:metric/:year/:month", get(get_cell))
        .route("/selections", post(post_selection))
        .route("/projects/:id", post(switch_project))
        .route("/export.csv", get(export_csv))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
