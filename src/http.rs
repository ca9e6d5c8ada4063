// ==================== HTTP SURFACE ====================
// JSON in, JSON out. Success bodies carry `ok: true`; failures are
// `{error: <message>}` with a 4xx/5xx status.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ServiceError;
use crate::record::SubmitRequest;
use crate::service::LeaderboardService;

pub type SharedService = Arc<LeaderboardService>;

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/signup", post(sign_up))
        .route("/login", post(log_in))
        .route("/scores", get(scores))
        .route("/submit", post(submit))
        .route("/player/:name", get(player))
        .route("/player/:name/element-counts", get(element_counts))
        .with_state(service)
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::InvalidInput(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ServiceError::Conflict(message) => (StatusCode::CONFLICT, message.clone()),
            ServiceError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServiceError::Storage(err) => {
                log::error!("[HTTP] storage failure error:{}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "storage failure".to_string())
            }
            ServiceError::Internal(err) => {
                log::error!("[HTTP] internal error:{}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScoresQuery {
    pub category: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountsQuery {
    pub category: Option<String>,
}

/// Run a store-touching service call off the async workers
async fn blocking<T, F>(service: SharedService, call: F) -> Result<T, ServiceError>
where
    F: FnOnce(&LeaderboardService) -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|err| ServiceError::Internal(err.to_string()))?
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServiceError::invalid(format!("invalid request body: {}", rejection.body_text())))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "time": Utc::now().to_rfc3339() }))
}

pub async fn sign_up(
    State(service): State<SharedService>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let request = body(payload)?;
    let name = blocking(service, move |s| s.sign_up(&request.name, &request.password)).await?;
    Ok(Json(json!({ "ok": true, "name": name })))
}

pub async fn log_in(
    State(service): State<SharedService>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let request = body(payload)?;
    let name = blocking(service, move |s| s.log_in(&request.name, &request.password)).await?;
    Ok(Json(json!({ "ok": true, "name": name })))
}

pub async fn scores(
    State(service): State<SharedService>,
    Query(query): Query<ScoresQuery>,
) -> Result<Json<Value>, ServiceError> {
    let symbols = service.catalog().symbols().clone();
    let players = blocking(service, move |s| {
        s.list_top(query.category.as_deref(), query.limit.as_deref())
    })
    .await?;
    Ok(Json(json!({ "ok": true, "players": players, "elementSymbols": symbols })))
}

pub async fn submit(
    State(service): State<SharedService>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let request = body(payload)?;
    blocking(service, move |s| s.submit(request)).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn player(
    State(service): State<SharedService>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let symbols = service.catalog().symbols().clone();
    let entries = blocking(service, move |s| s.get_player(&name)).await?;
    Ok(Json(json!({ "ok": true, "entries": entries, "elementSymbols": symbols })))
}

pub async fn element_counts(
    State(service): State<SharedService>,
    Path(name): Path<String>,
    Query(query): Query<CountsQuery>,
) -> Result<Json<Value>, ServiceError> {
    let counts = blocking(service, move |s| s.element_counts(&name, query.category.as_deref())).await?;
    Ok(Json(json!({ "ok": true, "completedCounts": counts })))
}
