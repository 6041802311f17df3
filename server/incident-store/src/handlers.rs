//! HTTP handlers: thin request/response mapping over the store.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, patch, post},
  Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{StoreError, ValidationError};
use crate::ingest::{self, IngestSummary};
use crate::store::IncidentStore;
use crate::types::{IncidentId, RawIncident, Status};
use crate::validate::ValidationRules;

pub struct AppState {
  pub store: IncidentStore,
  pub rules: ValidationRules,
}

pub fn router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/incidents", get(list).post(create))
    .route("/incidents/summary", get(summary))
    .route("/incidents/bulk", post(bulk))
    .route("/incidents/:id", get(find))
    .route("/incidents/:id/status", patch(change_status))
    .route("/incidents/:id/archive", post(archive))
    .route("/incidents/:id/reset", post(reset))
    .route("/admin/flush", post(flush))
    .with_state(state)
}

// ---------------------------------------------------------------------------
// Error body
// ---------------------------------------------------------------------------

/// Structured error body for every non-2xx response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub errors: Vec<ValidationError>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub allowed: Vec<Status>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub summary: Option<IngestSummary>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
      errors: Vec::new(),
      allowed: Vec::new(),
      summary: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}

pub struct ApiError {
  err: StoreError,
  summary: Option<IngestSummary>,
}

impl From<StoreError> for ApiError {
  fn from(err: StoreError) -> Self {
    Self { err, summary: None }
  }
}

fn status_for(err: &StoreError) -> StatusCode {
  match err {
    StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
    StoreError::InvalidTransition { .. } | StoreError::InvalidState { .. } => StatusCode::CONFLICT,
    StoreError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    StoreError::Persistence { .. } => StatusCode::SERVICE_UNAVAILABLE,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let code = status_for(&self.err);
    if !self.err.is_rejection() {
      error!(status = code.as_u16(), error = %self.err, "request failed");
    }

    let mut body = match &self.err {
      // The mutation is live in memory; only the durable copy lags.
      StoreError::Persistence { .. } => {
        ErrorOutput::new(format!("{} (change applied in memory, not yet on disk)", self.err))
      }
      _ => ErrorOutput::new(self.err.to_string()),
    };
    match self.err {
      StoreError::InvalidTransition { allowed, .. } => body.allowed = allowed,
      StoreError::Validation { errors } => {
        if let [only] = errors.as_slice() {
          body = body.with_field(only.field.clone());
        }
        body.errors = errors;
      }
      _ => {}
    }
    body.summary = self.summary;

    (code, Json(body)).into_response()
  }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn health() -> &'static str {
  "ok"
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  #[serde(default, rename = "includeArchived")]
  pub include_archived: bool,
}

pub async fn list(
  State(state): State<Arc<AppState>>,
  Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
  let incidents = state.store.list_all(params.include_archived).await?;
  Ok(Json(incidents))
}

pub async fn summary(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
  Ok(Json(state.store.counts().await?))
}

pub async fn find(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(state.store.find_by_id(&IncidentId(id)).await?))
}

pub async fn create(
  State(state): State<Arc<AppState>>,
  Json(raw): Json<RawIncident>,
) -> ApiResult<impl IntoResponse> {
  let value = state
    .rules
    .validate_create(&raw)
    .map_err(|errors| StoreError::Validation { errors })?;
  let incident = state.store.create(value).await?;
  Ok((StatusCode::CREATED, Json(incident)))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: String,
}

pub async fn change_status(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<StatusBody>,
) -> ApiResult<impl IntoResponse> {
  let requested = body.status.parse::<Status>().map_err(|e| StoreError::Validation {
    errors: vec![ValidationError::new("status", &e.to_string())],
  })?;
  Ok(Json(state.store.change_status(&IncidentId(id), requested).await?))
}

pub async fn archive(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(state.store.archive(&IncidentId(id)).await?))
}

pub async fn reset(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(state.store.reset(&IncidentId(id)).await?))
}

/// Rows arrive already parsed (e.g. from CSV) as a JSON array of objects.
pub async fn bulk(
  State(state): State<Arc<AppState>>,
  Json(rows): Json<Vec<serde_json::Value>>,
) -> ApiResult<impl IntoResponse> {
  let rows = rows.iter().map(RawIncident::from_json_loose);
  match ingest::ingest(&state.store, &state.rules, rows).await {
    Ok(summary) => Ok(Json(summary)),
    Err(aborted) => Err(ApiError {
      err: aborted.source,
      summary: Some(aborted.summary),
    }),
  }
}

pub async fn flush(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
  state.store.flush().await?;
  Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::MemoryBackend;
  use crate::config::Config;
  use axum::body::{to_bytes, Body};
  use axum::http::Request;
  use tower::ServiceExt;

  async fn app() -> Router {
    let store = IncidentStore::new(&Config::default(), Arc::new(MemoryBackend::new()));
    store.initialize().await.unwrap();
    router(Arc::new(AppState {
      store,
      rules: ValidationRules::default(),
    }))
  }

  async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
      Some(json) => builder
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
  }

  fn new_incident() -> serde_json::Value {
    serde_json::json!({
      "title": "VPN down",
      "description": "remote staff cannot connect",
      "category": "NETWORK",
      "severity": "critical"
    })
  }

  #[tokio::test]
  async fn create_returns_created_record() {
    let app = app().await;
    let (status, body) = send(&app, "POST", "/incidents", Some(new_incident())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "OPEN");
    assert_eq!(body["severity"], "CRITICAL");
    assert!(body["reportedAt"].is_string());
  }

  #[tokio::test]
  async fn invalid_create_is_422_with_field() {
    let app = app().await;
    let (status, body) = send(&app, "POST", "/incidents", Some(serde_json::json!({"category": "IT", "severity": "LOW"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], true);
    assert_eq!(body["field"], "title");
  }

  #[tokio::test]
  async fn bad_transition_is_409_with_allowed_set() {
    let app = app().await;
    let (_, created) = send(&app, "POST", "/incidents", Some(new_incident())).await;
    let id = created["id"].as_str().unwrap();

    let uri = format!("/incidents/{}/status", id);
    let (status, body) = send(&app, "PATCH", &uri, Some(serde_json::json!({"status": "RESOLVED"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["allowed"], serde_json::json!(["INVESTIGATING", "ARCHIVED"]));

    let (status, body) = send(&app, "PATCH", &uri, Some(serde_json::json!({"status": "closed"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "status");
  }

  #[tokio::test]
  async fn archive_hides_from_default_listing() {
    let app = app().await;
    let (_, created) = send(&app, "POST", "/incidents", Some(new_incident())).await;
    let id = created["id"].as_str().unwrap();

    let (status, _) = send(&app, "POST", &format!("/incidents/{}/archive", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, visible) = send(&app, "GET", "/incidents", None).await;
    assert_eq!(visible.as_array().unwrap().len(), 0);
    let (_, all) = send(&app, "GET", "/incidents?includeArchived=true", None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);

    let (_, counts) = send(&app, "GET", "/incidents/summary", None).await;
    assert_eq!(counts["archived"], 1);
  }

  #[tokio::test]
  async fn unknown_id_is_404() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/incidents/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("missing"));
  }

  #[tokio::test]
  async fn bulk_reports_counts() {
    let app = app().await;
    let rows = serde_json::json!([
      {"title": "a", "category": "IT", "severity": "LOW"},
      {"description": "no title", "category": "IT", "severity": "LOW"},
      "not an object",
      {"title": "d", "category": "FACILITIES", "severity": "MEDIUM"}
    ]);
    let (status, body) = send(&app, "POST", "/incidents/bulk", Some(rows)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalRows"], 4);
    assert_eq!(body["created"], 2);
    assert_eq!(body["skipped"], 2);
  }

  #[tokio::test]
  async fn flush_is_204() {
    let app = app().await;
    let (status, _) = send(&app, "POST", "/admin/flush", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
  }
}
