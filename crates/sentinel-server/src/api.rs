use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use sentinel_core::SentinelError;
use sentinel_engine::ReportPeriod;
use sentinel_types::{Labels, TimeRange};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// 未指定 `start` 时的默认查询跨度
const DEFAULT_QUERY_SPAN_MINUTES: i64 = 60;
const DEFAULT_LIST_LIMIT: usize = 100;
// chrono::Duration 可表示的秒数上限
const MAX_DURATION_SECS: i64 = i64::MAX / 1000;

/// 把引擎错误映射为 HTTP 响应
pub struct ApiError(SentinelError);

impl From<SentinelError> for ApiError {
    fn from(err: SentinelError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SentinelError::InvalidMetric(_) | SentinelError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            SentinelError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("API request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Deserialize)]
pub struct RecordMetricRequest {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub labels: Labels,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct SilenceRequest {
    pub pattern: String,
    pub duration_secs: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(telemetry))
        .route("/api/v1/metrics", get(list_metrics).post(record_metric))
        .route("/api/v1/metrics/:name", get(get_metric))
        .route("/api/v1/alerts", get(active_alerts))
        .route("/api/v1/alerts/history", get(alert_history))
        .route("/api/v1/health-checks", get(health_checks))
        .route("/api/v1/reports/:period", get(report))
        .route("/api/v1/dashboard", get(dashboard))
        .route("/api/v1/silences", get(list_silences).post(create_silence))
        .route("/api/v1/silences/:id", delete(remove_silence))
        .route("/api/v1/deliveries", get(deliveries))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "engine": state.engine.config().engine.name,
        "running": state.engine.is_running().await,
    }))
}

async fn telemetry(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let text = state.engine.telemetry_text().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}

async fn list_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "metrics": state.engine.metric_names().await }))
}

/// `GET /api/v1/metrics/:name?start=..&end=..&<label>=<value>`
///
/// `start`/`end` 为 RFC 3339 时间，其余查询参数作为精确匹配的标签。
async fn get_metric(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(mut params): Query<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let now = state.engine.clock().now();
    let end = match params.remove("end") {
        Some(raw) => parse_time("end", &raw)?,
        None => now,
    };
    let start = match params.remove("start") {
        Some(raw) => parse_time("start", &raw)?,
        None => end - Duration::minutes(DEFAULT_QUERY_SPAN_MINUTES),
    };
    if start > end {
        return Err(SentinelError::InvalidInput("start must not be after end".to_string()).into());
    }

    let labels: Labels = params.into_iter().collect();
    let filter = if labels.is_empty() { None } else { Some(&labels) };
    let points = state
        .engine
        .get_metric(&name, TimeRange::new(start, end), filter)
        .await;

    Ok(Json(json!({
        "name": name,
        "start": start,
        "end": end,
        "points": points,
    })))
}

fn parse_time(field: &str, raw: &str) -> ApiResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SentinelError::InvalidInput(format!("invalid {}: {}", field, e)).into())
}

async fn record_metric(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordMetricRequest>,
) -> ApiResult<impl IntoResponse> {
    let metric = match req.timestamp {
        Some(timestamp) => {
            state
                .engine
                .store()
                .record_at(&req.name, req.value, req.labels, timestamp)
                .await?
        }
        None => {
            state
                .engine
                .record_metric(&req.name, req.value, req.labels)
                .await?
        }
    };
    Ok((StatusCode::CREATED, Json(metric)))
}

async fn active_alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "alerts": state.engine.get_active_alerts().await }))
}

async fn alert_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Json(json!({ "alerts": state.engine.alert_history(limit).await }))
}

async fn health_checks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "endpoints": state.engine.get_health_status().await }))
}

async fn report(
    State(state): State<Arc<AppState>>,
    Path(period): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let period: ReportPeriod = period.parse()?;
    Ok(Json(state.engine.generate_report(period).await))
}

async fn dashboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.dashboard().await)
}

async fn list_silences(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "silences": state.engine.silences().await }))
}

async fn create_silence(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SilenceRequest>,
) -> ApiResult<impl IntoResponse> {
    let silence = state
        .engine
        .silence(
            &req.pattern,
            Duration::seconds(req.duration_secs.clamp(-MAX_DURATION_SECS, MAX_DURATION_SECS)),
            &req.reason,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(silence)))
}

async fn remove_silence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let released = state.engine.unsilence(&id).await?;
    Ok(Json(json!({ "id": id, "released": released })))
}

async fn deliveries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Json(json!({ "deliveries": state.engine.recent_deliveries(limit).await }))
}
