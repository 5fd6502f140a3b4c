//! HTTP health/readiness/admin surface (§13): liveness, readiness backed by
//! a Redis `PING`, stream introspection, Prometheus exposition, and an
//! admin surface over the Retry Scheduler's sorted set — renamed from the
//! teacher's DLQ admin surface, since this engine parks failed-and-dropped
//! work in the retry set rather than a dead-letter stream.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::metrics::get_metrics_handle;
use crate::retry::RetryScheduler;
use crate::task::Task;

#[derive(Clone)]
pub struct HealthState {
    redis: Arc<ConnectionManager>,
    app_name: &'static str,
    app_version: &'static str,
    stream_name: String,
    retry: Arc<RetryScheduler>,
}

impl HealthState {
    pub fn new(
        redis: Arc<ConnectionManager>,
        stream_name: impl Into<String>,
        retry: Arc<RetryScheduler>,
    ) -> Self {
        Self {
            redis,
            app_name: env!("CARGO_PKG_NAME"),
            app_version: env!("CARGO_PKG_VERSION"),
            stream_name: stream_name.into(),
            retry,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    name: &'static str,
    version: &'static str,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: "crawl-worker",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn ready_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut conn = (*state.redis).clone();
    match redis::cmd("PING").query_async::<String>(&mut conn).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ready",
                name: state.app_name,
                version: state.app_version,
            }),
        )
            .into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "redis unreachable").into_response(),
    }
}

pub async fn stream_info_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut conn = (*state.redis).clone();
    let result: redis::RedisResult<redis::Value> = redis::cmd("XINFO")
        .arg("STREAM")
        .arg(&state.stream_name)
        .query_async(&mut conn)
        .await;

    match result {
        Ok(value) => {
            let info = redis_value_to_json(&value);
            Json(info).into_response()
        }
        Err(e) if e.to_string().to_lowercase().contains("no such key") => {
            Json(serde_json::json!({ "stream": state.stream_name, "exists": false })).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn redis_value_to_json(value: &redis::Value) -> serde_json::Value {
    match value {
        redis::Value::Nil => serde_json::Value::Null,
        redis::Value::Int(i) => serde_json::json!(i),
        redis::Value::BulkString(b) => serde_json::json!(String::from_utf8_lossy(b)),
        redis::Value::SimpleString(s) => serde_json::json!(s),
        redis::Value::Array(items) | redis::Value::Set(items) => {
            serde_json::Value::Array(items.iter().map(redis_value_to_json).collect())
        }
        redis::Value::Map(pairs) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in pairs {
                if let redis::Value::BulkString(kb) = k {
                    obj.insert(String::from_utf8_lossy(kb).to_string(), redis_value_to_json(v));
                }
            }
            serde_json::Value::Object(obj)
        }
        _ => serde_json::Value::Null,
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    match get_metrics_handle() {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}

#[derive(Serialize)]
struct RetryStats {
    pending: i64,
}

pub async fn retry_stats_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.retry.len().await {
        Ok(pending) => Json(RetryStats { pending }).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct RetryListParams {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Serialize)]
struct RetryEntry {
    id: String,
    url: String,
    topic: String,
    retries: u32,
    next_attempt_at: i64,
}

impl From<Task> for RetryEntry {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            url: task.url,
            topic: task.topic.as_str().to_string(),
            retries: task.retries,
            next_attempt_at: task.next_attempt_at,
        }
    }
}

pub async fn retry_entries_handler(
    State(state): State<HealthState>,
    Query(params): Query<RetryListParams>,
) -> impl IntoResponse {
    let limit = params.limit.min(100) as isize;
    match state.retry.list(limit).await {
        Ok(tasks) => Json(
            tasks
                .into_iter()
                .map(RetryEntry::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn retry_remove_one_handler(
    State(state): State<HealthState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.retry.remove(&id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "no such retry entry").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Serialize)]
struct PurgeResponse {
    archived: i64,
}

pub async fn retry_remove_all_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.retry.purge().await {
        Ok(archived) => Json(PurgeResponse { archived }).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Liveness/readiness/stream-info/metrics, no state required beyond Redis
/// connectivity.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/stream/info", get(stream_info_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Retry-set admin surface, mounted alongside the health router.
pub fn retry_admin_router(state: HealthState) -> Router {
    Router::new()
        .route("/admin/retry/stats", get(retry_stats_handler))
        .route("/admin/retry/entries", get(retry_entries_handler))
        .route("/admin/retry/{id}", delete(retry_remove_one_handler))
        .route("/admin/retry/all", delete(retry_remove_all_handler))
        .with_state(state)
}

pub fn full_admin_router(state: HealthState) -> Router {
    health_router(state.clone()).merge(retry_admin_router(state))
}
