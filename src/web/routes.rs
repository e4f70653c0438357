use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use super::AppState;
use crate::cache::CacheSnapshot;
use crate::queue::{JobData, QueueStats};

/// Create the router. The intake route is only mounted when a token is configured.
pub fn router(intake_enabled: bool) -> Router<AppState> {
    let router = Router::new()
        .route("/healthz", get(health))
        .route("/queue/stats", get(queue_stats));

    if intake_enabled {
        router.route("/jobs", post(enqueue_job))
    } else {
        router
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    queue: QueueStats,
    cache: CacheSnapshot,
}

async fn queue_stats(State(state): State<AppState>) -> Response {
    let queue = match state.queue.stats().await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to get queue stats: {e:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    Json(StatsResponse {
        queue,
        cache: state.cache.snapshot(),
    })
    .into_response()
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    id: i64,
    created: bool,
}

/// POST /jobs - Queue a Reddit item for ingestion.
async fn enqueue_job(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers, state.intake_token.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid or missing token" })),
        )
            .into_response();
    }

    let data: JobData = match serde_json::from_slice(&body) {
        Ok(d) => d,
        Err(e) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": format!("invalid job: {e}") })),
            )
                .into_response();
        }
    };

    if data.game.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "invalid job: game is empty" })),
        )
            .into_response();
    }

    match state.queue.enqueue(&data).await {
        Ok(result) => {
            tracing::info!(
                job_id = result.id(),
                game = %data.game,
                created = result.is_new(),
                "Job received"
            );
            (
                StatusCode::ACCEPTED,
                Json(EnqueueResponse {
                    id: result.id(),
                    created: result.is_new(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Failed to enqueue job: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

fn authorized(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == expected)
}
