// src/server/routes.rs

//! API route definitions.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};

use crate::engine::EngineHandle;
use crate::errors::HealtrackError;
use crate::executions::ExecutionRequest;
use crate::healing::HealingNotification;
use crate::ids::{ExecutionId, HealingId};
use crate::stream::Subscription;

use super::ApiError;

type ApiResult<T> = Result<T, ApiError>;

pub fn api_routes() -> Router<EngineHandle> {
    Router::new()
        .route("/health", get(health))
        .route("/executions", post(start_execution))
        .route("/executions/bulk", post(start_bulk))
        .route("/executions/{id}", get(get_execution))
        .route("/executions/{id}/events", get(execution_events))
        .route("/executions/{id}/stop", post(stop_execution))
        .route("/executions/{id}/force-complete", post(force_complete))
        .route("/healing", post(notify_healing))
        .route("/healing/{id}/events", get(healing_events))
        .route("/dashboard", get(dashboard))
        .route("/dashboard/events", get(dashboard_events))
}

async fn health(State(handle): State<EngineHandle>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": if handle.is_closed() { "stopping" } else { "ok" },
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339()
        }
    }))
}

async fn start_execution(
    State(handle): State<EngineHandle>,
    Json(request): Json<ExecutionRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let execution_id = handle.start(request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "data": { "executionId": execution_id } })),
    ))
}

async fn start_bulk(
    State(handle): State<EngineHandle>,
    Json(requests): Json<Vec<ExecutionRequest>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let ids = handle.start_bulk(requests).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "data": { "executionIds": ids }, "meta": { "total": ids.len() } })),
    ))
}

async fn get_execution(
    State(handle): State<EngineHandle>,
    Path(id): Path<ExecutionId>,
) -> ApiResult<Json<Value>> {
    match handle.execution(id).await? {
        Some(record) => Ok(Json(json!({ "data": record }))),
        None => Err(HealtrackError::ExecutionNotFound(id.to_string()).into()),
    }
}

async fn execution_events(
    State(handle): State<EngineHandle>,
    Path(id): Path<ExecutionId>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = handle.subscribe_execution(id).await?;
    Ok(sse(subscription))
}

async fn stop_execution(
    State(handle): State<EngineHandle>,
    Path(id): Path<ExecutionId>,
) -> ApiResult<StatusCode> {
    handle.stop(id).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn force_complete(
    State(handle): State<EngineHandle>,
    Path(id): Path<ExecutionId>,
) -> ApiResult<StatusCode> {
    handle.force_complete(id).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn notify_healing(
    State(handle): State<EngineHandle>,
    Json(notification): Json<HealingNotification>,
) -> ApiResult<StatusCode> {
    handle.notify_healing(notification.into_event()).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn healing_events(
    State(handle): State<EngineHandle>,
    Path(id): Path<HealingId>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = handle.subscribe_healing(id).await?;
    Ok(sse(subscription))
}

async fn dashboard(State(handle): State<EngineHandle>) -> ApiResult<Json<Value>> {
    let snapshot = handle.snapshot().await?;
    Ok(Json(json!({ "data": snapshot })))
}

async fn dashboard_events(
    State(handle): State<EngineHandle>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = handle.subscribe_feed().await?;
    Ok(sse(subscription))
}

/// One SSE `data:` frame per event, JSON encoded. The stream ends when the
/// push channel is closed.
fn sse<T>(subscription: Subscription<T>) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Send + 'static,
{
    let stream = subscription.into_stream().map(|event| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|err| Event::default().comment(format!("unserializable event: {err}"))))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
