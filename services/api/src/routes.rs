use crate::infra::{AppState, OutboxNotifier};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use leave_approval::workflows::leave::{
    leave_router, ApprovalInput, LeaveApi, RequestStore, TokenVerifier, WorkflowEngine,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_leave_routes<S, V, E>(api: Arc<LeaveApi<S, V, E>>) -> Router
where
    S: RequestStore + 'static,
    V: TokenVerifier + 'static,
    E: WorkflowEngine<Input = ApprovalInput> + 'static,
{
    leave_router(api)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

/// Development-only inspection of captured e-mail.
pub(crate) fn with_outbox_route(router: Router, outbox: OutboxNotifier) -> Router {
    router
        .route("/dev/outbox", get(outbox_endpoint))
        .layer(Extension(outbox))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn outbox_endpoint(
    Extension(outbox): Extension<OutboxNotifier>,
) -> impl IntoResponse {
    let messages = outbox.messages();
    Json(json!({ "count": messages.len(), "messages": messages }))
}
