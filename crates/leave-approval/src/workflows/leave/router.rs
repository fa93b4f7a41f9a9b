use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};
use url::Url;

use super::auth::TokenVerifier;
use super::domain::{LeaveSubmission, RequestId};
use super::engine::{EngineError, WorkflowEngine};
use super::intake::{IntakeError, LeaveIntake};
use super::orchestrator::ApprovalInput;
use super::repository::RequestStore;
use super::resolution::{LeaveResolution, ResolutionError, ResolutionParams};

pub const INTAKE_ROUTE: &str = "/apply-leave";
pub const RESOLUTION_ROUTE: &str = "/process-approval";
pub const STATUS_ROUTE: &str = "/check-leave-status";

const INTERNAL_ERROR: &str = "Internal server error";

/// Everything the leave endpoints need, shared as router state.
pub struct LeaveApi<S, V, E> {
    intake: LeaveIntake<S, V, E>,
    resolution: LeaveResolution<E>,
    store: Arc<S>,
    public_base_url: Url,
}

impl<S, V, E> LeaveApi<S, V, E>
where
    S: RequestStore + 'static,
    V: TokenVerifier + 'static,
    E: WorkflowEngine<Input = ApprovalInput> + 'static,
{
    pub fn new(
        store: Arc<S>,
        verifier: Arc<V>,
        engine: Arc<E>,
        public_base_url: Url,
    ) -> Self {
        Self {
            intake: LeaveIntake::new(store.clone(), verifier, engine.clone()),
            resolution: LeaveResolution::new(engine),
            store,
            public_base_url,
        }
    }

    pub fn intake(&self) -> &LeaveIntake<S, V, E> {
        &self.intake
    }

    pub fn resolution(&self) -> &LeaveResolution<E> {
        &self.resolution
    }

    /// Links in approval e-mail carry the resume handle, so they are built only on the
    /// configured base URL, never on anything the caller sends.
    pub fn public_base_url(&self) -> &Url {
        &self.public_base_url
    }
}

/// Router builder exposing intake, resolution and status endpoints.
pub fn leave_router<S, V, E>(api: Arc<LeaveApi<S, V, E>>) -> Router
where
    S: RequestStore + 'static,
    V: TokenVerifier + 'static,
    E: WorkflowEngine<Input = ApprovalInput> + 'static,
{
    Router::new()
        .route(INTAKE_ROUTE, post(apply_leave_handler::<S, V, E>))
        .route(RESOLUTION_ROUTE, get(process_approval_handler::<S, V, E>))
        .route(STATUS_ROUTE, get(check_status_handler::<S, V, E>))
        .with_state(api)
}

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(json!({ "message": text.into() }))).into_response()
}

pub(crate) async fn apply_leave_handler<S, V, E>(
    State(api): State<Arc<LeaveApi<S, V, E>>>,
    headers: HeaderMap,
    body: Result<Json<LeaveSubmission>, JsonRejection>,
) -> Response
where
    S: RequestStore + 'static,
    V: TokenVerifier + 'static,
    E: WorkflowEngine<Input = ApprovalInput> + 'static,
{
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let submission = match body {
        Ok(Json(submission)) => submission,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable leave submission treated as empty");
            LeaveSubmission::default()
        }
    };
    let callback_base = Some(api.public_base_url.clone());

    match api.intake.submit(authorization, submission, callback_base) {
        Ok(receipt) => (
            StatusCode::OK,
            Json(json!({
                "message": "Leave applied",
                "requestId": receipt.request_id,
            })),
        )
            .into_response(),
        Err(IntakeError::Auth(err)) => message(StatusCode::UNAUTHORIZED, err.to_string()),
        Err(IntakeError::MissingField) => {
            message(StatusCode::BAD_REQUEST, "Missing required fields")
        }
        Err(IntakeError::InvalidDateRange(_)) => {
            message(StatusCode::BAD_REQUEST, "Invalid date range")
        }
        Err(other) => {
            error!(error = %other, "leave intake failed");
            message(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

pub(crate) async fn process_approval_handler<S, V, E>(
    State(api): State<Arc<LeaveApi<S, V, E>>>,
    params: Result<Query<ResolutionParams>, QueryRejection>,
) -> Response
where
    S: RequestStore + 'static,
    V: TokenVerifier + 'static,
    E: WorkflowEngine<Input = ApprovalInput> + 'static,
{
    let params = params.map(|Query(params)| params).unwrap_or_default();
    let request_id = params.request_id.clone().unwrap_or_default();

    match api.resolution.resolve(params) {
        Ok(receipt) => message(StatusCode::OK, receipt.message()),
        Err(ResolutionError::MissingParameter) => {
            message(StatusCode::BAD_REQUEST, "Missing required query parameters")
        }
        Err(ResolutionError::Engine(EngineError::InvalidHandle)) => message(
            StatusCode::CONFLICT,
            format!("Leave request {request_id} has already been decided or the link is invalid"),
        ),
        Err(other) => {
            error!(error = %other, "decision could not be processed");
            message(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StatusParams {
    request_id: Option<String>,
}

pub(crate) async fn check_status_handler<S, V, E>(
    State(api): State<Arc<LeaveApi<S, V, E>>>,
    params: Result<Query<StatusParams>, QueryRejection>,
) -> Response
where
    S: RequestStore + 'static,
    V: TokenVerifier + 'static,
    E: WorkflowEngine<Input = ApprovalInput> + 'static,
{
    let Some(request_id) = params
        .ok()
        .and_then(|Query(params)| params.request_id)
        .filter(|id| !id.is_empty())
    else {
        return message(StatusCode::BAD_REQUEST, "Missing required query parameters");
    };

    match api.store.get(&RequestId(request_id)) {
        Ok(Some(record)) => (StatusCode::OK, Json(record.status_view())).into_response(),
        Ok(None) => message(StatusCode::NOT_FOUND, "Leave request not found"),
        Err(err) => {
            error!(error = %err, "leave status lookup failed");
            message(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}
