use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use url::Url;

use super::auth::{bearer_token, AuthError, TokenVerifier};
use super::domain::{DateRangeError, LeavePeriod, LeaveRequest, LeaveSubmission, RequestId};
use super::engine::{EngineError, ExecutionId, WorkflowEngine};
use super::orchestrator::ApprovalInput;
use super::repository::{RequestStore, StoreError};

static LAST_ISSUED_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp, bumped past the last id this process issued.
fn next_request_id() -> RequestId {
    let now = Utc::now().timestamp_millis();
    let previous = LAST_ISSUED_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    RequestId::from_millis(now.max(previous + 1))
}

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeReceipt {
    pub request_id: RequestId,
    pub execution_id: ExecutionId,
}

/// Authenticates, validates and stores a submission, then starts its approval workflow.
pub struct LeaveIntake<S, V, E> {
    store: Arc<S>,
    verifier: Arc<V>,
    engine: Arc<E>,
}

impl<S, V, E> LeaveIntake<S, V, E>
where
    S: RequestStore + 'static,
    V: TokenVerifier + 'static,
    E: WorkflowEngine<Input = ApprovalInput> + 'static,
{
    pub fn new(store: Arc<S>, verifier: Arc<V>, engine: Arc<E>) -> Self {
        Self {
            store,
            verifier,
            engine,
        }
    }

    /// `authorization` is the raw `Authorization` header value; `callback_base` is where the
    /// approver links should point.
    pub fn submit(
        &self,
        authorization: Option<&str>,
        submission: LeaveSubmission,
        callback_base: Option<Url>,
    ) -> Result<IntakeReceipt, IntakeError> {
        let token = bearer_token(authorization)?;
        let claims = self.verifier.verify(token)?;

        let submission = submission.complete().ok_or(IntakeError::MissingField)?;
        let period = LeavePeriod::parse(&submission.start_date, &submission.end_date)?;
        let callback_base = callback_base.ok_or(IntakeError::MissingRoutingContext)?;

        let request_id = next_request_id();
        let record = LeaveRequest::pending(request_id.clone(), submission, period);
        info!(
            request_id = %request_id,
            subject = %claims.sub,
            requester = %record.user_email,
            "leave request received"
        );

        self.store.put(record.clone()).map_err(|err| {
            error!(request_id = %request_id, error = %err, "leave request could not be stored");
            IntakeError::from(err)
        })?;

        let execution_id = self
            .engine
            .start(ApprovalInput {
                request: record,
                callback_base,
            })
            .map_err(|err| {
                error!(
                    request_id = %request_id,
                    error = %err,
                    "approval workflow did not start; stored request stays PENDING until reconciled"
                );
                IntakeError::from(err)
            })?;

        info!(request_id = %request_id, execution_id = %execution_id, "approval workflow started");
        Ok(IntakeReceipt {
            request_id,
            execution_id,
        })
    }
}

/// Error raised by leave intake.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Missing required fields")]
    MissingField,
    #[error("Invalid date range: {0}")]
    InvalidDateRange(#[from] DateRangeError),
    #[error("no callback base URL could be determined")]
    MissingRoutingContext,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
