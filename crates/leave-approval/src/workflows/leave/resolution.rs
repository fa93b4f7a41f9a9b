use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::domain::{ApprovalOutcome, RequestId};
use super::engine::{EngineError, ExecutionId, ResumeHandle, WorkflowEngine};

/// Query parameters carried by an approve/reject link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolutionParams {
    pub request_id: Option<String>,
    pub action: Option<String>,
    pub task_token: Option<String>,
}

/// Accepted decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionReceipt {
    pub request_id: RequestId,
    pub outcome: ApprovalOutcome,
    pub execution_id: ExecutionId,
}

impl ResolutionReceipt {
    pub fn message(&self) -> String {
        format!(
            "Leave request {} {}",
            self.request_id,
            self.outcome.past_tense()
        )
    }
}

/// Resumes a suspended approval with the approver's decision. Holds no state of its own; the
/// resume handle alone selects and authorizes the instance.
pub struct LeaveResolution<E> {
    engine: Arc<E>,
}

impl<E> LeaveResolution<E>
where
    E: WorkflowEngine + 'static,
{
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    pub fn resolve(&self, params: ResolutionParams) -> Result<ResolutionReceipt, ResolutionError> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|value| !value.is_empty())
        }

        let (Some(request_id), Some(action), Some(task_token)) = (
            present(params.request_id),
            present(params.action),
            present(params.task_token),
        ) else {
            return Err(ResolutionError::MissingParameter);
        };

        let request_id = RequestId(request_id);
        let outcome = ApprovalOutcome::from_action(&action);
        info!(request_id = %request_id, outcome = outcome.label(), "processing decision");

        let execution_id = self
            .engine
            .resolve(&ResumeHandle::new(task_token), outcome)
            .map_err(|err| {
                warn!(request_id = %request_id, error = %err, "decision not applied");
                ResolutionError::from(err)
            })?;

        Ok(ResolutionReceipt {
            request_id,
            outcome,
            execution_id,
        })
    }
}

/// Error raised while resolving a decision link.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Missing required query parameters")]
    MissingParameter,
    #[error(transparent)]
    Engine(#[from] EngineError),
}
