use std::sync::Arc;

use tracing::info;
use url::Url;

use super::domain::{ApprovalOutcome, LeaveRequest};
use super::engine::{InProcessEngine, ResumeHandle, StepError, Workflow};
use super::notifications::{self, ApprovalLinks};
use super::repository::{Notifier, RequestStore};

/// Payload carried by each workflow instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalInput {
    pub request: LeaveRequest,
    /// Base URL the approve/reject/status links are built on.
    pub callback_base: Url,
}

/// Leave approval steps: ask the approver, then record and announce the decision.
pub struct LeaveApprovalWorkflow<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    sender: String,
}

/// Engine specialised to the leave approval workflow.
pub type LeaveEngine<S, N> = InProcessEngine<LeaveApprovalWorkflow<S, N>>;

impl<S, N> LeaveApprovalWorkflow<S, N>
where
    S: RequestStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, sender: impl Into<String>) -> Self {
        Self {
            store,
            notifier,
            sender: sender.into(),
        }
    }
}

impl<S, N> Workflow for LeaveApprovalWorkflow<S, N>
where
    S: RequestStore + 'static,
    N: Notifier + 'static,
{
    type Input = ApprovalInput;

    fn request_decision(
        &self,
        input: &ApprovalInput,
        handle: &ResumeHandle,
    ) -> Result<(), StepError> {
        let request = &input.request;
        let links = ApprovalLinks::build(&input.callback_base, &request.request_id, handle)
            .map_err(|err| StepError::Input(err.to_string()))?;

        self.notifier
            .send(notifications::approval_request(&self.sender, request, &links))?;
        info!(request_id = %request.request_id, "approval request sent");
        Ok(())
    }

    fn complete(&self, input: &ApprovalInput, outcome: ApprovalOutcome) -> Result<(), StepError> {
        let request = &input.request;
        let stored = self.store.transition(&request.request_id, outcome.status())?;

        self.notifier
            .send(notifications::decision_outcome(&self.sender, &stored, outcome))?;
        info!(
            request_id = %request.request_id,
            status = stored.status.label(),
            "requester notified of decision"
        );
        Ok(())
    }
}
