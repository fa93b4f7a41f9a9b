//! Leave request intake, approval workflow, and decision resolution.
//!
//! Collaborators (record store, e-mail channel, token verifier, orchestration engine) sit
//! behind traits and are injected into the handlers, so the same flow runs against in-memory
//! fakes in tests and against real adapters in the service binary.

pub mod auth;
pub mod domain;
pub mod engine;
pub mod intake;
pub mod notifications;
pub mod orchestrator;
pub mod repository;
pub mod resolution;
pub mod router;

#[cfg(test)]
mod tests;

pub use auth::{bearer_token, AuthError, Claims, JwtAuthority, TokenVerifier};
pub use domain::{
    ApprovalOutcome, CompleteSubmission, DateRangeError, LeavePeriod, LeaveRequest,
    LeaveStatus, LeaveStatusView, LeaveSubmission, RequestId,
};
pub use engine::{
    EngineDriver, EngineError, ExecutionId, InProcessEngine, InstanceSnapshot, ResumeHandle,
    StepError, Workflow, WorkflowEngine, WorkflowState,
};
pub use intake::{IntakeError, IntakeReceipt, LeaveIntake};
pub use notifications::{ApprovalLinks, LinkError, APPROVAL_SUBJECT, OUTCOME_SUBJECT};
pub use orchestrator::{ApprovalInput, LeaveApprovalWorkflow, LeaveEngine};
pub use repository::{DeliveryError, EmailMessage, Notifier, RequestStore, StoreError};
pub use resolution::{LeaveResolution, ResolutionError, ResolutionParams, ResolutionReceipt};
pub use router::{leave_router, LeaveApi, INTAKE_ROUTE, RESOLUTION_ROUTE, STATUS_ROUTE};
