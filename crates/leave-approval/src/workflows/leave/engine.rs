//! In-process orchestration engine with task-token suspension.
//!
//! `start` records an instance and queues it; an [`EngineDriver`] runs the steps. When the first
//! step runs the engine mints a [`ResumeHandle`] and hands it to the workflow, which delivers it to
//! the approver. The instance then parks as a plain table entry until [`WorkflowEngine::resolve`]
//! claims the handle. Claiming removes the handle under the engine lock, so a handle moves exactly
//! one instance exactly once no matter how many resolutions race for it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::domain::ApprovalOutcome;
use super::repository::{DeliveryError, StoreError};

/// Loggable identifier of one workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    fn mint() -> Self {
        Self(format!("exec-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability to resume one suspended instance. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResumeHandle(String);

impl ResumeHandle {
    /// 244 random bits rendered as 64 hex characters.
    fn mint() -> Self {
        Self(format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ResumeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResumeHandle(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Started,
    AwaitingDecision,
    Approved,
    Rejected,
    Completed,
    Failed,
}

impl WorkflowState {
    fn decided(outcome: ApprovalOutcome) -> Self {
        match outcome {
            ApprovalOutcome::Approved => WorkflowState::Approved,
            ApprovalOutcome::Rejected => WorkflowState::Rejected,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed)
    }
}

/// Step definitions executed by the engine.
pub trait Workflow: Send + Sync + 'static {
    type Input: Clone + Send + Sync + 'static;

    /// Runs once the handle is minted; must deliver it to whoever will decide.
    fn request_decision(
        &self,
        input: &Self::Input,
        handle: &ResumeHandle,
    ) -> Result<(), StepError>;

    /// Runs after a decision claimed the handle.
    fn complete(&self, input: &Self::Input, outcome: ApprovalOutcome) -> Result<(), StepError>;
}

/// Narrow engine surface used by the intake and resolution handlers.
pub trait WorkflowEngine: Send + Sync {
    type Input;

    fn start(&self, input: Self::Input) -> Result<ExecutionId, EngineError>;

    /// Claims `handle` and schedules completion. Fails for unknown or already used handles.
    fn resolve(
        &self,
        handle: &ResumeHandle,
        outcome: ApprovalOutcome,
    ) -> Result<ExecutionId, EngineError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("resume handle is unknown or already used")]
    InvalidHandle,
    #[error("execution {0} not found")]
    UnknownExecution(ExecutionId),
}

/// Failure of a single workflow step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid step input: {0}")]
    Input(String),
}

/// Handle-free view of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSnapshot {
    pub execution_id: ExecutionId,
    pub state: WorkflowState,
    pub outcome: Option<ApprovalOutcome>,
    pub suspended: bool,
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct WorkflowInstance<I> {
    state: WorkflowState,
    /// Released once the instance is terminal; only the snapshot fields stay behind.
    input: Option<I>,
    outcome: Option<ApprovalOutcome>,
    handle: Option<ResumeHandle>,
    failure: Option<String>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<I> WorkflowInstance<I> {
    fn enter(&mut self, state: WorkflowState) {
        self.state = state;
        self.updated_at = Utc::now();
        if state.is_terminal() {
            self.input = None;
        }
    }
}

struct EngineState<I> {
    instances: HashMap<ExecutionId, WorkflowInstance<I>>,
    handles: HashMap<ResumeHandle, ExecutionId>,
}

pub struct InProcessEngine<W: Workflow> {
    workflow: W,
    max_step_attempts: u32,
    state: Mutex<EngineState<W::Input>>,
    queue: mpsc::UnboundedSender<ExecutionId>,
}

impl<W: Workflow> InProcessEngine<W> {
    /// Builds the engine and the driver that executes its queued steps.
    pub fn new(workflow: W, max_step_attempts: u32) -> (Arc<Self>, EngineDriver<W>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            workflow,
            max_step_attempts: max_step_attempts.max(1),
            state: Mutex::new(EngineState {
                instances: HashMap::new(),
                handles: HashMap::new(),
            }),
            queue: sender,
        });
        let driver = EngineDriver {
            engine: engine.clone(),
            queue: receiver,
        };
        (engine, driver)
    }

    pub fn workflow(&self) -> &W {
        &self.workflow
    }

    pub fn snapshot(&self, id: &ExecutionId) -> Result<Option<InstanceSnapshot>, EngineError> {
        let state = self.lock()?;
        Ok(state.instances.get(id).map(|instance| InstanceSnapshot {
            execution_id: id.clone(),
            state: instance.state,
            outcome: instance.outcome,
            suspended: instance.handle.is_some(),
            failure: instance.failure.clone(),
            started_at: instance.started_at,
            updated_at: instance.updated_at,
        }))
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState<W::Input>>, EngineError> {
        self.state
            .lock()
            .map_err(|_| EngineError::Unavailable("engine state poisoned".to_string()))
    }

    /// Runs whichever step the instance's current state calls for.
    pub fn advance(&self, id: &ExecutionId) -> Result<WorkflowState, EngineError> {
        let (state, input, outcome) = {
            let guard = self.lock()?;
            let instance = guard
                .instances
                .get(id)
                .ok_or_else(|| EngineError::UnknownExecution(id.clone()))?;
            (instance.state, instance.input.clone(), instance.outcome)
        };

        let Some(input) = input else {
            return Ok(state);
        };
        match (state, outcome) {
            (WorkflowState::Started, _) => self.suspend(id, &input),
            (WorkflowState::Approved | WorkflowState::Rejected, Some(outcome)) => {
                self.finish(id, &input, outcome)
            }
            (current, _) => Ok(current),
        }
    }

    fn suspend(&self, id: &ExecutionId, input: &W::Input) -> Result<WorkflowState, EngineError> {
        let handle = ResumeHandle::mint();
        {
            // Registered before delivery so an immediate click cannot outrun the bookkeeping.
            let mut guard = self.lock()?;
            guard.handles.insert(handle.clone(), id.clone());
            if let Some(instance) = guard.instances.get_mut(id) {
                instance.handle = Some(handle.clone());
            }
        }

        let result = self.attempt(id, "request_decision", || {
            self.workflow.request_decision(input, &handle)
        });

        let mut guard = self.lock()?;
        let EngineState { instances, handles } = &mut *guard;
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownExecution(id.clone()))?;

        match result {
            Ok(()) if instance.state == WorkflowState::Started => {
                instance.enter(WorkflowState::AwaitingDecision);
                info!(execution_id = %id, "workflow suspended awaiting decision");
            }
            Ok(()) => {}
            Err(err) if instance.state == WorkflowState::Started => {
                handles.remove(&handle);
                instance.handle = None;
                instance.failure = Some(err.to_string());
                instance.enter(WorkflowState::Failed);
                error!(
                    execution_id = %id,
                    error = %err,
                    "approver could not be notified; workflow failed"
                );
            }
            Err(err) => {
                warn!(
                    execution_id = %id,
                    error = %err,
                    "decision arrived although delivery reported failure"
                );
            }
        }
        Ok(instance.state)
    }

    fn finish(
        &self,
        id: &ExecutionId,
        input: &W::Input,
        outcome: ApprovalOutcome,
    ) -> Result<WorkflowState, EngineError> {
        let result = self.attempt(id, "complete", || self.workflow.complete(input, outcome));

        let mut guard = self.lock()?;
        let instance = guard
            .instances
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownExecution(id.clone()))?;

        match result {
            Ok(()) => {
                instance.enter(WorkflowState::Completed);
                info!(execution_id = %id, outcome = outcome.label(), "workflow completed");
            }
            Err(err) => {
                instance.failure = Some(err.to_string());
                instance.enter(WorkflowState::Failed);
                error!(
                    execution_id = %id,
                    outcome = outcome.label(),
                    error = %err,
                    "workflow completion failed"
                );
            }
        }
        Ok(instance.state)
    }

    fn attempt<F>(&self, id: &ExecutionId, step: &'static str, mut run: F) -> Result<(), StepError>
    where
        F: FnMut() -> Result<(), StepError>,
    {
        let mut attempt = 1;
        loop {
            match run() {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.max_step_attempts => {
                    warn!(
                        execution_id = %id,
                        step,
                        attempt,
                        error = %err,
                        "workflow step failed; redelivering"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<W: Workflow> WorkflowEngine for InProcessEngine<W> {
    type Input = W::Input;

    fn start(&self, input: W::Input) -> Result<ExecutionId, EngineError> {
        let id = ExecutionId::mint();
        let now = Utc::now();
        let mut guard = self.lock()?;
        guard.instances.insert(
            id.clone(),
            WorkflowInstance {
                state: WorkflowState::Started,
                input: Some(input),
                outcome: None,
                handle: None,
                failure: None,
                started_at: now,
                updated_at: now,
            },
        );

        if self.queue.send(id.clone()).is_err() {
            guard.instances.remove(&id);
            return Err(EngineError::Unavailable("engine driver stopped".to_string()));
        }
        info!(execution_id = %id, "workflow started");
        Ok(id)
    }

    fn resolve(
        &self,
        handle: &ResumeHandle,
        outcome: ApprovalOutcome,
    ) -> Result<ExecutionId, EngineError> {
        let mut guard = self.lock()?;
        let EngineState { instances, handles } = &mut *guard;
        let id = handles.get(handle).cloned().ok_or(EngineError::InvalidHandle)?;
        let instance = instances
            .get_mut(&id)
            .ok_or_else(|| EngineError::UnknownExecution(id.clone()))?;

        // Queued under the lock so the driver cannot run ahead of the bookkeeping below.
        if self.queue.send(id.clone()).is_err() {
            return Err(EngineError::Unavailable("engine driver stopped".to_string()));
        }
        handles.remove(handle);
        instance.handle = None;
        instance.outcome = Some(outcome);
        instance.enter(WorkflowState::decided(outcome));

        info!(execution_id = %id, outcome = outcome.label(), "decision accepted");
        Ok(id)
    }
}

/// Executes queued steps for an [`InProcessEngine`].
pub struct EngineDriver<W: Workflow> {
    engine: Arc<InProcessEngine<W>>,
    queue: mpsc::UnboundedReceiver<ExecutionId>,
}

impl<W: Workflow> EngineDriver<W> {
    /// Runs every step queued so far on the calling thread; returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(id) = self.queue.try_recv() {
            if let Err(err) = self.engine.advance(&id) {
                error!(execution_id = %id, error = %err, "workflow step could not run");
            }
            processed += 1;
        }
        processed
    }

    /// Drives the engine until the runtime shuts down. Steps run on the blocking pool, one at a
    /// time, in queue order.
    pub async fn run(mut self) {
        while let Some(id) = self.queue.recv().await {
            let engine = self.engine.clone();
            let step_id = id.clone();
            match tokio::task::spawn_blocking(move || engine.advance(&step_id)).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    error!(execution_id = %id, error = %err, "workflow step could not run")
                }
                Err(err) => error!(execution_id = %id, error = %err, "workflow step panicked"),
            }
        }
    }
}
