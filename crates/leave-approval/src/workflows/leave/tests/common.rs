use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;
use url::Url;

use crate::workflows::leave::auth::{AuthError, Claims, TokenVerifier};
use crate::workflows::leave::domain::{LeaveRequest, LeaveSubmission, RequestId};
use crate::workflows::leave::engine::{
    EngineDriver, EngineError, ExecutionId, InProcessEngine, ResumeHandle, WorkflowEngine,
};
use crate::workflows::leave::orchestrator::{ApprovalInput, LeaveApprovalWorkflow};
use crate::workflows::leave::repository::{
    DeliveryError, EmailMessage, Notifier, RequestStore, StoreError,
};
use crate::workflows::leave::router::LeaveApi;
use crate::workflows::leave::{ApprovalOutcome, APPROVAL_SUBJECT};

pub(super) const VALID_TOKEN: &str = "valid-token";
pub(super) const SENDER: &str = "hr@example.com";

pub(super) fn bearer() -> String {
    format!("Bearer {VALID_TOKEN}")
}

pub(super) fn base_url() -> Url {
    Url::parse("https://leave.example.com/prod").expect("valid base url")
}

pub(super) fn submission() -> LeaveSubmission {
    LeaveSubmission {
        user_email: Some("user@example.com".to_string()),
        start_date: Some("2025-04-01".to_string()),
        end_date: Some("2025-04-05".to_string()),
        approver_email: Some("approver@example.com".to_string()),
        leave_type: Some("Sick".to_string()),
    }
}

/// Copies of `submission()` with exactly one required field removed.
pub(super) fn submissions_missing_one_field() -> Vec<(&'static str, LeaveSubmission)> {
    let mut cases = Vec::new();
    let mut without = |name: &'static str, clear: fn(&mut LeaveSubmission)| {
        let mut submission = submission();
        clear(&mut submission);
        cases.push((name, submission));
    };
    without("userEmail", |s| s.user_email = None);
    without("startDate", |s| s.start_date = None);
    without("endDate", |s| s.end_date = Some(String::new()));
    without("approverEmail", |s| s.approver_email = None);
    without("leaveType", |s| s.leave_type = Some(" ".to_string()));
    cases
}

pub(super) struct StaticVerifier;

impl TokenVerifier for StaticVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token == VALID_TOKEN {
            Ok(Claims {
                sub: "user@example.com".to_string(),
                exp: i64::MAX,
                iat: 0,
            })
        } else {
            Err(AuthError::InvalidCredential)
        }
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    records: Arc<Mutex<HashMap<RequestId, LeaveRequest>>>,
    puts: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub(super) fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub(super) fn record(&self, id: &RequestId) -> LeaveRequest {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned()
            .expect("record stored")
    }
}

impl RequestStore for MemoryStore {
    fn put(&self, record: LeaveRequest) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .expect("store mutex poisoned")
            .insert(record.request_id.clone(), record);
        Ok(())
    }

    fn get(&self, id: &RequestId) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self
            .records
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned())
    }
}

pub(super) struct UnavailableStore;

impl RequestStore for UnavailableStore {
    fn put(&self, _record: LeaveRequest) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("table offline".to_string()))
    }

    fn get(&self, _id: &RequestId) -> Result<Option<LeaveRequest>, StoreError> {
        Err(StoreError::Unavailable("table offline".to_string()))
    }
}

/// Captures sent messages; the first `failures` sends fail.
#[derive(Default, Clone)]
pub(super) struct MemoryOutbox {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
    failures: Arc<AtomicU32>,
}

impl MemoryOutbox {
    pub(super) fn failing(failures: u32) -> Self {
        let outbox = Self::default();
        outbox.fail_next(failures);
        outbox
    }

    pub(super) fn fail_next(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    pub(super) fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().expect("outbox mutex poisoned").clone()
    }

    pub(super) fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
        self.messages()
            .into_iter()
            .filter(|message| message.to == address)
            .collect()
    }
}

impl Notifier for MemoryOutbox {
    fn send(&self, message: EmailMessage) -> Result<(), DeliveryError> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DeliveryError::DeliveryFailed {
                to: message.to,
                reason: "smtp relay refused".to_string(),
            });
        }
        self.messages
            .lock()
            .expect("outbox mutex poisoned")
            .push(message);
        Ok(())
    }
}

/// Engine double that records calls instead of running anything.
#[derive(Default)]
pub(super) struct RecordingEngine {
    pub(super) started: Mutex<Vec<ApprovalInput>>,
    pub(super) resolved: Mutex<Vec<(String, ApprovalOutcome)>>,
    pub(super) unavailable: bool,
}

impl RecordingEngine {
    pub(super) fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub(super) fn starts(&self) -> Vec<ApprovalInput> {
        self.started.lock().expect("engine mutex poisoned").clone()
    }
}

impl WorkflowEngine for RecordingEngine {
    type Input = ApprovalInput;

    fn start(&self, input: ApprovalInput) -> Result<ExecutionId, EngineError> {
        if self.unavailable {
            return Err(EngineError::Unavailable("state machine throttled".to_string()));
        }
        let mut started = self.started.lock().expect("engine mutex poisoned");
        started.push(input);
        Ok(ExecutionId(format!("exec-{}", started.len())))
    }

    fn resolve(
        &self,
        handle: &ResumeHandle,
        outcome: ApprovalOutcome,
    ) -> Result<ExecutionId, EngineError> {
        if self.unavailable {
            return Err(EngineError::Unavailable("state machine throttled".to_string()));
        }
        self.resolved
            .lock()
            .expect("engine mutex poisoned")
            .push((handle.expose().to_string(), outcome));
        Ok(ExecutionId("exec-1".to_string()))
    }
}

pub(super) type TestWorkflow = LeaveApprovalWorkflow<MemoryStore, MemoryOutbox>;
pub(super) type TestEngine = InProcessEngine<TestWorkflow>;
pub(super) type TestApi = LeaveApi<MemoryStore, StaticVerifier, TestEngine>;

/// Full flow wired with in-memory collaborators and the real engine.
pub(super) struct Harness {
    pub(super) api: Arc<TestApi>,
    pub(super) engine: Arc<TestEngine>,
    pub(super) driver: EngineDriver<TestWorkflow>,
    pub(super) store: MemoryStore,
    pub(super) outbox: MemoryOutbox,
}

pub(super) fn harness_with(outbox: MemoryOutbox, max_step_attempts: u32) -> Harness {
    let store = MemoryStore::default();
    let workflow = LeaveApprovalWorkflow::new(
        Arc::new(store.clone()),
        Arc::new(outbox.clone()),
        SENDER,
    );
    let (engine, driver) = InProcessEngine::new(workflow, max_step_attempts);
    let api = Arc::new(LeaveApi::new(
        Arc::new(store.clone()),
        Arc::new(StaticVerifier),
        engine.clone(),
        base_url(),
    ));
    Harness {
        api,
        engine,
        driver,
        store,
        outbox,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(MemoryOutbox::default(), 1)
}

/// Links found in an HTML body, with `&amp;` entities decoded.
pub(super) fn links_in(html: &str) -> Vec<Url> {
    html.split("href=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .filter_map(|href| Url::parse(&href.replace("&amp;", "&")).ok())
        .collect()
}

pub(super) fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

/// The approve and reject links of the single approval request in the outbox.
pub(super) fn decision_links(outbox: &MemoryOutbox) -> (Url, Url) {
    let requests: Vec<EmailMessage> = outbox
        .messages()
        .into_iter()
        .filter(|message| message.subject == APPROVAL_SUBJECT)
        .collect();
    assert_eq!(requests.len(), 1, "exactly one approval request expected");

    let links = links_in(&requests[0].html_body);
    let find = |action: &str| {
        links
            .iter()
            .find(|url| query_value(url, "action").as_deref() == Some(action))
            .cloned()
            .unwrap_or_else(|| panic!("{action} link present"))
    };
    (find("approve"), find("reject"))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
