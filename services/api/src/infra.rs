use leave_approval::workflows::leave::{
    DeliveryError, EmailMessage, LeaveRequest, Notifier, RequestId, RequestStore, StoreError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local table of leave requests.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRequestStore {
    records: Arc<Mutex<HashMap<RequestId, LeaveRequest>>>,
}

impl RequestStore for InMemoryRequestStore {
    fn put(&self, record: LeaveRequest) -> Result<(), StoreError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("request table poisoned".to_string()))?;
        guard.insert(record.request_id.clone(), record);
        Ok(())
    }

    fn get(&self, id: &RequestId) -> Result<Option<LeaveRequest>, StoreError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("request table poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }
}

/// Notifier that keeps every message instead of handing it to a mail relay.
#[derive(Default, Clone)]
pub(crate) struct OutboxNotifier {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
}

impl Notifier for OutboxNotifier {
    fn send(&self, message: EmailMessage) -> Result<(), DeliveryError> {
        let mut guard = self
            .messages
            .lock()
            .map_err(|_| DeliveryError::DeliveryFailed {
                to: message.to.clone(),
                reason: "outbox poisoned".to_string(),
            })?;
        // Bodies carry resume handles; only the envelope is logged.
        info!(to = %message.to, subject = %message.subject, "message captured in outbox");
        guard.push(message);
        Ok(())
    }
}

impl OutboxNotifier {
    pub(crate) fn messages(&self) -> Vec<EmailMessage> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}
