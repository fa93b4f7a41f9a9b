use serde::{Deserialize, Serialize};

use super::domain::{LeaveRequest, LeaveStatus, RequestId};

/// Key-value storage for leave request records.
pub trait RequestStore: Send + Sync {
    /// Writes the record under its id, replacing any previous value.
    fn put(&self, record: LeaveRequest) -> Result<(), StoreError>;
    fn get(&self, id: &RequestId) -> Result<Option<LeaveRequest>, StoreError>;

    /// Moves a stored record to `next`. Re-applying the status it already holds is a no-op,
    /// so redelivered workflow steps stay harmless.
    fn transition(&self, id: &RequestId, next: LeaveStatus) -> Result<LeaveRequest, StoreError> {
        let mut record = self.get(id)?.ok_or(StoreError::NotFound)?;
        if record.status == next {
            return Ok(record);
        }
        if !record.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                from: record.status,
                to: next,
            });
        }
        record.status = next;
        self.put(record.clone())?;
        Ok(record)
    }
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("status cannot move from {} to {}", from.label(), to.label())]
    InvalidTransition { from: LeaveStatus, to: LeaveStatus },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outbound e-mail channel.
pub trait Notifier: Send + Sync {
    fn send(&self, message: EmailMessage) -> Result<(), DeliveryError>;
}

/// A single HTML e-mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery to {to} failed: {reason}")]
    DeliveryFailed { to: String, reason: String },
}
