use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a leave request, e.g. `LEAVE-1743465600000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub const PREFIX: &'static str = "LEAVE-";

    pub fn from_millis(millis: i64) -> Self {
        Self(format!("{}{millis}", Self::PREFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a stored request. Only `Pending` may move, and only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LeaveStatus::Pending => "PENDING",
            LeaveStatus::Approved => "APPROVED",
            LeaveStatus::Rejected => "REJECTED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, LeaveStatus::Pending)
    }

    pub fn can_transition_to(self, next: LeaveStatus) -> bool {
        matches!(
            (self, next),
            (
                LeaveStatus::Pending,
                LeaveStatus::Approved | LeaveStatus::Rejected
            )
        )
    }
}

/// Decision carried from the approver back into the paused workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
}

impl ApprovalOutcome {
    /// Only the exact string `approve` approves; everything else rejects.
    pub fn from_action(action: &str) -> Self {
        if action == "approve" {
            ApprovalOutcome::Approved
        } else {
            ApprovalOutcome::Rejected
        }
    }

    pub const fn status(self) -> LeaveStatus {
        match self {
            ApprovalOutcome::Approved => LeaveStatus::Approved,
            ApprovalOutcome::Rejected => LeaveStatus::Rejected,
        }
    }

    pub const fn label(self) -> &'static str {
        self.status().label()
    }

    pub const fn past_tense(self) -> &'static str {
        match self {
            ApprovalOutcome::Approved => "approved",
            ApprovalOutcome::Rejected => "rejected",
        }
    }
}

/// Inclusive leave period. The dates are the UTC calendar days of the submitted bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeavePeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    duration_days: i64,
}

impl LeavePeriod {
    /// Accepts `YYYY-MM-DD` (midnight UTC) or RFC 3339 timestamps.
    ///
    /// The duration is measured between the exact instants: `ceil((end - start) / 1 day) + 1`.
    pub fn parse(start: &str, end: &str) -> Result<Self, DateRangeError> {
        let starts_at = parse_instant("startDate", start)?;
        let ends_at = parse_instant("endDate", end)?;
        if ends_at < starts_at {
            return Err(DateRangeError::EndBeforeStart {
                start: starts_at.date_naive(),
                end: ends_at.date_naive(),
            });
        }
        Ok(Self {
            start_date: starts_at.date_naive(),
            end_date: ends_at.date_naive(),
            duration_days: inclusive_days(ends_at - starts_at),
        })
    }

    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, DateRangeError> {
        if end_date < start_date {
            return Err(DateRangeError::EndBeforeStart {
                start: start_date,
                end: end_date,
            });
        }
        Ok(Self {
            start_date,
            end_date,
            duration_days: (end_date - start_date).num_days() + 1,
        })
    }

    /// Days covered, counting both ends; a same-day request is one day.
    pub fn duration_days(&self) -> i64 {
        self.duration_days
    }
}

/// Whole days in `span`, any remainder rounded up, plus the starting day.
fn inclusive_days(span: Duration) -> i64 {
    let whole = span.num_days();
    let partial = span > Duration::days(whole);
    whole + i64::from(partial) + 1
}

fn parse_instant(field: &'static str, raw: &str) -> Result<DateTime<Utc>, DateRangeError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| DateRangeError::Unparsable {
            field,
            value: raw.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateRangeError {
    #[error("{field} '{value}' is not a valid date")]
    Unparsable { field: &'static str, value: String },
    #[error("leave ends ({end}) before it starts ({start})")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

/// Raw intake payload; every field is optional so omissions can be reported as one failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaveSubmission {
    pub user_email: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub approver_email: Option<String>,
    pub leave_type: Option<String>,
}

/// Submission with every required field present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteSubmission {
    pub user_email: String,
    pub start_date: String,
    pub end_date: String,
    pub approver_email: String,
    pub leave_type: String,
}

impl LeaveSubmission {
    /// `None` when any required field is absent or blank.
    pub fn complete(self) -> Option<CompleteSubmission> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|value| !value.trim().is_empty())
        }

        Some(CompleteSubmission {
            user_email: present(self.user_email)?,
            start_date: present(self.start_date)?,
            end_date: present(self.end_date)?,
            approver_email: present(self.approver_email)?,
            leave_type: present(self.leave_type)?,
        })
    }
}

/// Stored request record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub request_id: RequestId,
    pub user_email: String,
    pub approver_email: String,
    #[serde(flatten)]
    pub period: LeavePeriod,
    pub leave_type: String,
    pub status: LeaveStatus,
}

impl LeaveRequest {
    pub fn pending(
        request_id: RequestId,
        submission: CompleteSubmission,
        period: LeavePeriod,
    ) -> Self {
        Self {
            request_id,
            user_email: submission.user_email,
            approver_email: submission.approver_email,
            period,
            leave_type: submission.leave_type,
            status: LeaveStatus::Pending,
        }
    }

    pub fn status_view(&self) -> LeaveStatusView {
        LeaveStatusView {
            request_id: self.request_id.clone(),
            status: self.status.label(),
            leave_type: self.leave_type.clone(),
            start_date: self.period.start_date,
            end_date: self.period.end_date,
        }
    }
}

/// What the status link exposes; approver and requester addresses stay private.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveStatusView {
    pub request_id: RequestId,
    pub status: &'static str,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
