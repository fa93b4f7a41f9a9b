use std::fmt::Write as _;

use url::Url;

use super::domain::{ApprovalOutcome, LeaveRequest, RequestId};
use super::engine::ResumeHandle;
use super::repository::EmailMessage;
use super::router::{RESOLUTION_ROUTE, STATUS_ROUTE};

pub const APPROVAL_SUBJECT: &str = "Leave Approval Request";
pub const OUTCOME_SUBJECT: &str = "Leave Request Outcome";

/// The three links placed in the approver e-mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalLinks {
    pub approve: Url,
    pub reject: Url,
    pub status: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("callback base '{0}' cannot carry a path")]
pub struct LinkError(pub String);

impl ApprovalLinks {
    pub fn build(
        base: &Url,
        request_id: &RequestId,
        handle: &ResumeHandle,
    ) -> Result<Self, LinkError> {
        let decision = |action: &str| -> Result<Url, LinkError> {
            let mut url = endpoint(base, RESOLUTION_ROUTE)?;
            url.query_pairs_mut()
                .append_pair("requestId", request_id.as_str())
                .append_pair("action", action)
                .append_pair("taskToken", handle.expose());
            Ok(url)
        };

        let mut status = endpoint(base, STATUS_ROUTE)?;
        status
            .query_pairs_mut()
            .append_pair("requestId", request_id.as_str());

        Ok(Self {
            approve: decision("approve")?,
            reject: decision("reject")?,
            status,
        })
    }
}

/// Appends `route` to the base path, keeping any stage prefix such as `/prod`.
fn endpoint(base: &Url, route: &str) -> Result<Url, LinkError> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| LinkError(base.to_string()))?
        .pop_if_empty()
        .push(route.trim_start_matches('/'));
    Ok(url)
}

/// Message asking the approver to decide, with one link per outcome.
pub fn approval_request(
    sender: &str,
    request: &LeaveRequest,
    links: &ApprovalLinks,
) -> EmailMessage {
    let mut body = String::new();
    body.push_str("<p><b>New Leave Request</b></p>\n");
    detail_row(&mut body, "Request", request.request_id.as_str());
    detail_row(&mut body, "From", &request.user_email);
    detail_row(&mut body, "Leave Type", &request.leave_type);
    detail_row(&mut body, "Start Date", &request.period.start_date.to_string());
    detail_row(&mut body, "End Date", &request.period.end_date.to_string());
    detail_row(
        &mut body,
        "Duration",
        &format!("{} days", request.period.duration_days()),
    );
    let _ = write!(
        body,
        "<p>{} &nbsp; {}</p>\n<p><a href=\"{}\">Track Leave Status</a></p>\n",
        action_button(&links.approve, "Approve", "green"),
        action_button(&links.reject, "Reject", "red"),
        escape_html(links.status.as_str()),
    );

    EmailMessage {
        from: sender.to_string(),
        to: request.approver_email.clone(),
        subject: APPROVAL_SUBJECT.to_string(),
        html_body: body,
    }
}

/// Message telling the employee how the request was decided. Carries no actionable links.
pub fn decision_outcome(
    sender: &str,
    request: &LeaveRequest,
    outcome: ApprovalOutcome,
) -> EmailMessage {
    let color = match outcome {
        ApprovalOutcome::Approved => "green",
        ApprovalOutcome::Rejected => "red",
    };

    let mut body = String::new();
    let _ = writeln!(
        body,
        "<p><b>Your leave request ({}) has been <span style=\"color: {color};\">{}</span></b></p>",
        escape_html(request.request_id.as_str()),
        outcome.label(),
    );
    detail_row(&mut body, "Leave Type", &request.leave_type);
    detail_row(&mut body, "Start Date", &request.period.start_date.to_string());
    detail_row(&mut body, "End Date", &request.period.end_date.to_string());

    EmailMessage {
        from: sender.to_string(),
        to: request.user_email.clone(),
        subject: OUTCOME_SUBJECT.to_string(),
        html_body: body,
    }
}

fn detail_row(body: &mut String, label: &str, value: &str) {
    let _ = writeln!(body, "<p><b>{label}:</b> {}</p>", escape_html(value));
}

fn action_button(href: &Url, label: &str, color: &str) -> String {
    format!(
        "<a href=\"{}\"><button style=\"background-color: {color}; color: white; border: none; \
         padding: 10px 20px; cursor: pointer;\">{label}</button></a>",
        escape_html(href.as_str()),
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
