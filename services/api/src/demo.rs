use crate::infra::{InMemoryRequestStore, OutboxNotifier};
use clap::Args;
use leave_approval::config::ConfigError;
use leave_approval::error::AppError;
use leave_approval::workflows::leave::{
    EmailMessage, InProcessEngine, JwtAuthority, LeaveApi, LeaveApprovalWorkflow,
    LeaveSubmission, RequestStore, ResolutionParams, APPROVAL_SUBJECT,
};
use std::sync::Arc;
use url::Url;

const DEMO_SECRET: &str = "leave-approval-demo";
const DEMO_BASE_URL: &str = "http://localhost:3000/";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Decision the simulated approver clicks ("approve" or "reject")
    #[arg(long, default_value = "approve")]
    pub(crate) action: String,
    /// Leave type placed on the sample request
    #[arg(long, default_value = "Sick")]
    pub(crate) leave_type: String,
    /// Click the decision link a second time to show it is refused
    #[arg(long)]
    pub(crate) click_twice: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        action,
        leave_type,
        click_twice,
    } = args;

    let store = Arc::new(InMemoryRequestStore::default());
    let outbox = OutboxNotifier::default();
    let workflow = LeaveApprovalWorkflow::new(
        store.clone(),
        Arc::new(outbox.clone()),
        "no-reply@localhost",
    );
    let (engine, mut driver) = InProcessEngine::new(workflow, 3);
    let authority = JwtAuthority::new(DEMO_SECRET);
    let base_url =
        Url::parse(DEMO_BASE_URL).map_err(|source| ConfigError::InvalidBaseUrl { source })?;
    let api = LeaveApi::new(
        store.clone(),
        Arc::new(JwtAuthority::new(DEMO_SECRET)),
        engine.clone(),
        base_url.clone(),
    );

    println!("Leave approval demo");
    let token = authority.issue("user@example.com", chrono::Duration::minutes(5))?;
    let submission = LeaveSubmission {
        user_email: Some("user@example.com".to_string()),
        start_date: Some("2025-04-01".to_string()),
        end_date: Some("2025-04-05".to_string()),
        approver_email: Some("approver@example.com".to_string()),
        leave_type: Some(leave_type),
    };

    let receipt = match api
        .intake()
        .submit(Some(&format!("Bearer {token}")), submission, Some(base_url))
    {
        Ok(receipt) => receipt,
        Err(err) => {
            println!("1. Submission refused: {err}");
            return Ok(());
        }
    };
    println!(
        "1. Submitted {} (execution {})",
        receipt.request_id, receipt.execution_id
    );

    driver.run_pending();
    let approval_request = outbox
        .messages()
        .into_iter()
        .find(|message| message.subject == APPROVAL_SUBJECT);
    let Some(approval_request) = approval_request else {
        println!("2. No approval request was delivered; the workflow failed");
        return Ok(());
    };
    println!("2. Approval request sent to {}", approval_request.to);

    let Some(link) = decision_link(&approval_request, &action) else {
        println!("   No decision link found for action '{action}'");
        return Ok(());
    };
    println!("   Approver follows {}{}", link.path(), redacted_query(&link));

    let params = ResolutionParams {
        request_id: query_value(&link, "requestId"),
        action: Some(action.clone()),
        task_token: query_value(&link, "taskToken"),
    };
    match api.resolution().resolve(params.clone()) {
        Ok(decision) => println!("3. {}", decision.message()),
        Err(err) => println!("3. Decision refused: {err}"),
    }
    if click_twice {
        match api.resolution().resolve(params) {
            Ok(decision) => println!("   Second click accepted: {}", decision.message()),
            Err(err) => println!("   Second click refused: {err}"),
        }
    }

    driver.run_pending();
    let status = store
        .get(&receipt.request_id)
        .ok()
        .flatten()
        .map(|record| record.status.label())
        .unwrap_or("missing");
    println!("4. Stored status: {status}");
    if let Some(snapshot) = engine.snapshot(&receipt.execution_id).ok().flatten() {
        println!("   Workflow state: {:?}", snapshot.state);
    }
    for message in outbox
        .messages()
        .into_iter()
        .filter(|message| message.to == "user@example.com")
    {
        println!("5. Employee notified: \"{}\"", message.subject);
    }

    Ok(())
}

fn decision_link(message: &EmailMessage, action: &str) -> Option<Url> {
    message
        .html_body
        .split("href=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .filter_map(|href| Url::parse(&href.replace("&amp;", "&")).ok())
        .find(|url| query_value(url, "action").as_deref() == Some(action))
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

fn redacted_query(url: &Url) -> String {
    let pairs: Vec<String> = url
        .query_pairs()
        .map(|(key, value)| {
            if key == "taskToken" {
                format!("{key}=<redacted>")
            } else {
                format!("{key}={value}")
            }
        })
        .collect();
    format!("?{}", pairs.join("&"))
}
