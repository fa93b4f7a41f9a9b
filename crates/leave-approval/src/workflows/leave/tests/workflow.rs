use super::common::*;
use crate::workflows::leave::domain::{LeaveStatus, RequestId};
use crate::workflows::leave::engine::{EngineError, ExecutionId, WorkflowState};
use crate::workflows::leave::resolution::{ResolutionError, ResolutionParams};
use crate::workflows::leave::{OUTCOME_SUBJECT, STATUS_ROUTE};
use url::Url;

fn follow(link: &Url) -> ResolutionParams {
    ResolutionParams {
        request_id: query_value(link, "requestId"),
        action: query_value(link, "action"),
        task_token: query_value(link, "taskToken"),
    }
}

fn submit(harness: &Harness) -> (RequestId, ExecutionId) {
    let receipt = harness
        .api
        .intake()
        .submit(Some(&bearer()), submission(), Some(base_url()))
        .expect("submission accepted");
    (receipt.request_id, receipt.execution_id)
}

fn state(harness: &Harness, id: &ExecutionId) -> WorkflowState {
    harness
        .engine
        .snapshot(id)
        .expect("snapshot readable")
        .expect("instance exists")
        .state
}

#[test]
fn approval_round_trip_notifies_each_party_once() {
    let mut harness = harness();
    let (request_id, execution_id) = submit(&harness);

    assert!(
        harness.outbox.messages().is_empty(),
        "intake itself sends nothing"
    );
    harness.driver.run_pending();
    assert_eq!(state(&harness, &execution_id), WorkflowState::AwaitingDecision);

    let approver_mail = harness.outbox.sent_to("approver@example.com");
    assert_eq!(approver_mail.len(), 1);
    assert_eq!(approver_mail[0].from, SENDER);
    let (approve, reject) = decision_links(&harness.outbox);
    assert_eq!(
        query_value(&approve, "taskToken"),
        query_value(&reject, "taskToken")
    );
    assert_eq!(
        query_value(&approve, "requestId").as_deref(),
        Some(request_id.as_str())
    );
    let status_link = links_in(&approver_mail[0].html_body)
        .into_iter()
        .find(|url| url.path().ends_with(STATUS_ROUTE))
        .expect("status link present");
    assert!(query_value(&status_link, "taskToken").is_none());

    let receipt = harness
        .api
        .resolution()
        .resolve(follow(&approve))
        .expect("approval accepted");
    assert_eq!(receipt.message(), format!("Leave request {request_id} approved"));
    assert_eq!(receipt.execution_id, execution_id);

    harness.driver.run_pending();
    assert_eq!(state(&harness, &execution_id), WorkflowState::Completed);
    assert_eq!(harness.store.record(&request_id).status, LeaveStatus::Approved);

    let employee_mail = harness.outbox.sent_to("user@example.com");
    assert_eq!(employee_mail.len(), 1);
    assert_eq!(employee_mail[0].subject, OUTCOME_SUBJECT);
    assert!(employee_mail[0].html_body.contains("APPROVED"));
}

#[test]
fn duplicate_click_sends_no_second_outcome() {
    let mut harness = harness();
    let (request_id, _) = submit(&harness);
    harness.driver.run_pending();
    let (approve, _) = decision_links(&harness.outbox);

    harness
        .api
        .resolution()
        .resolve(follow(&approve))
        .expect("first click accepted");
    let second = harness.api.resolution().resolve(follow(&approve));
    harness.driver.run_pending();
    let third = harness.api.resolution().resolve(follow(&approve));
    harness.driver.run_pending();

    for attempt in [second, third] {
        assert!(matches!(
            attempt,
            Err(ResolutionError::Engine(EngineError::InvalidHandle))
        ));
    }
    assert_eq!(harness.outbox.sent_to("user@example.com").len(), 1);
    assert_eq!(harness.store.record(&request_id).status, LeaveStatus::Approved);
}

#[test]
fn reject_then_approve_keeps_the_rejection() {
    let mut harness = harness();
    let (request_id, execution_id) = submit(&harness);
    harness.driver.run_pending();
    let (approve, reject) = decision_links(&harness.outbox);

    let receipt = harness
        .api
        .resolution()
        .resolve(follow(&reject))
        .expect("rejection accepted");
    assert_eq!(receipt.message(), format!("Leave request {request_id} rejected"));
    assert!(harness.api.resolution().resolve(follow(&approve)).is_err());
    harness.driver.run_pending();

    assert_eq!(state(&harness, &execution_id), WorkflowState::Completed);
    assert_eq!(harness.store.record(&request_id).status, LeaveStatus::Rejected);
    let employee_mail = harness.outbox.sent_to("user@example.com");
    assert_eq!(employee_mail.len(), 1);
    assert!(employee_mail[0].html_body.contains("REJECTED"));
}

#[test]
fn tampered_action_falls_back_to_rejection() {
    let mut harness = harness();
    let (request_id, _) = submit(&harness);
    harness.driver.run_pending();
    let (approve, _) = decision_links(&harness.outbox);

    let mut params = follow(&approve);
    params.action = Some("APPROVE".to_string());
    harness
        .api
        .resolution()
        .resolve(params)
        .expect("decision accepted");
    harness.driver.run_pending();

    assert_eq!(harness.store.record(&request_id).status, LeaveStatus::Rejected);
}

#[test]
fn undeliverable_approval_request_fails_the_workflow() {
    let mut harness = harness_with(MemoryOutbox::failing(10), 3);
    let (request_id, execution_id) = submit(&harness);
    harness.driver.run_pending();

    let snapshot = harness
        .engine
        .snapshot(&execution_id)
        .expect("snapshot readable")
        .expect("instance exists");
    assert_eq!(snapshot.state, WorkflowState::Failed);
    assert!(!snapshot.suspended);
    assert!(harness.outbox.messages().is_empty());
    assert_eq!(harness.store.record(&request_id).status, LeaveStatus::Pending);
}

#[test]
fn transient_delivery_failure_is_redelivered_by_the_engine() {
    let mut harness = harness_with(MemoryOutbox::failing(1), 2);
    let (_, execution_id) = submit(&harness);
    harness.driver.run_pending();

    assert_eq!(state(&harness, &execution_id), WorkflowState::AwaitingDecision);
    assert_eq!(harness.outbox.sent_to("approver@example.com").len(), 1);
}

#[test]
fn failed_outcome_delivery_still_records_the_decision() {
    let mut harness = harness();
    let (request_id, execution_id) = submit(&harness);
    harness.driver.run_pending();
    let (approve, _) = decision_links(&harness.outbox);

    harness
        .api
        .resolution()
        .resolve(follow(&approve))
        .expect("approval accepted");
    harness.outbox.fail_next(1);
    harness.driver.run_pending();

    let snapshot = harness
        .engine
        .snapshot(&execution_id)
        .expect("snapshot readable")
        .expect("instance exists");
    assert_eq!(snapshot.state, WorkflowState::Failed);
    assert!(harness.outbox.sent_to("user@example.com").is_empty());
    assert_eq!(harness.store.record(&request_id).status, LeaveStatus::Approved);
}

#[test]
fn concurrent_requests_get_independent_handles() {
    let mut harness = harness();
    let (first, _) = submit(&harness);
    let (second, _) = submit(&harness);
    assert_ne!(first, second);
    harness.driver.run_pending();

    let approvals = harness.outbox.sent_to("approver@example.com");
    assert_eq!(approvals.len(), 2);
    let tokens: Vec<Option<String>> = approvals
        .iter()
        .map(|message| {
            links_in(&message.html_body)
                .first()
                .and_then(|link| query_value(link, "taskToken"))
        })
        .collect();
    assert!(tokens.iter().all(Option::is_some));
    assert_ne!(tokens[0], tokens[1]);
}
