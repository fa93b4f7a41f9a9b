//! Leave request approval with a suspend/resume task-token workflow.
//!
//! Intake stores a request and starts a workflow; the workflow e-mails the approver a pair of
//! links carrying a resume handle and parks until one of them is followed. Resolution consumes
//! the handle exactly once, records the outcome and notifies the employee.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
