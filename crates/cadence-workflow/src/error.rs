use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
  #[error("workflow id must not be empty")]
  MissingWorkflowId,

  #[error("task name must not be empty (at {path})")]
  MissingTaskName { path: String },

  #[error("task '{task}' must have a timeout greater than zero")]
  InvalidTimeout { task: String },

  #[error("task '{task}' retry policy needs at least one attempt")]
  InvalidRetry { task: String },

  #[error("fan-out '{state}' has max_concurrency {value}; it must be at least 1")]
  InvalidConcurrency { state: String, value: i64 },

  #[error("fan-out '{state}' has an empty items expression")]
  MissingItemsExpression { state: String },

  #[error("state id {0} is out of range")]
  StateNotFound(usize),
}
