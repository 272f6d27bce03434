//! The failure taxonomy shared by every layer of the orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::TaskError;

/// Why a task, chain, fan-out item, run or trigger delivery failed.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
  #[error("task '{task}' timed out after {timeout_ms}ms")]
  Timeout { task: String, timeout_ms: u64 },

  #[error("task '{task}' invocation rejected: {message}")]
  InvocationRejected { task: String, message: String },

  #[error("task '{task}' failed: {message}")]
  RemoteFailure { task: String, message: String },

  #[error("member directory unavailable: {message}")]
  DirectoryUnavailable { message: String },

  #[error("cancelled")]
  Cancelled,

  #[error("trigger delivery failed: {message}")]
  TriggerDeliveryFailed { message: String },

  /// The payload did not have the shape a state needed (e.g. a fan-out
  /// items expression that does not yield a list).
  #[error("invalid payload for state '{state}': {message}")]
  InvalidPayload { state: String, message: String },
}

/// Discriminant of [`FailureReason`], handy for assertions and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  Timeout,
  InvocationRejected,
  RemoteFailure,
  DirectoryUnavailable,
  Cancelled,
  TriggerDeliveryFailed,
  InvalidPayload,
}

impl FailureReason {
  pub fn kind(&self) -> FailureKind {
    match self {
      Self::Timeout { .. } => FailureKind::Timeout,
      Self::InvocationRejected { .. } => FailureKind::InvocationRejected,
      Self::RemoteFailure { .. } => FailureKind::RemoteFailure,
      Self::DirectoryUnavailable { .. } => FailureKind::DirectoryUnavailable,
      Self::Cancelled => FailureKind::Cancelled,
      Self::TriggerDeliveryFailed { .. } => FailureKind::TriggerDeliveryFailed,
      Self::InvalidPayload { .. } => FailureKind::InvalidPayload,
    }
  }

  /// Whether an explicit retry policy may re-attempt after this failure.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Timeout { .. } | Self::RemoteFailure { .. })
  }

  /// Attribute a handler error to `task`.
  pub fn from_task_error(task: &str, error: TaskError) -> Self {
    match error {
      TaskError::InvalidInput { .. } | TaskError::Rejected { .. } => Self::InvocationRejected {
        task: task.to_string(),
        message: error.to_string(),
      },
      TaskError::Remote { message } => Self::RemoteFailure {
        task: task.to_string(),
        message,
      },
      TaskError::DirectoryUnavailable { message } => Self::DirectoryUnavailable { message },
    }
  }
}
