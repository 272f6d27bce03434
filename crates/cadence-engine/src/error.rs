//! Engine error types.

use cadence_runtime::RuntimeError;
use cadence_workflow::WorkflowError;

/// Errors returned by [`WorkflowEngine`](crate::WorkflowEngine).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// No workflow is registered under this id.
  #[error("unknown workflow '{workflow_id}'")]
  UnknownWorkflow { workflow_id: String },

  /// The engine is shutting down and accepts no new runs.
  #[error("engine is shutting down")]
  ShuttingDown,

  /// `max_active_runs` runs are already executing.
  #[error("engine at capacity ({limit} active runs)")]
  AtCapacity { limit: usize },

  #[error("run '{run_id}' not found")]
  RunNotFound { run_id: String },

  /// A workflow references a task with no registered handler.
  #[error("workflow '{workflow_id}' references unregistered task '{task}'")]
  MissingHandler { workflow_id: String, task: String },

  /// A workflow failed load-time validation.
  #[error("invalid workflow '{workflow_id}': {source}")]
  InvalidWorkflow {
    workflow_id: String,
    #[source]
    source: RuntimeError,
  },

  /// A definition could not be locked.
  #[error(transparent)]
  Definition(#[from] WorkflowError),
}

/// Why a start request could not be handed to the engine.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
  /// The inbox is gone (engine stopped or never started).
  #[error("engine inbox unreachable")]
  Unreachable,

  /// The inbox did not accept or answer within the delivery timeout.
  #[error("delivery timed out after {timeout_ms}ms")]
  TimedOut { timeout_ms: u64 },

  /// The engine received the request and refused it.
  #[error("start request rejected: {0}")]
  Rejected(#[source] EngineError),
}
