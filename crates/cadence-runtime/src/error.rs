//! Runtime error types.

use cadence_task::FailureReason;
use cadence_workflow::StateId;

/// Errors from the runtime's entry points that address a single state.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// The state id is not part of the workflow.
  #[error("state {state_id} not found in workflow '{workflow_id}'")]
  StateNotFound {
    workflow_id: String,
    state_id: StateId,
  },

  /// `run_fan_out` was called on something other than a fan-out.
  #[error("state '{state}' is not a fan-out")]
  NotAFanOut { state: String },

  /// An items expression failed to compile.
  #[error("invalid items expression for fan-out '{state}': {message}")]
  InvalidSelector { state: String, message: String },

  /// The state ran and failed.
  #[error(transparent)]
  Failed(#[from] FailureReason),
}
