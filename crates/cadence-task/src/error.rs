use thiserror::Error;

/// Errors a [`crate::TaskHandler`] reports back to the invoker.
///
/// The invoker turns these into a [`crate::FailureReason`] tagged with the
/// task name. Each variant maps to exactly one failure kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
  /// The input payload does not have the shape the handler expects.
  #[error("invalid input: {message}")]
  InvalidInput { message: String },

  /// The collaborator refused the call (unreachable or misconfigured).
  #[error("rejected: {message}")]
  Rejected { message: String },

  /// The collaborator ran but reported a failure.
  #[error("{message}")]
  Remote { message: String },

  /// The member directory could not be read.
  #[error("directory unavailable: {message}")]
  DirectoryUnavailable { message: String },
}

impl TaskError {
  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }

  pub fn rejected(message: impl Into<String>) -> Self {
    Self::Rejected {
      message: message.into(),
    }
  }

  pub fn remote(message: impl Into<String>) -> Self {
    Self::Remote {
      message: message.into(),
    }
  }

  pub fn directory_unavailable(message: impl Into<String>) -> Self {
    Self::DirectoryUnavailable {
      message: message.into(),
    }
  }
}
