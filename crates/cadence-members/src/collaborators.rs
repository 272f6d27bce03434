//! Interfaces to the external providers.

use async_trait::async_trait;
use cadence_task::TaskError;
use serde::{Deserialize, Serialize};

use crate::account::MemberAccount;

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
  /// The provider could not be reached.
  #[error("unavailable: {0}")]
  Unavailable(String),

  /// The provider refused the caller: bad credentials, missing permission
  /// or a misconfigured endpoint.
  #[error("rejected: {0}")]
  Rejected(String),

  /// The provider refused an address in the request, e.g. a malformed
  /// email.
  #[error("invalid address '{address}': {message}")]
  InvalidAddress { address: String, message: String },

  /// The provider accepted the request but it failed.
  #[error("failed: {0}")]
  Failed(String),
}

impl CollaboratorError {
  /// Map to a handler error. Only refusals of the caller count as
  /// rejections; bad data and provider errors are remote failures.
  pub fn into_task_error(self) -> TaskError {
    match self {
      Self::Rejected(message) => TaskError::rejected(message),
      other => TaskError::remote(other.to_string()),
    }
  }
}

/// Opaque summary data for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SummaryPayload(pub serde_json::Value);

/// Result of ensuring an email identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
  /// The identity exists and is verified; nothing was done.
  AlreadyVerified,
  /// A verification request was sent.
  VerificationRequested,
}

/// Acknowledgement of a sent email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailReceipt {
  pub message_id: String,
}

#[async_trait]
pub trait MemberDirectory: Send + Sync {
  /// All member accounts, in directory order.
  async fn fetch_members(&self) -> Result<Vec<MemberAccount>, CollaboratorError>;
}

#[async_trait]
pub trait IdentityProvisioner: Send + Sync {
  /// Make sure `email` is a verified sending identity. Idempotent.
  async fn ensure_identity(&self, email: &str) -> Result<IdentityStatus, CollaboratorError>;
}

#[async_trait]
pub trait SummaryCollector: Send + Sync {
  async fn collect_summary(&self, account_id: &str) -> Result<SummaryPayload, CollaboratorError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
  /// Send `template_name` rendered with `data` to `recipient`, copying
  /// every address in `cc`.
  async fn send_email(
    &self,
    recipient: &str,
    cc: &[String],
    template_name: &str,
    data: &SummaryPayload,
  ) -> Result<EmailReceipt, CollaboratorError>;
}
