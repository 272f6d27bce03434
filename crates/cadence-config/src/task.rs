use serde::{Deserialize, Serialize};

use crate::enums::RetryBackoff;

/// Reference to an external unit of work.
///
/// The task carries no data beyond its identity, its timeout, and an
/// optional retry policy. The handler that implements it is looked up by
/// `name` in the task registry at invocation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
  /// Handler name, e.g. "EnsureIdentity"
  pub name: String,

  /// Per-invocation timeout in milliseconds.
  pub timeout_ms: u64,

  /// Explicit retry policy. Without one, a failed invocation is final.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry: Option<RetryPolicyDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicyDef {
  /// Total attempts including the first one.
  pub max_attempts: u32,
  #[serde(default)]
  pub backoff: RetryBackoff,
  #[serde(default)]
  pub initial_delay_ms: u64,
}
