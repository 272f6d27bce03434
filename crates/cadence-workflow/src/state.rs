use std::fmt;
use std::time::Duration;

use cadence_config::RetryBackoff;
use serde::{Deserialize, Serialize};

/// Index of a state in the workflow arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub usize);

impl fmt::Display for StateId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// A state in the locked workflow arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
  pub state_id: StateId,
  /// Human readable name, used in logs and run reports.
  pub name: String,
  pub kind: StateKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateKind {
  Task(LockedTask),
  Chain { children: Vec<StateId> },
  FanOut(LockedFanOut),
}

/// A validated task reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedTask {
  pub name: String,
  pub timeout_ms: u64,
  pub retry: Option<RetryPolicy>,
}

impl LockedTask {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  /// Number of attempts the invoker may make, always at least one.
  pub fn max_attempts(&self) -> u32 {
    self.retry.as_ref().map_or(1, |r| r.max_attempts)
  }
}

/// A validated, explicit retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff: RetryBackoff,
  pub initial_delay_ms: u64,
}

impl RetryPolicy {
  /// Delay before retry number `retry` (1-based).
  pub fn delay_for(&self, retry: u32) -> Duration {
    let base = self.initial_delay_ms;
    let millis = match self.backoff {
      RetryBackoff::Constant => base,
      RetryBackoff::Linear => base.saturating_mul(u64::from(retry)),
      RetryBackoff::Exponential => {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        base.saturating_mul(factor)
      }
    };
    Duration::from_millis(millis)
  }
}

/// A validated fan-out stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedFanOut {
  pub items: String,
  pub max_concurrency: usize,
  /// Always a `Chain` state.
  pub body: StateId,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn policy(backoff: RetryBackoff) -> RetryPolicy {
    RetryPolicy {
      max_attempts: 4,
      backoff,
      initial_delay_ms: 100,
    }
  }

  #[test]
  fn test_backoff_delays() {
    let constant = policy(RetryBackoff::Constant);
    assert_eq!(constant.delay_for(3), Duration::from_millis(100));

    let linear = policy(RetryBackoff::Linear);
    assert_eq!(linear.delay_for(1), Duration::from_millis(100));
    assert_eq!(linear.delay_for(3), Duration::from_millis(300));

    let exponential = policy(RetryBackoff::Exponential);
    assert_eq!(exponential.delay_for(1), Duration::from_millis(100));
    assert_eq!(exponential.delay_for(2), Duration::from_millis(200));
    assert_eq!(exponential.delay_for(4), Duration::from_millis(800));
  }

  #[test]
  fn test_max_attempts_defaults_to_one() {
    let task = LockedTask {
      name: "t".to_string(),
      timeout_ms: 10,
      retry: None,
    };
    assert_eq!(task.max_attempts(), 1);
  }
}
