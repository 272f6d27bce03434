//! Fan-out result types.

use cadence_task::FailureReason;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
  Succeeded,
  Failed,
}

/// Outcome of one fan-out element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
  /// Position of the element in the original list.
  pub index: usize,
  pub status: ItemStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failure: Option<FailureReason>,
}

impl ItemResult {
  pub fn succeeded(index: usize, output: serde_json::Value) -> Self {
    Self {
      index,
      status: ItemStatus::Succeeded,
      output: Some(output),
      failure: None,
    }
  }

  pub fn failed(index: usize, failure: FailureReason) -> Self {
    Self {
      index,
      status: ItemStatus::Failed,
      output: None,
      failure: Some(failure),
    }
  }

  pub(crate) fn from_outcome(index: usize, outcome: Result<serde_json::Value, FailureReason>) -> Self {
    match outcome {
      Ok(output) => Self::succeeded(index, output),
      Err(failure) => Self::failed(index, failure),
    }
  }

  pub fn is_failed(&self) -> bool {
    self.status == ItemStatus::Failed
  }
}

/// Aggregate outcome of a fan-out stage.
///
/// `items` holds exactly one entry per element, in index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutOutcome {
  pub status: ItemStatus,
  pub items: Vec<ItemResult>,
}

impl FanOutOutcome {
  pub(crate) fn new(items: Vec<ItemResult>) -> Self {
    let status = if items.iter().any(ItemResult::is_failed) {
      ItemStatus::Failed
    } else {
      ItemStatus::Succeeded
    };
    Self { status, items }
  }

  /// The failure of the lowest-index failed element.
  pub fn first_failure(&self) -> Option<&FailureReason> {
    self.items.iter().find_map(|item| item.failure.as_ref())
  }

  /// The stage output: item outputs in index order.
  ///
  /// Fails with the lowest-index failure when any element failed.
  pub fn into_output(self) -> Result<serde_json::Value, FailureReason> {
    if let Some(failure) = self.first_failure() {
      return Err(failure.clone());
    }
    Ok(serde_json::Value::Array(
      self
        .items
        .into_iter()
        .map(|item| item.output.unwrap_or(serde_json::Value::Null))
        .collect(),
    ))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_empty_outcome_succeeds() {
    let outcome = FanOutOutcome::new(Vec::new());
    assert_eq!(outcome.status, ItemStatus::Succeeded);
    assert_eq!(outcome.into_output().unwrap(), json!([]));
  }

  #[test]
  fn test_lowest_index_failure_wins() {
    let outcome = FanOutOutcome::new(vec![
      ItemResult::succeeded(0, json!("a")),
      ItemResult::failed(1, FailureReason::Cancelled),
      ItemResult::failed(
        2,
        FailureReason::RemoteFailure {
          task: "T".to_string(),
          message: "boom".to_string(),
        },
      ),
    ]);
    assert_eq!(outcome.status, ItemStatus::Failed);
    assert_eq!(outcome.into_output().unwrap_err(), FailureReason::Cancelled);
  }
}
