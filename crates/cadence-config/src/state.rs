use serde::{Deserialize, Serialize};

use crate::task::TaskDef;

/// A node of the workflow state tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateDef {
  /// Invoke a single task.
  Task(TaskDef),

  /// Run child states in order, feeding each output into the next input.
  Chain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    states: Vec<StateDef>,
  },

  /// Run `body` once per element of a list selected from the input payload.
  FanOut(FanOutDef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutDef {
  pub name: String,

  /// Expression selecting the list to fan out over, e.g. "$.member_list".
  pub items: String,

  /// Kept signed so that zero and negative values survive parsing and are
  /// reported by validation instead of by serde.
  pub max_concurrency: i64,

  /// The item chain.
  pub body: Vec<StateDef>,
}

impl StateDef {
  /// Convenience constructor for a task state.
  pub fn task(name: impl Into<String>, timeout_ms: u64) -> Self {
    Self::Task(TaskDef {
      name: name.into(),
      timeout_ms,
      retry: None,
    })
  }

  /// Convenience constructor for a fan-out state.
  pub fn fan_out(
    name: impl Into<String>,
    items: impl Into<String>,
    max_concurrency: i64,
    body: Vec<StateDef>,
  ) -> Self {
    Self::FanOut(FanOutDef {
      name: name.into(),
      items: items.into(),
      max_concurrency,
      body,
    })
  }
}
