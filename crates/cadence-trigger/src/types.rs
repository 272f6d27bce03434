use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event emitted when a schedule rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
  /// Unique identifier for this trigger event
  pub event_id: String,

  /// The rule that fired
  pub rule: String,

  /// Workflow the event asks the engine to start
  pub workflow_id: String,

  /// Start payload
  pub payload: serde_json::Value,

  /// The scheduled minute the rule fired for
  pub fired_at: DateTime<Utc>,
}

/// What happened to one fired event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FireOutcome {
  /// The engine accepted the request.
  Started {
    rule: String,
    event_id: String,
    run_id: String,
  },

  /// Delivery failed and the event was written to the rule's sink.
  DeadLettered {
    rule: String,
    event_id: String,
    entry_id: String,
    reason: String,
  },

  /// Delivery failed and the sink rejected the entry too.
  Lost {
    rule: String,
    event_id: String,
    reason: String,
    error: String,
  },
}
