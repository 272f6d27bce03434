use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// An undeliverable trigger event as stored in a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DeadLetterEntry {
  pub entry_id: String,
  pub sink: String,
  pub rule_name: String,
  /// The trigger event exactly as the scheduler tried to deliver it.
  pub original_event: Json<serde_json::Value>,
  pub reason: String,
  pub enqueued_at: DateTime<Utc>,
}

impl DeadLetterEntry {
  /// A new entry with a fresh id, enqueued now.
  pub fn new(
    sink: impl Into<String>,
    rule_name: impl Into<String>,
    original_event: serde_json::Value,
    reason: impl Into<String>,
  ) -> Self {
    Self {
      entry_id: uuid::Uuid::new_v4().to_string(),
      sink: sink.into(),
      rule_name: rule_name.into(),
      original_event: Json(original_event),
      reason: reason.into(),
      enqueued_at: Utc::now(),
    }
  }
}
