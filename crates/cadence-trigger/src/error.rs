/// Error type for schedule and trigger operations.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
  #[error("invalid cron expression '{expression}': {message}")]
  InvalidCron { expression: String, message: String },

  #[error("schedule rule '{rule}' names unknown dead-letter sink '{sink}'")]
  UnknownSink { rule: String, sink: String },

  #[error("schedule rule name must not be empty")]
  MissingRuleName,

  #[error("duplicate schedule rule '{0}'")]
  DuplicateRule(String),

  #[error("schedule rule '{rule}' has no target workflow")]
  MissingTarget { rule: String },
}
