use std::time::Duration;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// Upper bound on concurrently running runs. `None` means unbounded.
  pub max_active_runs: Option<usize>,
  /// Capacity of the start-request inbox channel.
  pub inbox_buffer: usize,
  /// How long a [`StartRequestSender`](crate::StartRequestSender) waits for
  /// the inbox to accept a request and for the engine to reply.
  pub delivery_timeout: Duration,
  /// How many finished runs stay queryable. The oldest finished run is
  /// forgotten first; running runs are never dropped.
  pub retained_runs: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_active_runs: None,
      inbox_buffer: 100,
      delivery_timeout: Duration::from_secs(5),
      retained_runs: 1000,
    }
  }
}
