//! Run records and status snapshots.

use std::sync::{Arc, OnceLock};

use cadence_runtime::{FanOutReport, ItemResult, RunProgress};
use cadence_task::FailureReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Observable phase of a run. A run is `Running` from the moment `start`
/// returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
  Running,
  Succeeded,
  Failed,
}

impl RunPhase {
  pub fn is_terminal(self) -> bool {
    !matches!(self, Self::Running)
  }
}

/// Snapshot of a run as reported by [`WorkflowEngine::status`](crate::WorkflowEngine::status).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
  pub run_id: String,
  pub workflow_id: String,
  pub phase: RunPhase,
  /// Output of the latest completed top-level state (the final output once
  /// succeeded).
  pub payload: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failure: Option<FailureReason>,
  /// Per-item results of the most recent top-level fan-out.
  pub per_item_results: Vec<ItemResult>,
  /// Every top-level fan-out in start order.
  pub fan_outs: Vec<FanOutReport>,
  pub started_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
}

pub(crate) struct RunRecord {
  pub(crate) run_id: String,
  pub(crate) workflow_id: String,
  pub(crate) started_at: DateTime<Utc>,
  pub(crate) progress: Arc<RunProgress>,
  pub(crate) cancel: CancellationToken,
  terminal: OnceLock<RunStatus>,
  done: watch::Sender<bool>,
}

impl RunRecord {
  pub(crate) fn new(
    run_id: String,
    workflow_id: String,
    input: serde_json::Value,
    cancel: CancellationToken,
  ) -> Self {
    let (done, _) = watch::channel(false);
    Self {
      run_id,
      workflow_id,
      started_at: Utc::now(),
      progress: Arc::new(RunProgress::new(input)),
      cancel,
      terminal: OnceLock::new(),
      done,
    }
  }

  fn snapshot(&self, phase: RunPhase, failure: Option<FailureReason>) -> RunStatus {
    let fan_outs = self.progress.fan_outs();
    let per_item_results = fan_outs
      .last()
      .map(|report| report.results.clone())
      .unwrap_or_default();
    RunStatus {
      run_id: self.run_id.clone(),
      workflow_id: self.workflow_id.clone(),
      phase,
      payload: self.progress.payload(),
      failure,
      per_item_results,
      fan_outs,
      started_at: self.started_at,
      completed_at: phase.is_terminal().then(Utc::now),
    }
  }

  /// Current status. Frozen once the run is terminal.
  pub(crate) fn status(&self) -> RunStatus {
    match self.terminal.get() {
      Some(status) => status.clone(),
      None => self.snapshot(RunPhase::Running, None),
    }
  }

  pub(crate) fn is_terminal(&self) -> bool {
    self.terminal.get().is_some()
  }

  /// Record the terminal outcome and wake waiters. Only the first call has
  /// any effect.
  pub(crate) fn finish(&self, result: Result<serde_json::Value, FailureReason>) -> &RunStatus {
    let status = self.terminal.get_or_init(|| match result {
      Ok(_) => self.snapshot(RunPhase::Succeeded, None),
      Err(failure) => {
        // A cancelled run reports the cancellation, whatever item failure
        // surfaced first.
        let failure = if self.cancel.is_cancelled() {
          FailureReason::Cancelled
        } else {
          failure
        };
        self.snapshot(RunPhase::Failed, Some(failure))
      }
    });
    self.done.send_replace(true);
    status
  }

  pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
    self.done.subscribe()
  }
}
