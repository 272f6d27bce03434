//! Execution events and notifiers for observability.
//!
//! Events are emitted while a run executes so consumers can observe
//! progress, persist it, stream it, etc.

use cadence_task::FailureReason;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::result::ItemStatus;

/// Events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// A run has started.
  RunStarted { run_id: String, workflow_id: String },

  /// A state has started executing.
  StateStarted {
    run_id: String,
    state: String,
    item_index: Option<usize>,
  },

  /// A state completed successfully.
  StateCompleted {
    run_id: String,
    state: String,
    item_index: Option<usize>,
    output: serde_json::Value,
  },

  /// A state failed.
  StateFailed {
    run_id: String,
    state: String,
    item_index: Option<usize>,
    failure: FailureReason,
  },

  /// One fan-out element reached its outcome.
  ItemCompleted {
    run_id: String,
    state: String,
    index: usize,
    status: ItemStatus,
  },

  /// The run succeeded.
  RunSucceeded { run_id: String },

  /// The run failed.
  RunFailed {
    run_id: String,
    failure: FailureReason,
  },
}

/// Trait for receiving execution events.
///
/// The runtime calls `notify` for each event; implementations decide what to
/// do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a run. Volume is a handful of
  // events per state.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
