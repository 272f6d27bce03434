//! Live progress of a run, readable while it executes.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};

use crate::result::ItemResult;

/// Shared slots of one fan-out, one per element.
pub(crate) type Slots = Arc<[OnceLock<ItemResult>]>;

/// Snapshot of a top-level fan-out's per-item results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutReport {
  pub state: String,
  pub item_count: usize,
  /// Completed elements in index order. Elements still running are absent.
  pub results: Vec<ItemResult>,
}

struct TrackedFanOut {
  state: String,
  slots: Slots,
}

/// Progress published by the runtime for the engine's status queries.
pub struct RunProgress {
  payload: Mutex<serde_json::Value>,
  fan_outs: Mutex<Vec<TrackedFanOut>>,
}

impl RunProgress {
  pub fn new(input: serde_json::Value) -> Self {
    Self {
      payload: Mutex::new(input),
      fan_outs: Mutex::new(Vec::new()),
    }
  }

  /// Output of the most recently completed top-level state.
  pub fn payload(&self) -> serde_json::Value {
    self
      .payload
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub(crate) fn set_payload(&self, payload: serde_json::Value) {
    *self.payload.lock().unwrap_or_else(PoisonError::into_inner) = payload;
  }

  pub(crate) fn track_fan_out(&self, state: &str, slots: Slots) {
    self
      .fan_outs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(TrackedFanOut {
        state: state.to_string(),
        slots,
      });
  }

  /// Reports for every top-level fan-out started so far, in start order.
  pub fn fan_outs(&self) -> Vec<FanOutReport> {
    self
      .fan_outs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .map(|tracked| FanOutReport {
        state: tracked.state.clone(),
        item_count: tracked.slots.len(),
        results: tracked
          .slots
          .iter()
          .filter_map(|slot| slot.get().cloned())
          .collect(),
      })
      .collect()
  }
}

impl std::fmt::Debug for RunProgress {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RunProgress")
      .field("payload", &self.payload())
      .field("fan_outs", &self.fan_outs())
      .finish()
  }
}
