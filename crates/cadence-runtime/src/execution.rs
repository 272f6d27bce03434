//! The recursive interpreter behind [`Runtime`](crate::Runtime).

use std::sync::{Arc, OnceLock};

use cadence_task::{FailureReason, TaskInvoker};
use cadence_workflow::{LockedFanOut, StateId, StateKind};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::items::ItemsSelector;
use crate::progress::{RunProgress, Slots};
use crate::result::{FanOutOutcome, ItemResult};
use crate::runtime::RunContext;

/// Where a state executes. Only top-level states publish progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
  TopLevel,
  Item { index: usize },
}

impl Scope {
  fn item_index(self) -> Option<usize> {
    match self {
      Self::TopLevel => None,
      Self::Item { index } => Some(index),
    }
  }
}

/// Everything an in-flight run needs, shared by its item tasks.
pub(crate) struct Execution {
  pub(crate) invoker: Arc<TaskInvoker>,
  pub(crate) notifier: Arc<dyn ExecutionNotifier>,
  pub(crate) run: RunContext,
  pub(crate) progress: Option<Arc<RunProgress>>,
}

impl Execution {
  fn notify(&self, event: ExecutionEvent) {
    self.notifier.notify(event);
  }

  /// Execute one state of the arena.
  pub(crate) fn run_state(
    self: Arc<Self>,
    state_id: StateId,
    input: serde_json::Value,
    scope: Scope,
    cancel: CancellationToken,
  ) -> BoxFuture<'static, Result<serde_json::Value, FailureReason>> {
    async move {
      let workflow = self.run.workflow.clone();
      let Some(state) = workflow.get(state_id) else {
        return Err(FailureReason::InvalidPayload {
          state: state_id.to_string(),
          message: "state not found in workflow".to_string(),
        });
      };

      let item_index = scope.item_index();
      debug!(state = %state.name, ?item_index, "state_started");
      self.notify(ExecutionEvent::StateStarted {
        run_id: self.run.run_id.clone(),
        state: state.name.clone(),
        item_index,
      });

      let result = match &state.kind {
        StateKind::Task(task) => {
          self
            .invoker
            .invoke(
              task,
              input,
              &self.run.grant,
              &self.run.run_id,
              item_index,
              &cancel,
            )
            .await
        }
        StateKind::Chain { children } => {
          self
            .clone()
            .run_chain(children, input, scope, &cancel)
            .await
        }
        StateKind::FanOut(fan_out) => {
          match ItemsSelector::parse(&state.name, &fan_out.items) {
            Ok(selector) => match selector.select(&input) {
              Ok(items) => {
                self
                  .clone()
                  .fan_out(&state.name, fan_out, items, scope, &cancel)
                  .await
                  .into_output()
              }
              Err(reason) => Err(reason),
            },
            Err(e) => Err(FailureReason::InvalidPayload {
              state: state.name.clone(),
              message: e.to_string(),
            }),
          }
        }
      };

      match &result {
        Ok(output) => {
          debug!(state = %state.name, ?item_index, "state_completed");
          self.notify(ExecutionEvent::StateCompleted {
            run_id: self.run.run_id.clone(),
            state: state.name.clone(),
            item_index,
            output: output.clone(),
          });
        }
        Err(failure) => {
          warn!(state = %state.name, ?item_index, error = %failure, "state_failed");
          self.notify(ExecutionEvent::StateFailed {
            run_id: self.run.run_id.clone(),
            state: state.name.clone(),
            item_index,
            failure: failure.clone(),
          });
        }
      }

      result
    }
    .boxed()
  }

  async fn run_chain(
    self: Arc<Self>,
    children: &[StateId],
    input: serde_json::Value,
    scope: Scope,
    cancel: &CancellationToken,
  ) -> Result<serde_json::Value, FailureReason> {
    let mut payload = input;
    for child in children {
      if cancel.is_cancelled() {
        return Err(FailureReason::Cancelled);
      }
      payload = self
        .clone()
        .run_state(*child, payload, scope, cancel.clone())
        .await?;
      if let (Scope::TopLevel, Some(progress)) = (scope, &self.progress) {
        progress.set_payload(payload.clone());
      }
    }
    Ok(payload)
  }

  /// Run the fan-out body once per element with at most
  /// `max_concurrency` item chains in flight.
  pub(crate) async fn fan_out(
    self: Arc<Self>,
    state: &str,
    fan_out: &LockedFanOut,
    items: Vec<serde_json::Value>,
    scope: Scope,
    cancel: &CancellationToken,
  ) -> FanOutOutcome {
    let item_count = items.len();
    let slots: Slots = (0..item_count).map(|_| OnceLock::new()).collect();
    if let (Scope::TopLevel, Some(progress)) = (scope, &self.progress) {
      progress.track_fan_out(state, slots.clone());
    }

    info!(
      state,
      item_count,
      max_concurrency = fan_out.max_concurrency,
      "fan_out_started"
    );

    let semaphore = Arc::new(Semaphore::new(fan_out.max_concurrency));
    let mut items_in_flight = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
      let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = semaphore.clone().acquire_owned() => permit.ok(),
      };
      let Some(permit) = permit else {
        warn!(state, admitted = index, item_count, "fan_out_admission_stopped");
        break;
      };

      let execution = self.clone();
      let slots = slots.clone();
      let cancel = cancel.clone();
      let body = fan_out.body;
      let state = state.to_string();
      items_in_flight.spawn(async move {
        // Held until the item chain finishes, admitting the next element.
        let _permit = permit;
        let outcome = execution
          .clone()
          .run_state(body, item, Scope::Item { index }, cancel)
          .await;
        let result = ItemResult::from_outcome(index, outcome);
        execution.notify(ExecutionEvent::ItemCompleted {
          run_id: execution.run.run_id.clone(),
          state,
          index,
          status: result.status,
        });
        let _ = slots[index].set(result);
      });
    }

    while let Some(joined) = items_in_flight.join_next().await {
      if let Err(e) = joined {
        error!(state, error = %e, "fan_out_item_aborted");
      }
    }

    let results: Vec<ItemResult> = slots
      .iter()
      .enumerate()
      .map(|(index, slot)| {
        slot
          .get_or_init(|| {
            if cancel.is_cancelled() {
              ItemResult::failed(index, FailureReason::Cancelled)
            } else {
              ItemResult::failed(
                index,
                FailureReason::RemoteFailure {
                  task: state.to_string(),
                  message: "item execution aborted".to_string(),
                },
              )
            }
          })
          .clone()
      })
      .collect();

    let outcome = FanOutOutcome::new(results);
    let failed = outcome.items.iter().filter(|item| item.is_failed()).count();
    info!(state, item_count, failed, status = ?outcome.status, "fan_out_completed");
    outcome
  }
}
