//! Task invocation.

use cadence_workflow::LockedTask;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::failure::FailureReason;
use crate::grant::Grant;
use crate::registry::TaskRegistry;

/// Identity of one invocation, handed to the handler.
#[derive(Debug, Clone)]
pub struct InvocationContext {
  /// Run this invocation belongs to.
  pub run_id: String,
  /// Task being invoked.
  pub task: String,
  /// 1-based attempt number.
  pub attempt: u32,
  /// Fan-out element index, when running inside an item chain.
  pub item_index: Option<usize>,
}

/// Invokes registered task handlers.
///
/// The invoker holds no state across calls beyond the registry it was built
/// with.
#[derive(Debug, Clone)]
pub struct TaskInvoker {
  registry: TaskRegistry,
}

impl TaskInvoker {
  pub fn new(registry: TaskRegistry) -> Self {
    Self { registry }
  }

  pub fn registry(&self) -> &TaskRegistry {
    &self.registry
  }

  /// Invoke `task` with `input`.
  ///
  /// Fails with `InvocationRejected` when the grant does not permit the task
  /// or no handler is registered, `Timeout` when an attempt exceeds the task
  /// timeout, and `Cancelled` when `cancel` fires while waiting. Retries
  /// happen only under the task's explicit retry policy.
  #[instrument(
    name = "task_invoke",
    skip(self, task, input, grant, cancel),
    fields(
      run_id = %run_id,
      task = %task.name,
      item_index = ?item_index,
    )
  )]
  pub async fn invoke(
    &self,
    task: &LockedTask,
    input: serde_json::Value,
    grant: &Grant,
    run_id: &str,
    item_index: Option<usize>,
    cancel: &CancellationToken,
  ) -> Result<serde_json::Value, FailureReason> {
    if !grant.permits(&task.name) {
      warn!("task not permitted by grant");
      return Err(FailureReason::InvocationRejected {
        task: task.name.clone(),
        message: "not permitted for this run".to_string(),
      });
    }

    let Some(handler) = self.registry.get(&task.name) else {
      error!("no handler registered");
      return Err(FailureReason::InvocationRejected {
        task: task.name.clone(),
        message: "no handler registered".to_string(),
      });
    };

    let max_attempts = task.max_attempts();
    let mut attempt = 1;

    loop {
      if cancel.is_cancelled() {
        return Err(FailureReason::Cancelled);
      }

      let ctx = InvocationContext {
        run_id: run_id.to_string(),
        task: task.name.clone(),
        attempt,
        item_index,
      };

      info!(attempt, input = %input, "task_started");

      let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FailureReason::Cancelled),
        result = tokio::time::timeout(task.timeout(), handler.call(&ctx, input.clone())) => match result {
          Ok(Ok(output)) => Ok(output),
          Ok(Err(e)) => Err(FailureReason::from_task_error(&task.name, e)),
          Err(_) => Err(FailureReason::Timeout {
            task: task.name.clone(),
            timeout_ms: task.timeout_ms,
          }),
        },
      };

      let reason = match outcome {
        Ok(output) => {
          info!(attempt, output = %output, "task_completed");
          return Ok(output);
        }
        Err(reason) => reason,
      };

      if attempt >= max_attempts || !reason.is_retryable() {
        error!(attempt, error = %reason, "task_failed");
        return Err(reason);
      }

      // Only reachable with an explicit retry policy.
      let delay = task
        .retry
        .as_ref()
        .map(|policy| policy.delay_for(attempt))
        .unwrap_or_default();
      warn!(attempt, error = %reason, delay_ms = delay.as_millis() as u64, "task_retrying");

      tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FailureReason::Cancelled),
        _ = tokio::time::sleep(delay) => {}
      }
      attempt += 1;
    }
  }
}
