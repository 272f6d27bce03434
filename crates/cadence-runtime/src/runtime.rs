//! Workflow runtime.
//!
//! The [`Runtime`] is the entry point for executing locked workflows. It owns
//! the task invoker and an execution notifier, and provides
//! `invoke(run, input, progress, cancel)` to execute a whole run.

use std::sync::Arc;

use cadence_task::{FailureReason, Grant, TaskInvoker};
use cadence_workflow::{StateId, StateKind, Workflow};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::error::RuntimeError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::execution::{Execution, Scope};
use crate::progress::RunProgress;
use crate::result::FanOutOutcome;

/// Identity and capability of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
  pub run_id: String,
  pub workflow: Arc<Workflow>,
  pub grant: Arc<Grant>,
}

impl RunContext {
  pub fn new(run_id: impl Into<String>, workflow: Arc<Workflow>, grant: Arc<Grant>) -> Self {
    Self {
      run_id: run_id.into(),
      workflow,
      grant,
    }
  }
}

/// The workflow runtime.
pub struct Runtime {
  invoker: Arc<TaskInvoker>,
  notifier: Arc<dyn ExecutionNotifier>,
}

impl Runtime {
  pub fn new(invoker: Arc<TaskInvoker>) -> Self {
    Self::with_notifier(invoker, Arc::new(NoopNotifier))
  }

  pub fn with_notifier(invoker: Arc<TaskInvoker>, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    Self { invoker, notifier }
  }

  pub fn invoker(&self) -> &TaskInvoker {
    &self.invoker
  }

  fn execution(&self, run: RunContext, progress: Option<Arc<RunProgress>>) -> Arc<Execution> {
    Arc::new(Execution {
      invoker: self.invoker.clone(),
      notifier: self.notifier.clone(),
      run,
      progress,
    })
  }

  /// Execute the workflow's root chain with `input`.
  ///
  /// The current payload and top-level fan-out slots are published to
  /// `progress` as the run advances.
  #[instrument(
    name = "runtime_invoke",
    skip(self, run, input, progress, cancel),
    fields(
      run_id = %run.run_id,
      workflow_id = %run.workflow.workflow_id,
    )
  )]
  pub async fn invoke(
    &self,
    run: RunContext,
    input: serde_json::Value,
    progress: Arc<RunProgress>,
    cancel: CancellationToken,
  ) -> Result<serde_json::Value, FailureReason> {
    let run_id = run.run_id.clone();
    let root = run.workflow.root;

    info!(input = %input, "run_started");
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run_id.clone(),
      workflow_id: run.workflow.workflow_id.clone(),
    });

    let result = self
      .execution(run, Some(progress))
      .run_state(root, input, Scope::TopLevel, cancel)
      .await;

    match &result {
      Ok(output) => {
        info!(output = %output, "run_succeeded");
        self.notifier.notify(ExecutionEvent::RunSucceeded { run_id });
      }
      Err(failure) => {
        error!(error = %failure, "run_failed");
        self.notifier.notify(ExecutionEvent::RunFailed {
          run_id,
          failure: failure.clone(),
        });
      }
    }

    result
  }

  /// Execute a single state in isolation.
  ///
  /// Useful for debugging one chain or task without running the whole
  /// workflow. Nothing is published as progress.
  #[instrument(
    name = "runtime_invoke_state",
    skip(self, run, input, cancel),
    fields(run_id = %run.run_id, state_id = %state_id)
  )]
  pub async fn invoke_state(
    &self,
    run: RunContext,
    state_id: StateId,
    input: serde_json::Value,
    cancel: CancellationToken,
  ) -> Result<serde_json::Value, RuntimeError> {
    if run.workflow.get(state_id).is_none() {
      return Err(RuntimeError::StateNotFound {
        workflow_id: run.workflow.workflow_id.clone(),
        state_id,
      });
    }

    let output = self
      .execution(run, None)
      .run_state(state_id, input, Scope::TopLevel, cancel)
      .await?;
    Ok(output)
  }

  /// Run a fan-out stage over an explicit list of elements, bypassing its
  /// items expression.
  #[instrument(
    name = "runtime_run_fan_out",
    skip(self, run, items, cancel),
    fields(run_id = %run.run_id, state_id = %state_id, item_count = items.len())
  )]
  pub async fn run_fan_out(
    &self,
    run: RunContext,
    state_id: StateId,
    items: Vec<serde_json::Value>,
    cancel: CancellationToken,
  ) -> Result<FanOutOutcome, RuntimeError> {
    let workflow = run.workflow.clone();
    let state = workflow
      .get(state_id)
      .ok_or_else(|| RuntimeError::StateNotFound {
        workflow_id: workflow.workflow_id.clone(),
        state_id,
      })?;
    let StateKind::FanOut(fan_out) = &state.kind else {
      return Err(RuntimeError::NotAFanOut {
        state: state.name.clone(),
      });
    };

    Ok(
      self
        .execution(run, None)
        .fan_out(&state.name, fan_out, items, Scope::TopLevel, &cancel)
        .await,
    )
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use async_trait::async_trait;
  use cadence_config::{StateDef, WorkflowDef};
  use cadence_task::{
    FailureKind, InvocationContext, TaskError, TaskHandler, TaskRegistry,
  };
  use serde_json::json;
  use tokio::sync::mpsc;

  use super::*;
  use crate::events::ChannelNotifier;
  use crate::result::ItemStatus;

  /// Appends its task name to `input.trail`.
  struct Trail;

  #[async_trait]
  impl TaskHandler for Trail {
    async fn call(
      &self,
      ctx: &InvocationContext,
      mut input: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError> {
      let trail = input
        .get_mut("trail")
        .and_then(|t| t.as_array_mut())
        .ok_or_else(|| TaskError::invalid_input("missing trail"))?;
      trail.push(json!(ctx.task));
      Ok(input)
    }
  }

  struct Failing;

  #[async_trait]
  impl TaskHandler for Failing {
    async fn call(
      &self,
      _ctx: &InvocationContext,
      _input: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError> {
      Err(TaskError::remote("unavailable"))
    }
  }

  #[derive(Default)]
  struct Counting(AtomicUsize);

  #[async_trait]
  impl TaskHandler for Counting {
    async fn call(
      &self,
      _ctx: &InvocationContext,
      input: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError> {
      self.0.fetch_add(1, Ordering::SeqCst);
      Ok(input)
    }
  }

  /// Tracks how many items are in flight; fails items equal to "bad".
  #[derive(Default)]
  struct Gauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<usize>>,
  }

  #[async_trait]
  impl TaskHandler for Gauge {
    async fn call(
      &self,
      ctx: &InvocationContext,
      input: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError> {
      let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak.fetch_max(now, Ordering::SeqCst);
      if let Some(index) = ctx.item_index {
        self.started.lock().unwrap().push(index);
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
      self.in_flight.fetch_sub(1, Ordering::SeqCst);
      if input == json!("bad") {
        return Err(TaskError::remote("bad item"));
      }
      Ok(json!({ "item": input }))
    }
  }

  struct Stuck;

  #[async_trait]
  impl TaskHandler for Stuck {
    async fn call(
      &self,
      _ctx: &InvocationContext,
      input: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError> {
      tokio::time::sleep(Duration::from_secs(3600)).await;
      Ok(input)
    }
  }

  fn workflow(states: Vec<StateDef>) -> Arc<Workflow> {
    Arc::new(
      Workflow::lock(&WorkflowDef {
        workflow_id: "wf".to_string(),
        name: "Test".to_string(),
        states,
      })
      .unwrap(),
    )
  }

  fn runtime(handlers: Vec<(&str, Arc<dyn TaskHandler>)>) -> Runtime {
    let mut registry = TaskRegistry::new();
    for (name, handler) in handlers {
      registry.register(name, handler);
    }
    Runtime::new(Arc::new(TaskInvoker::new(registry)))
  }

  fn run(workflow: &Arc<Workflow>) -> RunContext {
    RunContext::new("run-1", workflow.clone(), Arc::new(Grant::Unrestricted))
  }

  fn fan_out_id(workflow: &Workflow) -> StateId {
    workflow.fan_outs().next().unwrap().0.state_id
  }

  #[tokio::test]
  async fn test_chain_feeds_outputs_forward() {
    let wf = workflow(vec![StateDef::task("A", 1000), StateDef::task("B", 1000)]);
    let rt = runtime(vec![("A", Arc::new(Trail)), ("B", Arc::new(Trail))]);
    let progress = Arc::new(RunProgress::new(json!({ "trail": [] })));

    let output = rt
      .invoke(run(&wf), json!({ "trail": [] }), progress.clone(), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(output, json!({ "trail": ["A", "B"] }));
    assert_eq!(progress.payload(), output);
  }

  #[tokio::test]
  async fn test_chain_fails_fast() {
    let later = Arc::new(Counting::default());
    let wf = workflow(vec![StateDef::task("A", 1000), StateDef::task("B", 1000)]);
    let rt = runtime(vec![("A", Arc::new(Failing)), ("B", later.clone())]);

    let err = rt
      .invoke(
        run(&wf),
        json!({}),
        Arc::new(RunProgress::new(json!({}))),
        CancellationToken::new(),
      )
      .await
      .unwrap_err();

    assert_eq!(err.kind(), FailureKind::RemoteFailure);
    assert_eq!(later.0.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_empty_chain_returns_input() {
    let wf = workflow(Vec::new());
    let rt = runtime(Vec::new());
    let output = rt
      .invoke_state(run(&wf), wf.root, json!({ "x": 1 }), CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(output, json!({ "x": 1 }));
  }

  #[tokio::test]
  async fn test_invoke_state_unknown_id() {
    let wf = workflow(Vec::new());
    let rt = runtime(Vec::new());
    let err = rt
      .invoke_state(run(&wf), StateId(99), json!(null), CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(err, RuntimeError::StateNotFound { .. }));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_fan_out_respects_ceiling() {
    let gauge = Arc::new(Gauge::default());
    let wf = workflow(vec![StateDef::fan_out(
      "Map",
      "$",
      2,
      vec![StateDef::task("Gauge", 1000)],
    )]);
    let rt = runtime(vec![("Gauge", gauge.clone())]);
    let items: Vec<_> = (0..8).map(|i| json!(i)).collect();

    let outcome = rt
      .run_fan_out(run(&wf), fan_out_id(&wf), items, CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(outcome.status, ItemStatus::Succeeded);
    assert_eq!(outcome.items.len(), 8);
    for (i, item) in outcome.items.iter().enumerate() {
      assert_eq!(item.index, i);
      assert_eq!(item.output, Some(json!({ "item": i })));
    }
    assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_fan_out_single_permit_is_sequential() {
    let gauge = Arc::new(Gauge::default());
    let wf = workflow(vec![StateDef::fan_out(
      "Map",
      "$",
      1,
      vec![StateDef::task("Gauge", 1000)],
    )]);
    let rt = runtime(vec![("Gauge", gauge.clone())]);
    let items: Vec<_> = (0..5).map(|i| json!(i)).collect();

    rt.run_fan_out(run(&wf), fan_out_id(&wf), items, CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    assert_eq!(*gauge.started.lock().unwrap(), vec![0, 1, 2, 3, 4]);
  }

  #[tokio::test]
  async fn test_fan_out_empty_items() {
    let wf = workflow(vec![StateDef::fan_out(
      "Map",
      "member_list",
      1,
      vec![StateDef::task("Gauge", 1000)],
    )]);
    let rt = runtime(vec![("Gauge", Arc::new(Gauge::default()))]);
    let progress = Arc::new(RunProgress::new(json!({ "member_list": [] })));

    let output = rt
      .invoke(run(&wf), json!({ "member_list": [] }), progress.clone(), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(output, json!([]));
    let reports = progress.fan_outs();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].item_count, 0);
    assert!(reports[0].results.is_empty());
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_fan_out_isolates_item_failures() {
    let wf = workflow(vec![StateDef::fan_out(
      "Map",
      "member_list",
      2,
      vec![StateDef::task("Gauge", 1000)],
    )]);
    let rt = runtime(vec![("Gauge", Arc::new(Gauge::default()))]);
    let input = json!({ "member_list": ["a", "bad", "c"] });
    let progress = Arc::new(RunProgress::new(input.clone()));

    let err = rt
      .invoke(run(&wf), input, progress.clone(), CancellationToken::new())
      .await
      .unwrap_err();

    assert_eq!(err.kind(), FailureKind::RemoteFailure);
    let results = &progress.fan_outs()[0].results;
    let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
    assert_eq!(
      statuses,
      vec![ItemStatus::Succeeded, ItemStatus::Failed, ItemStatus::Succeeded]
    );
    assert_eq!(results[2].output, Some(json!({ "item": "c" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_stops_admission() {
    let wf = workflow(vec![StateDef::fan_out(
      "Map",
      "$",
      1,
      vec![StateDef::task("Stuck", 7_200_000)],
    )]);
    let rt = runtime(vec![("Stuck", Arc::new(Stuck))]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      trigger.cancel();
    });

    let outcome = rt
      .run_fan_out(run(&wf), fan_out_id(&wf), vec![json!(0), json!(1), json!(2)], cancel)
      .await
      .unwrap();

    assert_eq!(outcome.status, ItemStatus::Failed);
    assert_eq!(outcome.items.len(), 3);
    for item in &outcome.items {
      assert_eq!(item.failure, Some(FailureReason::Cancelled));
    }
  }

  #[tokio::test]
  async fn test_non_list_items_fail_stage() {
    let wf = workflow(vec![StateDef::fan_out(
      "Map",
      "member_list",
      1,
      vec![StateDef::task("Gauge", 1000)],
    )]);
    let rt = runtime(vec![("Gauge", Arc::new(Gauge::default()))]);
    let err = rt
      .invoke(
        run(&wf),
        json!({ "member_list": { "not": "a list" } }),
        Arc::new(RunProgress::new(json!({}))),
        CancellationToken::new(),
      )
      .await
      .unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidPayload);
  }

  #[tokio::test]
  async fn test_grant_is_enforced() {
    let wf = workflow(vec![StateDef::task("A", 1000)]);
    let rt = runtime(vec![("A", Arc::new(Counting::default()))]);
    let ctx = RunContext::new("run-1", wf.clone(), Arc::new(Grant::tasks(["B"])));
    let err = rt
      .invoke(ctx, json!({}), Arc::new(RunProgress::new(json!({}))), CancellationToken::new())
      .await
      .unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvocationRejected);
  }

  #[tokio::test]
  async fn test_notifier_sees_run_lifecycle() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut registry = TaskRegistry::new();
    registry.register("A", Arc::new(Counting::default()));
    let rt = Runtime::with_notifier(
      Arc::new(TaskInvoker::new(registry)),
      Arc::new(ChannelNotifier::new(tx)),
    );
    let wf = workflow(vec![StateDef::task("A", 1000)]);

    rt.invoke(run(&wf), json!({}), Arc::new(RunProgress::new(json!({}))), CancellationToken::new())
      .await
      .unwrap();
    drop(rt);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
      events.push(event);
    }
    assert!(matches!(events.first(), Some(ExecutionEvent::RunStarted { .. })));
    assert!(matches!(events.last(), Some(ExecutionEvent::RunSucceeded { .. })));
    assert!(events.iter().any(|e| matches!(
      e,
      ExecutionEvent::StateCompleted { state, .. } if state == "A"
    )));
  }
}
