//! Workflow engine.
//!
//! The [`WorkflowEngine`] holds registered workflows and the records of every
//! run it started. Runs execute as independent tokio tasks; the engine only
//! tracks them, keeping the latest `retained_runs` finished records.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use cadence_config::WorkflowDef;
use cadence_runtime::{ExecutionNotifier, NoopNotifier, RunContext, Runtime, validate_selectors};
use cadence_task::{Grant, TaskInvoker, TaskRegistry};
use cadence_workflow::Workflow;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::run::{RunRecord, RunStatus};

struct Registered {
  workflow: Arc<Workflow>,
  grant: Arc<Grant>,
}

struct EngineInner {
  config: EngineConfig,
  runtime: Runtime,
  workflows: RwLock<HashMap<String, Registered>>,
  runs: RwLock<HashMap<String, Arc<RunRecord>>>,
  /// Finished run ids, oldest first.
  finished: Mutex<VecDeque<String>>,
  active_runs: AtomicUsize,
  shutting_down: AtomicBool,
  cancel: CancellationToken,
}

/// Accepts start requests and executes runs asynchronously.
///
/// Cheap to clone; clones share the same registrations and runs.
#[derive(Clone)]
pub struct WorkflowEngine {
  inner: Arc<EngineInner>,
}

impl WorkflowEngine {
  pub fn new(config: EngineConfig, registry: TaskRegistry) -> Self {
    Self::with_notifier(config, registry, Arc::new(NoopNotifier))
  }

  pub fn with_notifier(
    config: EngineConfig,
    registry: TaskRegistry,
    notifier: Arc<dyn ExecutionNotifier>,
  ) -> Self {
    let runtime = Runtime::with_notifier(Arc::new(TaskInvoker::new(registry)), notifier);
    Self {
      inner: Arc::new(EngineInner {
        config,
        runtime,
        workflows: RwLock::new(HashMap::new()),
        runs: RwLock::new(HashMap::new()),
        finished: Mutex::new(VecDeque::new()),
        active_runs: AtomicUsize::new(0),
        shutting_down: AtomicBool::new(false),
        cancel: CancellationToken::new(),
      }),
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.inner.config
  }

  /// Register a workflow. Its runs may invoke exactly the tasks it
  /// references.
  pub fn register(&self, workflow: Workflow) -> Result<(), EngineError> {
    let grant = Grant::tasks(workflow.task_names());
    self.register_with_grant(workflow, grant)
  }

  /// Register a workflow whose runs carry `grant`.
  ///
  /// Fails if a task has no handler or an items expression does not
  /// compile. Re-registering an id replaces the previous workflow for new
  /// runs.
  pub fn register_with_grant(&self, workflow: Workflow, grant: Grant) -> Result<(), EngineError> {
    let invoker = self.inner.runtime.invoker();
    if let Some(task) = workflow
      .task_names()
      .into_iter()
      .find(|task| !invoker.registry().contains(task))
    {
      return Err(EngineError::MissingHandler {
        workflow_id: workflow.workflow_id.clone(),
        task: task.to_string(),
      });
    }

    validate_selectors(&workflow).map_err(|source| EngineError::InvalidWorkflow {
      workflow_id: workflow.workflow_id.clone(),
      source,
    })?;

    info!(
      workflow_id = %workflow.workflow_id,
      workflow_name = %workflow.name,
      states = workflow.states.len(),
      "workflow_registered"
    );

    let workflow_id = workflow.workflow_id.clone();
    self
      .inner
      .workflows
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(
        workflow_id,
        Registered {
          workflow: Arc::new(workflow),
          grant: Arc::new(grant),
        },
      );
    Ok(())
  }

  /// Lock a definition and register it.
  pub fn register_definition(&self, def: &WorkflowDef) -> Result<(), EngineError> {
    self.register(Workflow::lock(def)?)
  }

  /// Ids of all registered workflows, sorted.
  pub fn workflows(&self) -> Vec<String> {
    let mut ids: Vec<String> = self
      .inner
      .workflows
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .keys()
      .cloned()
      .collect();
    ids.sort();
    ids
  }

  /// Start a run and return its id without waiting for it.
  ///
  /// Must be called from within a Tokio runtime.
  pub fn start(&self, workflow_id: &str, input: serde_json::Value) -> Result<String, EngineError> {
    if self.inner.shutting_down.load(Ordering::SeqCst) {
      return Err(EngineError::ShuttingDown);
    }

    let (workflow, grant) = {
      let workflows = self
        .inner
        .workflows
        .read()
        .unwrap_or_else(PoisonError::into_inner);
      let registered = workflows
        .get(workflow_id)
        .ok_or_else(|| EngineError::UnknownWorkflow {
          workflow_id: workflow_id.to_string(),
        })?;
      (registered.workflow.clone(), registered.grant.clone())
    };

    self.reserve_slot()?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let record = Arc::new(RunRecord::new(
      run_id.clone(),
      workflow_id.to_string(),
      input.clone(),
      self.inner.cancel.child_token(),
    ));
    self
      .inner
      .runs
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(run_id.clone(), record.clone());

    info!(run_id = %run_id, workflow_id = %workflow_id, "run_accepted");

    let inner = self.inner.clone();
    let span = info_span!("run", run_id = %run_id, workflow_id = %workflow_id);
    tokio::spawn(
      async move {
        let run = RunContext::new(record.run_id.clone(), workflow, grant);
        let result = inner
          .runtime
          .invoke(run, input, record.progress.clone(), record.cancel.clone())
          .await;
        // Free the slot and evict old records before waking waiters.
        inner.active_runs.fetch_sub(1, Ordering::SeqCst);
        inner.retire(&record.run_id);
        let status = record.finish(result);
        info!(phase = ?status.phase, "run_finished");
      }
      .instrument(span),
    );

    Ok(run_id)
  }

  fn reserve_slot(&self) -> Result<(), EngineError> {
    let limit = self.inner.config.max_active_runs;
    self
      .inner
      .active_runs
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| match limit {
        Some(limit) if active >= limit => None,
        _ => Some(active + 1),
      })
      .map(|_| ())
      .map_err(|_| EngineError::AtCapacity {
        limit: limit.unwrap_or_default(),
      })
  }

  fn record(&self, run_id: &str) -> Result<Arc<RunRecord>, EngineError> {
    self
      .inner
      .runs
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(run_id)
      .cloned()
      .ok_or_else(|| EngineError::RunNotFound {
        run_id: run_id.to_string(),
      })
  }

  /// Current status of a run. Identical on every call once terminal.
  pub fn status(&self, run_id: &str) -> Result<RunStatus, EngineError> {
    Ok(self.record(run_id)?.status())
  }

  /// Statuses of every known run.
  pub fn runs(&self) -> Vec<RunStatus> {
    self
      .inner
      .runs
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .map(|record| record.status())
      .collect()
  }

  /// Number of runs that have not reached a terminal phase.
  pub fn active_runs(&self) -> usize {
    self.inner.active_runs.load(Ordering::SeqCst)
  }

  /// Request cancellation. The run fails with `Cancelled` unless it already
  /// finished.
  pub fn cancel(&self, run_id: &str) -> Result<(), EngineError> {
    let record = self.record(run_id)?;
    if !record.is_terminal() {
      warn!(run_id = %run_id, "run_cancel_requested");
      record.cancel.cancel();
    }
    Ok(())
  }

  /// Wait until the run is terminal and return its final status.
  pub async fn wait(&self, run_id: &str) -> Result<RunStatus, EngineError> {
    let record = self.record(run_id)?;
    let mut done = record.subscribe();
    // The record owns the sender, so the channel cannot close under us.
    let _ = done.wait_for(|finished| *finished).await;
    Ok(record.status())
  }

  /// Reject new runs, cancel every active run and wait for them to finish.
  pub async fn shutdown(&self) {
    if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
      return;
    }
    info!(active_runs = self.active_runs(), "engine_shutting_down");
    self.inner.cancel.cancel();

    let pending: Vec<Arc<RunRecord>> = self
      .inner
      .runs
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .filter(|record| !record.is_terminal())
      .cloned()
      .collect();
    for record in pending {
      let mut done = record.subscribe();
      let _ = done.wait_for(|finished| *finished).await;
    }
    info!("engine_stopped");
  }

  pub fn is_shutting_down(&self) -> bool {
    self.inner.shutting_down.load(Ordering::SeqCst)
  }
}

impl EngineInner {
  /// Queue a finished run and forget the oldest ones past `retained_runs`.
  fn retire(&self, run_id: &str) {
    let evicted: Vec<String> = {
      let mut finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
      finished.push_back(run_id.to_string());
      let excess = finished.len().saturating_sub(self.config.retained_runs.max(1));
      finished.drain(..excess).collect()
    };
    if evicted.is_empty() {
      return;
    }

    let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
    for run_id in &evicted {
      runs.remove(run_id);
    }
    debug!(evicted = evicted.len(), retained = runs.len(), "runs_evicted");
  }
}
