use std::collections::BTreeSet;

use cadence_config::{RetryPolicyDef, StateDef, TaskDef, WorkflowDef};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::state::{LockedFanOut, LockedTask, RetryPolicy, State, StateId, StateKind};

/// A locked workflow ready for execution.
///
/// States live in a flat arena; `root` is the top-level chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  pub states: Vec<State>,
  pub root: StateId,
}

impl Workflow {
  /// Validate a definition and flatten it into the arena form.
  pub fn lock(def: &WorkflowDef) -> Result<Self, WorkflowError> {
    if def.workflow_id.trim().is_empty() {
      return Err(WorkflowError::MissingWorkflowId);
    }

    let mut builder = Builder::default();
    let root = builder.chain(def.name.clone(), &def.states, &def.workflow_id)?;

    Ok(Self {
      workflow_id: def.workflow_id.clone(),
      name: def.name.clone(),
      states: builder.states,
      root,
    })
  }

  /// Get a state by id.
  pub fn get(&self, state_id: StateId) -> Option<&State> {
    self.states.get(state_id.0)
  }

  /// Get a state by id, failing with [`WorkflowError::StateNotFound`].
  pub fn state(&self, state_id: StateId) -> Result<&State, WorkflowError> {
    self
      .get(state_id)
      .ok_or(WorkflowError::StateNotFound(state_id.0))
  }

  /// Find a state by name. Names are not required to be unique; the first
  /// match in arena order wins.
  pub fn find(&self, name: &str) -> Option<&State> {
    self.states.iter().find(|s| s.name == name)
  }

  /// Children of a chain state (empty for tasks, the body for fan-outs).
  pub fn children(&self, state_id: StateId) -> Vec<StateId> {
    match self.get(state_id).map(|s| &s.kind) {
      Some(StateKind::Chain { children }) => children.clone(),
      Some(StateKind::FanOut(fan_out)) => vec![fan_out.body],
      _ => Vec::new(),
    }
  }

  /// Names of every task referenced anywhere in the tree.
  pub fn task_names(&self) -> BTreeSet<&str> {
    self
      .states
      .iter()
      .filter_map(|s| match &s.kind {
        StateKind::Task(task) => Some(task.name.as_str()),
        _ => None,
      })
      .collect()
  }

  /// All fan-out states with their ids.
  pub fn fan_outs(&self) -> impl Iterator<Item = (&State, &LockedFanOut)> {
    self.states.iter().filter_map(|s| match &s.kind {
      StateKind::FanOut(fan_out) => Some((s, fan_out)),
      _ => None,
    })
  }
}

#[derive(Default)]
struct Builder {
  states: Vec<State>,
}

impl Builder {
  /// Reserve a slot so parents get lower ids than their children.
  fn reserve(&mut self, name: String) -> StateId {
    let state_id = StateId(self.states.len());
    self.states.push(State {
      state_id,
      name,
      kind: StateKind::Chain {
        children: Vec::new(),
      },
    });
    state_id
  }

  fn chain(&mut self, name: String, defs: &[StateDef], path: &str) -> Result<StateId, WorkflowError> {
    let state_id = self.reserve(name);
    let mut children = Vec::with_capacity(defs.len());
    for (i, def) in defs.iter().enumerate() {
      children.push(self.state(def, &format!("{}[{}]", path, i))?);
    }
    self.states[state_id.0].kind = StateKind::Chain { children };
    Ok(state_id)
  }

  fn state(&mut self, def: &StateDef, path: &str) -> Result<StateId, WorkflowError> {
    match def {
      StateDef::Task(task) => {
        let locked = lock_task(task, path)?;
        let state_id = self.reserve(locked.name.clone());
        self.states[state_id.0].kind = StateKind::Task(locked);
        Ok(state_id)
      }
      StateDef::Chain { name, states } => {
        let name = name.clone().unwrap_or_else(|| format!("chain@{}", path));
        self.chain(name, states, path)
      }
      StateDef::FanOut(fan_out) => {
        if fan_out.max_concurrency < 1 {
          return Err(WorkflowError::InvalidConcurrency {
            state: fan_out.name.clone(),
            value: fan_out.max_concurrency,
          });
        }
        if fan_out.items.trim().is_empty() {
          return Err(WorkflowError::MissingItemsExpression {
            state: fan_out.name.clone(),
          });
        }
        let max_concurrency =
          usize::try_from(fan_out.max_concurrency).map_err(|_| WorkflowError::InvalidConcurrency {
            state: fan_out.name.clone(),
            value: fan_out.max_concurrency,
          })?;

        let state_id = self.reserve(fan_out.name.clone());
        let body = self.chain(
          format!("{}.body", fan_out.name),
          &fan_out.body,
          &format!("{}.{}", path, fan_out.name),
        )?;
        self.states[state_id.0].kind = StateKind::FanOut(LockedFanOut {
          items: fan_out.items.clone(),
          max_concurrency,
          body,
        });
        Ok(state_id)
      }
    }
  }
}

fn lock_task(task: &TaskDef, path: &str) -> Result<LockedTask, WorkflowError> {
  if task.name.trim().is_empty() {
    return Err(WorkflowError::MissingTaskName {
      path: path.to_string(),
    });
  }
  if task.timeout_ms == 0 {
    return Err(WorkflowError::InvalidTimeout {
      task: task.name.clone(),
    });
  }
  let retry = task
    .retry
    .as_ref()
    .map(|r| lock_retry(&task.name, r))
    .transpose()?;

  Ok(LockedTask {
    name: task.name.clone(),
    timeout_ms: task.timeout_ms,
    retry,
  })
}

fn lock_retry(task: &str, retry: &RetryPolicyDef) -> Result<RetryPolicy, WorkflowError> {
  if retry.max_attempts == 0 {
    return Err(WorkflowError::InvalidRetry {
      task: task.to_string(),
    });
  }
  Ok(RetryPolicy {
    max_attempts: retry.max_attempts,
    backoff: retry.backoff,
    initial_delay_ms: retry.initial_delay_ms,
  })
}
