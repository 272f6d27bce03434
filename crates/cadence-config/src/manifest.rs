use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleRuleDef;
use crate::workflow::WorkflowDef;

/// Everything a deployment declares: workflows and the rules that fire them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
  #[serde(default)]
  pub workflows: Vec<WorkflowDef>,
  #[serde(default)]
  pub schedules: Vec<ScheduleRuleDef>,
}

impl Manifest {
  /// Find a workflow definition by id.
  pub fn workflow(&self, workflow_id: &str) -> Option<&WorkflowDef> {
    self.workflows.iter().find(|w| w.workflow_id == workflow_id)
  }
}
