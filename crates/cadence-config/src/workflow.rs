use serde::{Deserialize, Serialize};

use crate::state::StateDef;

/// A workflow definition: a named top-level chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub workflow_id: String,
  pub name: String,
  pub states: Vec<StateDef>,
}
