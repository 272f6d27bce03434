use serde::{Deserialize, Serialize};

/// A recurring trigger for a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRuleDef {
  pub name: String,

  /// Five-field cron expression evaluated in UTC, e.g. "0 9 * * MON".
  pub cron: String,

  #[serde(default = "default_enabled")]
  pub enabled: bool,

  /// `workflow_id` of the workflow to start.
  pub target_workflow: String,

  /// Name of the sink that receives events which could not be delivered.
  pub dead_letter_sink: String,

  /// Payload sent with every start request.
  #[serde(default = "default_input")]
  pub input: serde_json::Value,
}

fn default_enabled() -> bool {
  true
}

fn default_input() -> serde_json::Value {
  serde_json::json!({})
}
