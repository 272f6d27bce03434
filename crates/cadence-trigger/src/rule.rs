use cadence_config::ScheduleRuleDef;
use chrono::{DateTime, Utc};

use crate::cron::CronSchedule;
use crate::error::TriggerError;

/// A validated schedule rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRule {
  pub name: String,
  pub cron: CronSchedule,
  pub enabled: bool,
  pub target_workflow: String,
  pub dead_letter_sink: String,
  pub input: serde_json::Value,
}

impl ScheduleRule {
  /// Validate a definition: non-empty names and a parseable cron expression.
  pub fn lock(def: &ScheduleRuleDef) -> Result<Self, TriggerError> {
    if def.name.trim().is_empty() {
      return Err(TriggerError::MissingRuleName);
    }
    if def.target_workflow.trim().is_empty() {
      return Err(TriggerError::MissingTarget {
        rule: def.name.clone(),
      });
    }

    Ok(Self {
      name: def.name.clone(),
      cron: CronSchedule::parse(&def.cron)?,
      enabled: def.enabled,
      target_workflow: def.target_workflow.clone(),
      dead_letter_sink: def.dead_letter_sink.clone(),
      input: def.input.clone(),
    })
  }

  /// Whether this rule fires in the minute containing `at`.
  pub fn is_due(&self, at: DateTime<Utc>) -> bool {
    self.enabled && self.cron.matches(at)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn def(cron: &str, enabled: bool) -> ScheduleRuleDef {
    ScheduleRuleDef {
      name: "weekly".to_string(),
      cron: cron.to_string(),
      enabled,
      target_workflow: "summary-report".to_string(),
      dead_letter_sink: "summary-dlq".to_string(),
      input: json!({}),
    }
  }

  #[test]
  fn test_disabled_rule_is_never_due() {
    let monday = DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    assert!(ScheduleRule::lock(&def("0 9 * * MON", true)).unwrap().is_due(monday));
    assert!(!ScheduleRule::lock(&def("0 9 * * MON", false)).unwrap().is_due(monday));
  }

  #[test]
  fn test_bad_cron_rejected() {
    assert!(matches!(
      ScheduleRule::lock(&def("0 25 * * *", true)),
      Err(TriggerError::InvalidCron { .. })
    ));
  }
}
