//! Fan-out items selection.
//!
//! An items expression picks the list a fan-out iterates over from the
//! stage input. Expressions are minijinja expressions evaluated with the
//! input object as context:
//!
//! ```text
//! member_list            -> input["member_list"]
//! $.member_list          -> same (the `$.` prefix is accepted)
//! $                      -> the input itself
//! accounts | reverse     -> any minijinja expression
//! ```

use cadence_task::FailureReason;
use cadence_workflow::Workflow;
use minijinja::{Environment, Value};

use crate::error::RuntimeError;

/// A compiled-once, validated items expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemsSelector {
  state: String,
  expression: Option<String>,
}

impl ItemsSelector {
  /// Parse and compile `expression` for the fan-out `state`.
  pub fn parse(state: &str, expression: &str) -> Result<Self, RuntimeError> {
    let trimmed = expression.trim();
    let expression = match trimmed {
      "$" => None,
      _ => Some(trimmed.strip_prefix("$.").unwrap_or(trimmed).to_string()),
    };

    if let Some(source) = &expression {
      let env = Environment::new();
      env
        .compile_expression(source)
        .map_err(|e| RuntimeError::InvalidSelector {
          state: state.to_string(),
          message: e.to_string(),
        })?;
    }

    Ok(Self {
      state: state.to_string(),
      expression,
    })
  }

  /// Evaluate against `input`; the result must be a list.
  pub fn select(&self, input: &serde_json::Value) -> Result<Vec<serde_json::Value>, FailureReason> {
    let selected = match &self.expression {
      None => input.clone(),
      Some(source) => self.eval(source, input)?,
    };

    match selected {
      serde_json::Value::Array(items) => Ok(items),
      other => Err(self.invalid(format!(
        "items expression did not yield a list (got {})",
        json_type(&other)
      ))),
    }
  }

  fn eval(&self, source: &str, input: &serde_json::Value) -> Result<serde_json::Value, FailureReason> {
    let env = Environment::new();
    let expr = env
      .compile_expression(source)
      .map_err(|e| self.invalid(e.to_string()))?;
    let value = expr
      .eval(Value::from_serialize(input))
      .map_err(|e| self.invalid(e.to_string()))?;
    serde_json::to_value(&value).map_err(|e| self.invalid(e.to_string()))
  }

  fn invalid(&self, message: String) -> FailureReason {
    FailureReason::InvalidPayload {
      state: self.state.clone(),
      message,
    }
  }
}

/// Check that every fan-out in `workflow` has a compilable items expression.
pub fn validate_selectors(workflow: &Workflow) -> Result<(), RuntimeError> {
  for (state, fan_out) in workflow.fan_outs() {
    ItemsSelector::parse(&state.name, &fan_out.items)?;
  }
  Ok(())
}

fn json_type(value: &serde_json::Value) -> &'static str {
  match value {
    serde_json::Value::Null => "null",
    serde_json::Value::Bool(_) => "boolean",
    serde_json::Value::Number(_) => "number",
    serde_json::Value::String(_) => "string",
    serde_json::Value::Array(_) => "array",
    serde_json::Value::Object(_) => "object",
  }
}

#[cfg(test)]
mod tests {
  use cadence_task::FailureKind;
  use serde_json::json;

  use super::*;

  #[test]
  fn test_member_list_forms() {
    let input = json!({ "member_list": [{ "account_id": "1" }, { "account_id": "2" }] });
    for expr in ["member_list", "$.member_list", " member_list "] {
      let selector = ItemsSelector::parse("Map", expr).unwrap();
      assert_eq!(selector.select(&input).unwrap().len(), 2, "expression {expr:?}");
    }
  }

  #[test]
  fn test_root_selector() {
    let selector = ItemsSelector::parse("Map", "$").unwrap();
    assert_eq!(selector.select(&json!([1, 2, 3])).unwrap(), vec![json!(1), json!(2), json!(3)]);
  }

  #[test]
  fn test_nested_path_and_filters() {
    let input = json!({ "data": { "accounts": [1, 2, 3] } });
    let selector = ItemsSelector::parse("Map", "data.accounts | reverse | list").unwrap();
    assert_eq!(selector.select(&input).unwrap(), vec![json!(3), json!(2), json!(1)]);
  }

  #[test]
  fn test_non_list_is_invalid_payload() {
    let selector = ItemsSelector::parse("Map", "member_list").unwrap();

    let err = selector.select(&json!({ "member_list": "nope" })).unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidPayload);

    let missing = selector.select(&json!({})).unwrap_err();
    assert_eq!(missing.kind(), FailureKind::InvalidPayload);
  }

  #[test]
  fn test_compile_error() {
    let err = ItemsSelector::parse("Map", "member_list |").unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidSelector { ref state, .. } if state == "Map"));
  }
}
