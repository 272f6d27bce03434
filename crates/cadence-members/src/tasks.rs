//! Task handlers for the member workflows.
//!
//! Each handler adapts one collaborator call to the task payload contract:
//!
//! | task              | input                | output                                              |
//! |-------------------|----------------------|-----------------------------------------------------|
//! | `FetchMemberList` | anything             | `{"member_list": [MemberAccount]}`                  |
//! | `EnsureIdentity`  | `MemberAccount`      | `{"account_id", "identities"}`                      |
//! | `CollectSummary`  | `MemberAccount`      | `{"account", "summary"}`                            |
//! | `SendEmail`       | `CollectSummary` out | `{"account_id", "to_address", "cc_addresses", ...}` |

use std::sync::Arc;

use async_trait::async_trait;
use cadence_task::{InvocationContext, TaskError, TaskHandler};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::account::MemberAccount;
use crate::collaborators::{
  CollaboratorError, IdentityProvisioner, MemberDirectory, Notifier, SummaryCollector,
  SummaryPayload,
};

pub const FETCH_MEMBER_LIST: &str = "FetchMemberList";
pub const ENSURE_IDENTITY: &str = "EnsureIdentity";
pub const COLLECT_SUMMARY: &str = "CollectSummary";
pub const SEND_EMAIL: &str = "SendEmail";

fn parse<T: serde::de::DeserializeOwned>(input: serde_json::Value) -> Result<T, TaskError> {
  serde_json::from_value(input).map_err(|e| TaskError::invalid_input(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value, TaskError> {
  serde_json::to_value(value).map_err(|e| TaskError::remote(format!("unserializable output: {e}")))
}

/// Fetches the member list from the directory.
pub struct FetchMemberList {
  directory: Arc<dyn MemberDirectory>,
}

impl FetchMemberList {
  pub fn new(directory: Arc<dyn MemberDirectory>) -> Self {
    Self { directory }
  }
}

#[async_trait]
impl TaskHandler for FetchMemberList {
  async fn call(
    &self,
    ctx: &InvocationContext,
    _input: serde_json::Value,
  ) -> Result<serde_json::Value, TaskError> {
    let members = self
      .directory
      .fetch_members()
      .await
      .map_err(|e| TaskError::directory_unavailable(e.to_string()))?;
    info!(run_id = %ctx.run_id, member_count = members.len(), "member_list_fetched");
    Ok(json!({ "member_list": encode(&members)? }))
  }
}

/// Ensures the account email, and the tech-owner email when present, are
/// verified identities.
pub struct EnsureIdentity {
  provisioner: Arc<dyn IdentityProvisioner>,
}

impl EnsureIdentity {
  pub fn new(provisioner: Arc<dyn IdentityProvisioner>) -> Self {
    Self { provisioner }
  }
}

#[async_trait]
impl TaskHandler for EnsureIdentity {
  async fn call(
    &self,
    ctx: &InvocationContext,
    input: serde_json::Value,
  ) -> Result<serde_json::Value, TaskError> {
    let account: MemberAccount = parse(input)?;
    let mut identities = Vec::new();
    for email in account.addresses() {
      let status = self
        .provisioner
        .ensure_identity(email)
        .await
        .map_err(CollaboratorError::into_task_error)?;
      debug!(run_id = %ctx.run_id, account_id = %account.account_id, email, ?status, "identity_ensured");
      identities.push(json!({ "email": email, "status": status }));
    }
    Ok(json!({
      "account_id": account.account_id,
      "identities": identities,
    }))
  }
}

/// Output of `CollectSummary`, input of `SendEmail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
  pub account: MemberAccount,
  pub summary: SummaryPayload,
}

/// Collects the summary report data for one account.
pub struct CollectSummary {
  collector: Arc<dyn SummaryCollector>,
}

impl CollectSummary {
  pub fn new(collector: Arc<dyn SummaryCollector>) -> Self {
    Self { collector }
  }
}

#[async_trait]
impl TaskHandler for CollectSummary {
  async fn call(
    &self,
    _ctx: &InvocationContext,
    input: serde_json::Value,
  ) -> Result<serde_json::Value, TaskError> {
    let account: MemberAccount = parse(input)?;
    let summary = self
      .collector
      .collect_summary(&account.account_id)
      .await
      .map_err(CollaboratorError::into_task_error)?;
    encode(&AccountSummary { account, summary })
  }
}

/// Emails the collected summary to the account owner, copying the tech
/// owner when there is one.
pub struct SendEmail {
  notifier: Arc<dyn Notifier>,
  template_name: String,
}

impl SendEmail {
  pub fn new(notifier: Arc<dyn Notifier>, template_name: impl Into<String>) -> Self {
    Self {
      notifier,
      template_name: template_name.into(),
    }
  }
}

#[async_trait]
impl TaskHandler for SendEmail {
  async fn call(
    &self,
    ctx: &InvocationContext,
    input: serde_json::Value,
  ) -> Result<serde_json::Value, TaskError> {
    let AccountSummary { account, summary } = parse(input)?;

    let mut member_summary = serde_json::Map::new();
    member_summary.insert("member_account".to_string(), json!(account.account_id));
    match summary.0 {
      serde_json::Value::Object(fields) => member_summary.extend(fields),
      other => {
        member_summary.insert("summary".to_string(), other);
      }
    }
    let data = SummaryPayload(serde_json::Value::Object(member_summary));
    let cc: Vec<String> = account.tech_owner_email.iter().cloned().collect();

    let receipt = self
      .notifier
      .send_email(&account.email, &cc, &self.template_name, &data)
      .await
      .map_err(CollaboratorError::into_task_error)?;
    info!(
      run_id = %ctx.run_id,
      account_id = %account.account_id,
      message_id = %receipt.message_id,
      "summary_email_sent"
    );

    Ok(json!({
      "account_id": account.account_id,
      "to_address": account.email,
      "cc_addresses": cc,
      "email_template": self.template_name,
      "member_summary": data,
      "message_id": receipt.message_id,
    }))
  }
}
