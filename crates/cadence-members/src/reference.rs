//! The reference workflows and their schedule, built purely as data.
//!
//! ```text
//! identity-provisioning: FetchMemberList -> EachMember(k=1)[EnsureIdentity]
//! summary-report:        FetchMemberList -> EachMember(k=1)[CollectSummary -> SendEmail]
//! weekly-summary:        0 9 * * MON (UTC) -> summary-report
//! ```

use std::sync::Arc;

use cadence_config::{Manifest, ScheduleRuleDef, StateDef, WorkflowDef};
use cadence_task::TaskRegistry;

use crate::collaborators::{IdentityProvisioner, MemberDirectory, Notifier, SummaryCollector};
use crate::tasks::{
  COLLECT_SUMMARY, CollectSummary, ENSURE_IDENTITY, EnsureIdentity, FETCH_MEMBER_LIST,
  FetchMemberList, SEND_EMAIL, SendEmail,
};

pub const IDENTITY_PROVISIONING: &str = "identity-provisioning";
pub const SUMMARY_REPORT: &str = "summary-report";
pub const WEEKLY_SUMMARY: &str = "weekly-summary";
pub const SUMMARY_DEAD_LETTER_SINK: &str = "summary-report-dlq";
pub const WEEKLY_SUMMARY_CRON: &str = "0 9 * * MON";
pub const MEMBER_LIST: &str = "$.member_list";
pub const DEFAULT_EMAIL_TEMPLATE: &str = "member-summary";

const FETCH_MEMBER_LIST_TIMEOUT_MS: u64 = 300_000;
const ENSURE_IDENTITY_TIMEOUT_MS: u64 = 60_000;
const COLLECT_SUMMARY_TIMEOUT_MS: u64 = 900_000;
const SEND_EMAIL_TIMEOUT_MS: u64 = 900_000;

pub fn identity_provisioning() -> WorkflowDef {
  WorkflowDef {
    workflow_id: IDENTITY_PROVISIONING.to_string(),
    name: "Member identity provisioning".to_string(),
    states: vec![
      StateDef::task(FETCH_MEMBER_LIST, FETCH_MEMBER_LIST_TIMEOUT_MS),
      StateDef::fan_out(
        "EachMemberIdentity",
        MEMBER_LIST,
        1,
        vec![StateDef::task(ENSURE_IDENTITY, ENSURE_IDENTITY_TIMEOUT_MS)],
      ),
    ],
  }
}

pub fn summary_report() -> WorkflowDef {
  WorkflowDef {
    workflow_id: SUMMARY_REPORT.to_string(),
    name: "Member summary report".to_string(),
    states: vec![
      StateDef::task(FETCH_MEMBER_LIST, FETCH_MEMBER_LIST_TIMEOUT_MS),
      StateDef::fan_out(
        "EachMemberSummary",
        MEMBER_LIST,
        1,
        vec![
          StateDef::task(COLLECT_SUMMARY, COLLECT_SUMMARY_TIMEOUT_MS),
          StateDef::task(SEND_EMAIL, SEND_EMAIL_TIMEOUT_MS),
        ],
      ),
    ],
  }
}

/// Starts the summary report every Monday at 09:00 UTC.
pub fn weekly_summary_rule() -> ScheduleRuleDef {
  ScheduleRuleDef {
    name: WEEKLY_SUMMARY.to_string(),
    cron: WEEKLY_SUMMARY_CRON.to_string(),
    enabled: true,
    target_workflow: SUMMARY_REPORT.to_string(),
    dead_letter_sink: SUMMARY_DEAD_LETTER_SINK.to_string(),
    input: serde_json::json!({}),
  }
}

/// Both workflows and the weekly rule.
pub fn manifest() -> Manifest {
  Manifest {
    workflows: vec![identity_provisioning(), summary_report()],
    schedules: vec![weekly_summary_rule()],
  }
}

/// The external providers the reference tasks call.
#[derive(Clone)]
pub struct Collaborators {
  pub directory: Arc<dyn MemberDirectory>,
  pub provisioner: Arc<dyn IdentityProvisioner>,
  pub collector: Arc<dyn SummaryCollector>,
  pub notifier: Arc<dyn Notifier>,
  pub email_template: String,
}

/// Register the four reference task handlers.
pub fn register_tasks(registry: &mut TaskRegistry, collaborators: &Collaborators) {
  registry
    .register(
      FETCH_MEMBER_LIST,
      Arc::new(FetchMemberList::new(collaborators.directory.clone())),
    )
    .register(
      ENSURE_IDENTITY,
      Arc::new(EnsureIdentity::new(collaborators.provisioner.clone())),
    )
    .register(
      COLLECT_SUMMARY,
      Arc::new(CollectSummary::new(collaborators.collector.clone())),
    )
    .register(
      SEND_EMAIL,
      Arc::new(SendEmail::new(
        collaborators.notifier.clone(),
        collaborators.email_template.clone(),
      )),
    );
}
