use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cadence_engine::{EngineConfig, EngineInbox, RunPhase, WorkflowEngine};
use cadence_members::reference::{self, Collaborators};
use cadence_members::{
  CollaboratorError, EmailReceipt, IdentityProvisioner, IdentityStatus, MemberAccount,
  MemberDirectory, Notifier, SummaryCollector, SummaryPayload,
};
use cadence_runtime::ItemStatus;
use cadence_store::{DeadLetterSink, SqliteDeadLetterSink};
use cadence_task::{FailureKind, FailureReason, TaskRegistry};
use cadence_trigger::{FireOutcome, Scheduler};
use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

struct FakeDirectory {
  members: Result<Vec<MemberAccount>, CollaboratorError>,
}

#[async_trait]
impl MemberDirectory for FakeDirectory {
  async fn fetch_members(&self) -> Result<Vec<MemberAccount>, CollaboratorError> {
    self.members.clone()
  }
}

#[derive(Default)]
struct FakeProvisioner {
  failing: HashSet<String>,
  malformed: HashSet<String>,
  calls: Mutex<Vec<String>>,
  in_flight: AtomicUsize,
  peak: AtomicUsize,
}

#[async_trait]
impl IdentityProvisioner for FakeProvisioner {
  async fn ensure_identity(&self, email: &str) -> Result<IdentityStatus, CollaboratorError> {
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(5)).await;
    self.in_flight.fetch_sub(1, Ordering::SeqCst);

    self.calls.lock().unwrap().push(email.to_string());
    if self.malformed.contains(email) {
      return Err(CollaboratorError::InvalidAddress {
        address: email.to_string(),
        message: "not a valid email address".to_string(),
      });
    }
    if self.failing.contains(email) {
      return Err(CollaboratorError::Failed(format!("cannot verify {email}")));
    }
    Ok(IdentityStatus::VerificationRequested)
  }
}

struct FakeCollector;

#[async_trait]
impl SummaryCollector for FakeCollector {
  async fn collect_summary(&self, account_id: &str) -> Result<SummaryPayload, CollaboratorError> {
    Ok(SummaryPayload(json!({ "findings": account_id.len() })))
  }
}

#[derive(Default)]
struct FakeNotifier {
  sent: Mutex<Vec<SentEmail>>,
}

#[derive(Debug, Clone, PartialEq)]
struct SentEmail {
  recipient: String,
  cc: Vec<String>,
  template_name: String,
  data: SummaryPayload,
}

#[async_trait]
impl Notifier for FakeNotifier {
  async fn send_email(
    &self,
    recipient: &str,
    cc: &[String],
    template_name: &str,
    data: &SummaryPayload,
  ) -> Result<EmailReceipt, CollaboratorError> {
    let mut sent = self.sent.lock().unwrap();
    sent.push(SentEmail {
      recipient: recipient.to_string(),
      cc: cc.to_vec(),
      template_name: template_name.to_string(),
      data: data.clone(),
    });
    Ok(EmailReceipt {
      message_id: format!("msg-{}", sent.len()),
    })
  }
}

struct Harness {
  engine: WorkflowEngine,
  provisioner: Arc<FakeProvisioner>,
  notifier: Arc<FakeNotifier>,
}

fn harness(
  members: Result<Vec<MemberAccount>, CollaboratorError>,
  provisioner: FakeProvisioner,
) -> Harness {
  let provisioner = Arc::new(provisioner);
  let notifier = Arc::new(FakeNotifier::default());
  let collaborators = Collaborators {
    directory: Arc::new(FakeDirectory { members }),
    provisioner: provisioner.clone(),
    collector: Arc::new(FakeCollector),
    notifier: notifier.clone(),
    email_template: reference::DEFAULT_EMAIL_TEMPLATE.to_string(),
  };

  let mut registry = TaskRegistry::new();
  reference::register_tasks(&mut registry, &collaborators);
  let engine = WorkflowEngine::new(EngineConfig::default(), registry);
  for def in reference::manifest().workflows {
    engine.register_definition(&def).unwrap();
  }

  Harness {
    engine,
    provisioner,
    notifier,
  }
}

fn members(ids: &[&str]) -> Vec<MemberAccount> {
  ids
    .iter()
    .map(|id| MemberAccount::new(*id, format!("{id}@example.com")))
    .collect()
}

#[tokio::test]
async fn test_one_failed_identity_is_isolated() {
  let provisioner = FakeProvisioner {
    failing: HashSet::from(["b@example.com".to_string()]),
    ..Default::default()
  };
  let h = harness(Ok(members(&["a", "b"])), provisioner);

  let run_id = h
    .engine
    .start(reference::IDENTITY_PROVISIONING, json!({}))
    .unwrap();
  let status = h.engine.wait(&run_id).await.unwrap();

  assert_eq!(status.phase, RunPhase::Failed);
  assert_eq!(
    status.failure.as_ref().map(FailureReason::kind),
    Some(FailureKind::RemoteFailure)
  );
  assert_eq!(status.per_item_results.len(), 2);
  assert_eq!(status.per_item_results[0].index, 0);
  assert_eq!(status.per_item_results[0].status, ItemStatus::Succeeded);
  assert_eq!(status.per_item_results[1].index, 1);
  assert_eq!(status.per_item_results[1].status, ItemStatus::Failed);
  assert!(matches!(
    status.per_item_results[1].failure,
    Some(FailureReason::RemoteFailure { ref task, .. }) if task == "EnsureIdentity"
  ));

  // Item 0 ran to completion despite item 1 failing.
  let calls = h.provisioner.calls.lock().unwrap().clone();
  assert_eq!(calls, vec!["a@example.com", "b@example.com"]);
}

#[tokio::test]
async fn test_malformed_email_is_a_remote_failure() {
  let accounts = vec![
    MemberAccount::new("1", "a@example.com"),
    MemberAccount::new("2", "not-an-email"),
  ];
  let provisioner = FakeProvisioner {
    malformed: HashSet::from(["not-an-email".to_string()]),
    ..Default::default()
  };
  let h = harness(Ok(accounts), provisioner);

  let run_id = h
    .engine
    .start(reference::IDENTITY_PROVISIONING, json!({}))
    .unwrap();
  let status = h.engine.wait(&run_id).await.unwrap();

  assert_eq!(status.phase, RunPhase::Failed);
  assert_eq!(status.per_item_results[0].status, ItemStatus::Succeeded);
  assert_eq!(
    status.per_item_results[1]
      .failure
      .as_ref()
      .map(FailureReason::kind),
    Some(FailureKind::RemoteFailure)
  );
  assert_eq!(
    status.failure.as_ref().map(FailureReason::kind),
    Some(FailureKind::RemoteFailure)
  );
}

#[tokio::test]
async fn test_empty_member_list_succeeds() {
  for workflow_id in [reference::IDENTITY_PROVISIONING, reference::SUMMARY_REPORT] {
    let h = harness(Ok(Vec::new()), FakeProvisioner::default());

    let run_id = h.engine.start(workflow_id, json!({})).unwrap();
    let status = h.engine.wait(&run_id).await.unwrap();

    assert_eq!(status.phase, RunPhase::Succeeded, "{workflow_id}");
    assert!(status.per_item_results.is_empty());
    assert!(status.failure.is_none());
    assert!(h.provisioner.calls.lock().unwrap().is_empty());
    assert!(h.notifier.sent.lock().unwrap().is_empty());
  }
}

#[tokio::test]
async fn test_summary_report_emails_every_member() {
  let accounts = vec![
    MemberAccount::new("111", "a@example.com").with_tech_owner("owner@example.com"),
    MemberAccount::new("2222", "b@example.com"),
  ];
  let h = harness(Ok(accounts), FakeProvisioner::default());

  let run_id = h.engine.start(reference::SUMMARY_REPORT, json!({})).unwrap();
  let status = h.engine.wait(&run_id).await.unwrap();

  assert_eq!(status.phase, RunPhase::Succeeded);
  assert_eq!(status.per_item_results.len(), 2);

  let sent = h.notifier.sent.lock().unwrap().clone();
  assert_eq!(
    sent,
    vec![
      SentEmail {
        recipient: "a@example.com".to_string(),
        cc: vec!["owner@example.com".to_string()],
        template_name: reference::DEFAULT_EMAIL_TEMPLATE.to_string(),
        data: SummaryPayload(json!({ "member_account": "111", "findings": 3 })),
      },
      SentEmail {
        recipient: "b@example.com".to_string(),
        cc: Vec::new(),
        template_name: reference::DEFAULT_EMAIL_TEMPLATE.to_string(),
        data: SummaryPayload(json!({ "member_account": "2222", "findings": 4 })),
      },
    ]
  );

  let first = status.per_item_results[0].output.clone().unwrap();
  assert_eq!(first["cc_addresses"], json!(["owner@example.com"]));

  let output = status.per_item_results[1].output.clone().unwrap();
  assert_eq!(output["account_id"], "2222");
  assert_eq!(output["to_address"], "b@example.com");
  assert_eq!(output["cc_addresses"], json!([]));
  assert_eq!(output["email_template"], reference::DEFAULT_EMAIL_TEMPLATE);
  assert_eq!(output["member_summary"]["member_account"], "2222");

  // The final payload is the fan-out's output list.
  assert_eq!(status.payload.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_directory_unavailable_fails_before_fan_out() {
  let h = harness(
    Err(CollaboratorError::Unavailable("directory down".to_string())),
    FakeProvisioner::default(),
  );

  let run_id = h
    .engine
    .start(reference::IDENTITY_PROVISIONING, json!({}))
    .unwrap();
  let status = h.engine.wait(&run_id).await.unwrap();

  assert_eq!(status.phase, RunPhase::Failed);
  assert_eq!(
    status.failure.as_ref().map(FailureReason::kind),
    Some(FailureKind::DirectoryUnavailable)
  );
  assert!(status.fan_outs.is_empty());
  assert!(status.per_item_results.is_empty());
}

#[tokio::test]
async fn test_directory_refusal_is_directory_unavailable() {
  let h = harness(
    Err(CollaboratorError::Rejected("bad credentials".to_string())),
    FakeProvisioner::default(),
  );

  let run_id = h.engine.start(reference::SUMMARY_REPORT, json!({})).unwrap();
  let status = h.engine.wait(&run_id).await.unwrap();

  assert_eq!(
    status.failure.as_ref().map(FailureReason::kind),
    Some(FailureKind::DirectoryUnavailable)
  );
}

#[tokio::test]
async fn test_members_are_processed_one_at_a_time() {
  let accounts = vec![
    MemberAccount::new("1", "a@example.com").with_tech_owner("t1@example.com"),
    MemberAccount::new("2", "b@example.com"),
    MemberAccount::new("3", "c@example.com").with_tech_owner("t3@example.com"),
  ];
  let h = harness(Ok(accounts), FakeProvisioner::default());

  let run_id = h
    .engine
    .start(reference::IDENTITY_PROVISIONING, json!({}))
    .unwrap();
  let status = h.engine.wait(&run_id).await.unwrap();

  assert_eq!(status.phase, RunPhase::Succeeded);
  assert_eq!(h.provisioner.peak.load(Ordering::SeqCst), 1);
  let calls = h.provisioner.calls.lock().unwrap().clone();
  assert_eq!(
    calls,
    vec![
      "a@example.com",
      "t1@example.com",
      "b@example.com",
      "c@example.com",
      "t3@example.com",
    ]
  );
}

#[tokio::test]
async fn test_duplicate_accounts_are_distinct_items() {
  let h = harness(Ok(members(&["a", "a"])), FakeProvisioner::default());

  let run_id = h
    .engine
    .start(reference::IDENTITY_PROVISIONING, json!({}))
    .unwrap();
  let status = h.engine.wait(&run_id).await.unwrap();

  assert_eq!(status.phase, RunPhase::Succeeded);
  assert_eq!(status.per_item_results.len(), 2);
  assert_eq!(h.provisioner.calls.lock().unwrap().len(), 2);
}

async fn dead_letter_sinks() -> (SqliteDeadLetterSink, HashMap<String, Arc<dyn DeadLetterSink>>) {
  let sink = SqliteDeadLetterSink::in_memory(reference::SUMMARY_DEAD_LETTER_SINK)
    .await
    .unwrap();
  let mut sinks: HashMap<String, Arc<dyn DeadLetterSink>> = HashMap::new();
  sinks.insert(
    reference::SUMMARY_DEAD_LETTER_SINK.to_string(),
    Arc::new(sink.clone()),
  );
  (sink, sinks)
}

#[tokio::test]
async fn test_unreachable_engine_dead_letters_once() {
  let h = harness(Ok(members(&["a"])), FakeProvisioner::default());
  let inbox = EngineInbox::new(h.engine.clone());
  let sender = inbox.sender();
  drop(inbox);

  let (sink, sinks) = dead_letter_sinks().await;
  let scheduler =
    Scheduler::from_defs(&reference::manifest().schedules, Arc::new(sender), sinks).unwrap();

  let monday_nine = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 30).unwrap();
  let outcomes = scheduler.fire_due(monday_nine).await;

  assert_eq!(outcomes.len(), 1);
  assert!(matches!(outcomes[0], FireOutcome::DeadLettered { .. }));

  let entries = sink.list().await.unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].rule_name, reference::WEEKLY_SUMMARY);
  assert!(entries[0].reason.starts_with("trigger delivery failed"));
  assert_eq!(
    entries[0].original_event.0["workflow_id"],
    reference::SUMMARY_REPORT
  );
  assert!(h.engine.runs().is_empty());
}

#[tokio::test]
async fn test_scheduled_summary_report_runs() {
  let h = harness(Ok(members(&["a", "b"])), FakeProvisioner::default());
  let inbox = EngineInbox::new(h.engine.clone());
  let sender = inbox.sender();
  let cancel = CancellationToken::new();
  let inbox_task = tokio::spawn(inbox.start(cancel.clone()));

  let (sink, sinks) = dead_letter_sinks().await;
  let scheduler =
    Scheduler::from_defs(&reference::manifest().schedules, Arc::new(sender), sinks).unwrap();

  // Tuesday: nothing due.
  let tuesday = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
  assert!(scheduler.fire_due(tuesday).await.is_empty());

  let monday_nine = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();
  let outcomes = scheduler.fire_due(monday_nine).await;
  let run_id = match &outcomes[..] {
    [FireOutcome::Started { run_id, .. }] => run_id.clone(),
    other => panic!("unexpected outcomes: {other:?}"),
  };

  let status = h.engine.wait(&run_id).await.unwrap();
  assert_eq!(status.workflow_id, reference::SUMMARY_REPORT);
  assert_eq!(status.phase, RunPhase::Succeeded);
  assert_eq!(h.notifier.sent.lock().unwrap().len(), 2);
  assert!(sink.list().await.unwrap().is_empty());

  cancel.cancel();
  inbox_task.await.unwrap();
}

#[tokio::test]
async fn test_dead_letters_land_in_the_data_directory() {
  let h = harness(Ok(members(&["a"])), FakeProvisioner::default());
  let inbox = EngineInbox::new(h.engine.clone());
  let sender = inbox.sender();
  drop(inbox);

  let data_dir = tempfile::tempdir().unwrap();
  let sink = SqliteDeadLetterSink::open_in(data_dir.path(), reference::SUMMARY_DEAD_LETTER_SINK)
    .await
    .unwrap();
  let mut sinks: HashMap<String, Arc<dyn DeadLetterSink>> = HashMap::new();
  sinks.insert(
    reference::SUMMARY_DEAD_LETTER_SINK.to_string(),
    Arc::new(sink.clone()),
  );
  let scheduler =
    Scheduler::from_defs(&reference::manifest().schedules, Arc::new(sender), sinks).unwrap();
  let monday_nine = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
  scheduler.fire_due(monday_nine).await;
  sink.close().await;

  // What the dead-letters command opens.
  let reader = SqliteDeadLetterSink::open(
    &data_dir.path().join(cadence_store::DATABASE_FILE),
    reference::SUMMARY_DEAD_LETTER_SINK,
  )
  .await
  .unwrap();
  let entries = reader.list().await.unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].rule_name, reference::WEEKLY_SUMMARY);
}

#[test]
fn test_weekly_rule_fires_monday_morning() {
  let rule = cadence_trigger::ScheduleRule::lock(&reference::weekly_summary_rule()).unwrap();
  let after = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
  assert_eq!(
    rule.cron.next_after(after),
    Some(Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap())
  );
}
