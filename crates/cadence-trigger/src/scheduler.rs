//! The cron scheduler.
//!
//! Every minute, each enabled rule whose schedule matches produces one
//! [`TriggerEvent`] and exactly one delivery attempt. Events that cannot be
//! delivered are written to the rule's dead-letter sink; nothing is retried.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cadence_config::ScheduleRuleDef;
use cadence_engine::StartRequest;
use cadence_store::{DeadLetterEntry, DeadLetterSink};
use cadence_task::FailureReason;
use chrono::{DateTime, Duration, DurationRound, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::TriggerError;
use crate::rule::ScheduleRule;
use crate::target::StartRequestTarget;
use crate::types::{FireOutcome, TriggerEvent};

/// Fires schedule rules and routes failed deliveries to dead-letter sinks.
pub struct Scheduler {
  rules: Vec<ScheduleRule>,
  target: Arc<dyn StartRequestTarget>,
  sinks: HashMap<String, Arc<dyn DeadLetterSink>>,
}

impl Scheduler {
  /// Build a scheduler. Every rule must name a known sink and rule names
  /// must be unique.
  pub fn new(
    rules: Vec<ScheduleRule>,
    target: Arc<dyn StartRequestTarget>,
    sinks: HashMap<String, Arc<dyn DeadLetterSink>>,
  ) -> Result<Self, TriggerError> {
    let mut seen = HashSet::new();
    for rule in &rules {
      if !seen.insert(rule.name.as_str()) {
        return Err(TriggerError::DuplicateRule(rule.name.clone()));
      }
      if !sinks.contains_key(&rule.dead_letter_sink) {
        return Err(TriggerError::UnknownSink {
          rule: rule.name.clone(),
          sink: rule.dead_letter_sink.clone(),
        });
      }
    }

    Ok(Self {
      rules,
      target,
      sinks,
    })
  }

  /// Lock `defs` and build a scheduler from them.
  pub fn from_defs(
    defs: &[ScheduleRuleDef],
    target: Arc<dyn StartRequestTarget>,
    sinks: HashMap<String, Arc<dyn DeadLetterSink>>,
  ) -> Result<Self, TriggerError> {
    let rules = defs
      .iter()
      .map(ScheduleRule::lock)
      .collect::<Result<Vec<_>, _>>()?;
    Self::new(rules, target, sinks)
  }

  pub fn rules(&self) -> &[ScheduleRule] {
    &self.rules
  }

  /// The earliest upcoming fire time across enabled rules.
  pub fn next_fire(&self, after: DateTime<Utc>) -> Option<(&ScheduleRule, DateTime<Utc>)> {
    self
      .rules
      .iter()
      .filter(|rule| rule.enabled)
      .filter_map(|rule| rule.cron.next_after(after).map(|t| (rule, t)))
      .min_by_key(|(_, t)| *t)
  }

  /// Fire every enabled rule due in the minute containing `at`.
  #[instrument(name = "scheduler_fire_due", skip(self, at), fields(at = %at))]
  pub async fn fire_due(&self, at: DateTime<Utc>) -> Vec<FireOutcome> {
    let fired_at = minute_floor(at);
    let mut outcomes = Vec::new();
    for rule in self.rules.iter().filter(|rule| rule.is_due(fired_at)) {
      outcomes.push(self.fire(rule, fired_at).await);
    }
    outcomes
  }

  /// Fire one rule regardless of its schedule.
  pub async fn fire(&self, rule: &ScheduleRule, fired_at: DateTime<Utc>) -> FireOutcome {
    let event = TriggerEvent {
      event_id: uuid::Uuid::new_v4().to_string(),
      rule: rule.name.clone(),
      workflow_id: rule.target_workflow.clone(),
      payload: rule.input.clone(),
      fired_at,
    };

    info!(
      rule = %rule.name,
      event_id = %event.event_id,
      workflow_id = %event.workflow_id,
      "trigger_fired"
    );

    let request = StartRequest {
      workflow_id: event.workflow_id.clone(),
      input: event.payload.clone(),
    };
    let delivery_error = match self.target.deliver(request).await {
      Ok(run_id) => {
        info!(rule = %rule.name, event_id = %event.event_id, run_id = %run_id, "trigger_delivered");
        return FireOutcome::Started {
          rule: rule.name.clone(),
          event_id: event.event_id,
          run_id,
        };
      }
      Err(e) => e,
    };

    let reason = FailureReason::TriggerDeliveryFailed {
      message: delivery_error.to_string(),
    }
    .to_string();
    warn!(rule = %rule.name, event_id = %event.event_id, reason = %reason, "trigger_delivery_failed");

    self.dead_letter(rule, event, reason).await
  }

  async fn dead_letter(&self, rule: &ScheduleRule, event: TriggerEvent, reason: String) -> FireOutcome {
    let event_id = event.event_id.clone();
    let lost = |error: String| FireOutcome::Lost {
      rule: rule.name.clone(),
      event_id: event_id.clone(),
      reason: reason.clone(),
      error,
    };

    // Sinks are checked in `new`
    let Some(sink) = self.sinks.get(&rule.dead_letter_sink) else {
      return lost(format!("unknown sink '{}'", rule.dead_letter_sink));
    };
    let original_event = match serde_json::to_value(&event) {
      Ok(value) => value,
      Err(e) => return lost(e.to_string()),
    };

    let entry = DeadLetterEntry::new(sink.name(), &rule.name, original_event, reason.clone());
    match sink.enqueue(&entry).await {
      Ok(()) => {
        info!(
          rule = %rule.name,
          event_id = %event_id,
          sink = %sink.name(),
          entry_id = %entry.entry_id,
          "trigger_dead_lettered"
        );
        FireOutcome::DeadLettered {
          rule: rule.name.clone(),
          event_id: event_id.clone(),
          entry_id: entry.entry_id,
          reason: reason.clone(),
        }
      }
      Err(e) => {
        error!(rule = %rule.name, event_id = %event_id, error = %e, "trigger_lost");
        lost(e.to_string())
      }
    }
  }

  /// Fire due rules at every minute boundary until `cancel` fires.
  ///
  /// Minutes that pass while deliveries are still in flight are fired late,
  /// in order, up to [`MAX_CATCH_UP_MINUTES`] behind.
  pub async fn run(&self, cancel: CancellationToken) {
    info!(rules = self.rules.len(), "scheduler_started");
    let clock = Clock::start();
    let mut next = minute_floor(clock.now()) + Duration::minutes(1);

    loop {
      let wait = (next - clock.now()).to_std().unwrap_or_default();
      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          info!("scheduler_cancelled");
          break;
        }
        _ = tokio::time::sleep(wait) => {}
      }

      let behind = (minute_floor(clock.now()) - next).num_minutes();
      if behind > MAX_CATCH_UP_MINUTES {
        let skipped = behind - MAX_CATCH_UP_MINUTES;
        warn!(skipped, from = %next, "scheduler_minutes_skipped");
        next += Duration::minutes(skipped);
      } else if behind > 0 {
        debug!(behind, minute = %next, "scheduler_catching_up");
      }

      self.fire_due(next).await;
      next += Duration::minutes(1);
    }
  }
}

/// How far behind the wall clock `run` still fires missed minutes.
pub const MAX_CATCH_UP_MINUTES: i64 = 60;

/// Wall-clock time advanced by tokio's monotonic clock from a fixed anchor.
struct Clock {
  wall: DateTime<Utc>,
  instant: tokio::time::Instant,
}

impl Clock {
  fn start() -> Self {
    Self {
      wall: Utc::now(),
      instant: tokio::time::Instant::now(),
    }
  }

  fn now(&self) -> DateTime<Utc> {
    let elapsed = Duration::from_std(self.instant.elapsed()).unwrap_or_else(|_| Duration::zero());
    self.wall + elapsed
  }
}

fn minute_floor(at: DateTime<Utc>) -> DateTime<Utc> {
  at.duration_trunc(Duration::minutes(1)).unwrap_or(at)
}
