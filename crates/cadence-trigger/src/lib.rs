//! Cadence Trigger
//!
//! Recurring triggers for workflows: cron expressions ([`CronSchedule`]),
//! validated [`ScheduleRule`]s and the [`Scheduler`] that fires them.
//!
//! Delivery to the engine is message passing through a
//! [`StartRequestTarget`] (normally the engine inbox's
//! `StartRequestSender`). Each fired event is delivered at most once; an
//! event that cannot be delivered goes to the rule's dead-letter sink.

mod cron;
mod error;
mod rule;
mod scheduler;
mod target;
mod types;

pub use cron::CronSchedule;
pub use error::TriggerError;
pub use rule::ScheduleRule;
pub use scheduler::{MAX_CATCH_UP_MINUTES, Scheduler};
pub use target::StartRequestTarget;
pub use types::{FireOutcome, TriggerEvent};
