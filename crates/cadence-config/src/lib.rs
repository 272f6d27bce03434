//! Cadence Config
//!
//! This crate contains the serializable configuration types for Cadence.
//! These types represent workflow and schedule definitions before they are
//! validated and locked by `cadence-workflow` and `cadence-trigger`.
//!
//! Configuration is loaded from a JSON manifest:
//!
//! ```json
//! {
//!   "workflows": [
//!     {
//!       "workflow_id": "summary-report",
//!       "name": "Summary Report",
//!       "states": [
//!         { "type": "task", "name": "FetchMemberList", "timeout_ms": 300000 },
//!         {
//!           "type": "fan_out",
//!           "name": "EachAccount",
//!           "items": "$.member_list",
//!           "max_concurrency": 1,
//!           "body": [
//!             { "type": "task", "name": "CollectSummary", "timeout_ms": 900000 },
//!             { "type": "task", "name": "SendEmail", "timeout_ms": 900000 }
//!           ]
//!         }
//!       ]
//!     }
//!   ],
//!   "schedules": [
//!     {
//!       "name": "weekly-summary",
//!       "cron": "0 9 * * MON",
//!       "target_workflow": "summary-report",
//!       "dead_letter_sink": "summary-dlq"
//!     }
//!   ]
//! }
//! ```

mod enums;
mod manifest;
mod schedule;
mod state;
mod task;
mod workflow;

pub use enums::RetryBackoff;
pub use manifest::Manifest;
pub use schedule::ScheduleRuleDef;
pub use state::{FanOutDef, StateDef};
pub use task::{RetryPolicyDef, TaskDef};
pub use workflow::WorkflowDef;
