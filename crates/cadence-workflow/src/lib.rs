//! Cadence Workflow
//!
//! This crate provides the "locked" workflow representation for Cadence.
//! A locked workflow is a validated form of a [`cadence_config::WorkflowDef`]
//! that is ready for execution.
//!
//! Key differences from `cadence-config`:
//! - The state tree is flattened into an arena; children are referenced by
//!   [`StateId`] instead of being owned inline
//! - Every fan-out has a concurrency ceiling of at least one
//! - Task timeouts and retry policies are checked
//! - The root is always a chain

mod error;
mod state;
mod workflow;

pub use error::WorkflowError;
pub use state::{LockedFanOut, LockedTask, RetryPolicy, State, StateId, StateKind};
pub use workflow::Workflow;
