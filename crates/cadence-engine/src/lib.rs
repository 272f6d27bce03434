//! Cadence Workflow Engine
//!
//! This crate owns the lifecycle of workflow runs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EngineInbox                          │
//! │  - owns mpsc channel of start requests (+ oneshot replies)  │
//! │  - sender() hands out StartRequestSender for triggers       │
//! │  - start(cancel) runs the receive loop                      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowEngine                         │
//! │  - register(workflow) validates handlers + items selectors  │
//! │  - start(workflow_id, input) → run_id (non-blocking)        │
//! │  - status / cancel / wait / shutdown                        │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Runtime                             │
//! │  - chain + bounded fan-out interpretation                   │
//! │  - TaskInvoker per task                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let engine = WorkflowEngine::new(EngineConfig::default(), registry);
//! engine.register(workflow)?;
//!
//! let run_id = engine.start("summary-report", serde_json::json!({}))?;
//! let status = engine.wait(&run_id).await?;
//! ```

mod config;
mod engine;
mod error;
mod inbox;
mod run;

pub use config::EngineConfig;
pub use engine::WorkflowEngine;
pub use error::{DeliveryError, EngineError};
pub use inbox::{EngineInbox, StartRequest, StartRequestSender};
pub use run::{RunPhase, RunStatus};
