//! Cadence Runtime
//!
//! This crate interprets a locked [`cadence_workflow::Workflow`]. A single
//! recursive interpreter walks the state arena:
//!
//! ```text
//! Runtime::invoke(run, input)
//! └── Chain      - children in order, output i feeds input i+1, fail-fast
//!     ├── Task   - TaskInvoker::invoke (grant, timeout, retry)
//!     └── FanOut - items selector -> item chains behind a semaphore
//!                  results land in write-once, index-isolated slots
//! ```
//!
//! Top-level progress (the current payload and every top-level fan-out's
//! per-item slots) is published through [`RunProgress`] so the engine can
//! report status while a run is still executing. Observers can also
//! subscribe to [`ExecutionEvent`]s through an [`ExecutionNotifier`].

mod error;
mod events;
mod execution;
mod items;
mod progress;
mod result;
mod runtime;

pub use error::RuntimeError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use items::{ItemsSelector, validate_selectors};
pub use progress::{FanOutReport, RunProgress};
pub use result::{FanOutOutcome, ItemResult, ItemStatus};
pub use runtime::{RunContext, Runtime};
