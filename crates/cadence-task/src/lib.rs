//! Cadence Task
//!
//! The lowest-level execution primitive: invoking one named unit of work.
//!
//! A [`TaskHandler`] implements the work (usually by calling an external
//! collaborator). Handlers are registered by name in a [`TaskRegistry`], and
//! the [`TaskInvoker`] looks them up, checks the caller's [`Grant`], applies
//! the task timeout and explicit retry policy, and reports a typed
//! [`FailureReason`] when the work does not succeed.

mod error;
mod failure;
mod grant;
mod invoker;
mod registry;

pub use error::TaskError;
pub use failure::{FailureKind, FailureReason};
pub use grant::Grant;
pub use invoker::{InvocationContext, TaskInvoker};
pub use registry::{TaskHandler, TaskRegistry};
