//! Cadence Members
//!
//! The member-account domain the reference workflows run over:
//!
//! - [`MemberAccount`] records produced by a [`MemberDirectory`]
//! - narrow collaborator traits for the external providers
//!   ([`IdentityProvisioner`], [`SummaryCollector`], [`Notifier`])
//! - the task handlers wrapping them ([`tasks`])
//! - the reference workflow and schedule definitions ([`reference`])

mod account;
mod collaborators;
pub mod reference;
pub mod tasks;

pub use account::MemberAccount;
pub use collaborators::{
  CollaboratorError, EmailReceipt, IdentityProvisioner, IdentityStatus, MemberDirectory, Notifier,
  SummaryCollector, SummaryPayload,
};
