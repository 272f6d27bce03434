//! Cadence Store
//!
//! Durable storage for trigger events that could not be delivered to the
//! engine.
//!
//! The [`DeadLetterSink`] trait is scoped to one named sink. Two
//! implementations are provided:
//! - [`SqliteDeadLetterSink`] persists entries with sqlx (several sinks may
//!   share one database)
//! - [`MemoryDeadLetterSink`] keeps entries in memory, for tests and
//!   embedding
//!
//! A process that runs the scheduler writes its entries to
//! [`DATABASE_FILE`] in its data directory ([`SqliteDeadLetterSink::open_in`]);
//! the `cadence dead-letters` command reads the same file.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryDeadLetterSink;
pub use sqlite::{DATABASE_FILE, SqliteDeadLetterSink};
pub use types::DeadLetterEntry;

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested entry was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Preparing the data directory failed.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// Applying migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// A durable queue of undeliverable trigger events.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
  /// Name rules use to address this sink.
  fn name(&self) -> &str;

  /// Durably record an entry.
  async fn enqueue(&self, entry: &DeadLetterEntry) -> Result<(), Error>;

  /// Entries of this sink, oldest first.
  async fn list(&self) -> Result<Vec<DeadLetterEntry>, Error>;

  /// Get one entry by id.
  async fn get(&self, entry_id: &str) -> Result<DeadLetterEntry, Error>;

  /// Remove an entry once it has been handled.
  async fn remove(&self, entry_id: &str) -> Result<(), Error>;
}
