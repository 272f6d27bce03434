use std::path::Path;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::{DeadLetterEntry, DeadLetterSink, Error};

/// File name of the dead-letter database inside a data directory.
pub const DATABASE_FILE: &str = "cadence.db";

/// SQLite-based sink. Entries of every sink live in one `dead_letters`
/// table, keyed by sink name.
#[derive(Debug, Clone)]
pub struct SqliteDeadLetterSink {
  pool: SqlitePool,
  name: String,
}

impl SqliteDeadLetterSink {
  /// Create a sink over an existing connection pool.
  pub fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
    Self {
      pool,
      name: name.into(),
    }
  }

  /// Open (creating if needed) the database file at `path` and migrate it.
  pub async fn open(path: &Path, name: impl Into<String>) -> Result<Self, Error> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let sink = Self::new(pool, name);
    sink.migrate().await?;
    info!(path = %path.display(), sink = %sink.name, "dead_letter_store_opened");
    Ok(sink)
  }

  /// Open the sink in `data_dir`'s [`DATABASE_FILE`], creating the
  /// directory if needed.
  pub async fn open_in(data_dir: &Path, name: impl Into<String>) -> Result<Self, Error> {
    tokio::fs::create_dir_all(data_dir).await?;
    Self::open(&data_dir.join(DATABASE_FILE), name).await
  }

  /// A migrated, private in-memory database.
  pub async fn in_memory(name: impl Into<String>) -> Result<Self, Error> {
    // A single connection, otherwise each connection gets its own database.
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await?;
    let sink = Self::new(pool, name);
    sink.migrate().await?;
    Ok(sink)
  }

  /// Another sink sharing this sink's database.
  pub fn sibling(&self, name: impl Into<String>) -> Self {
    Self::new(self.pool.clone(), name)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }

  /// Close the underlying pool.
  pub async fn close(&self) {
    self.pool.close().await;
  }
}

#[async_trait]
impl DeadLetterSink for SqliteDeadLetterSink {
  fn name(&self) -> &str {
    &self.name
  }

  async fn enqueue(&self, entry: &DeadLetterEntry) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO dead_letters (entry_id, sink, rule_name, original_event, reason, enqueued_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&entry.entry_id)
    .bind(&self.name)
    .bind(&entry.rule_name)
    .bind(&entry.original_event)
    .bind(&entry.reason)
    .bind(entry.enqueued_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list(&self) -> Result<Vec<DeadLetterEntry>, Error> {
    let entries = sqlx::query_as(
      r#"
            SELECT entry_id, sink, rule_name, original_event, reason, enqueued_at
            FROM dead_letters
            WHERE sink = ?
            ORDER BY enqueued_at ASC, rowid ASC
            "#,
    )
    .bind(&self.name)
    .fetch_all(&self.pool)
    .await?;

    Ok(entries)
  }

  async fn get(&self, entry_id: &str) -> Result<DeadLetterEntry, Error> {
    sqlx::query_as(
      r#"
            SELECT entry_id, sink, rule_name, original_event, reason, enqueued_at
            FROM dead_letters
            WHERE sink = ? AND entry_id = ?
            "#,
    )
    .bind(&self.name)
    .bind(entry_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(entry_id.to_string()))
  }

  async fn remove(&self, entry_id: &str) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            DELETE FROM dead_letters
            WHERE sink = ? AND entry_id = ?
            "#,
    )
    .bind(&self.name)
    .bind(entry_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(entry_id.to_string()));
    }
    Ok(())
  }
}
