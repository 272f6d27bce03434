use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{DeadLetterEntry, DeadLetterSink, Error};

/// In-memory sink. Entries are lost when it is dropped.
#[derive(Debug)]
pub struct MemoryDeadLetterSink {
  name: String,
  entries: RwLock<Vec<DeadLetterEntry>>,
}

impl MemoryDeadLetterSink {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      entries: RwLock::new(Vec::new()),
    }
  }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
  fn name(&self) -> &str {
    &self.name
  }

  async fn enqueue(&self, entry: &DeadLetterEntry) -> Result<(), Error> {
    self.entries.write().await.push(entry.clone());
    Ok(())
  }

  async fn list(&self) -> Result<Vec<DeadLetterEntry>, Error> {
    Ok(self.entries.read().await.clone())
  }

  async fn get(&self, entry_id: &str) -> Result<DeadLetterEntry, Error> {
    self
      .entries
      .read()
      .await
      .iter()
      .find(|e| e.entry_id == entry_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(entry_id.to_string()))
  }

  async fn remove(&self, entry_id: &str) -> Result<(), Error> {
    let mut entries = self.entries.write().await;
    let before = entries.len();
    entries.retain(|e| e.entry_id != entry_id);
    if entries.len() == before {
      return Err(Error::NotFound(entry_id.to_string()));
    }
    Ok(())
  }
}
