use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::invoker::InvocationContext;

/// A unit of work that can be invoked by name.
#[async_trait]
pub trait TaskHandler: Send + Sync {
  async fn call(
    &self,
    ctx: &InvocationContext,
    input: serde_json::Value,
  ) -> Result<serde_json::Value, TaskError>;
}

/// Handlers keyed by task name.
#[derive(Clone, Default)]
pub struct TaskRegistry {
  handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a handler, replacing any previous handler with the same name.
  pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) -> &mut Self {
    self.handlers.insert(name.into(), handler);
    self
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
    self.handlers.get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.handlers.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.handlers.keys().map(String::as_str)
  }
}

impl std::fmt::Debug for TaskRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut names: Vec<_> = self.names().collect();
    names.sort_unstable();
    f.debug_struct("TaskRegistry").field("handlers", &names).finish()
  }
}
