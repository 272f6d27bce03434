use std::collections::BTreeSet;

/// Capability passed into every invocation.
///
/// A run is started with a grant listing the tasks it may call; the invoker
/// rejects anything outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
  /// May invoke any registered task.
  Unrestricted,
  /// May invoke only the named tasks.
  Tasks(BTreeSet<String>),
}

impl Grant {
  pub fn tasks<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::Tasks(names.into_iter().map(Into::into).collect())
  }

  pub fn permits(&self, task: &str) -> bool {
    match self {
      Self::Unrestricted => true,
      Self::Tasks(names) => names.contains(task),
    }
  }
}
