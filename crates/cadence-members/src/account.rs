use serde::{Deserialize, Serialize};

/// A member account as returned by the directory.
///
/// Serialized with the field names the task payloads use:
/// `{"account_id", "account_email", "tech_owner_email"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAccount {
  pub account_id: String,
  #[serde(rename = "account_email", alias = "email")]
  pub email: String,
  /// Secondary owner address, provisioned and notified alongside `email`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tech_owner_email: Option<String>,
}

impl MemberAccount {
  pub fn new(account_id: impl Into<String>, email: impl Into<String>) -> Self {
    Self {
      account_id: account_id.into(),
      email: email.into(),
      tech_owner_email: None,
    }
  }

  pub fn with_tech_owner(mut self, email: impl Into<String>) -> Self {
    self.tech_owner_email = Some(email.into());
    self
  }

  /// Every address that should hold a verified identity.
  pub fn addresses(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.email.as_str()).chain(self.tech_owner_email.as_deref())
  }
}
