//! Typed, versioned view over a [`KeyValueStore`].
//!
//! Keys look like `b9s:<namespace>:v<version>:<name>`. The namespace is derived
//! from the API base URL so state from two backends never mixes; bumping
//! [`SCHEMA_VERSION`] makes older layouts invisible without deleting them.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use super::kv::KeyValueStore;
use crate::api::types::{OrganizationRef, UserProfile};

pub const SCHEMA_VERSION: u32 = 2;

/// Every value the client persists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKey {
  /// Integrations, enrichment statuses and fetch time as one record
  Snapshot,
  SelectedOrganization,
  UserProfile,
  AuthToken,
}

impl StateKey {
  pub const ALL: [StateKey; 4] = [
    StateKey::Snapshot,
    StateKey::SelectedOrganization,
    StateKey::UserProfile,
    StateKey::AuthToken,
  ];

  fn name(&self) -> &'static str {
    match self {
      StateKey::Snapshot => "snapshot",
      StateKey::SelectedOrganization => "selected_organization",
      StateKey::UserProfile => "user_profile",
      StateKey::AuthToken => "auth_token",
    }
  }
}

#[derive(Clone)]
pub struct PersistedState {
  store: Arc<dyn KeyValueStore>,
  prefix: String,
}

impl PersistedState {
  pub fn new(store: Arc<dyn KeyValueStore>, api_url: &str) -> Self {
    Self {
      store,
      prefix: format!("b9s:{}:v{}", namespace_for(api_url), SCHEMA_VERSION),
    }
  }

  fn key(&self, key: StateKey) -> String {
    format!("{}:{}", self.prefix, key.name())
  }

  /// Read and decode a value. Anything unparseable counts as absent.
  pub fn read<T: DeserializeOwned>(&self, key: StateKey) -> Option<T> {
    let full_key = self.key(key);
    let raw = self.store.get(&full_key)?;
    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(key = %full_key, error = %e, "discarding unreadable state entry");
        None
      }
    }
  }

  pub fn write<T: Serialize + ?Sized>(&self, key: StateKey, value: &T) {
    let full_key = self.key(key);
    match serde_json::to_string(value) {
      Ok(raw) => self.store.set(&full_key, &raw),
      Err(e) => warn!(key = %full_key, error = %e, "failed to serialize state entry"),
    }
  }

  pub fn clear(&self, key: StateKey) {
    self.store.remove(&self.key(key));
  }

  /// Raw access for tests that need to corrupt an entry.
  #[cfg(test)]
  pub fn write_raw(&self, key: StateKey, raw: &str) {
    self.store.set(&self.key(key), raw);
  }

  pub fn auth_token(&self) -> Option<String> {
    self
      .read::<String>(StateKey::AuthToken)
      .filter(|t| !t.trim().is_empty())
  }

  pub fn set_auth_token(&self, token: Option<&str>) {
    match token {
      Some(token) => self.write(StateKey::AuthToken, token),
      None => self.clear(StateKey::AuthToken),
    }
  }

  pub fn selected_organization(&self) -> Option<OrganizationRef> {
    self.read(StateKey::SelectedOrganization)
  }

  pub fn set_selected_organization(&self, org: Option<&OrganizationRef>) {
    match org {
      Some(org) => self.write(StateKey::SelectedOrganization, org),
      None => self.clear(StateKey::SelectedOrganization),
    }
  }

  pub fn user_profile(&self) -> Option<UserProfile> {
    self.read(StateKey::UserProfile)
  }

  pub fn set_user_profile(&self, profile: &UserProfile) {
    self.write(StateKey::UserProfile, profile);
  }

  /// Forget everything tied to the signed-in session.
  pub fn clear_session(&self) {
    for key in StateKey::ALL {
      self.clear(key);
    }
  }
}

/// Short stable digest of the API base URL.
fn namespace_for(api_url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(api_url.trim_end_matches('/').as_bytes());
  let digest = hex::encode(hasher.finalize());
  digest[..12].to_string()
}
