//! Fixtures shared by unit tests.

use crate::api::types::{Integration, Platform};

pub fn integration(platform: Platform, id: &str, name: &str) -> Integration {
  Integration {
    id: id.to_string(),
    name: name.to_string(),
    platform,
    organization_name: None,
    total_users: None,
    permissions: Default::default(),
    created_at: None,
    last_used_at: None,
    token_suffix: None,
    is_default: false,
  }
}

pub fn rootly_token() -> String {
  format!("rootly_{}", "a".repeat(64))
}
