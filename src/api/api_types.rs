//! Serde types matching backend response envelopes.
//!
//! Kept apart from the domain types so the envelopes can change shape
//! without touching the rest of the app.

use serde::{Deserialize, Serialize};

use super::types::{
  Integration, Invitation, ManualMapping, Member, Platform, Role, TokenPreview, TokenTestOutcome,
};

#[derive(Debug, Deserialize)]
pub struct ApiIntegrationList {
  #[serde(default)]
  pub integrations: Vec<ApiIntegration>,
}

/// Integration as listed by a platform endpoint. Older backends omit the
/// platform tag, so it is filled in from the endpoint that returned it.
#[derive(Debug, Deserialize)]
pub struct ApiIntegration {
  #[serde(flatten)]
  pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ApiIntegration {
  pub fn into_integration(mut self, platform: Platform) -> serde_json::Result<Integration> {
    self
      .fields
      .entry("platform")
      .or_insert_with(|| serde_json::Value::String(platform.slug().to_string()));
    serde_json::from_value(serde_json::Value::Object(self.fields))
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiIntegrationEnvelope {
  pub integration: ApiIntegration,
}

#[derive(Debug, Serialize)]
pub struct ApiTokenRequest<'a> {
  pub token: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub platform: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct ApiRenameRequest<'a> {
  pub name: &'a str,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiTokenTestResponse {
  #[serde(default)]
  pub valid: bool,
  #[serde(default)]
  pub preview: Option<TokenPreview>,
  #[serde(default)]
  pub account_info: Option<TokenPreview>,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub error_code: Option<String>,
  #[serde(default)]
  pub existing_integration: Option<String>,
}

impl From<ApiTokenTestResponse> for TokenTestOutcome {
  fn from(resp: ApiTokenTestResponse) -> Self {
    if let Some(name) = resp.existing_integration {
      return TokenTestOutcome::AlreadyConnected { name };
    }
    if resp.valid {
      return TokenTestOutcome::Valid(resp.preview.or(resp.account_info).unwrap_or_default());
    }
    TokenTestOutcome::Invalid(
      resp
        .error
        .or(resp.message)
        .or(resp.error_code)
        .unwrap_or_else(|| "token was not accepted".to_string()),
    )
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiAuthorizationUrl {
  pub authorization_url: String,
}

#[derive(Debug, Serialize)]
pub struct ApiOAuthCallback<'a> {
  pub code: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub state: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMappingList {
  #[serde(default)]
  pub mappings: Vec<ManualMapping>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMappingEnvelope {
  pub mapping: ManualMapping,
}

#[derive(Debug, Serialize)]
pub struct ApiMappingUpdate<'a> {
  pub target_identifier: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ApiMemberList {
  #[serde(default)]
  pub members: Vec<Member>,
}

#[derive(Debug, Deserialize)]
pub struct ApiInvitationList {
  #[serde(default)]
  pub invitations: Vec<Invitation>,
}

#[derive(Debug, Deserialize)]
pub struct ApiInvitationEnvelope {
  pub invitation: Invitation,
}

#[derive(Debug, Serialize)]
pub struct ApiInviteRequest<'a> {
  pub email: &'a str,
  pub role: Role,
}

/// Error body shapes seen from the backend: `{detail: "..."}`,
/// `{detail: {message, existing_integration}}`, `{message: "..."}`.
#[derive(Debug, Deserialize, Default)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub detail: Option<serde_json::Value>,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub existing_integration: Option<String>,
}

impl ApiErrorBody {
  pub fn message(&self) -> Option<String> {
    match &self.detail {
      Some(serde_json::Value::String(s)) => Some(s.clone()),
      Some(serde_json::Value::Object(obj)) => obj
        .get("message")
        .and_then(|v| v.as_str())
        .map(String::from),
      _ => None,
    }
    .or_else(|| self.message.clone())
  }

  pub fn existing_integration(&self) -> Option<String> {
    self.existing_integration.clone().or_else(|| {
      self
        .detail
        .as_ref()
        .and_then(|d| d.get("existing_integration"))
        .and_then(|v| v.as_str())
        .map(String::from)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_missing_platform_is_filled_from_endpoint() {
    let api: ApiIntegration = serde_json::from_value(json!({
      "id": 3,
      "name": "PD main"
    }))
    .unwrap();
    let integration = api.into_integration(Platform::PagerDuty).unwrap();
    assert_eq!(integration.platform, Platform::PagerDuty);
    assert_eq!(integration.id, "3");
  }

  #[test]
  fn test_token_test_duplicate_wins_over_valid() {
    let resp: ApiTokenTestResponse = serde_json::from_value(json!({
      "valid": false,
      "error_code": "DUPLICATE_TOKEN",
      "existing_integration": "Acme Corp"
    }))
    .unwrap();
    assert_eq!(
      TokenTestOutcome::from(resp),
      TokenTestOutcome::AlreadyConnected {
        name: "Acme Corp".to_string()
      }
    );
  }

  #[test]
  fn test_token_test_reads_account_info_alias() {
    let resp: ApiTokenTestResponse = serde_json::from_value(json!({
      "valid": true,
      "account_info": { "organization_name": "Acme", "total_users": 12 }
    }))
    .unwrap();
    match TokenTestOutcome::from(resp) {
      TokenTestOutcome::Valid(preview) => {
        assert_eq!(preview.organization_name.as_deref(), Some("Acme"));
        assert_eq!(preview.total_users, Some(12));
      }
      other => panic!("unexpected outcome {:?}", other),
    }
  }

  #[test]
  fn test_error_body_nested_detail() {
    let body: ApiErrorBody = serde_json::from_value(json!({
      "detail": { "message": "duplicate", "existing_integration": "Acme Corp" }
    }))
    .unwrap();
    assert_eq!(body.message().as_deref(), Some("duplicate"));
    assert_eq!(body.existing_integration().as_deref(), Some("Acme Corp"));
  }
}
