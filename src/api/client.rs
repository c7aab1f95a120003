use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use url::Url;

use crate::api::api_types::{
  ApiAuthorizationUrl, ApiErrorBody, ApiIntegrationEnvelope, ApiIntegrationList,
  ApiInvitationEnvelope, ApiInvitationList, ApiInviteRequest, ApiMappingEnvelope,
  ApiMappingList, ApiMappingUpdate, ApiMemberList, ApiOAuthCallback, ApiRenameRequest,
  ApiTokenRequest, ApiTokenTestResponse,
};
use crate::api::types::{
  EnrichmentStatus, Integration, Invitation, ManualMapping, Member, NewMapping, Platform, Role,
  TokenTestOutcome, UserProfile,
};
use crate::error::ApiError;
use crate::validation;

/// Backend REST client.
///
/// Clones share the bearer token, so signing in from one view is seen by
/// every background task holding a clone.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
  pub fn new(base_url: &str, token: Option<String>) -> color_eyre::Result<Self> {
    let base_url = Url::parse(base_url)
      .map_err(|e| color_eyre::eyre::eyre!("Invalid API url '{}': {}", base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(color_eyre::eyre::eyre!("API url '{}' cannot be a base", base_url));
    }

    let http = reqwest::Client::builder()
      .user_agent(concat!("b9s/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| color_eyre::eyre::eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      token: Arc::new(RwLock::new(token.filter(|t| !t.trim().is_empty()))),
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn has_token(&self) -> bool {
    self.token.read().map(|t| t.is_some()).unwrap_or(false)
  }

  /// Replace the bearer token for this client and all of its clones.
  pub fn set_token(&self, token: Option<String>) {
    if let Ok(mut guard) = self.token.write() {
      *guard = token.filter(|t| !t.trim().is_empty());
    }
  }

  fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| ApiError::Validation(format!("{} cannot be a base url", self.base_url)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
    let token = self
      .token
      .read()
      .ok()
      .and_then(|t| (*t).clone())
      .ok_or(ApiError::Unauthorized)?;
    let url = self.endpoint(segments)?;
    debug!(%method, %url, "api request");
    Ok(self.http.request(method, url).bearer_auth(token))
  }

  async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
    let response = builder.send().await?;
    check_status(response).await
  }

  async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
    let response = self.send(builder).await?;
    response
      .json::<T>()
      .await
      .map_err(|e| ApiError::Decode(e.to_string()))
  }

  async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
    self.send_json(self.request(Method::GET, segments)?).await
  }

  async fn post_json<B: Serialize, T: DeserializeOwned>(
    &self,
    segments: &[&str],
    body: &B,
  ) -> Result<T, ApiError> {
    self
      .send_json(self.request(Method::POST, segments)?.json(body))
      .await
  }

  // ==========================================================================
  // Integrations
  // ==========================================================================

  /// List integrations on an incident platform (Rootly, PagerDuty)
  pub async fn list_integrations(&self, platform: Platform) -> Result<Vec<Integration>, ApiError> {
    require_incident_source(platform)?;
    let list: ApiIntegrationList = self.get_json(&[platform.slug(), "integrations"]).await?;

    let mut integrations = Vec::with_capacity(list.integrations.len());
    for api in list.integrations {
      match api.into_integration(platform) {
        Ok(integration) => integrations.push(integration),
        Err(e) => warn!(%platform, error = %e, "skipping malformed integration"),
      }
    }
    Ok(integrations)
  }

  /// Connection status of an enrichment platform (GitHub, Slack)
  pub async fn enrichment_status(&self, platform: Platform) -> Result<EnrichmentStatus, ApiError> {
    require_enrichment(platform)?;
    self
      .get_json(&["integrations", platform.slug(), "status"])
      .await
  }

  /// Ask the backend whether a raw token works, without storing it.
  pub async fn test_token(
    &self,
    platform: Platform,
    token: &str,
  ) -> Result<TokenTestOutcome, ApiError> {
    require_incident_source(platform)?;
    validation::validate_token(platform, token)?;

    let body = ApiTokenRequest {
      token: token.trim(),
      name: None,
      platform: None,
    };
    let response = self
      .request(Method::POST, &[platform.slug(), "token", "test"])?
      .json(&body)
      .send()
      .await?;

    match response.status() {
      StatusCode::CONFLICT | StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
        let status = response.status();
        let body: ApiErrorBody = response.json().await.unwrap_or_default();
        if let Some(name) = body.existing_integration() {
          return Ok(TokenTestOutcome::AlreadyConnected { name });
        }
        Ok(TokenTestOutcome::Invalid(
          body.message().unwrap_or_else(|| status.to_string()),
        ))
      }
      _ => {
        let response = check_status(response).await?;
        let parsed: ApiTokenTestResponse = response
          .json()
          .await
          .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(parsed.into())
      }
    }
  }

  /// Store a new integration. Rootly and PagerDuty need a display name;
  /// GitHub takes a personal access token only.
  pub async fn add_integration(
    &self,
    platform: Platform,
    token: &str,
    name: &str,
  ) -> Result<Integration, ApiError> {
    validation::validate_token(platform, token)?;
    let token = token.trim();
    let name = name.trim();

    let (segments, body): (&[&str], ApiTokenRequest) = match platform {
      Platform::Rootly => {
        validation::validate_name(name)?;
        (
          &["rootly", "token", "add"][..],
          ApiTokenRequest {
            token,
            name: Some(name),
            platform: None,
          },
        )
      }
      Platform::PagerDuty => {
        validation::validate_name(name)?;
        (
          &["pagerduty", "integrations"][..],
          ApiTokenRequest {
            token,
            name: Some(name),
            platform: Some("pagerduty"),
          },
        )
      }
      Platform::GitHub => (
        &["integrations", "github", "token"][..],
        ApiTokenRequest {
          token,
          name: None,
          platform: None,
        },
      ),
      Platform::Slack => {
        return Err(validation::ValidationError::TokenNotSupported { platform }.into());
      }
    };

    let envelope: ApiIntegrationEnvelope = self.post_json(segments, &body).await?;
    envelope
      .integration
      .into_integration(platform)
      .map_err(|e| ApiError::Decode(e.to_string()))
  }

  pub async fn rename_integration(
    &self,
    platform: Platform,
    id: &str,
    name: &str,
  ) -> Result<(), ApiError> {
    require_incident_source(platform)?;
    validation::validate_name(name)?;
    let builder = self
      .request(Method::PUT, &[platform.slug(), "integrations", id])?
      .json(&ApiRenameRequest { name: name.trim() });
    self.send(builder).await?;
    Ok(())
  }

  /// Delete an incident integration, or disconnect an enrichment platform.
  pub async fn delete_integration(&self, platform: Platform, id: &str) -> Result<(), ApiError> {
    let builder = if platform.is_incident_source() {
      self.request(Method::DELETE, &[platform.slug(), "integrations", id])?
    } else {
      self.request(
        Method::DELETE,
        &["integrations", platform.slug(), "disconnect"],
      )?
    };
    self.send(builder).await?;
    Ok(())
  }

  /// Authorization URL for the provider's consent screen.
  pub async fn start_oauth(&self, platform: Platform) -> Result<String, ApiError> {
    require_enrichment(platform)?;
    let resp: ApiAuthorizationUrl = self
      .get_json(&["integrations", platform.slug(), "connect"])
      .await?;
    Ok(resp.authorization_url)
  }

  /// Hand the provider's redirect parameters to the backend, which performs
  /// the token exchange.
  pub async fn complete_oauth(
    &self,
    platform: Platform,
    code: &str,
    state: Option<&str>,
  ) -> Result<(), ApiError> {
    require_enrichment(platform)?;
    if code.trim().is_empty() {
      return Err(validation::ValidationError::Required("authorization code").into());
    }
    let builder = self
      .request(Method::POST, &["integrations", platform.slug(), "callback"])?
      .json(&ApiOAuthCallback { code, state });
    self.send(builder).await?;
    Ok(())
  }

  pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
    self.get_json(&["auth", "user", "me"]).await
  }

  // ==========================================================================
  // Manual mappings
  // ==========================================================================

  pub async fn list_mappings(&self) -> Result<Vec<ManualMapping>, ApiError> {
    let list: ApiMappingList = self.get_json(&["mappings", "manual"]).await?;
    Ok(list.mappings)
  }

  pub async fn create_mapping(&self, mapping: &NewMapping) -> Result<ManualMapping, ApiError> {
    validation::validate_mapping(
      &mapping.source_identifier,
      mapping.target_platform,
      &mapping.target_identifier,
    )?;
    let envelope: ApiMappingEnvelope = self.post_json(&["mappings", "manual"], mapping).await?;
    Ok(envelope.mapping)
  }

  pub async fn update_mapping(
    &self,
    id: &str,
    target_platform: Platform,
    target_identifier: &str,
  ) -> Result<ManualMapping, ApiError> {
    validation::validate_mapping_target(target_platform, target_identifier)?;
    let builder = self
      .request(Method::PUT, &["mappings", "manual", id])?
      .json(&ApiMappingUpdate {
        target_identifier: target_identifier.trim(),
      });
    let envelope: ApiMappingEnvelope = self.send_json(builder).await?;
    Ok(envelope.mapping)
  }

  pub async fn delete_mapping(&self, id: &str) -> Result<(), ApiError> {
    self
      .send(self.request(Method::DELETE, &["mappings", "manual", id])?)
      .await?;
    Ok(())
  }

  // ==========================================================================
  // Organization membership
  // ==========================================================================

  pub async fn list_members(&self) -> Result<Vec<Member>, ApiError> {
    let list: ApiMemberList = self.get_json(&["organizations", "members"]).await?;
    Ok(list.members)
  }

  pub async fn list_invitations(&self) -> Result<Vec<Invitation>, ApiError> {
    let list: ApiInvitationList = self.get_json(&["organizations", "invitations"]).await?;
    Ok(list.invitations)
  }

  pub async fn invite(&self, email: &str, role: Role) -> Result<Invitation, ApiError> {
    validation::validate_email(email)?;
    let envelope: ApiInvitationEnvelope = self
      .post_json(
        &["organizations", "invitations"],
        &ApiInviteRequest {
          email: email.trim(),
          role,
        },
      )
      .await?;
    Ok(envelope.invitation)
  }

  pub async fn revoke_invitation(&self, id: &str) -> Result<(), ApiError> {
    self
      .send(self.request(Method::DELETE, &["organizations", "invitations", id])?)
      .await?;
    Ok(())
  }
}

fn require_incident_source(platform: Platform) -> Result<(), ApiError> {
  if platform.is_incident_source() {
    Ok(())
  } else {
    Err(ApiError::Validation(format!(
      "{} integrations are managed through connect/disconnect",
      platform
    )))
  }
}

fn require_enrichment(platform: Platform) -> Result<(), ApiError> {
  if platform.is_incident_source() {
    Err(ApiError::Validation(format!(
      "{} has no connection status",
      platform
    )))
  } else {
    Ok(())
  }
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(response: Response) -> Result<Response, ApiError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  if status == StatusCode::UNAUTHORIZED {
    return Err(ApiError::Unauthorized);
  }

  let body: ApiErrorBody = response.json().await.unwrap_or_default();
  if status == StatusCode::CONFLICT {
    if let Some(name) = body.existing_integration() {
      return Err(ApiError::AlreadyConnected { name });
    }
  }
  Err(ApiError::Status {
    status: status.as_u16(),
    message: body
      .message()
      .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::rootly_token;
  use serde_json::json;
  use wiremock::matchers::{body_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.uri(), Some("session-token".to_string())).unwrap()
  }

  #[tokio::test]
  async fn test_missing_token_is_unauthorized_without_request() {
    let server = MockServer::start().await;
    let client = ApiClient::new(&server.uri(), None).unwrap();

    let err = client.list_integrations(Platform::Rootly).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
    assert!(server.received_requests().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_list_sends_bearer_and_tags_platform() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/pagerduty/integrations"))
      .and(header("authorization", "Bearer session-token"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "integrations": [
          { "id": "P1", "name": "PD main", "token_suffix": "9f3a" },
          { "name": "missing id" }
        ]
      })))
      .mount(&server)
      .await;

    let client = client_for(&server).await;
    let list = client.list_integrations(Platform::PagerDuty).await.unwrap();

    assert_eq!(list.len(), 1);
    assert_eq!(list[0].platform, Platform::PagerDuty);
    assert_eq!(list[0].token_suffix.as_deref(), Some("9f3a"));
  }

  #[tokio::test]
  async fn test_base_path_is_preserved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/integrations/slack/status"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "connected": false })))
      .mount(&server)
      .await;

    let client =
      ApiClient::new(&format!("{}/api/", server.uri()), Some("t".to_string())).unwrap();
    let status = client.enrichment_status(Platform::Slack).await.unwrap();
    assert!(!status.connected);
  }

  #[tokio::test]
  async fn test_token_test_reports_existing_integration() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rootly/token/test"))
      .and(body_json(json!({ "token": rootly_token() })))
      .respond_with(ResponseTemplate::new(409).set_body_json(json!({
        "detail": {
          "message": "This token is already connected",
          "existing_integration": "Acme Corp"
        }
      })))
      .mount(&server)
      .await;

    let client = client_for(&server).await;
    let outcome = client
      .test_token(Platform::Rootly, &rootly_token())
      .await
      .unwrap();

    assert_eq!(
      outcome,
      TokenTestOutcome::AlreadyConnected {
        name: "Acme Corp".to_string()
      }
    );
    assert_eq!(outcome.message(), "Already connected as Acme Corp");
  }

  #[tokio::test]
  async fn test_malformed_token_never_reaches_server() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;

    let err = client
      .test_token(Platform::Rootly, &format!("rootly_{}", "a".repeat(63)))
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_add_pagerduty_posts_platform() {
    let server = MockServer::start().await;
    let token = "u+AbCdEfGhIjKlMnOpQr";
    Mock::given(method("POST"))
      .and(path("/pagerduty/integrations"))
      .and(body_json(json!({
        "token": token,
        "name": "PD main",
        "platform": "pagerduty"
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "integration": { "id": 77, "name": "PD main" }
      })))
      .mount(&server)
      .await;

    let client = client_for(&server).await;
    let integration = client
      .add_integration(Platform::PagerDuty, token, " PD main ")
      .await
      .unwrap();

    assert_eq!(integration.id, "77");
    assert_eq!(integration.platform, Platform::PagerDuty);
  }

  #[tokio::test]
  async fn test_delete_enrichment_uses_disconnect() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/integrations/github/disconnect"))
      .respond_with(ResponseTemplate::new(200))
      .expect(1)
      .mount(&server)
      .await;

    let client = client_for(&server).await;
    client
      .delete_integration(Platform::GitHub, "github")
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_status_errors_carry_detail() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .and(path("/rootly/integrations/12"))
      .respond_with(
        ResponseTemplate::new(404).set_body_json(json!({ "detail": "Integration not found" })),
      )
      .mount(&server)
      .await;

    let client = client_for(&server).await;
    let err = client
      .rename_integration(Platform::Rootly, "12", "New name")
      .await
      .unwrap_err();

    assert_eq!(
      err,
      ApiError::Status {
        status: 404,
        message: "Integration not found".to_string()
      }
    );
  }

  #[tokio::test]
  async fn test_rejected_session_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/mappings/manual"))
      .respond_with(ResponseTemplate::new(401))
      .mount(&server)
      .await;

    let client = client_for(&server).await;
    assert_eq!(
      client.list_mappings().await.unwrap_err(),
      ApiError::Unauthorized
    );
  }

  #[tokio::test]
  async fn test_shared_token_across_clones() {
    let server = MockServer::start().await;
    let client = ApiClient::new(&server.uri(), None).unwrap();
    let clone = client.clone();

    assert!(!clone.has_token());
    client.set_token(Some("fresh".to_string()));
    assert!(clone.has_token());
    client.set_token(Some("  ".to_string()));
    assert!(!clone.has_token());
  }
}
