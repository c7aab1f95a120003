use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Platforms an organization can connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
  Rootly,
  #[serde(rename = "pagerduty")]
  PagerDuty,
  #[serde(rename = "github")]
  GitHub,
  Slack,
}

impl Platform {
  pub const ALL: [Platform; 4] = [
    Platform::Rootly,
    Platform::PagerDuty,
    Platform::GitHub,
    Platform::Slack,
  ];

  /// Path segment used by the backend
  pub fn slug(&self) -> &'static str {
    match self {
      Platform::Rootly => "rootly",
      Platform::PagerDuty => "pagerduty",
      Platform::GitHub => "github",
      Platform::Slack => "slack",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Platform::Rootly => "Rootly",
      Platform::PagerDuty => "PagerDuty",
      Platform::GitHub => "GitHub",
      Platform::Slack => "Slack",
    }
  }

  /// Incident platforms hold the organizations that get analyzed.
  /// The others only enrich those analyses.
  pub fn is_incident_source(&self) -> bool {
    matches!(self, Platform::Rootly | Platform::PagerDuty)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl FromStr for Platform {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "rootly" => Ok(Platform::Rootly),
      "pagerduty" | "pd" => Ok(Platform::PagerDuty),
      "github" | "gh" => Ok(Platform::GitHub),
      "slack" => Ok(Platform::Slack),
      other => Err(format!("unknown platform '{}'", other)),
    }
  }
}

/// Whether the stored token can reach one capability on the platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
  #[serde(default)]
  pub access: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// One connected account on a platform
/// The organization analyses run against. Ids are only unique per platform,
/// so the platform is part of the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRef {
  pub platform: Platform,
  pub id: String,
}

impl OrganizationRef {
  pub fn new(platform: Platform, id: impl Into<String>) -> Self {
    Self {
      platform,
      id: id.into(),
    }
  }

  pub fn is(&self, platform: Platform, id: &str) -> bool {
    self.platform == platform && self.id == id
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
  #[serde(deserialize_with = "deserialize_opaque_id")]
  pub id: String,
  pub name: String,
  pub platform: Platform,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub organization_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total_users: Option<u64>,
  #[serde(default)]
  pub permissions: BTreeMap<String, Permission>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_used_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub token_suffix: Option<String>,
  #[serde(default)]
  pub is_default: bool,
}

impl Integration {
  /// Identity within a cached list
  pub fn key(&self) -> (Platform, &str) {
    (self.platform, self.id.as_str())
  }

  pub fn org_ref(&self) -> OrganizationRef {
    OrganizationRef::new(self.platform, &self.id)
  }

  /// Capabilities the token is missing, with the backend's reason if any
  pub fn missing_permissions(&self) -> Vec<(&str, Option<&str>)> {
    self
      .permissions
      .iter()
      .filter(|(_, p)| !p.access)
      .map(|(name, p)| (name.as_str(), p.error.as_deref()))
      .collect()
  }
}

/// Connection state of an enrichment platform (GitHub, Slack)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentStatus {
  #[serde(default)]
  pub connected: bool,
  #[serde(default)]
  pub integration: Option<serde_json::Value>,
}

impl EnrichmentStatus {
  pub fn disconnected() -> Self {
    Self::default()
  }

  /// Human label for the connected account, e.g. a GitHub login or Slack workspace
  pub fn account_label(&self) -> Option<String> {
    let obj = self.integration.as_ref()?.as_object()?;
    ["github_username", "workspace_name", "name"]
      .iter()
      .find_map(|field| obj.get(*field).and_then(|v| v.as_str()))
      .map(String::from)
  }

  /// Project a connected status into a list row for the merged view.
  pub fn to_integration(&self, platform: Platform) -> Option<Integration> {
    if !self.connected {
      return None;
    }
    let obj = self.integration.as_ref().and_then(|v| v.as_object());
    let field = |name: &str| obj.and_then(|o| o.get(name));

    let id = field("id")
      .and_then(opaque_id_from_value)
      .unwrap_or_else(|| platform.slug().to_string());
    let timestamp = |name: &str| {
      field(name)
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
    };

    Some(Integration {
      id,
      name: self
        .account_label()
        .unwrap_or_else(|| platform.label().to_string()),
      platform,
      organization_name: field("workspace_name")
        .or_else(|| field("organization"))
        .and_then(|v| v.as_str())
        .map(String::from),
      total_users: None,
      permissions: BTreeMap::new(),
      created_at: timestamp("connected_at"),
      last_used_at: timestamp("last_used_at"),
      token_suffix: field("token_suffix")
        .and_then(|v| v.as_str())
        .map(String::from),
      is_default: false,
    })
  }
}

/// What the backend found when it tried a raw token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPreview {
  #[serde(default)]
  pub organization_name: Option<String>,
  #[serde(default)]
  pub suggested_name: Option<String>,
  #[serde(default)]
  pub total_users: Option<u64>,
  #[serde(default)]
  pub permissions: BTreeMap<String, Permission>,
}

/// Result of testing a token before adding it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTestOutcome {
  Valid(TokenPreview),
  Invalid(String),
  /// Not a failure: the account is already registered under this name
  AlreadyConnected { name: String },
}

impl TokenTestOutcome {
  pub fn message(&self) -> String {
    match self {
      TokenTestOutcome::Valid(preview) => match &preview.organization_name {
        Some(org) => format!("Token is valid for {}", org),
        None => "Token is valid".to_string(),
      },
      TokenTestOutcome::Invalid(reason) => format!("Token rejected: {}", reason),
      TokenTestOutcome::AlreadyConnected { name } => format!("Already connected as {}", name),
    }
  }
}

/// User-declared identity correlation between platforms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualMapping {
  #[serde(deserialize_with = "deserialize_opaque_id")]
  pub id: String,
  pub source_platform: String,
  pub source_identifier: String,
  pub target_platform: Platform,
  pub target_identifier: String,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
}

/// Fields for creating a mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMapping {
  pub source_platform: String,
  pub source_identifier: String,
  pub target_platform: Platform,
  pub target_identifier: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  #[default]
  Member,
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Role::Admin => f.write_str("admin"),
      Role::Member => f.write_str("member"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
  #[serde(deserialize_with = "deserialize_opaque_id")]
  pub id: String,
  #[serde(default)]
  pub name: Option<String>,
  pub email: String,
  #[serde(default)]
  pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
  #[serde(deserialize_with = "deserialize_opaque_id")]
  pub id: String,
  pub email: String,
  #[serde(default)]
  pub role: Role,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub expires_at: Option<DateTime<Utc>>,
}

/// Display fields of the signed-in user, cached for the header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub organization_name: Option<String>,
}

impl UserProfile {
  pub fn display_name(&self) -> &str {
    self
      .name
      .as_deref()
      .or(self.email.as_deref())
      .unwrap_or("unknown user")
  }
}

fn opaque_id_from_value(value: &serde_json::Value) -> Option<String> {
  match value {
    serde_json::Value::String(s) => Some(s.clone()),
    serde_json::Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// The backend sends ids as numbers for some platforms and strings for others.
fn deserialize_opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  let value = serde_json::Value::deserialize(deserializer)?;
  opaque_id_from_value(&value)
    .ok_or_else(|| serde::de::Error::custom(format!("expected string or number id, got {}", value)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_platform_round_trips_through_slug() {
    for platform in Platform::ALL {
      assert_eq!(platform.slug().parse::<Platform>(), Ok(platform));
    }
    assert!("opsgenie".parse::<Platform>().is_err());
  }

  #[test]
  fn test_integration_accepts_numeric_id() {
    let integration: Integration = serde_json::from_value(json!({
      "id": 42,
      "name": "Acme Prod",
      "platform": "rootly",
      "permissions": {
        "users": { "access": true },
        "incidents": { "access": false, "error": "missing scope" }
      }
    }))
    .unwrap();

    assert_eq!(integration.id, "42");
    assert_eq!(integration.key(), (Platform::Rootly, "42"));
    assert_eq!(
      integration.missing_permissions(),
      vec![("incidents", Some("missing scope"))]
    );
  }

  #[test]
  fn test_connected_status_becomes_row() {
    let status = EnrichmentStatus {
      connected: true,
      integration: Some(json!({
        "id": "gh-7",
        "github_username": "octo-ops",
        "connected_at": "2024-03-01T10:00:00Z"
      })),
    };

    let row = status.to_integration(Platform::GitHub).unwrap();
    assert_eq!(row.id, "gh-7");
    assert_eq!(row.name, "octo-ops");
    assert_eq!(row.platform, Platform::GitHub);
    assert!(row.created_at.is_some());

    assert!(EnrichmentStatus::disconnected()
      .to_integration(Platform::Slack)
      .is_none());
  }

  #[test]
  fn test_already_connected_message_names_integration() {
    let outcome = TokenTestOutcome::AlreadyConnected {
      name: "Acme Corp".to_string(),
    };
    assert_eq!(outcome.message(), "Already connected as Acme Corp");
  }
}
