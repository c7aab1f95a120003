//! Client-side form checks. A failure blocks submission and is shown inline.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::api::types::Platform;

static ROOTLY_TOKEN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^rootly_[0-9a-f]{64}$").expect("valid regex"));
static PAGERDUTY_TOKEN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_+\-]{20,}$").expect("valid regex"));
static GITHUB_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(ghp_[A-Za-z0-9]{36}|github_pat_[A-Za-z0-9_]{82})$").expect("valid regex")
});
static GITHUB_USERNAME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,38})$").expect("valid regex"));
static SLACK_USER_ID: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[UW][A-Z0-9]{8,}$").expect("valid regex"));
static EMAIL: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

pub const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("{0} is required")]
  Required(&'static str),
  #[error("{platform} token format is invalid: {hint}")]
  TokenShape {
    platform: Platform,
    hint: &'static str,
  },
  #[error("{platform} does not accept API tokens here")]
  TokenNotSupported { platform: Platform },
  #[error("name must be at most 100 characters")]
  NameTooLong,
  #[error("'{0}' is not a valid GitHub username")]
  GithubUsername(String),
  #[error("'{0}' is not a valid Slack user ID (expected e.g. U01ABCDEF23)")]
  SlackUserId(String),
  #[error("mappings can only target GitHub or Slack")]
  MappingTarget,
  #[error("'{0}' is not a valid email address")]
  Email(String),
}

/// Check the shape of a raw API token before it is sent anywhere.
pub fn validate_token(platform: Platform, token: &str) -> Result<(), ValidationError> {
  let token = token.trim();
  if token.is_empty() {
    return Err(ValidationError::Required("token"));
  }

  let (re, hint) = match platform {
    Platform::Rootly => (&ROOTLY_TOKEN, "expected rootly_ followed by 64 hex characters"),
    Platform::PagerDuty => (&PAGERDUTY_TOKEN, "expected at least 20 characters"),
    Platform::GitHub => (
      &GITHUB_TOKEN,
      "expected a ghp_ classic token or a github_pat_ fine-grained token",
    ),
    Platform::Slack => return Err(ValidationError::TokenNotSupported { platform }),
  };

  if re.is_match(token) {
    Ok(())
  } else {
    Err(ValidationError::TokenShape { platform, hint })
  }
}

/// Display names must be present and reasonably short.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
  let name = name.trim();
  if name.is_empty() {
    return Err(ValidationError::Required("name"));
  }
  if name.chars().count() > MAX_NAME_LEN {
    return Err(ValidationError::NameTooLong);
  }
  Ok(())
}

/// Validate the identity pair of a manual mapping.
pub fn validate_mapping(
  source_identifier: &str,
  target_platform: Platform,
  target_identifier: &str,
) -> Result<(), ValidationError> {
  if source_identifier.trim().is_empty() {
    return Err(ValidationError::Required("source identifier"));
  }
  validate_mapping_target(target_platform, target_identifier)
}

pub fn validate_mapping_target(
  target_platform: Platform,
  target_identifier: &str,
) -> Result<(), ValidationError> {
  let target = target_identifier.trim();
  if target.is_empty() {
    return Err(ValidationError::Required("target identifier"));
  }
  match target_platform {
    Platform::GitHub if GITHUB_USERNAME.is_match(target) => Ok(()),
    Platform::GitHub => Err(ValidationError::GithubUsername(target.to_string())),
    Platform::Slack if SLACK_USER_ID.is_match(target) => Ok(()),
    Platform::Slack => Err(ValidationError::SlackUserId(target.to_string())),
    _ => Err(ValidationError::MappingTarget),
  }
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
  let email = email.trim();
  if email.is_empty() {
    return Err(ValidationError::Required("email"));
  }
  if EMAIL.is_match(email) {
    Ok(())
  } else {
    Err(ValidationError::Email(email.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rootly_token_requires_64_hex() {
    let valid = format!("rootly_{}", "a".repeat(64));
    let short = format!("rootly_{}", "a".repeat(63));
    let long = format!("rootly_{}", "a".repeat(65));
    let not_hex = format!("rootly_{}", "g".repeat(64));

    assert_eq!(validate_token(Platform::Rootly, &valid), Ok(()));
    assert!(validate_token(Platform::Rootly, &short).is_err());
    assert!(validate_token(Platform::Rootly, &long).is_err());
    assert!(validate_token(Platform::Rootly, &not_hex).is_err());
  }

  #[test]
  fn test_pagerduty_token_length_boundary() {
    assert!(validate_token(Platform::PagerDuty, &"x".repeat(19)).is_err());
    assert_eq!(validate_token(Platform::PagerDuty, &"x".repeat(20)), Ok(()));
    assert_eq!(
      validate_token(Platform::PagerDuty, "u+AbCdEfGhIjKlMnOpQr"),
      Ok(())
    );
  }

  #[test]
  fn test_empty_token_is_required() {
    assert_eq!(
      validate_token(Platform::Rootly, "   "),
      Err(ValidationError::Required("token"))
    );
  }

  #[test]
  fn test_github_token_shapes() {
    let classic = format!("ghp_{}", "A1".repeat(18));
    assert_eq!(validate_token(Platform::GitHub, &classic), Ok(()));
    assert!(validate_token(Platform::GitHub, "ghp_short").is_err());
  }

  #[test]
  fn test_slack_has_no_token_form() {
    assert_eq!(
      validate_token(Platform::Slack, "xoxb-123"),
      Err(ValidationError::TokenNotSupported {
        platform: Platform::Slack
      })
    );
  }

  #[test]
  fn test_name_rules() {
    assert_eq!(validate_name(" Acme "), Ok(()));
    assert_eq!(validate_name(""), Err(ValidationError::Required("name")));
    assert_eq!(
      validate_name(&"n".repeat(MAX_NAME_LEN + 1)),
      Err(ValidationError::NameTooLong)
    );
  }

  #[test]
  fn test_mapping_targets() {
    assert_eq!(
      validate_mapping("jane@acme.io", Platform::GitHub, "jane-doe"),
      Ok(())
    );
    assert_eq!(
      validate_mapping("jane@acme.io", Platform::Slack, "U01ABCDEF23"),
      Ok(())
    );
    assert!(validate_mapping("jane@acme.io", Platform::Slack, "jane").is_err());
    assert!(validate_mapping("jane@acme.io", Platform::GitHub, "-jane").is_err());
    assert_eq!(
      validate_mapping("", Platform::GitHub, "jane"),
      Err(ValidationError::Required("source identifier"))
    );
    assert_eq!(
      validate_mapping("jane", Platform::Rootly, "jane"),
      Err(ValidationError::MappingTarget)
    );
  }

  #[test]
  fn test_email() {
    assert_eq!(validate_email("ops@acme.io"), Ok(()));
    assert!(validate_email("ops@acme").is_err());
    assert!(validate_email("two@@acme.io").is_err());
  }
}
