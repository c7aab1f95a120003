//! Finishing a GitHub or Slack OAuth flow from the provider's redirect URL.
//!
//! The browser lands on a redirect like
//! `http://localhost:3000/integrations/github/callback?code=...&state=...`;
//! the user pastes it into `b9s --oauth-callback <url>` and the backend
//! performs the token exchange.

use color_eyre::{eyre::eyre, Result};
use tracing::info;
use url::Url;

use crate::api::types::Platform;
use crate::api::ApiClient;
use crate::cache::SnapshotStore;
use crate::store::PersistedState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCallback {
  pub platform: Platform,
  pub code: String,
  pub state: Option<String>,
}

impl OAuthCallback {
  pub fn parse(redirect: &str) -> Result<Self> {
    let url = Url::parse(redirect.trim()).map_err(|e| eyre!("Invalid redirect URL: {}", e))?;

    let mut code = None;
    let mut state = None;
    let mut platform_param = None;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "code" => code = Some(value.into_owned()),
        "state" => state = Some(value.into_owned()),
        "platform" => platform_param = Some(value.into_owned()),
        "error" => return Err(eyre!("Provider denied authorization: {}", value)),
        _ => {}
      }
    }

    let platform = match platform_param {
      Some(p) => p.parse::<Platform>().map_err(|e| eyre!(e))?,
      None => url
        .path_segments()
        .into_iter()
        .flatten()
        .find_map(|segment| segment.parse::<Platform>().ok())
        .ok_or_else(|| eyre!("Could not tell which platform the redirect is for"))?,
    };
    if platform.is_incident_source() {
      return Err(eyre!("{} does not use OAuth", platform));
    }

    let code = code
      .filter(|c| !c.is_empty())
      .ok_or_else(|| eyre!("Redirect URL has no authorization code"))?;

    Ok(Self {
      platform,
      code,
      state,
    })
  }
}

/// Hand the callback to the backend and mark the cached list stale so the
/// next launch refetches it and shows the new connection.
pub async fn complete(client: &ApiClient, state: &PersistedState, callback: &OAuthCallback) -> Result<()> {
  if !client.has_token() {
    return Err(eyre!("Not signed in; run b9s and log in first"));
  }

  client
    .complete_oauth(callback.platform, &callback.code, callback.state.as_deref())
    .await
    .map_err(|e| eyre!("Failed to complete {} connection: {}", callback.platform, e))?;

  SnapshotStore::new(state.clone()).invalidate();
  info!(platform = %callback.platform, "oauth connection completed");
  Ok(())
}
