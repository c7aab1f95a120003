//! Concurrent refresh of every platform's integrations.

use chrono::Utc;
use tracing::{info, warn};

use crate::api::client::ApiClient;
use crate::api::types::{EnrichmentStatus, Integration, Platform};
use crate::cache::{CacheSnapshot, SnapshotStore};
use crate::error::ApiError;

/// Merged result of one full refresh
#[derive(Debug, Clone)]
pub struct AggregateResult {
  pub integrations: Vec<Integration>,
  pub github_status: EnrichmentStatus,
  pub slack_status: EnrichmentStatus,
  /// Platforms that could not be reached, treated as empty
  pub failures: Vec<(Platform, ApiError)>,
  pub snapshot: CacheSnapshot,
}

/// Fetches all four platforms in parallel and persists the merged snapshot.
#[derive(Clone)]
pub struct FetchAggregator {
  client: ApiClient,
  snapshots: SnapshotStore,
}

impl FetchAggregator {
  pub fn new(client: ApiClient, snapshots: SnapshotStore) -> Self {
    Self { client, snapshots }
  }

  /// Refresh everything.
  ///
  /// One platform failing never discards the others; it just contributes
  /// nothing. The whole refresh fails only when the session is rejected or
  /// when every platform failed, and in both cases the cache is left alone.
  pub async fn fetch_all(&self) -> Result<AggregateResult, ApiError> {
    let (rootly, pagerduty, github, slack) = futures::join!(
      self.client.list_integrations(Platform::Rootly),
      self.client.list_integrations(Platform::PagerDuty),
      self.client.enrichment_status(Platform::GitHub),
      self.client.enrichment_status(Platform::Slack)
    );

    let mut failures = Vec::new();
    let mut integrations = Vec::new();

    for (platform, result) in [(Platform::Rootly, rootly), (Platform::PagerDuty, pagerduty)] {
      match result {
        Ok(list) => integrations.extend(list),
        Err(e) => failures.push((platform, e)),
      }
    }

    let mut statuses = Vec::with_capacity(2);
    for (platform, result) in [(Platform::GitHub, github), (Platform::Slack, slack)] {
      match result {
        Ok(status) => statuses.push(status),
        Err(e) => {
          failures.push((platform, e));
          statuses.push(EnrichmentStatus::disconnected());
        }
      }
    }
    let slack_status = statuses.pop().unwrap_or_default();
    let github_status = statuses.pop().unwrap_or_default();

    if let Some((_, e)) = failures.iter().find(|(_, e)| e.is_auth()) {
      return Err(e.clone());
    }
    if failures.len() == Platform::ALL.len() {
      let (platform, e) = failures.swap_remove(0);
      warn!(%platform, error = %e, "refresh failed on every platform");
      return Err(e);
    }
    for (platform, e) in &failures {
      warn!(%platform, error = %e, "platform unavailable, treating as not connected");
    }

    integrations.extend(github_status.to_integration(Platform::GitHub));
    integrations.extend(slack_status.to_integration(Platform::Slack));

    let snapshot = CacheSnapshot::from_list(
      integrations,
      github_status.clone(),
      slack_status.clone(),
      Some(Utc::now()),
    );
    self.snapshots.save(&snapshot);
    info!(
      integrations = snapshot.merged().len(),
      failed = failures.len(),
      "integrations refreshed"
    );

    Ok(AggregateResult {
      integrations: snapshot.merged(),
      github_status,
      slack_status,
      failures,
      snapshot,
    })
  }
}
