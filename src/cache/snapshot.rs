//! The cached integrations view and its persisted form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::api::types::{EnrichmentStatus, Integration, Platform};
use crate::store::{PersistedState, StateKey};

/// Everything the integrations view needs to paint without the network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
  pub integrations: BTreeMap<Platform, Vec<Integration>>,
  pub github_status: EnrichmentStatus,
  pub slack_status: EnrichmentStatus,
  pub last_fetch: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
  /// Group a flat list by platform, keeping the first of any duplicate
  /// `(platform, id)` pair.
  pub fn from_list(
    list: impl IntoIterator<Item = Integration>,
    github_status: EnrichmentStatus,
    slack_status: EnrichmentStatus,
    last_fetch: Option<DateTime<Utc>>,
  ) -> Self {
    let mut seen = HashSet::new();
    let mut integrations: BTreeMap<Platform, Vec<Integration>> = BTreeMap::new();
    for integration in list {
      if seen.insert((integration.platform, integration.id.clone())) {
        integrations
          .entry(integration.platform)
          .or_default()
          .push(integration);
      }
    }

    Self {
      integrations,
      github_status,
      slack_status,
      last_fetch,
    }
  }

  /// Flattened list, in platform order.
  pub fn merged(&self) -> Vec<Integration> {
    Platform::ALL
      .iter()
      .filter_map(|p| self.integrations.get(p))
      .flatten()
      .cloned()
      .collect()
  }

  pub fn status(&self, platform: Platform) -> Option<&EnrichmentStatus> {
    match platform {
      Platform::GitHub => Some(&self.github_status),
      Platform::Slack => Some(&self.slack_status),
      _ => None,
    }
  }

  /// Same contents, ignoring when they were fetched.
  #[cfg(test)]
  pub fn same_contents(&self, other: &CacheSnapshot) -> bool {
    self.integrations == other.integrations
      && self.github_status == other.github_status
      && self.slack_status == other.slack_status
  }
}

/// Reads and writes whole snapshots through the persisted state.
///
/// A snapshot is a single stored value, so readers never see half of one.
/// Clones share a write lock that also covers the read-modify-write in
/// [`SnapshotStore::save_list`] and [`SnapshotStore::invalidate`].
#[derive(Clone)]
pub struct SnapshotStore {
  state: PersistedState,
  write_lock: Arc<Mutex<()>>,
}

impl SnapshotStore {
  pub fn new(state: PersistedState) -> Self {
    Self {
      state,
      write_lock: Arc::new(Mutex::new(())),
    }
  }

  /// `None` when nothing was ever persisted or it can't be read.
  pub fn load(&self) -> Option<CacheSnapshot> {
    self.state.read(StateKey::Snapshot)
  }

  pub fn save(&self, snapshot: &CacheSnapshot) {
    let _guard = self.lock();
    self.state.write(StateKey::Snapshot, snapshot);
  }

  /// Persist a locally confirmed list without touching the fetch timestamp.
  /// Enrichment platforms with no remaining row are stored as disconnected.
  pub fn save_list(&self, list: &[Integration]) {
    let _guard = self.lock();
    let previous = self.load().unwrap_or_default();
    let has = |platform: Platform| list.iter().any(|i| i.platform == platform);

    let snapshot = CacheSnapshot::from_list(
      list.iter().cloned(),
      if has(Platform::GitHub) {
        previous.github_status
      } else {
        EnrichmentStatus::disconnected()
      },
      if has(Platform::Slack) {
        previous.slack_status
      } else {
        EnrichmentStatus::disconnected()
      },
      previous.last_fetch,
    );
    self.state.write(StateKey::Snapshot, &snapshot);
  }

  /// Keep the cached list but force the next launch to refetch it.
  pub fn invalidate(&self) {
    let _guard = self.lock();
    if let Some(mut snapshot) = self.load() {
      snapshot.last_fetch = None;
      self.state.write(StateKey::Snapshot, &snapshot);
    }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
    // The guarded data is (), so a poisoned lock is still usable
    self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn state(&self) -> &PersistedState {
    &self.state
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use crate::test_support::integration;
  use chrono::Duration;
  use std::sync::Arc;

  fn store() -> SnapshotStore {
    let state = PersistedState::new(Arc::new(MemoryStore::new()), "http://localhost:8000");
    SnapshotStore::new(state)
  }

  #[test]
  fn test_from_list_drops_duplicate_keys() {
    let snapshot = CacheSnapshot::from_list(
      vec![
        integration(Platform::Rootly, "1", "first"),
        integration(Platform::Rootly, "1", "second"),
        integration(Platform::PagerDuty, "1", "pd"),
      ],
      EnrichmentStatus::default(),
      EnrichmentStatus::default(),
      None,
    );

    let merged = snapshot.merged();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].name, "first");
    assert_eq!(merged[1].platform, Platform::PagerDuty);
  }

  #[test]
  fn test_round_trip_is_exact() {
    let store = store();
    let snapshot = CacheSnapshot::from_list(
      vec![
        integration(Platform::PagerDuty, "P1", "PD"),
        integration(Platform::Rootly, "9", "Acme"),
      ],
      EnrichmentStatus {
        connected: true,
        integration: Some(serde_json::json!({ "github_username": "octo" })),
      },
      EnrichmentStatus::default(),
      Some(Utc::now() - Duration::seconds(10)),
    );

    store.save(&snapshot);
    assert_eq!(store.load(), Some(snapshot));
  }

  #[test]
  fn test_missing_or_corrupt_list_is_a_miss() {
    let store = store();
    assert_eq!(store.load(), None);

    store
      .state()
      .write_raw(StateKey::Snapshot, "{\"integrations\": [this is not a map");
    assert_eq!(store.load(), None);
  }

  #[test]
  fn test_save_list_keeps_timestamp_and_disconnects_removed_enrichment() {
    let store = store();
    let fetched_at = Utc::now() - Duration::minutes(2);
    store.save(&CacheSnapshot::from_list(
      vec![
        integration(Platform::Rootly, "1", "Acme"),
        integration(Platform::GitHub, "github", "octo"),
      ],
      EnrichmentStatus {
        connected: true,
        integration: None,
      },
      EnrichmentStatus::default(),
      Some(fetched_at),
    ));

    store.save_list(&[integration(Platform::Rootly, "1", "Acme")]);

    let loaded = store.load().unwrap();
    assert_eq!(loaded.last_fetch, Some(fetched_at));
    assert!(!loaded.github_status.connected);
    assert_eq!(loaded.merged().len(), 1);
  }

  #[test]
  fn test_snapshot_is_one_stored_value() {
    let store = store();
    store.save(&CacheSnapshot::from_list(
      vec![integration(Platform::Rootly, "1", "Acme")],
      EnrichmentStatus::default(),
      EnrichmentStatus::default(),
      Some(Utc::now()),
    ));

    let raw = store.state().read::<serde_json::Value>(StateKey::Snapshot).unwrap();
    assert!(raw["integrations"].is_object());
    assert!(raw["last_fetch"].is_string());
  }

  #[test]
  fn test_concurrent_writers_leave_a_whole_snapshot() {
    let store = store();
    let full = |name: &str| {
      CacheSnapshot::from_list(
        vec![
          integration(Platform::Rootly, "1", name),
          integration(Platform::GitHub, "github", "octo"),
        ],
        EnrichmentStatus {
          connected: true,
          integration: None,
        },
        EnrichmentStatus::default(),
        Some(Utc::now()),
      )
    };
    store.save(&full("seed"));

    let fetched = full("fetched");
    let confirmed = vec![integration(Platform::Rootly, "1", "confirmed")];
    std::thread::scope(|s| {
      for _ in 0..20 {
        s.spawn(|| store.save(&fetched));
        s.spawn(|| store.save_list(&confirmed));
      }
    });

    let loaded = store.load().unwrap();
    let rootly_name = loaded.merged()[0].name.clone();
    match rootly_name.as_str() {
      // A full fetch wrote last
      "fetched" => assert!(loaded.same_contents(&fetched)),
      // A local confirmation wrote last, on top of some whole snapshot
      "confirmed" => {
        assert_eq!(loaded.merged().len(), 1);
        assert!(!loaded.github_status.connected);
        assert!(loaded.last_fetch.is_some());
      }
      other => panic!("unexpected name {}", other),
    }
  }

  #[test]
  fn test_invalidate_keeps_rows_and_drops_timestamp() {
    let store = store();
    store.save(&CacheSnapshot::from_list(
      vec![integration(Platform::PagerDuty, "P1", "PD")],
      EnrichmentStatus::default(),
      EnrichmentStatus::default(),
      Some(Utc::now()),
    ));

    store.invalidate();
    let loaded = store.load().unwrap();
    assert_eq!(loaded.last_fetch, None);
    assert_eq!(loaded.merged().len(), 1);
  }
}
