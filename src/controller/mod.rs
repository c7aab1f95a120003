//! Display controller for the integrations list.
//!
//! Paints whatever the cache holds first, then decides whether and how to go
//! to the network. Results from spawned work come back over a channel and are
//! folded into [`IntegrationsState`] on the next [`IntegrationsController::poll`].

pub mod state;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::types::{Integration, OrganizationRef, Platform};
use crate::api::{ApiClient, FetchAggregator};
use crate::cache::{FreshnessPolicy, SnapshotStore};
use crate::validation::{validate_name, ValidationError};

pub use state::{Action, Change, IntegrationRow, IntegrationsState, Notice, RowState, Tab};

pub struct IntegrationsController {
  state: IntegrationsState,
  client: ApiClient,
  snapshots: SnapshotStore,
  aggregator: FetchAggregator,
  policy: FreshnessPolicy,
  tx: mpsc::UnboundedSender<Action>,
  rx: mpsc::UnboundedReceiver<Action>,
}

impl IntegrationsController {
  pub fn new(client: ApiClient, snapshots: SnapshotStore, policy: FreshnessPolicy) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let aggregator = FetchAggregator::new(client.clone(), snapshots.clone());
    let state = IntegrationsState {
      selected_organization: snapshots.state().selected_organization(),
      ..Default::default()
    };

    Self {
      state,
      client,
      snapshots,
      aggregator,
      policy,
      tx,
      rx,
    }
  }

  pub fn state(&self) -> &IntegrationsState {
    &self.state
  }

  pub fn client(&self) -> &ApiClient {
    &self.client
  }

  /// Show the cache synchronously, then fetch if the cache is missing or stale.
  ///
  /// A fresh cache means no network at all. A stale one is shown as-is while
  /// a background refresh runs. With nothing cached every platform shows a
  /// loading state until the first fetch answers.
  pub fn mount(&mut self) {
    let now = Utc::now();
    match self.snapshots.load() {
      Some(snapshot) => {
        let stale = self.policy.is_stale(snapshot.last_fetch, now);
        debug!(stale, "painting cached integrations");
        self.dispatch(Action::CacheLoaded { snapshot, stale });
        if stale {
          self.spawn_fetch(false);
        }
      }
      None => {
        debug!("no cached integrations");
        self.spawn_fetch(true);
      }
    }
  }

  /// Explicit refresh. Never blanks what is already shown.
  pub fn refresh(&mut self) {
    let blocking = self.state.rows.is_empty() && self.state.last_fetch.is_none();
    self.spawn_fetch(blocking);
  }

  fn spawn_fetch(&mut self, blocking: bool) {
    if !self.client.has_token() {
      self.dispatch(Action::AuthRequired);
      return;
    }
    if self.state.refreshing {
      debug!("refresh already running");
      return;
    }
    self.dispatch(Action::FetchStarted { blocking });

    let aggregator = self.aggregator.clone();
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let action = match aggregator.fetch_all().await {
        Ok(result) => Action::FetchSucceeded(result),
        Err(e) => Action::FetchFailed(e),
      };
      let _ = tx.send(action);
    });
  }

  /// Apply everything spawned work has reported. Returns whether anything changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(action) = self.rx.try_recv() {
      self.dispatch(action);
      changed = true;
    }
    changed
  }

  pub fn dispatch(&mut self, action: Action) {
    let effects = state::reduce(&mut self.state, action);
    if effects.persist_list {
      self
        .snapshots
        .save_list(&self.state.confirmed_integrations());
    }
    if effects.persist_selection {
      self
        .snapshots
        .state()
        .set_selected_organization(self.state.selected_organization.as_ref());
    }
  }

  /// Optimistically rename, reverting if the server refuses.
  pub fn rename(&mut self, platform: Platform, id: &str, name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    validate_name(name)?;
    if !self.accepts_change(platform, id, "rename") {
      return Ok(());
    }

    self.dispatch(Action::MutationStarted {
      platform,
      id: id.to_string(),
      change: Change::Rename {
        name: name.to_string(),
      },
    });

    let client = self.client.clone();
    let tx = self.tx.clone();
    let id = id.to_string();
    let name = name.to_string();
    tokio::spawn(async move {
      let action = match client.rename_integration(platform, &id, &name).await {
        Ok(_) => Action::MutationConfirmed { platform, id },
        Err(error) => Action::MutationFailed {
          platform,
          id,
          error,
        },
      };
      let _ = tx.send(action);
    });
    Ok(())
  }

  /// Mark the row pending and remove it once the server confirms.
  pub fn delete(&mut self, platform: Platform, id: &str) {
    if !self.accepts_change(platform, id, "delete") {
      return;
    }

    self.dispatch(Action::MutationStarted {
      platform,
      id: id.to_string(),
      change: Change::Delete,
    });

    let client = self.client.clone();
    let tx = self.tx.clone();
    let id = id.to_string();
    tokio::spawn(async move {
      let action = match client.delete_integration(platform, &id).await {
        Ok(()) => Action::MutationConfirmed { platform, id },
        Err(error) => Action::MutationFailed {
          platform,
          id,
          error,
        },
      };
      let _ = tx.send(action);
    });
  }

  /// A row takes one change at a time; the next waits for the server's answer.
  fn accepts_change(&mut self, platform: Platform, id: &str, kind: &str) -> bool {
    let pending = self.state.row(platform, id).map(|r| r.state.is_pending());
    match pending {
      None => {
        warn!(%platform, id, kind, "change to unknown integration");
        false
      }
      Some(true) => {
        debug!(%platform, id, kind, "change already in flight");
        self.notify(Notice::info("Still waiting on the previous change"));
        false
      }
      Some(false) => true,
    }
  }

  /// Fold in an integration the server has already created.
  pub fn integration_added(&mut self, integration: Integration) {
    info!(platform = %integration.platform, id = %integration.id, "integration added");
    self.dispatch(Action::IntegrationAdded(integration));
  }

  pub fn select_organization(&mut self, org: Option<OrganizationRef>) {
    self.dispatch(Action::OrganizationSelected(org));
  }

  pub fn select_tab(&mut self, tab: Tab) {
    self.dispatch(Action::TabSelected(tab));
  }

  pub fn notify(&mut self, notice: Notice) {
    self.dispatch(Action::Notify(notice));
  }

  pub fn dismiss_notice(&mut self) {
    self.dispatch(Action::NoticeDismissed);
  }

  /// Wait for the next report from spawned work and apply it.
  #[cfg(test)]
  pub async fn settle(&mut self) {
    if let Some(action) = self.rx.recv().await {
      self.dispatch(action);
    }
  }
}
