//! Integrations view state and its transitions.
//!
//! All changes go through [`reduce`], one [`Action`] per logical event, so the
//! view never juggles independent loading flags.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::api::aggregator::AggregateResult;
use crate::api::types::{EnrichmentStatus, Integration, OrganizationRef, Platform};
use crate::cache::{CacheSnapshot, CacheSource};
use crate::error::ApiError;

/// Which platforms the list shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
  #[default]
  All,
  Platform(Platform),
}

impl Tab {
  pub const ALL: [Tab; 5] = [
    Tab::All,
    Tab::Platform(Platform::Rootly),
    Tab::Platform(Platform::PagerDuty),
    Tab::Platform(Platform::GitHub),
    Tab::Platform(Platform::Slack),
  ];

  pub fn label(&self) -> &'static str {
    match self {
      Tab::All => "All",
      Tab::Platform(p) => p.label(),
    }
  }

  pub fn includes(&self, platform: Platform) -> bool {
    match self {
      Tab::All => true,
      Tab::Platform(p) => *p == platform,
    }
  }

  pub fn next(&self) -> Tab {
    let idx = Tab::ALL.iter().position(|t| t == self).unwrap_or(0);
    Tab::ALL[(idx + 1) % Tab::ALL.len()]
  }

  pub fn previous(&self) -> Tab {
    let idx = Tab::ALL.iter().position(|t| t == self).unwrap_or(0);
    Tab::ALL[(idx + Tab::ALL.len() - 1) % Tab::ALL.len()]
  }
}

/// A change the user asked for that the server has not confirmed yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
  Rename { name: String },
  Delete,
}

/// Server confirmation state of one row
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RowState {
  #[default]
  Confirmed,
  /// Optimistically applied, waiting for the server
  RenamePending { previous_name: String },
  DeletePending,
  /// The server refused the last change and it was reverted
  Failed(String),
}

impl RowState {
  pub fn is_pending(&self) -> bool {
    matches!(self, RowState::RenamePending { .. } | RowState::DeletePending)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationRow {
  pub integration: Integration,
  pub state: RowState,
}

impl IntegrationRow {
  fn confirmed(integration: Integration) -> Self {
    Self {
      integration,
      state: RowState::Confirmed,
    }
  }

  fn matches(&self, platform: Platform, id: &str) -> bool {
    self.integration.platform == platform && self.integration.id == id
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Info,
  Error,
}

/// Transient message for the status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub level: NoticeLevel,
  pub message: String,
}

impl Notice {
  pub fn info(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Info,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Error,
      message: message.into(),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct IntegrationsState {
  pub rows: Vec<IntegrationRow>,
  pub github_status: EnrichmentStatus,
  pub slack_status: EnrichmentStatus,
  /// Per-platform skeleton flags, only raised when there is nothing to show
  pub loading: BTreeMap<Platform, bool>,
  /// A refresh is running behind already-painted data
  pub refreshing: bool,
  pub last_fetch: Option<DateTime<Utc>>,
  pub source: Option<CacheSource>,
  pub active_tab: Tab,
  pub selected_organization: Option<OrganizationRef>,
  pub notice: Option<Notice>,
  pub auth_required: bool,
}

impl IntegrationsState {
  pub fn is_loading(&self, platform: Platform) -> bool {
    self.loading.get(&platform).copied().unwrap_or(false)
  }

  pub fn any_loading(&self) -> bool {
    self.loading.values().any(|l| *l)
  }

  /// Rows visible under the active tab
  pub fn visible_rows(&self) -> Vec<&IntegrationRow> {
    self
      .rows
      .iter()
      .filter(|r| self.active_tab.includes(r.integration.platform))
      .collect()
  }

  pub fn row(&self, platform: Platform, id: &str) -> Option<&IntegrationRow> {
    self.rows.iter().find(|r| r.matches(platform, id))
  }

  /// What the server has agreed to, ignoring rows still waiting on a delete
  pub fn confirmed_integrations(&self) -> Vec<Integration> {
    self
      .rows
      .iter()
      .filter(|r| r.state != RowState::DeletePending)
      .map(|r| match &r.state {
        RowState::RenamePending { previous_name } => Integration {
          name: previous_name.clone(),
          ..r.integration.clone()
        },
        _ => r.integration.clone(),
      })
      .collect()
  }

  pub fn selected_integration(&self) -> Option<&Integration> {
    let org = self.selected_organization.as_ref()?;
    self
      .rows
      .iter()
      .map(|r| &r.integration)
      .find(|i| i.platform.is_incident_source() && org.is(i.platform, &i.id))
  }

  fn set_loading(&mut self, value: bool) {
    for platform in Platform::ALL {
      self.loading.insert(platform, value);
    }
  }

  /// Replace rows wholesale, carrying over changes the server hasn't
  /// answered yet so a refresh can't undo them on screen.
  fn replace_rows(&mut self, integrations: Vec<Integration>) {
    let pending: Vec<IntegrationRow> = self
      .rows
      .drain(..)
      .filter(|r| r.state.is_pending())
      .collect();

    self.rows = integrations
      .into_iter()
      .map(|integration| {
        match pending
          .iter()
          .find(|p| p.matches(integration.platform, &integration.id))
        {
          Some(p) => IntegrationRow {
            integration: Integration {
              name: p.integration.name.clone(),
              ..integration
            },
            state: p.state.clone(),
          },
          None => IntegrationRow::confirmed(integration),
        }
      })
      .collect();
  }

  /// Pick a default organization when none is selected.
  fn ensure_selection(&mut self) -> bool {
    if self.selected_integration().is_some() {
      return false;
    }
    let incident = || {
      self
        .rows
        .iter()
        .map(|r| &r.integration)
        .filter(|i| i.platform.is_incident_source())
    };
    let pick = incident()
      .find(|i| i.is_default)
      .or_else(|| incident().next())
      .map(|i| i.org_ref());

    if pick.is_some() && pick != self.selected_organization {
      self.selected_organization = pick;
      return true;
    }
    false
  }
}

/// Events that move the integrations view forward
#[derive(Debug, Clone)]
pub enum Action {
  CacheLoaded { snapshot: CacheSnapshot, stale: bool },
  FetchStarted { blocking: bool },
  FetchSucceeded(AggregateResult),
  FetchFailed(ApiError),
  AuthRequired,
  IntegrationAdded(Integration),
  MutationStarted {
    platform: Platform,
    id: String,
    change: Change,
  },
  MutationConfirmed { platform: Platform, id: String },
  MutationFailed {
    platform: Platform,
    id: String,
    error: ApiError,
  },
  OrganizationSelected(Option<OrganizationRef>),
  TabSelected(Tab),
  Notify(Notice),
  NoticeDismissed,
}

/// What the controller must persist after a transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
  pub persist_list: bool,
  pub persist_selection: bool,
}

pub fn reduce(state: &mut IntegrationsState, action: Action) -> Effects {
  let mut effects = Effects::default();

  match action {
    Action::CacheLoaded { snapshot, stale } => {
      state.replace_rows(snapshot.merged());
      state.github_status = snapshot.github_status;
      state.slack_status = snapshot.slack_status;
      state.last_fetch = snapshot.last_fetch;
      state.source = Some(if stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      });
      state.set_loading(false);
    }
    Action::FetchStarted { blocking } => {
      if blocking {
        state.set_loading(true);
      }
      state.refreshing = true;
      state.auth_required = false;
    }
    Action::FetchSucceeded(result) => {
      state.replace_rows(result.integrations);
      state.github_status = result.github_status;
      state.slack_status = result.slack_status;
      state.last_fetch = result.snapshot.last_fetch;
      state.source = Some(CacheSource::Network);
      state.set_loading(false);
      state.refreshing = false;
      state.auth_required = false;

      if !result.failures.is_empty() {
        let platforms: Vec<&str> = result.failures.iter().map(|(p, _)| p.label()).collect();
        state.notice = Some(Notice::info(format!(
          "{} unavailable, shown as not connected",
          platforms.join(", ")
        )));
      }
      effects.persist_selection = state.ensure_selection();
    }
    Action::FetchFailed(error) => {
      state.set_loading(false);
      state.refreshing = false;
      state.auth_required = error.is_auth();
      if !error.is_auth() {
        if !state.rows.is_empty() {
          state.source = Some(CacheSource::CacheStale);
        }
        state.notice = Some(Notice::error(format!(
          "Refresh failed ({}), showing cached data",
          error
        )));
      }
    }
    Action::AuthRequired => {
      state.set_loading(false);
      state.refreshing = false;
      state.auth_required = true;
    }
    Action::IntegrationAdded(integration) => {
      let platform = integration.platform;
      let name = integration.name.clone();
      match state
        .rows
        .iter_mut()
        .find(|r| r.matches(platform, &integration.id))
      {
        Some(row) => *row = IntegrationRow::confirmed(integration),
        None => state.rows.push(IntegrationRow::confirmed(integration)),
      }
      state.notice = Some(Notice::info(format!("Connected {} ({})", name, platform)));
      effects.persist_list = true;
      effects.persist_selection = state.ensure_selection();
    }
    Action::MutationStarted {
      platform,
      id,
      change,
    } => {
      // One change in flight per row; a second would lose the revert target
      let Some(row) = state
        .rows
        .iter_mut()
        .find(|r| r.matches(platform, &id) && !r.state.is_pending())
      else {
        return effects;
      };
      match change {
        Change::Rename { name } => {
          let previous_name = std::mem::replace(&mut row.integration.name, name);
          row.state = RowState::RenamePending { previous_name };
        }
        Change::Delete => row.state = RowState::DeletePending,
      }
    }
    Action::MutationConfirmed { platform, id } => {
      let Some(idx) = state.rows.iter().position(|r| r.matches(platform, &id)) else {
        return effects;
      };
      match state.rows[idx].state {
        RowState::DeletePending => {
          let removed = state.rows.remove(idx);
          if state
            .selected_organization
            .as_ref()
            .is_some_and(|org| org.is(platform, &id))
          {
            state.selected_organization = None;
            effects.persist_selection = true;
          }
          match platform {
            Platform::GitHub => state.github_status = EnrichmentStatus::disconnected(),
            Platform::Slack => state.slack_status = EnrichmentStatus::disconnected(),
            _ => {}
          }
          state.notice = Some(Notice::info(format!(
            "Removed {} ({})",
            removed.integration.name, platform
          )));
        }
        _ => {
          state.rows[idx].state = RowState::Confirmed;
          state.notice = Some(Notice::info(format!(
            "Renamed to {}",
            state.rows[idx].integration.name
          )));
        }
      }
      effects.persist_list = true;
    }
    Action::MutationFailed {
      platform,
      id,
      error,
    } => {
      if let Some(row) = state.rows.iter_mut().find(|r| r.matches(platform, &id)) {
        if let RowState::RenamePending { previous_name } = &row.state {
          row.integration.name = previous_name.clone();
        }
        row.state = RowState::Failed(error.to_string());
      }
      if error.is_auth() {
        state.auth_required = true;
      }
      state.notice = Some(Notice::error(error.to_string()));
    }
    Action::OrganizationSelected(id) => {
      if state.selected_organization != id {
        state.selected_organization = id;
        effects.persist_selection = true;
      }
    }
    Action::TabSelected(tab) => state.active_tab = tab,
    Action::Notify(notice) => state.notice = Some(notice),
    Action::NoticeDismissed => state.notice = None,
  }

  effects
}
