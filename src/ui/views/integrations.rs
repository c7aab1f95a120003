use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap};

use crate::api::types::{Integration, Platform};
use crate::cache::freshness::describe_age;
use crate::cache::CacheSource;
use crate::controller::state::NoticeLevel;
use crate::controller::{IntegrationRow, IntegrationsController, Notice, RowState, Tab};
use crate::query::Query;
use crate::ui::components::{
  ConfirmDialog, ConfirmEvent, KeyResult, PromptDialog, PromptEvent, SearchEvent, SearchInput,
};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{platform_color, row_marker, truncate};
use crate::ui::view::{global_shortcuts, ShortcutInfo, View, ViewAction, ViewResult};
use crate::ui::views::AddIntegrationView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SortKey {
  #[default]
  Platform,
  Name,
  Users,
  Newest,
}

impl SortKey {
  fn next(self) -> Self {
    match self {
      SortKey::Platform => SortKey::Name,
      SortKey::Name => SortKey::Users,
      SortKey::Users => SortKey::Newest,
      SortKey::Newest => SortKey::Platform,
    }
  }

  fn label(self) -> &'static str {
    match self {
      SortKey::Platform => "platform",
      SortKey::Name => "name",
      SortKey::Users => "users",
      SortKey::Newest => "newest",
    }
  }

  fn sort(self, rows: &mut [&IntegrationRow]) {
    match self {
      // Rows already arrive in platform order
      SortKey::Platform => {}
      SortKey::Name => rows.sort_by_key(|r| r.integration.name.to_lowercase()),
      SortKey::Users => rows.sort_by(|a, b| b.integration.total_users.cmp(&a.integration.total_users)),
      SortKey::Newest => rows.sort_by(|a, b| b.integration.created_at.cmp(&a.integration.created_at)),
    }
  }
}

type RowKey = (Platform, String);

/// Root view: every connected platform, backed by the cache controller
pub struct IntegrationsView {
  controller: IntegrationsController,
  list_state: ListState,
  search: SearchInput,
  sort: SortKey,
  rename: PromptDialog<RowKey>,
  confirm_delete: ConfirmDialog<RowKey>,
  connect: Option<(Platform, Query<String>)>,
  connect_url: Option<(Platform, String)>,
  login_prompted: bool,
}

impl IntegrationsView {
  pub fn new(mut controller: IntegrationsController) -> Self {
    controller.mount();
    Self {
      controller,
      list_state: ListState::default(),
      search: SearchInput::new(),
      sort: SortKey::default(),
      rename: PromptDialog::new(),
      confirm_delete: ConfirmDialog::new(),
      connect: None,
      connect_url: None,
      login_prompted: false,
    }
  }

  /// Rows under the active tab, search and sort, in display order
  fn visible(&self) -> Vec<&IntegrationRow> {
    let mut rows: Vec<&IntegrationRow> = self
      .controller
      .state()
      .visible_rows()
      .into_iter()
      .filter(|r| {
        let i = &r.integration;
        self.search.matches(
          [
            i.name.as_str(),
            i.platform.label(),
            i.organization_name.as_deref().unwrap_or(""),
          ]
          .into_iter(),
        )
      })
      .collect();
    self.sort.sort(&mut rows);
    rows
  }

  fn selected(&self) -> Option<Integration> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|r| r.integration.clone())
  }

  fn selected_row_state(&self) -> Option<RowState> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|r| r.state.clone())
  }

  fn set_tab(&mut self, tab: Tab) {
    self.controller.select_tab(tab);
    self.list_state.select(Some(0));
  }

  /// GitHub or Slack, from the active tab or the selected row
  fn enrichment_target(&self) -> Option<Platform> {
    if let Tab::Platform(p) = self.controller.state().active_tab {
      if !p.is_incident_source() {
        return Some(p);
      }
    }
    self
      .selected()
      .map(|i| i.platform)
      .filter(|p| !p.is_incident_source())
  }

  fn start_connect(&mut self, platform: Platform) {
    let client = self.controller.client().clone();
    let mut query = Query::new(move || {
      let client = client.clone();
      async move { client.start_oauth(platform).await }
    });
    query.fetch();
    self.connect = Some((platform, query));
    self.connect_url = None;
  }

  fn handle_overlays(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match self.rename.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted {
        value,
        payload: (platform, id),
      }) => {
        if let Err(e) = self.controller.rename(platform, &id, &value) {
          self.rename.reject(&value, (platform, id), e.to_string());
        }
        return Some(ViewAction::None);
      }
      KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => {
        return Some(ViewAction::None)
      }
      KeyResult::NotHandled => {}
    }

    match self.confirm_delete.handle_key(key) {
      KeyResult::Event(ConfirmEvent::Confirmed((platform, id))) => {
        self.controller.delete(platform, &id);
        return Some(ViewAction::None);
      }
      KeyResult::Event(ConfirmEvent::Cancelled) | KeyResult::Handled => {
        return Some(ViewAction::None)
      }
      KeyResult::NotHandled => {}
    }

    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Changed(_)) => {
        self.list_state.select(Some(0));
        Some(ViewAction::None)
      }
      KeyResult::Event(SearchEvent::Submitted) | KeyResult::Handled => Some(ViewAction::None),
      KeyResult::NotHandled => None,
    }
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.list_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => self.list_state.select_last(),
      KeyCode::Tab | KeyCode::Char('l') | KeyCode::Right => {
        let tab = self.controller.state().active_tab.next();
        self.set_tab(tab);
      }
      KeyCode::BackTab | KeyCode::Char('h') | KeyCode::Left => {
        let tab = self.controller.state().active_tab.previous();
        self.set_tab(tab);
      }
      KeyCode::Char(c @ '1'..='5') => {
        let idx = c as usize - '1' as usize;
        self.set_tab(Tab::ALL[idx]);
      }
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let action = match key.code {
      KeyCode::Char('r') => {
        self.controller.refresh();
        ViewAction::None
      }
      KeyCode::Char('s') => {
        self.sort = self.sort.next();
        ViewAction::None
      }
      KeyCode::Char('a') => ViewAction::Push(Box::new(AddIntegrationView::new(
        self.controller.client().clone(),
      ))),
      KeyCode::Enter => {
        match self.selected() {
          Some(i) if i.platform.is_incident_source() => {
            self
              .controller
              .notify(Notice::info(format!("Organization set to {}", i.name)));
            self.controller.select_organization(Some(i.org_ref()));
          }
          Some(_) => self
            .controller
            .notify(Notice::info("Only Rootly and PagerDuty can be the organization")),
          None => {}
        }
        ViewAction::None
      }
      KeyCode::Char('e') => {
        match (self.selected(), self.selected_row_state()) {
          (Some(_), Some(state)) if state.is_pending() => self
            .controller
            .notify(Notice::info("Waiting for the server to confirm the last change")),
          (Some(i), _) if i.platform.is_incident_source() => {
            self.rename.show(
              format!("Rename {} integration", i.platform),
              &i.name,
              (i.platform, i.id),
            );
          }
          (Some(i), _) => self
            .controller
            .notify(Notice::info(format!("{} connections can't be renamed", i.platform))),
          _ => {}
        }
        ViewAction::None
      }
      KeyCode::Char('d') => {
        match (self.selected(), self.selected_row_state()) {
          (Some(_), Some(state)) if state.is_pending() => self
            .controller
            .notify(Notice::info("Waiting for the server to confirm the last change")),
          (Some(i), _) => {
            let question = if i.platform.is_incident_source() {
              format!("Delete {} integration \"{}\"?", i.platform, i.name)
            } else {
              format!("Disconnect {}?", i.platform)
            };
            self.confirm_delete.show(question, (i.platform, i.id));
          }
          _ => {}
        }
        ViewAction::None
      }
      KeyCode::Char('c') => {
        match self.enrichment_target() {
          Some(platform) => self.start_connect(platform),
          None => self
            .controller
            .notify(Notice::info("Switch to the GitHub or Slack tab to connect")),
        }
        ViewAction::None
      }
      KeyCode::Esc if self.controller.state().notice.is_some() => {
        self.controller.dismiss_notice();
        ViewAction::None
      }
      KeyCode::Esc if self.search.filter().is_some() => {
        self.search = SearchInput::new();
        ViewAction::None
      }
      KeyCode::Char('q') | KeyCode::Esc => ViewAction::Pop,
      _ => return None,
    };
    Some(action)
  }

  fn render_tabs(&self, frame: &mut Frame, area: Rect) {
    let state = self.controller.state();
    let titles: Vec<Line> = Tab::ALL
      .iter()
      .enumerate()
      .map(|(i, tab)| {
        let count = state
          .rows
          .iter()
          .filter(|r| tab.includes(r.integration.platform))
          .count();
        Line::from(format!("{} {} ({})", i + 1, tab.label(), count))
      })
      .collect();
    let selected = Tab::ALL
      .iter()
      .position(|t| *t == state.active_tab)
      .unwrap_or(0);

    let tabs = Tabs::new(titles)
      .select(selected)
      .style(Style::default().fg(Color::DarkGray))
      .highlight_style(Style::default().fg(Color::Yellow).bold())
      .divider("│");
    frame.render_widget(tabs, area);
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let state = self.controller.state();
    let selected_org = state.selected_organization.clone();
    let loading: Vec<Platform> = Platform::ALL
      .into_iter()
      .filter(|p| state.active_tab.includes(*p) && state.is_loading(*p))
      .collect();
    let refreshing = state.refreshing;

    let items: Vec<ListItem> = self
      .visible()
      .into_iter()
      .map(|row| {
        let i = &row.integration;
        let (marker, marker_color) = row_marker(&row.state);
        let is_org = selected_org
          .as_ref()
          .is_some_and(|org| org.is(i.platform, &i.id));
        let name_style = match row.state {
          RowState::DeletePending => Style::default().fg(Color::DarkGray).crossed_out(),
          RowState::RenamePending { .. } => Style::default().fg(Color::DarkGray).italic(),
          _ => Style::default().fg(Color::White),
        };
        ListItem::new(Line::from(vec![
          Span::styled(marker, Style::default().fg(marker_color)),
          Span::styled(if is_org { "★ " } else { "  " }, Style::default().fg(Color::Yellow)),
          Span::styled(
            format!("{:<11}", i.platform.label()),
            Style::default().fg(platform_color(i.platform)),
          ),
          Span::styled(format!("{:<32}", truncate(&i.name, 30)), name_style),
          Span::styled(
            truncate(i.organization_name.as_deref().unwrap_or(""), 24),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();
    let len = items.len();
    ensure_valid_selection(&mut self.list_state, len);

    let mut title = format!(
      " Integrations ({}){} sort:{} ",
      len,
      self.search.title_suffix(),
      self.sort.label()
    );
    if refreshing && loading.is_empty() {
      title.push_str("⟳ ");
    }

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let lines: Vec<Line> = if loading.is_empty() {
        vec![Line::from("No integrations. Press 'a' to connect one.")]
      } else {
        loading
          .iter()
          .map(|p| Line::from(format!("{:<11}loading...", p.label())))
          .collect()
      };
      frame.render_widget(
        Paragraph::new(lines)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    }

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(" Details ")
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let label = |s: &'static str| Span::styled(format!("{:<12}", s), Style::default().fg(Color::DarkGray));
    let mut lines: Vec<Line> = Vec::new();

    if let Some(i) = self.selected() {
      let state = self.controller.state();
      lines.push(Line::from(vec![label("Name"), Span::raw(i.name.clone())]));
      lines.push(Line::from(vec![
        label("Platform"),
        Span::styled(i.platform.label(), Style::default().fg(platform_color(i.platform))),
      ]));
      if let Some(org) = &i.organization_name {
        lines.push(Line::from(vec![label("Organization"), Span::raw(org.clone())]));
      }
      if let Some(users) = i.total_users {
        lines.push(Line::from(vec![label("Users"), Span::raw(users.to_string())]));
      }
      if let Some(suffix) = &i.token_suffix {
        lines.push(Line::from(vec![label("Token"), Span::raw(format!("…{}", suffix))]));
      }
      if let Some(created) = i.created_at {
        lines.push(Line::from(vec![
          label("Connected"),
          Span::raw(created.format("%Y-%m-%d %H:%M").to_string()),
        ]));
      }
      if let Some(used) = i.last_used_at {
        lines.push(Line::from(vec![
          label("Last used"),
          Span::raw(format!("{} ago", describe_age(used, Utc::now()))),
        ]));
      }
      if let Some(status) = match i.platform {
        Platform::GitHub => Some(&state.github_status),
        Platform::Slack => Some(&state.slack_status),
        _ => None,
      } {
        let text = if status.connected { "connected" } else { "not connected" };
        lines.push(Line::from(vec![label("Status"), Span::raw(text)]));
      }

      if !i.permissions.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::styled("Permissions", Style::default().bold()));
        for (name, permission) in &i.permissions {
          let (mark, color) = if permission.access {
            ("✓", Color::Green)
          } else {
            ("✗", Color::Red)
          };
          let mut spans = vec![
            Span::styled(format!(" {} ", mark), Style::default().fg(color)),
            Span::raw(name.clone()),
          ];
          if let Some(error) = permission.error.as_ref().filter(|_| !permission.access) {
            spans.push(Span::styled(format!("  {}", error), Style::default().fg(Color::DarkGray)));
          }
          lines.push(Line::from(spans));
        }
      }

      if let Some(row) = state.row(i.platform, &i.id) {
        if let RowState::Failed(reason) = &row.state {
          lines.push(Line::from(""));
          lines.push(Line::styled(
            format!("Last change failed: {}", reason),
            Style::default().fg(Color::Red),
          ));
        }
      }
    }

    match (&self.connect, &self.connect_url) {
      (Some((platform, query)), _) if query.is_loading() => {
        lines.push(Line::from(""));
        lines.push(Line::from(format!("Requesting {} authorization...", platform)));
      }
      (_, Some((platform, url))) => {
        lines.push(Line::from(""));
        lines.push(Line::styled(
          format!("Open this URL to connect {}:", platform),
          Style::default().fg(Color::Yellow),
        ));
        lines.push(Line::styled(url.clone(), Style::default().fg(Color::Cyan)));
        lines.push(Line::from("Then run: b9s --oauth-callback '<redirect url>'"));
      }
      _ => {}
    }

    frame.render_widget(
      Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
      area,
    );
  }
}

impl View for IntegrationsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_overlays(key)
      .or_else(|| self.handle_navigation(key))
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let rows = Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).split(area);
    self.render_tabs(frame, rows[0]);

    let cols =
      Layout::horizontal([Constraint::Percentage(62), Constraint::Percentage(38)]).split(rows[1]);
    self.render_list(frame, cols[0]);
    self.render_detail(frame, cols[1]);

    self.search.render_overlay(frame, area);
    self.rename.render_overlay(frame, area);
    self.confirm_delete.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Integrations".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.controller.poll();

    if let Some((platform, query)) = &mut self.connect {
      if query.poll() {
        let platform = *platform;
        if let Some(url) = query.data() {
          self.connect_url = Some((platform, url.clone()));
        } else if let Some(e) = query.error() {
          let message = format!("Could not start {} connection: {}", platform, e);
          let unauthorized = e.is_auth();
          self.connect = None;
          if unauthorized {
            return ViewAction::LoginRequired;
          }
          self.controller.notify(Notice::error(message));
        }
      }
    }

    let auth_required = self.controller.state().auth_required;
    if !auth_required {
      self.login_prompted = false;
    } else if !self.login_prompted {
      self.login_prompted = true;
      return ViewAction::LoginRequired;
    }
    ViewAction::None
  }

  fn on_result(&mut self, result: ViewResult) {
    match result {
      ViewResult::IntegrationAdded(integration) => self.controller.integration_added(integration),
      ViewResult::LoggedIn(_) => self.controller.refresh(),
      ViewResult::MappingSaved => {}
    }
  }

  fn refresh(&mut self) {
    self.controller.refresh();
  }

  fn captures_input(&self) -> bool {
    self.search.is_active() || self.rename.is_active()
  }

  fn context(&self) -> Option<String> {
    let state = self.controller.state();
    let mut parts = Vec::new();
    if let Some(org) = state.selected_integration() {
      parts.push(org.name.clone());
    }
    let freshness = match (state.source, state.last_fetch) {
      (_, _) if state.any_loading() => "loading".to_string(),
      (Some(CacheSource::Network), Some(at)) => format!("live {}", describe_age(at, Utc::now())),
      (Some(CacheSource::CacheFresh), Some(at)) => format!("cached {}", describe_age(at, Utc::now())),
      (Some(_), Some(at)) => format!("stale {}", describe_age(at, Utc::now())),
      _ => "not fetched".to_string(),
    };
    parts.push(freshness);
    Some(parts.join(" · "))
  }

  fn status(&self) -> Option<(String, Color)> {
    let state = self.controller.state();
    if let Some(notice) = &state.notice {
      let color = match notice.level {
        NoticeLevel::Info => Color::Green,
        NoticeLevel::Error => Color::Red,
      };
      return Some((notice.message.clone(), color));
    }
    state
      .refreshing
      .then(|| ("Refreshing...".to_string(), Color::DarkGray))
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = global_shortcuts();
    shortcuts.extend([
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("a", "add").with_priority(40),
      ShortcutInfo::new("e", "rename").with_priority(41),
      ShortcutInfo::new("d", "delete").with_priority(42),
      ShortcutInfo::new("c", "connect").with_priority(43),
      ShortcutInfo::new("⏎", "use org").with_priority(44),
      ShortcutInfo::new("s", "sort").with_priority(50),
      ShortcutInfo::new("r", "refresh").with_priority(51),
    ]);
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{EnrichmentStatus, OrganizationRef};
  use crate::api::ApiClient;
  use crate::cache::{CacheSnapshot, FreshnessPolicy, SnapshotStore};
  use crate::store::{MemoryStore, PersistedState};
  use crate::test_support::integration;
  use crossterm::event::KeyModifiers;
  use std::sync::Arc;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn view_with(list: Vec<Integration>) -> IntegrationsView {
    // Fresh cache: mounting never touches the network
    let client = ApiClient::new("http://127.0.0.1:9", Some("t".to_string())).unwrap();
    let state = PersistedState::new(Arc::new(MemoryStore::new()), "http://127.0.0.1:9");
    let snapshots = SnapshotStore::new(state);
    snapshots.save(&CacheSnapshot::from_list(
      list,
      EnrichmentStatus::default(),
      EnrichmentStatus::default(),
      Some(Utc::now()),
    ));
    IntegrationsView::new(IntegrationsController::new(
      client,
      snapshots,
      FreshnessPolicy::default(),
    ))
  }

  fn names(view: &IntegrationsView) -> Vec<String> {
    view
      .visible()
      .iter()
      .map(|r| r.integration.name.clone())
      .collect()
  }

  #[test]
  fn test_sort_and_search() {
    let mut view = view_with(vec![
      integration(Platform::Rootly, "1", "zeta"),
      integration(Platform::PagerDuty, "2", "Alpha"),
    ]);
    assert_eq!(names(&view), vec!["zeta", "Alpha"]);

    view.handle_key(key(KeyCode::Char('s')));
    assert_eq!(names(&view), vec!["Alpha", "zeta"]);

    view.handle_key(key(KeyCode::Char('/')));
    view.handle_key(key(KeyCode::Char('z')));
    assert_eq!(names(&view), vec!["zeta"]);
  }

  #[test]
  fn test_number_keys_switch_tabs() {
    let mut view = view_with(vec![
      integration(Platform::Rootly, "1", "Acme"),
      integration(Platform::PagerDuty, "2", "PD"),
    ]);
    view.handle_key(key(KeyCode::Char('3')));
    assert_eq!(names(&view), vec!["PD"]);
    view.handle_key(key(KeyCode::Char('1')));
    assert_eq!(names(&view).len(), 2);
  }

  #[test]
  fn test_enter_selects_organization() {
    let mut view = view_with(vec![integration(Platform::Rootly, "1", "Acme")]);
    view.list_state.select(Some(0));
    view.handle_key(key(KeyCode::Enter));
    assert_eq!(
      view.controller.state().selected_organization,
      Some(OrganizationRef::new(Platform::Rootly, "1"))
    );
    assert!(view.context().unwrap_or_default().starts_with("Acme"));
  }

  #[test]
  fn test_rename_dialog_rejects_overlong_name() {
    let mut view = view_with(vec![integration(Platform::Rootly, "1", "Acme")]);
    view.list_state.select(Some(0));
    view.handle_key(key(KeyCode::Char('e')));
    assert!(view.captures_input());

    for _ in 0..101 {
      view.handle_key(key(KeyCode::Char('x')));
    }
    view.handle_key(key(KeyCode::Enter));
    // Still open with the error, and nothing was sent
    assert!(view.rename.is_active());
    assert_eq!(view.controller.state().rows[0].state, RowState::Confirmed);
  }
}
