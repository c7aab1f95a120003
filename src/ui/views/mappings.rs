use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::api::types::ManualMapping;
use crate::api::ApiClient;
use crate::query::Query;
use crate::ui::components::{ConfirmDialog, ConfirmEvent, KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{platform_color, truncate};
use crate::ui::view::{global_shortcuts, ShortcutInfo, View, ViewAction, ViewResult};
use crate::ui::views::MappingFormView;

/// Manual identity mappings between incident platform users and GitHub/Slack
pub struct MappingsView {
  client: ApiClient,
  query: Query<Vec<ManualMapping>>,
  list_state: ListState,
  search: SearchInput,
  confirm_delete: ConfirmDialog<String>,
  delete: Option<Query<()>>,
  status: Option<(String, Color)>,
}

impl MappingsView {
  pub fn new(client: ApiClient) -> Self {
    let client_for_query = client.clone();
    let mut query = Query::new(move || {
      let client = client_for_query.clone();
      async move { client.list_mappings().await }
    });
    query.fetch();

    Self {
      client,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
      confirm_delete: ConfirmDialog::new(),
      delete: None,
      status: None,
    }
  }

  fn visible(&self) -> Vec<&ManualMapping> {
    self
      .query
      .data()
      .map(|v| v.as_slice())
      .unwrap_or(&[])
      .iter()
      .filter(|m| {
        self.search.matches([
          m.source_identifier.as_str(),
          m.target_identifier.as_str(),
          m.target_platform.label(),
        ])
      })
      .collect()
  }

  fn selected(&self) -> Option<ManualMapping> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|m| (*m).clone())
  }

  fn start_delete(&mut self, id: String) {
    let client = self.client.clone();
    let mut query = Query::new(move || {
      let client = client.clone();
      let id = id.clone();
      async move { client.delete_mapping(&id).await }
    });
    query.fetch();
    self.delete = Some(query);
  }

  fn handle_overlays(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match self.confirm_delete.handle_key(key) {
      KeyResult::Event(ConfirmEvent::Confirmed(id)) => {
        self.start_delete(id);
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

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let action = match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.list_state.select_next();
        ViewAction::None
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.list_state.select_previous();
        ViewAction::None
      }
      KeyCode::Char('r') => {
        self.query.refetch();
        ViewAction::None
      }
      KeyCode::Char('a') => {
        ViewAction::Push(Box::new(MappingFormView::create(self.client.clone())))
      }
      KeyCode::Char('e') | KeyCode::Enter => match self.selected() {
        Some(mapping) => ViewAction::Push(Box::new(MappingFormView::edit(
          self.client.clone(),
          mapping,
        ))),
        None => ViewAction::None,
      },
      KeyCode::Char('d') => {
        if let Some(m) = self.selected() {
          self.confirm_delete.show(
            format!("Delete mapping {} → {}?", m.source_identifier, m.target_identifier),
            m.id,
          );
        }
        ViewAction::None
      }
      KeyCode::Char('q') | KeyCode::Esc => ViewAction::Pop,
      _ => return None,
    };
    Some(action)
  }
}

impl View for MappingsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_overlays(key)
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = self
      .visible()
      .into_iter()
      .map(|m| {
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<11}", m.source_platform),
            Style::default().fg(Color::DarkGray),
          ),
          Span::raw(format!("{:<32}", truncate(&m.source_identifier, 30))),
          Span::styled("→ ", Style::default().fg(Color::DarkGray)),
          Span::styled(
            format!("{:<8}", m.target_platform.label()),
            Style::default().fg(platform_color(m.target_platform)),
          ),
          Span::raw(m.target_identifier.clone()),
        ]))
      })
      .collect();
    let len = items.len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = if self.query.is_loading() {
      " Mappings (loading...) ".to_string()
    } else {
      format!(" Mappings ({}){} ", len, self.search.title_suffix())
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 && !self.query.is_loading() {
      let content = match self.query.error() {
        Some(e) => format!("Failed to load mappings: {}", e),
        None => "No manual mappings. Press 'a' to add one.".to_string(),
      };
      frame.render_widget(
        Paragraph::new(content)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
    } else {
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

    self.search.render_overlay(frame, area);
    self.confirm_delete.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Mappings".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    if self.query.poll() {
      if self.query.is_unauthorized() {
        return ViewAction::LoginRequired;
      }
      let len = self.visible().len();
      ensure_valid_selection(&mut self.list_state, len);
    }

    if let Some(delete) = &mut self.delete {
      if delete.poll() {
        let unauthorized = delete.is_unauthorized();
        self.status = Some(match delete.error() {
          Some(e) => (format!("Delete failed: {}", e), Color::Red),
          None => ("Mapping deleted".to_string(), Color::Green),
        });
        self.delete = None;
        if unauthorized {
          return ViewAction::LoginRequired;
        }
        self.query.refetch();
      }
    }
    ViewAction::None
  }

  fn on_result(&mut self, result: ViewResult) {
    if let ViewResult::MappingSaved = result {
      self.status = Some(("Mapping saved".to_string(), Color::Green));
    }
    self.query.refetch();
  }

  fn refresh(&mut self) {
    self.query.refetch();
  }

  fn captures_input(&self) -> bool {
    self.search.is_active()
  }

  fn status(&self) -> Option<(String, Color)> {
    self.status.clone()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = global_shortcuts();
    shortcuts.extend([
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("a", "add").with_priority(40),
      ShortcutInfo::new("e", "edit").with_priority(41),
      ShortcutInfo::new("d", "delete").with_priority(42),
      ShortcutInfo::new("r", "refresh").with_priority(50),
    ]);
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  async fn settle(view: &mut MappingsView) -> ViewAction {
    for _ in 0..100 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      let action = view.tick();
      if !matches!(action, ViewAction::None) {
        return action;
      }
      if !view.query.is_loading() && view.delete.is_none() {
        break;
      }
    }
    ViewAction::None
  }

  async fn mount_list(server: &MockServer) {
    Mock::given(method("GET"))
      .and(path("/mappings/manual"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "mappings": [
          {"id": 1, "source_platform": "rootly", "source_identifier": "ada@example.com",
           "target_platform": "github", "target_identifier": "ada"},
          {"id": 2, "source_platform": "pagerduty", "source_identifier": "bob@example.com",
           "target_platform": "slack", "target_identifier": "U01ABCDEF23"}
        ]
      })))
      .mount(server)
      .await;
  }

  #[tokio::test]
  async fn test_search_filters_by_identifier() {
    let server = MockServer::start().await;
    mount_list(&server).await;

    let client = ApiClient::new(&server.uri(), Some("t".to_string())).unwrap();
    let mut view = MappingsView::new(client);
    settle(&mut view).await;
    assert_eq!(view.visible().len(), 2);

    view.handle_key(key(KeyCode::Char('/')));
    for c in "bob".chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
    let visible = view.visible();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].target_identifier, "U01ABCDEF23");
  }

  #[tokio::test]
  async fn test_confirmed_delete_calls_backend() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("DELETE"))
      .and(path("/mappings/manual/1"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let client = ApiClient::new(&server.uri(), Some("t".to_string())).unwrap();
    let mut view = MappingsView::new(client);
    settle(&mut view).await;

    view.handle_key(key(KeyCode::Char('d')));
    view.handle_key(key(KeyCode::Char('y')));
    assert!(view.delete.is_some());
    settle(&mut view).await;

    assert_eq!(view.status().unwrap().0, "Mapping deleted");
  }

  #[tokio::test]
  async fn test_unauthorized_list_requests_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/mappings/manual"))
      .respond_with(ResponseTemplate::new(401))
      .mount(&server)
      .await;

    let client = ApiClient::new(&server.uri(), Some("t".to_string())).unwrap();
    let mut view = MappingsView::new(client);
    let action = settle(&mut view).await;
    assert!(matches!(action, ViewAction::LoginRequired));
  }
}
