use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tracing::info;

use crate::api::types::{Invitation, Member, Role};
use crate::api::ApiClient;
use crate::query::Query;
use crate::ui::components::{
  ConfirmDialog, ConfirmEvent, KeyResult, PromptDialog, PromptEvent,
};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{global_shortcuts, ShortcutInfo, View, ViewAction};
use crate::validation::validate_email;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
  Members,
  Invitations,
}

/// Organization members and pending invitations
pub struct MembersView {
  client: ApiClient,
  members: Query<Vec<Member>>,
  invitations: Query<Vec<Invitation>>,
  pane: Pane,
  member_state: ListState,
  invitation_state: ListState,
  invite_prompt: PromptDialog<Role>,
  confirm_revoke: ConfirmDialog<String>,
  /// In-flight invite or revoke; resolves to the status message
  action: Option<Query<String>>,
  status: Option<(String, Color)>,
}

impl MembersView {
  pub fn new(client: ApiClient) -> Self {
    let members_client = client.clone();
    let mut members = Query::new(move || {
      let client = members_client.clone();
      async move { client.list_members().await }
    });
    members.fetch();

    let invitations_client = client.clone();
    let mut invitations = Query::new(move || {
      let client = invitations_client.clone();
      async move { client.list_invitations().await }
    });
    invitations.fetch();

    Self {
      client,
      members,
      invitations,
      pane: Pane::Members,
      member_state: ListState::default(),
      invitation_state: ListState::default(),
      invite_prompt: PromptDialog::new(),
      confirm_revoke: ConfirmDialog::new(),
      action: None,
      status: None,
    }
  }

  fn pending_invitations(&self) -> Vec<&Invitation> {
    self
      .invitations
      .data()
      .map(|v| v.as_slice())
      .unwrap_or(&[])
      .iter()
      .filter(|i| i.status.as_deref().map_or(true, |s| s == "pending"))
      .collect()
  }

  fn selected_invitation(&self) -> Option<Invitation> {
    let idx = self.invitation_state.selected()?;
    self.pending_invitations().get(idx).map(|i| (*i).clone())
  }

  fn run_action<F, Fut>(&mut self, action: F)
  where
    F: Fn(ApiClient) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, crate::error::ApiError>> + Send + 'static,
  {
    let client = self.client.clone();
    let mut query = Query::new(move || action(client.clone()));
    query.fetch();
    self.action = Some(query);
  }

  fn invite(&mut self, email: String, role: Role) {
    let email = email.trim().to_string();
    if let Err(e) = validate_email(&email) {
      self.invite_prompt.reject(&email, role, e.to_string());
      return;
    }
    info!(%role, "sending invitation");
    self.run_action(move |client| {
      let email = email.clone();
      async move {
        let invitation = client.invite(&email, role).await?;
        Ok(format!("Invited {} as {}", invitation.email, invitation.role))
      }
    });
  }

  fn revoke(&mut self, id: String) {
    self.run_action(move |client| {
      let id = id.clone();
      async move {
        client.revoke_invitation(&id).await?;
        Ok("Invitation revoked".to_string())
      }
    });
  }

  fn handle_overlays(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match self.invite_prompt.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted { value, payload }) => {
        self.invite(value, payload);
        return Some(ViewAction::None);
      }
      KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => {
        return Some(ViewAction::None)
      }
      KeyResult::NotHandled => {}
    }

    match self.confirm_revoke.handle_key(key) {
      KeyResult::Event(ConfirmEvent::Confirmed(id)) => {
        self.revoke(id);
        Some(ViewAction::None)
      }
      KeyResult::Event(ConfirmEvent::Cancelled) | KeyResult::Handled => Some(ViewAction::None),
      KeyResult::NotHandled => None,
    }
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let state = match self.pane {
      Pane::Members => &mut self.member_state,
      Pane::Invitations => &mut self.invitation_state,
    };
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => state.select_previous(),
      KeyCode::Tab | KeyCode::BackTab | KeyCode::Char('h') | KeyCode::Char('l') => {
        self.pane = match self.pane {
          Pane::Members => Pane::Invitations,
          Pane::Invitations => Pane::Members,
        };
      }
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let busy = self.action.as_ref().is_some_and(|q| q.is_loading());
    match key.code {
      KeyCode::Char('i') if !busy => {
        self.invite_prompt.show("Invite member (email)", "", Role::Member);
      }
      KeyCode::Char('I') if !busy => {
        self.invite_prompt.show("Invite admin (email)", "", Role::Admin);
      }
      KeyCode::Char('x') | KeyCode::Char('d') if !busy && self.pane == Pane::Invitations => {
        if let Some(invitation) = self.selected_invitation() {
          self.confirm_revoke.show(
            format!("Revoke invitation for {}?", invitation.email),
            invitation.id,
          );
        }
      }
      KeyCode::Char('r') => self.refresh(),
      KeyCode::Char('q') | KeyCode::Esc => return Some(ViewAction::Pop),
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn render_members(&mut self, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = self
      .members
      .data()
      .map(|v| v.as_slice())
      .unwrap_or(&[])
      .iter()
      .map(|m| {
        let role_color = match m.role {
          Role::Admin => Color::Yellow,
          Role::Member => Color::DarkGray,
        };
        ListItem::new(Line::from(vec![
          Span::raw(format!(
            "{:<24}",
            truncate(m.name.as_deref().unwrap_or("-"), 22)
          )),
          Span::raw(format!("{:<32}", truncate(&m.email, 30))),
          Span::styled(m.role.to_string(), Style::default().fg(role_color)),
        ]))
      })
      .collect();
    let len = items.len();
    ensure_valid_selection(&mut self.member_state, len);

    let title = if self.members.is_loading() {
      " Members (loading...) ".to_string()
    } else {
      format!(" Members ({}) ", len)
    };
    let block = pane_block(title, self.pane == Pane::Members);

    if let (0, Some(e)) = (len, self.members.error()) {
      frame.render_widget(
        Paragraph::new(format!("Failed to load members: {}", e))
          .block(block)
          .style(Style::default().fg(Color::Red)),
        area,
      );
      return;
    }

    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray))
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.member_state);
  }

  fn render_invitations(&mut self, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = self
      .pending_invitations()
      .into_iter()
      .map(|i| {
        let expires = i
          .expires_at
          .map(|t| format!("expires {}", t.format("%Y-%m-%d")))
          .unwrap_or_default();
        ListItem::new(Line::from(vec![
          Span::raw(format!("{:<32}", truncate(&i.email, 30))),
          Span::styled(format!("{:<8}", i.role), Style::default().fg(Color::Cyan)),
          Span::styled(expires, Style::default().fg(Color::DarkGray)),
        ]))
      })
      .collect();
    let len = items.len();
    ensure_valid_selection(&mut self.invitation_state, len);

    let title = if self.invitations.is_loading() {
      " Pending invitations (loading...) ".to_string()
    } else {
      format!(" Pending invitations ({}) ", len)
    };
    let block = pane_block(title, self.pane == Pane::Invitations);

    if len == 0 && !self.invitations.is_loading() {
      let content = match self.invitations.error() {
        Some(e) => format!("Failed to load invitations: {}", e),
        None => "No pending invitations. Press 'i' to invite someone.".to_string(),
      };
      frame.render_widget(
        Paragraph::new(content)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    }

    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray))
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.invitation_state);
  }
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
  let border = if focused { Color::Blue } else { Color::DarkGray };
  Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(border))
}

impl View for MembersView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_overlays(key)
      .or_else(|| self.handle_navigation(key))
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
      .split(area);

    self.render_members(frame, chunks[0]);
    self.render_invitations(frame, chunks[1]);

    self.invite_prompt.render_overlay(frame, area);
    self.confirm_revoke.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Members".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    let mut unauthorized = false;
    if self.members.poll() {
      unauthorized |= self.members.is_unauthorized();
    }
    if self.invitations.poll() {
      unauthorized |= self.invitations.is_unauthorized();
      let pending = self.pending_invitations().len();
      ensure_valid_selection(&mut self.invitation_state, pending);
    }

    if let Some(action) = &mut self.action {
      if action.poll() {
        unauthorized |= action.is_unauthorized();
        self.status = Some(match (action.data(), action.error()) {
          (Some(message), _) => (message.clone(), Color::Green),
          (None, Some(e)) => (e.to_string(), Color::Red),
          (None, None) => ("Done".to_string(), Color::Green),
        });
        self.action = None;
        self.invitations.refetch();
      }
    }

    if unauthorized {
      ViewAction::LoginRequired
    } else {
      ViewAction::None
    }
  }

  fn refresh(&mut self) {
    self.members.refetch();
    self.invitations.refetch();
  }

  fn captures_input(&self) -> bool {
    self.invite_prompt.is_active()
  }

  fn status(&self) -> Option<(String, Color)> {
    if self.action.as_ref().is_some_and(|q| q.is_loading()) {
      return Some(("Working...".to_string(), Color::Yellow));
    }
    self.status.clone()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = global_shortcuts();
    shortcuts.extend([
      ShortcutInfo::new("Tab", "switch pane").with_priority(20),
      ShortcutInfo::new("i", "invite").with_priority(40),
      ShortcutInfo::new("I", "invite admin").with_priority(41),
      ShortcutInfo::new("r", "refresh").with_priority(50),
    ]);
    if self.pane == Pane::Invitations {
      shortcuts.push(ShortcutInfo::new("x", "revoke").with_priority(42));
    }
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_text(view: &mut MembersView, text: &str) {
    for c in text.chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
  }

  async fn mount_lists(server: &MockServer) {
    Mock::given(method("GET"))
      .and(path("/organizations/members"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "members": [{"id": 1, "name": "Ada", "email": "ada@example.com", "role": "admin"}]
      })))
      .mount(server)
      .await;
    Mock::given(method("GET"))
      .and(path("/organizations/invitations"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "invitations": [
          {"id": 10, "email": "bob@example.com", "role": "member", "status": "pending"},
          {"id": 11, "email": "old@example.com", "role": "member", "status": "accepted"}
        ]
      })))
      .mount(server)
      .await;
  }

  async fn settle(view: &mut MembersView) -> ViewAction {
    for _ in 0..100 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      let action = view.tick();
      if !matches!(action, ViewAction::None) {
        return action;
      }
      let loading = view.members.is_loading()
        || view.invitations.is_loading()
        || view.action.is_some();
      if !loading {
        break;
      }
    }
    ViewAction::None
  }

  #[tokio::test]
  async fn test_only_pending_invitations_are_listed() {
    let server = MockServer::start().await;
    mount_lists(&server).await;

    let client = ApiClient::new(&server.uri(), Some("t".to_string())).unwrap();
    let mut view = MembersView::new(client);
    settle(&mut view).await;

    assert_eq!(view.members.data().map(|m| m.len()), Some(1));
    let pending = view.pending_invitations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].email, "bob@example.com");
  }

  #[tokio::test]
  async fn test_invalid_email_keeps_prompt_open() {
    let server = MockServer::start().await;
    mount_lists(&server).await;

    let client = ApiClient::new(&server.uri(), Some("t".to_string())).unwrap();
    let mut view = MembersView::new(client);
    settle(&mut view).await;

    view.handle_key(key(KeyCode::Char('i')));
    type_text(&mut view, "not-an-email");
    view.handle_key(key(KeyCode::Enter));

    assert!(view.invite_prompt.is_active());
    assert!(view.action.is_none());
  }

  #[tokio::test]
  async fn test_admin_invite_reports_status() {
    let server = MockServer::start().await;
    mount_lists(&server).await;
    Mock::given(method("POST"))
      .and(path("/organizations/invitations"))
      .and(body_json(json!({"email": "cy@example.com", "role": "admin"})))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!({
        "invitation": {"id": 12, "email": "cy@example.com", "role": "admin", "status": "pending"}
      })))
      .expect(1)
      .mount(&server)
      .await;

    let client = ApiClient::new(&server.uri(), Some("t".to_string())).unwrap();
    let mut view = MembersView::new(client);
    settle(&mut view).await;

    view.handle_key(key(KeyCode::Char('I')));
    type_text(&mut view, "cy@example.com");
    view.handle_key(key(KeyCode::Enter));
    assert!(view.action.is_some());
    settle(&mut view).await;

    let (message, color) = view.status().unwrap();
    assert_eq!(message, "Invited cy@example.com as admin");
    assert_eq!(color, Color::Green);
  }

  #[tokio::test]
  async fn test_revoke_requires_invitations_pane() {
    let server = MockServer::start().await;
    mount_lists(&server).await;
    Mock::given(method("DELETE"))
      .and(path("/organizations/invitations/10"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let client = ApiClient::new(&server.uri(), Some("t".to_string())).unwrap();
    let mut view = MembersView::new(client);
    settle(&mut view).await;

    view.handle_key(key(KeyCode::Char('x')));
    assert!(!view.confirm_revoke.is_active());

    view.handle_key(key(KeyCode::Tab));
    view.handle_key(key(KeyCode::Char('x')));
    assert!(view.confirm_revoke.is_active());
    view.handle_key(key(KeyCode::Char('y')));
    settle(&mut view).await;

    assert_eq!(view.status().unwrap().0, "Invitation revoked");
  }
}
