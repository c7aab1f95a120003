use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};
use tracing::info;

use crate::api::types::UserProfile;
use crate::api::ApiClient;
use crate::query::{Query, QueryState};
use crate::store::PersistedState;
use crate::ui::centered_rect;
use crate::ui::components::{InputResult, TextInput};
use crate::ui::renderfns::form::{input_line, message_line};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewResult};

/// Asks for an API token and checks it against the current-user endpoint
pub struct LoginView {
  client: ApiClient,
  state: PersistedState,
  token: TextInput,
  check: Option<Query<UserProfile>>,
  error: Option<String>,
}

impl LoginView {
  pub fn new(client: ApiClient, state: PersistedState) -> Self {
    Self {
      client,
      state,
      token: TextInput::masked(),
      check: None,
      error: None,
    }
  }

  fn submit(&mut self, token: String) {
    let token = token.trim().to_string();
    if token.is_empty() {
      self.error = Some("token is required".to_string());
      return;
    }

    self.client.set_token(Some(token));
    let client = self.client.clone();
    let mut query = Query::new(move || {
      let client = client.clone();
      async move { client.current_user().await }
    });
    query.fetch();
    self.check = Some(query);
    self.error = None;
  }
}

impl View for LoginView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.check.as_ref().is_some_and(|q| q.is_loading()) {
      return ViewAction::None;
    }
    match self.token.handle_key(key) {
      InputResult::Submitted(token) => self.submit(token),
      InputResult::Cancelled => return ViewAction::Pop,
      InputResult::Consumed => self.error = None,
      InputResult::NotHandled => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let mut lines = vec![
      Line::from(""),
      Line::styled(
        format!("  Sign in to {}", self.client.base_url()),
        Style::default().fg(Color::White),
      ),
      Line::from(""),
      input_line("API token", &self.token, true),
    ];
    if let Some(error) = &self.error {
      lines.push(message_line(error, Color::Red));
    } else if self.check.as_ref().is_some_and(|q| q.is_loading()) {
      lines.push(message_line("Checking...", Color::DarkGray));
    }

    let block = Block::default()
      .title(" Login ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow));

    frame.render_widget(
      Paragraph::new(lines).block(block),
      centered_rect(80, 8, area),
    );
  }

  fn breadcrumb_label(&self) -> String {
    "Login".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    let Some(check) = &mut self.check else {
      return ViewAction::None;
    };
    if !check.poll() {
      return ViewAction::None;
    }

    match check.state().clone() {
      QueryState::Success(profile) => {
        self.state.set_auth_token(Some(self.token.value().trim()));
        self.state.set_user_profile(&profile);
        info!(user = profile.display_name(), "signed in");
        ViewAction::PopWith(ViewResult::LoggedIn(profile))
      }
      QueryState::Error(e) => {
        self.client.set_token(None);
        self.error = Some(if e.is_auth() {
          "Token rejected".to_string()
        } else {
          format!("Could not verify token: {}", e)
        });
        self.check = None;
        ViewAction::None
      }
      QueryState::Idle | QueryState::Loading => ViewAction::None,
    }
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn is_login(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("⏎", "sign in").with_priority(10),
      ShortcutInfo::new("Esc", "cancel").with_priority(20),
    ]
  }
}
