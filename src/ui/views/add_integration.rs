use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::api::types::{Integration, Platform, TokenTestOutcome};
use crate::api::ApiClient;
use crate::error::ApiError;
use crate::query::{Query, QueryState};
use crate::ui::components::{InputResult, TextInput};
use crate::ui::renderfns::form::{choice_line, input_line, message_line};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewResult};
use crate::validation::{validate_name, validate_token};

/// Platforms that can be connected with a pasted token
const TOKEN_PLATFORMS: [Platform; 3] = [Platform::Rootly, Platform::PagerDuty, Platform::GitHub];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
  Platform,
  Token,
  Name,
}

/// Form for connecting Rootly, PagerDuty or GitHub with an API token
pub struct AddIntegrationView {
  client: ApiClient,
  platform: usize,
  focus: Field,
  token: TextInput,
  name: TextInput,
  test: Option<Query<TokenTestOutcome>>,
  submit: Option<Query<Integration>>,
  error: Option<String>,
}

impl AddIntegrationView {
  pub fn new(client: ApiClient) -> Self {
    Self {
      client,
      platform: 0,
      focus: Field::Platform,
      token: TextInput::masked(),
      name: TextInput::new(),
      test: None,
      submit: None,
      error: None,
    }
  }

  fn platform(&self) -> Platform {
    TOKEN_PLATFORMS[self.platform]
  }

  fn fields(&self) -> &'static [Field] {
    if self.platform().is_incident_source() {
      &[Field::Platform, Field::Token, Field::Name]
    } else {
      &[Field::Platform, Field::Token]
    }
  }

  fn move_focus(&mut self, forward: bool) {
    let fields = self.fields();
    let idx = fields.iter().position(|f| *f == self.focus).unwrap_or(0);
    let next = if forward {
      (idx + 1) % fields.len()
    } else {
      (idx + fields.len() - 1) % fields.len()
    };
    self.focus = fields[next];
  }

  fn cycle_platform(&mut self, forward: bool) {
    let len = TOKEN_PLATFORMS.len();
    self.platform = if forward {
      (self.platform + 1) % len
    } else {
      (self.platform + len - 1) % len
    };
    self.test = None;
    self.error = None;
  }

  /// Shape problem with the token typed so far, shown as the user types
  fn token_error(&self) -> Option<String> {
    if self.token.is_empty() {
      return None;
    }
    validate_token(self.platform(), self.token.value())
      .err()
      .map(|e| e.to_string())
  }

  fn is_busy(&self) -> bool {
    self.submit.as_ref().is_some_and(|q| q.is_loading())
  }

  fn start_test(&mut self) {
    let platform = self.platform();
    if !platform.is_incident_source() {
      self.error = Some(format!("{} tokens are checked when you connect", platform));
      return;
    }
    if let Some(e) = self.token_error() {
      self.error = Some(e);
      return;
    }
    if self.token.is_empty() {
      self.error = Some("token is required".to_string());
      return;
    }

    let client = self.client.clone();
    let token = self.token.value().to_string();
    let mut query = Query::new(move || {
      let client = client.clone();
      let token = token.clone();
      async move { client.test_token(platform, &token).await }
    });
    query.fetch();
    self.test = Some(query);
    self.error = None;
  }

  fn start_submit(&mut self) {
    let platform = self.platform();
    if let Err(e) = validate_token(platform, self.token.value()) {
      self.error = Some(e.to_string());
      self.focus = Field::Token;
      return;
    }
    if platform.is_incident_source() {
      if let Err(e) = validate_name(self.name.value()) {
        self.error = Some(e.to_string());
        self.focus = Field::Name;
        return;
      }
    }

    let client = self.client.clone();
    let token = self.token.value().to_string();
    let name = self.name.value().to_string();
    let mut query = Query::new(move || {
      let client = client.clone();
      let token = token.clone();
      let name = name.clone();
      async move { client.add_integration(platform, &token, &name).await }
    });
    query.fetch();
    self.submit = Some(query);
    self.error = None;
  }

  /// Prefill the name from a successful token test
  fn apply_preview(&mut self) {
    if !self.name.is_empty() {
      return;
    }
    if let Some(TokenTestOutcome::Valid(preview)) = self.test.as_ref().and_then(|q| q.data()) {
      if let Some(name) = preview
        .suggested_name
        .as_ref()
        .or(preview.organization_name.as_ref())
      {
        self.name = TextInput::with_value(name);
      }
    }
  }

  /// Line describing the last token test
  fn test_message(&self) -> Option<(String, Color)> {
    match self.test.as_ref()?.state() {
      QueryState::Idle => None,
      QueryState::Loading => Some(("Testing token...".to_string(), Color::DarkGray)),
      QueryState::Success(outcome) => {
        let color = match outcome {
          TokenTestOutcome::Valid(_) => Color::Green,
          TokenTestOutcome::Invalid(_) => Color::Red,
          TokenTestOutcome::AlreadyConnected { .. } => Color::Yellow,
        };
        Some((outcome.message(), color))
      }
      QueryState::Error(e) => Some((format!("Test failed: {}", e), Color::Red)),
    }
  }
}

impl View for AddIntegrationView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.is_busy() {
      return ViewAction::None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
      KeyCode::Esc => return ViewAction::Pop,
      KeyCode::Tab | KeyCode::Down => self.move_focus(true),
      KeyCode::BackTab | KeyCode::Up => self.move_focus(false),
      KeyCode::Char('t') if ctrl => self.start_test(),
      KeyCode::Char('s') if ctrl => self.start_submit(),
      KeyCode::Enter => {
        if self.fields().last() == Some(&self.focus) {
          self.start_submit();
        } else {
          self.move_focus(true);
        }
      }
      _ => match self.focus {
        Field::Platform => match key.code {
          KeyCode::Left | KeyCode::Char('h') => self.cycle_platform(false),
          KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => self.cycle_platform(true),
          _ => {}
        },
        Field::Token => {
          if self.token.handle_key(key) == InputResult::Consumed {
            self.test = None;
            self.error = None;
          }
        }
        Field::Name => {
          if self.name.handle_key(key) == InputResult::Consumed {
            self.error = None;
          }
        }
      },
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let labels: Vec<&str> = TOKEN_PLATFORMS.iter().map(|p| p.label()).collect();
    let platform = self.platform();

    let mut lines = vec![
      Line::from(""),
      choice_line("Platform", &labels, self.platform, self.focus == Field::Platform),
      Line::from(""),
      input_line("API token", &self.token, self.focus == Field::Token),
    ];
    if let Some(e) = self.token_error() {
      lines.push(message_line(&e, Color::Red));
    }
    if let Some((message, color)) = self.test_message() {
      lines.push(message_line(&message, color));
    }

    if platform.is_incident_source() {
      lines.push(Line::from(""));
      lines.push(input_line("Name", &self.name, self.focus == Field::Name));
    }

    if let Some(TokenTestOutcome::Valid(preview)) = self.test.as_ref().and_then(|q| q.data()) {
      lines.push(Line::from(""));
      if let Some(users) = preview.total_users {
        lines.push(message_line(&format!("{} users", users), Color::Gray));
      }
      for (name, permission) in preview.permissions.iter().filter(|(_, p)| !p.access) {
        let reason = permission.error.as_deref().unwrap_or("no access");
        lines.push(message_line(&format!("✗ {}: {}", name, reason), Color::Yellow));
      }
    }

    lines.push(Line::from(""));
    if let Some(error) = &self.error {
      lines.push(message_line(error, Color::Red));
    }
    if self.is_busy() {
      lines.push(message_line(&format!("Connecting {}...", platform), Color::DarkGray));
    }

    let block = Block::default()
      .title(format!(" Connect {} ", platform))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    frame.render_widget(
      Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
      area,
    );
  }

  fn breadcrumb_label(&self) -> String {
    "Add integration".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    if let Some(test) = &mut self.test {
      if test.poll() {
        if test.is_unauthorized() {
          return ViewAction::LoginRequired;
        }
        self.apply_preview();
      }
    }

    let Some(submit) = &mut self.submit else {
      return ViewAction::None;
    };
    if !submit.poll() {
      return ViewAction::None;
    }
    match submit.state().clone() {
      QueryState::Success(integration) => {
        ViewAction::PopWith(ViewResult::IntegrationAdded(integration))
      }
      QueryState::Error(ApiError::Unauthorized) => {
        self.submit = None;
        ViewAction::LoginRequired
      }
      QueryState::Error(ApiError::AlreadyConnected { name }) => {
        self.error = Some(format!("Already connected as {}", name));
        self.submit = None;
        ViewAction::None
      }
      QueryState::Error(e) => {
        self.error = Some(e.to_string());
        self.submit = None;
        ViewAction::None
      }
      QueryState::Idle | QueryState::Loading => ViewAction::None,
    }
  }

  fn on_result(&mut self, result: ViewResult) {
    if let ViewResult::LoggedIn(_) = result {
      self.error = Some("Signed in, submit again".to_string());
    }
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("Tab", "next field").with_priority(10),
      ShortcutInfo::new("^T", "test token").with_priority(20),
      ShortcutInfo::new("^S", "connect").with_priority(30),
      ShortcutInfo::new("Esc", "cancel").with_priority(40),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::rootly_token;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
  }

  fn type_text(view: &mut AddIntegrationView, text: &str) {
    for c in text.chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
  }

  fn offline_view() -> AddIntegrationView {
    AddIntegrationView::new(ApiClient::new("http://127.0.0.1:9", Some("t".to_string())).unwrap())
  }

  async fn settle(view: &mut AddIntegrationView) -> ViewAction {
    for _ in 0..100 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      let action = view.tick();
      let busy = view.test.as_ref().is_some_and(|q| q.is_loading()) || view.is_busy();
      if !busy {
        return action;
      }
    }
    ViewAction::None
  }

  #[test]
  fn test_inline_token_validation() {
    let mut view = offline_view();
    view.handle_key(key(KeyCode::Tab));
    type_text(&mut view, &format!("rootly_{}", "a".repeat(63)));
    assert!(view.token_error().is_some());

    type_text(&mut view, "a");
    assert_eq!(view.token_error(), None);
  }

  #[test]
  fn test_submit_requires_name_for_incident_platforms() {
    let mut view = offline_view();
    view.handle_key(key(KeyCode::Tab));
    type_text(&mut view, &rootly_token());
    view.handle_key(ctrl('s'));

    assert_eq!(view.focus, Field::Name);
    assert!(view.error.is_some());
    assert!(view.submit.is_none());
  }

  #[test]
  fn test_github_form_has_no_name_field() {
    let mut view = offline_view();
    view.handle_key(key(KeyCode::Left));
    assert_eq!(view.platform(), Platform::GitHub);
    assert_eq!(view.fields(), &[Field::Platform, Field::Token]);
  }

  #[tokio::test]
  async fn test_already_connected_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rootly/token/test"))
      .respond_with(ResponseTemplate::new(409).set_body_json(json!({
        "detail": "duplicate",
        "existing_integration": "Acme Corp"
      })))
      .mount(&server)
      .await;

    let mut view =
      AddIntegrationView::new(ApiClient::new(&server.uri(), Some("t".to_string())).unwrap());
    view.handle_key(key(KeyCode::Tab));
    type_text(&mut view, &rootly_token());
    view.handle_key(ctrl('t'));
    settle(&mut view).await;

    let (message, _) = view.test_message().unwrap();
    assert_eq!(message, "Already connected as Acme Corp");
  }

  #[tokio::test]
  async fn test_successful_add_pops_with_integration() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rootly/token/add"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "integration": { "id": 12, "name": "Acme" }
      })))
      .mount(&server)
      .await;

    let mut view =
      AddIntegrationView::new(ApiClient::new(&server.uri(), Some("t".to_string())).unwrap());
    view.handle_key(key(KeyCode::Tab));
    type_text(&mut view, &rootly_token());
    view.handle_key(key(KeyCode::Tab));
    type_text(&mut view, "Acme");
    view.handle_key(key(KeyCode::Enter));

    match settle(&mut view).await {
      ViewAction::PopWith(ViewResult::IntegrationAdded(i)) => {
        assert_eq!(i.id, "12");
        assert_eq!(i.platform, Platform::Rootly);
      }
      _ => panic!("expected the new integration"),
    }
  }
}
