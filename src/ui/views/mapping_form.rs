use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::api::types::{ManualMapping, NewMapping, Platform};
use crate::api::ApiClient;
use crate::query::{Query, QueryState};
use crate::ui::components::{InputResult, TextInput};
use crate::ui::renderfns::form::{choice_line, input_line, message_line};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewResult};
use crate::validation::{validate_mapping, validate_mapping_target};

const SOURCES: [Platform; 2] = [Platform::Rootly, Platform::PagerDuty];
const TARGETS: [Platform; 2] = [Platform::GitHub, Platform::Slack];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
  Source,
  SourceIdentifier,
  Target,
  TargetIdentifier,
}

/// Create a mapping, or change the target identifier of an existing one
pub struct MappingFormView {
  client: ApiClient,
  /// Set when editing; only the target identifier can change then
  existing: Option<ManualMapping>,
  source: usize,
  target: usize,
  focus: Field,
  source_identifier: TextInput,
  target_identifier: TextInput,
  submit: Option<Query<ManualMapping>>,
  error: Option<String>,
}

impl MappingFormView {
  pub fn create(client: ApiClient) -> Self {
    Self {
      client,
      existing: None,
      source: 0,
      target: 0,
      focus: Field::Source,
      source_identifier: TextInput::new(),
      target_identifier: TextInput::new(),
      submit: None,
      error: None,
    }
  }

  pub fn edit(client: ApiClient, mapping: ManualMapping) -> Self {
    let source = SOURCES
      .iter()
      .position(|p| p.slug() == mapping.source_platform)
      .unwrap_or(0);
    let target = TARGETS
      .iter()
      .position(|p| *p == mapping.target_platform)
      .unwrap_or(0);
    Self {
      client,
      source,
      target,
      focus: Field::TargetIdentifier,
      source_identifier: TextInput::with_value(&mapping.source_identifier),
      target_identifier: TextInput::with_value(&mapping.target_identifier),
      existing: Some(mapping),
      submit: None,
      error: None,
    }
  }

  fn fields(&self) -> &'static [Field] {
    if self.existing.is_some() {
      &[Field::TargetIdentifier]
    } else {
      &[
        Field::Source,
        Field::SourceIdentifier,
        Field::Target,
        Field::TargetIdentifier,
      ]
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

  fn target_platform(&self) -> Platform {
    TARGETS[self.target]
  }

  fn start_submit(&mut self) {
    let target_platform = self.target_platform();
    let target_identifier = self.target_identifier.value().trim().to_string();
    let client = self.client.clone();

    let mut query = match &self.existing {
      Some(mapping) => {
        if let Err(e) = validate_mapping_target(target_platform, &target_identifier) {
          self.error = Some(e.to_string());
          return;
        }
        let id = mapping.id.clone();
        Query::new(move || {
          let client = client.clone();
          let id = id.clone();
          let target_identifier = target_identifier.clone();
          async move {
            client
              .update_mapping(&id, target_platform, &target_identifier)
              .await
          }
        })
      }
      None => {
        let mapping = NewMapping {
          source_platform: SOURCES[self.source].slug().to_string(),
          source_identifier: self.source_identifier.value().trim().to_string(),
          target_platform,
          target_identifier,
        };
        if let Err(e) = validate_mapping(
          &mapping.source_identifier,
          mapping.target_platform,
          &mapping.target_identifier,
        ) {
          self.error = Some(e.to_string());
          return;
        }
        Query::new(move || {
          let client = client.clone();
          let mapping = mapping.clone();
          async move { client.create_mapping(&mapping).await }
        })
      }
    };

    query.fetch();
    self.submit = Some(query);
    self.error = None;
  }
}

impl View for MappingFormView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.submit.as_ref().is_some_and(|q| q.is_loading()) {
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Esc => return ViewAction::Pop,
      KeyCode::Tab | KeyCode::Down => self.move_focus(true),
      KeyCode::BackTab | KeyCode::Up => self.move_focus(false),
      KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => self.start_submit(),
      KeyCode::Enter => {
        if self.fields().last() == Some(&self.focus) {
          self.start_submit();
        } else {
          self.move_focus(true);
        }
      }
      _ => {
        let changed = match self.focus {
          Field::Source => {
            if matches!(key.code, KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')) {
              self.source = (self.source + 1) % SOURCES.len();
            }
            true
          }
          Field::Target => {
            if matches!(key.code, KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')) {
              self.target = (self.target + 1) % TARGETS.len();
            }
            true
          }
          Field::SourceIdentifier => self.source_identifier.handle_key(key) == InputResult::Consumed,
          Field::TargetIdentifier => self.target_identifier.handle_key(key) == InputResult::Consumed,
        };
        if changed {
          self.error = None;
        }
      }
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let sources: Vec<&str> = SOURCES.iter().map(|p| p.label()).collect();
    let targets: Vec<&str> = TARGETS.iter().map(|p| p.label()).collect();
    let hint = match self.target_platform() {
      Platform::Slack => "Slack member ID, e.g. U01ABCDEF23",
      _ => "GitHub username",
    };

    let mut lines = vec![
      Line::from(""),
      choice_line("Source platform", &sources, self.source, self.focus == Field::Source),
      input_line(
        "Source user",
        &self.source_identifier,
        self.focus == Field::SourceIdentifier,
      ),
      Line::from(""),
      choice_line("Target platform", &targets, self.target, self.focus == Field::Target),
      input_line(
        "Target user",
        &self.target_identifier,
        self.focus == Field::TargetIdentifier,
      ),
      message_line(hint, Color::DarkGray),
      Line::from(""),
    ];
    if let Some(error) = &self.error {
      lines.push(message_line(error, Color::Red));
    }
    if self.submit.as_ref().is_some_and(|q| q.is_loading()) {
      lines.push(message_line("Saving...", Color::DarkGray));
    }

    let title = if self.existing.is_some() {
      " Edit mapping "
    } else {
      " New mapping "
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    frame.render_widget(Paragraph::new(lines).block(block), area);
  }

  fn breadcrumb_label(&self) -> String {
    match &self.existing {
      Some(m) => format!("Edit {}", m.source_identifier),
      None => "New mapping".to_string(),
    }
  }

  fn tick(&mut self) -> ViewAction {
    let Some(submit) = &mut self.submit else {
      return ViewAction::None;
    };
    if !submit.poll() {
      return ViewAction::None;
    }
    match submit.state().clone() {
      QueryState::Success(_) => ViewAction::PopWith(ViewResult::MappingSaved),
      QueryState::Error(e) if e.is_auth() => {
        self.submit = None;
        ViewAction::LoginRequired
      }
      QueryState::Error(e) => {
        self.error = Some(e.to_string());
        self.submit = None;
        ViewAction::None
      }
      _ => ViewAction::None,
    }
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("Tab", "next field").with_priority(10),
      ShortcutInfo::new("^S", "save").with_priority(20),
      ShortcutInfo::new("Esc", "cancel").with_priority(30),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn offline_client() -> ApiClient {
    ApiClient::new("http://127.0.0.1:9", Some("t".to_string())).unwrap()
  }

  #[test]
  fn test_invalid_slack_id_blocks_submit() {
    let mut form = MappingFormView::create(offline_client());
    form.handle_key(key(KeyCode::Tab));
    for c in "alice@example.com".chars() {
      form.handle_key(key(KeyCode::Char(c)));
    }
    form.handle_key(key(KeyCode::Tab));
    form.handle_key(key(KeyCode::Right));
    assert_eq!(form.target_platform(), Platform::Slack);
    form.handle_key(key(KeyCode::Tab));
    for c in "alice".chars() {
      form.handle_key(key(KeyCode::Char(c)));
    }
    form.handle_key(key(KeyCode::Enter));

    assert!(form.submit.is_none());
    assert!(form.error.unwrap().contains("Slack user ID"));
  }

  #[test]
  fn test_edit_only_focuses_target() {
    let mapping = ManualMapping {
      id: "7".to_string(),
      source_platform: "pagerduty".to_string(),
      source_identifier: "bob@example.com".to_string(),
      target_platform: Platform::GitHub,
      target_identifier: "bob".to_string(),
      created_at: None,
    };
    let mut form = MappingFormView::edit(offline_client(), mapping);
    assert_eq!(form.source, 1);
    form.handle_key(key(KeyCode::Tab));
    assert_eq!(form.focus, Field::TargetIdentifier);
  }
}
