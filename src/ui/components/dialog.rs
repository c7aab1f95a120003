//! Modal dialogs drawn over a view: yes/no confirmation and a one-line prompt.
//!
//! Both carry a payload so the view knows what the answer was about when the
//! event comes back.

use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::ui::centered_rect;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

/// Events from a confirmation dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmEvent<T> {
  Confirmed(T),
  Cancelled,
}

#[derive(Debug, Clone)]
pub struct ConfirmDialog<T> {
  pending: Option<(String, T)>,
}

impl<T> Default for ConfirmDialog<T> {
  fn default() -> Self {
    Self { pending: None }
  }
}

impl<T> ConfirmDialog<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.pending.is_some()
  }

  pub fn show(&mut self, question: impl Into<String>, payload: T) {
    self.pending = Some((question.into(), payload));
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<ConfirmEvent<T>> {
    if self.pending.is_none() {
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => match self.pending.take() {
        Some((_, payload)) => KeyResult::Event(ConfirmEvent::Confirmed(payload)),
        None => KeyResult::Handled,
      },
      KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc | KeyCode::Char('q') => {
        self.pending = None;
        KeyResult::Event(ConfirmEvent::Cancelled)
      }
      // Modal: nothing reaches the view while open
      _ => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    let Some((question, _)) = &self.pending else {
      return;
    };

    let width = (question.chars().count() as u16 + 6).clamp(30, 70);
    let overlay_area = centered_rect(width, 5, area);
    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Red))
      .title(" Confirm ");

    let text = vec![
      Line::from(question.as_str()),
      Line::from(vec![
        Span::styled("<y>", Style::default().fg(Color::Cyan)),
        Span::styled(" yes   ", Style::default().fg(Color::DarkGray)),
        Span::styled("<n>", Style::default().fg(Color::Cyan)),
        Span::styled(" no", Style::default().fg(Color::DarkGray)),
      ]),
    ];

    frame.render_widget(
      Paragraph::new(text)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true }),
      overlay_area,
    );
  }
}

/// Events from a prompt dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent<T> {
  Submitted { value: String, payload: T },
  Cancelled,
}

/// One-line text prompt. The view validates the submitted value and may
/// reopen the prompt with an error.
#[derive(Debug, Clone)]
pub struct PromptDialog<T> {
  title: String,
  input: TextInput,
  error: Option<String>,
  payload: Option<T>,
}

impl<T> Default for PromptDialog<T> {
  fn default() -> Self {
    Self {
      title: String::new(),
      input: TextInput::new(),
      error: None,
      payload: None,
    }
  }
}

impl<T: Clone> PromptDialog<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.payload.is_some()
  }

  pub fn show(&mut self, title: impl Into<String>, initial: &str, payload: T) {
    self.title = title.into();
    self.input = TextInput::with_value(initial);
    self.error = None;
    self.payload = Some(payload);
  }

  /// Keep the prompt open with the user's text and an inline error
  pub fn reject(&mut self, value: &str, payload: T, error: impl Into<String>) {
    self.input = TextInput::with_value(value);
    self.error = Some(error.into());
    self.payload = Some(payload);
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<PromptEvent<T>> {
    if self.payload.is_none() {
      return KeyResult::NotHandled;
    }

    match self.input.handle_key(key) {
      InputResult::Submitted(value) => match self.payload.take() {
        Some(payload) => KeyResult::Event(PromptEvent::Submitted { value, payload }),
        None => KeyResult::Handled,
      },
      InputResult::Cancelled => {
        self.payload = None;
        KeyResult::Event(PromptEvent::Cancelled)
      }
      InputResult::Consumed => {
        self.error = None;
        KeyResult::Handled
      }
      InputResult::NotHandled => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if self.payload.is_none() {
      return;
    }

    let height = if self.error.is_some() { 4 } else { 3 };
    let overlay_area = centered_rect(60, height, area);
    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.title));

    let mut lines = vec![Line::from(self.input.spans(true))];
    if let Some(error) = &self.error {
      lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
    }

    frame.render_widget(Paragraph::new(lines).block(block), overlay_area);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_confirm_returns_payload() {
    let mut dialog = ConfirmDialog::new();
    dialog.show("Delete Acme?", 42);
    assert_eq!(dialog.handle_key(key(KeyCode::Char('x'))), KeyResult::Handled);
    assert_eq!(
      dialog.handle_key(key(KeyCode::Char('y'))),
      KeyResult::Event(ConfirmEvent::Confirmed(42))
    );
    assert!(!dialog.is_active());
  }

  #[test]
  fn test_confirm_cancel() {
    let mut dialog = ConfirmDialog::new();
    dialog.show("Delete?", ());
    assert_eq!(
      dialog.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(ConfirmEvent::Cancelled)
    );
    assert_eq!(dialog.handle_key(key(KeyCode::Char('y'))), KeyResult::NotHandled);
  }

  #[test]
  fn test_prompt_starts_with_initial_value() {
    let mut prompt = PromptDialog::new();
    prompt.show("Rename", "Acme", "id-1");
    prompt.handle_key(key(KeyCode::Char('!')));
    assert_eq!(
      prompt.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(PromptEvent::Submitted {
        value: "Acme!".to_string(),
        payload: "id-1"
      })
    );
    assert!(!prompt.is_active());

    prompt.reject("Acme!", "id-1", "too long");
    assert!(prompt.is_active());
  }
}
