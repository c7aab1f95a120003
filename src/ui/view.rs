use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use crate::api::types::{Integration, UserProfile};

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Shortcuts every view shares
pub fn global_shortcuts() -> Vec<ShortcutInfo> {
  vec![
    ShortcutInfo::new(":", "command").with_priority(10),
    ShortcutInfo::new("q", "back").with_priority(30),
  ]
}

/// Something a popped view hands to the view underneath it
#[derive(Debug, Clone)]
pub enum ViewResult {
  /// The server created a new integration
  IntegrationAdded(Integration),
  /// A mapping was created or edited
  MappingSaved,
  /// A token was accepted
  LoggedIn(UserProfile),
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  /// No action needed
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
  /// Pop and deliver a result to the new top view
  PopWith(ViewResult),
  /// The backend rejected the session; the app shows the login view
  LoginRequired,
}

/// Trait for view behavior
///
/// Views handle their own input modes (search, dialogs, forms) and return
/// actions for the App to execute: App → View → Components.
///
/// Views that load data asynchronously use `Query<T>` internally and poll it
/// in `tick()`.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// Called on each tick to poll background work
  fn tick(&mut self) -> ViewAction {
    ViewAction::None
  }

  /// Receive the result of a view this one pushed
  fn on_result(&mut self, _result: ViewResult) {}

  /// Reload from the server, as for the `:refresh` command
  fn refresh(&mut self) {}

  /// The login view; the app never stacks a second one
  fn is_login(&self) -> bool {
    false
  }

  /// True while the view is typing into a field, so global keys like `:`
  /// and `q` go to the view instead of the app
  fn captures_input(&self) -> bool {
    false
  }

  /// Context for the header, e.g. selected organization and cache age
  fn context(&self) -> Option<String> {
    None
  }

  /// Status message for the footer
  fn status(&self) -> Option<(String, Color)> {
    None
  }

  /// Get keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    global_shortcuts()
  }
}
