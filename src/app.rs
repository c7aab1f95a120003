use crate::api::types::UserProfile;
use crate::api::ApiClient;
use crate::cache::{FreshnessPolicy, SnapshotStore};
use crate::commands;
use crate::config::Config;
use crate::controller::IntegrationsController;
use crate::event::{Event, EventHandler};
use crate::query::{Query, QueryState};
use crate::store::{KeyValueStore, MemoryStore, PersistedState, SqliteStore};
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::{draw_footer, draw_header};
use crate::ui::view::{View, ViewAction, ViewResult};
use crate::ui::views::{
  AddIntegrationView, IntegrationsView, LoginView, MappingsView, MembersView,
};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::{stdout, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Open the persisted state for an API URL. Without a usable database the
/// app still runs, it just forgets everything on exit.
pub fn open_state(api_url: &str, no_cache: bool) -> PersistedState {
  let store: Arc<dyn KeyValueStore> = if no_cache {
    Arc::new(MemoryStore::new())
  } else {
    match SqliteStore::open() {
      Ok(store) => Arc::new(store),
      Err(e) => {
        warn!(error = %e, "falling back to in-memory state");
        Arc::new(MemoryStore::new())
      }
    }
  };
  PersistedState::new(store, api_url)
}

/// Main application state
pub struct App {
  /// Navigation stack - the integrations view is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// Command palette (after pressing :)
  command_input: CommandInput,

  /// Header title
  title: String,

  client: ApiClient,
  state: PersistedState,
  policy: FreshnessPolicy,

  /// Signed-in user shown in the header
  profile: Option<UserProfile>,
  profile_query: Option<Query<UserProfile>>,

  /// App-level status, e.g. an unknown command
  status: Option<(String, Color)>,

  should_quit: bool,
}

impl App {
  pub fn new(config: Config, no_cache: bool) -> Result<Self> {
    let state = open_state(&config.api.url, no_cache);
    let token = Config::get_api_token().or_else(|| state.auth_token());
    let client = ApiClient::new(&config.api.url, token)?;
    let policy = FreshnessPolicy::from_secs(config.cache.stale_after_secs);

    let profile_query = client.has_token().then(|| {
      let client = client.clone();
      let mut query = Query::new(move || {
        let client = client.clone();
        async move { client.current_user().await }
      });
      query.fetch();
      query
    });

    let mut app = Self {
      view_stack: Vec::new(),
      command_input: CommandInput::new(),
      title: config.display_title(),
      profile: state.user_profile(),
      client,
      state,
      policy,
      profile_query,
      status: None,
      should_quit: false,
    };
    let root = app.build_root();
    app.view_stack.push(root);
    Ok(app)
  }

  fn build_root(&self) -> Box<dyn View> {
    let controller = IntegrationsController::new(
      self.client.clone(),
      SnapshotStore::new(self.state.clone()),
      self.policy,
    );
    Box::new(IntegrationsView::new(controller))
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal).await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(100));

    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Resize) | Some(Event::Tick) => {}
        None => break,
      }
      self.tick();
    }
    Ok(())
  }

  fn draw(&mut self, frame: &mut Frame) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
      ])
      .split(frame.area());

    let breadcrumb: Vec<String> = self.view_stack.iter().map(|v| v.breadcrumb_label()).collect();
    let context = self.view_stack.first().and_then(|v| v.context());
    let user = self.profile.as_ref().map(|p| p.display_name().to_string());

    let Some(top) = self.view_stack.last_mut() else {
      return;
    };

    draw_header(
      frame,
      chunks[0],
      &self.title,
      user.as_deref(),
      context.as_deref(),
      top.shortcuts(),
    );
    top.render(frame, chunks[1]);
    let status = top.status().or_else(|| self.status.clone());
    self.command_input.render_overlay(frame, chunks[1]);
    draw_footer(frame, chunks[2], &breadcrumb, status);
  }

  /// Poll background work of every view on the stack. Only the top view may
  /// navigate, but any view can send the session back to login.
  fn tick(&mut self) {
    let mut login_required = self.poll_profile();

    let top = self.view_stack.len().saturating_sub(1);
    let mut top_action = ViewAction::None;
    for (i, view) in self.view_stack.iter_mut().enumerate() {
      match view.tick() {
        ViewAction::LoginRequired => login_required = true,
        action if i == top => top_action = action,
        _ => {}
      }
    }

    self.apply(top_action);
    if login_required {
      self.apply(ViewAction::LoginRequired);
    }
  }

  /// Refresh the header profile; true when the stored token was rejected
  fn poll_profile(&mut self) -> bool {
    let Some(query) = &mut self.profile_query else {
      return false;
    };
    if !query.poll() {
      return false;
    }

    let state = query.state().clone();
    self.profile_query = None;
    match state {
      QueryState::Success(profile) => {
        self.state.set_user_profile(&profile);
        self.profile = Some(profile);
        false
      }
      QueryState::Error(e) if e.is_auth() => true,
      QueryState::Error(e) => {
        warn!(error = %e, "could not refresh user profile");
        false
      }
      QueryState::Idle | QueryState::Loading => false,
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let captures = self.view_stack.last().is_some_and(|v| v.captures_input());
    if !captures {
      match self.command_input.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(cmd)) => {
          self.execute_command(&cmd);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    self.status = None;
    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => self.pop(),
      ViewAction::PopWith(result) => {
        self.pop();
        if let ViewResult::LoggedIn(profile) = &result {
          self.profile = Some(profile.clone());
          // Every view may hold data from the rejected session
          for view in self.view_stack.iter_mut() {
            view.on_result(result.clone());
          }
        } else if let Some(view) = self.view_stack.last_mut() {
          view.on_result(result);
        }
      }
      ViewAction::LoginRequired => {
        if self.view_stack.last().is_some_and(|v| v.is_login()) {
          return;
        }
        info!("login required");
        self.view_stack.push(Box::new(LoginView::new(
          self.client.clone(),
          self.state.clone(),
        )));
      }
    }
  }

  fn pop(&mut self) {
    if self.view_stack.len() > 1 {
      self.view_stack.pop();
    } else {
      self.should_quit = true;
    }
  }

  /// Replace everything above the root with a new view
  fn open(&mut self, view: Box<dyn View>) {
    self.view_stack.truncate(1);
    self.view_stack.push(view);
  }

  fn execute_command(&mut self, input: &str) {
    let Some(cmd) = commands::resolve(input) else {
      self.status = Some((format!("Unknown command: {}", input), Color::Red));
      return;
    };

    match cmd {
      "integrations" => self.view_stack.truncate(1),
      "add" => self.open(Box::new(AddIntegrationView::new(self.client.clone()))),
      "mappings" => self.open(Box::new(MappingsView::new(self.client.clone()))),
      "members" => self.open(Box::new(MembersView::new(self.client.clone()))),
      "refresh" => {
        if let Some(view) = self.view_stack.last_mut() {
          view.refresh();
        }
      }
      "login" => self.apply(ViewAction::LoginRequired),
      "logout" => self.logout(),
      "quit" => self.should_quit = true,
      other => warn!(command = other, "command has no handler"),
    }
  }

  /// Forget the session and every cached value, then ask for a new token
  fn logout(&mut self) {
    info!("logging out");
    self.state.clear_session();
    self.client.set_token(None);
    self.profile = None;
    self.profile_query = None;
    self.view_stack = vec![self.build_root()];
    self.apply(ViewAction::LoginRequired);
  }
}
