use ratatui::prelude::Color;

use crate::api::types::Platform;
use crate::controller::RowState;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Brand-ish color for a platform column
pub fn platform_color(platform: Platform) -> Color {
  match platform {
    Platform::Rootly => Color::Magenta,
    Platform::PagerDuty => Color::Green,
    Platform::GitHub => Color::White,
    Platform::Slack => Color::Yellow,
  }
}

/// One-character marker and color for a row's confirmation state
pub fn row_marker(state: &RowState) -> (&'static str, Color) {
  match state {
    RowState::Confirmed => (" ", Color::Reset),
    RowState::RenamePending { .. } | RowState::DeletePending => ("…", Color::DarkGray),
    RowState::Failed(_) => ("!", Color::Red),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_counts_characters() {
    assert_eq!(truncate("ééééé", 4), "é...");
  }

  #[test]
  fn test_row_marker() {
    assert_eq!(row_marker(&RowState::DeletePending).0, "…");
    assert_eq!(row_marker(&RowState::Failed("x".into())).1, Color::Red);
  }
}
