use ratatui::prelude::*;

use crate::ui::components::TextInput;

fn label_span(label: &str, focused: bool) -> Span<'static> {
  let style = if focused {
    Style::default().fg(Color::Yellow).bold()
  } else {
    Style::default().fg(Color::DarkGray)
  };
  Span::styled(format!("{:>18}  ", label), style)
}

/// A labelled text field
pub fn input_line(label: &str, input: &TextInput, focused: bool) -> Line<'static> {
  let mut spans = vec![label_span(label, focused)];
  spans.extend(input.spans(focused));
  Line::from(spans)
}

/// A labelled choice between fixed options, the current one highlighted
pub fn choice_line(label: &str, options: &[&str], selected: usize, focused: bool) -> Line<'static> {
  let mut spans = vec![label_span(label, focused)];
  for (i, option) in options.iter().enumerate() {
    let style = if i == selected {
      Style::default().fg(Color::Black).bg(if focused {
        Color::Yellow
      } else {
        Color::Gray
      })
    } else {
      Style::default().fg(Color::DarkGray)
    };
    spans.push(Span::styled(format!(" {} ", option), style));
    spans.push(Span::raw(" "));
  }
  Line::from(spans)
}

/// Indented message under a field
pub fn message_line(message: &str, color: Color) -> Line<'static> {
  Line::from(vec![
    Span::raw(" ".repeat(20)),
    Span::styled(message.to_string(), Style::default().fg(color)),
  ])
}
