use crate::keybinds::{InputMode, LineInput};
use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
};

/// Render the top tab bar showing open tools.
pub fn render_tab_bar(frame: &mut Frame, area: Rect, tools: &[&str], active: usize) {
    let titles: Vec<Line> = tools.iter().map(|t| Line::from(*t)).collect();

    let tabs = Tabs::new(titles)
        .select(active)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED))
        .style(Style::default().add_modifier(Modifier::DIM))
        .divider(Span::raw(" | "));

    frame.render_widget(tabs, area);
}

/// Render the bottom status bar: mode, tool, session info and the latest
/// tool message.
pub fn render_status_bar(
    frame: &mut Frame,
    area: Rect,
    mode: InputMode,
    tool_name: &str,
    info: &str,
) {
    let mode_style = match mode {
        InputMode::Normal => Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED),
        InputMode::Insert => Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD | Modifier::REVERSED),
        InputMode::Command => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::REVERSED),
    };

    let line = Line::from(vec![
        Span::styled(format!(" {} ", mode.label()), mode_style),
        Span::raw(" "),
        Span::styled(tool_name, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(info, Style::default().add_modifier(Modifier::DIM)),
    ]);

    let bar = Paragraph::new(line).style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_widget(bar, area);
}

/// Render the command-line input at the bottom of the screen.
pub fn render_command_line(frame: &mut Frame, area: Rect, input: &str, cursor: usize) {
    let line = Line::from(vec![
        Span::styled(":", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(input),
    ]);

    frame.render_widget(Paragraph::new(line), area);
    frame.set_cursor_position((area.x + 1 + cursor as u16, area.y));
}

/// Standard layout: tab bar (1 line) + main content + status bar (1 line).
/// Returns (tab_area, content_area, status_area).
pub fn standard_layout(area: Rect) -> (Rect, Rect, Rect) {
    let [tab_area, content_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(area);

    (tab_area, content_area, status_area)
}

/// Create a standard bordered block for a tool pane.
pub fn tool_block(title: &str, focused: bool) -> Block<'static> {
    let border = if focused { Color::Blue } else { Color::DarkGray };
    Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
}

/// Render a bordered single-line input box. The cursor is placed only when
/// `active` is set.
pub fn render_input_box(frame: &mut Frame, area: Rect, title: &str, input: &LineInput, active: bool) {
    let color = if active { Color::Green } else { Color::DarkGray };
    let block = Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));

    let inner = block.inner(area);
    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(input.text.as_str()), inner);

    if active {
        frame.set_cursor_position((inner.x + input.cursor as u16, inner.y));
    }
}

/// Dim key hints shown at the bottom of a pane.
pub fn render_hints(frame: &mut Frame, area: Rect, hints: &str) {
    let widget = Paragraph::new(Span::styled(
        format!(" {hints}"),
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(widget, area);
}

/// A message line: red for errors, green otherwise.
pub fn message_line(message: &str, is_error: bool) -> Line<'static> {
    let color = if is_error { Color::Red } else { Color::Green };
    Line::from(Span::styled(
        message.to_string(),
        Style::default().fg(color),
    ))
}

/// A `width` x `height` rect in the middle of `area`.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [rect] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(row);
    rect
}
