use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph},
};

use biomero_core::history::{Submission, SubmissionKind, SubmissionStatus};
use biomero_core::keybinds::LineInput;
use biomero_core::ui::{render_hints, render_input_box, tool_block};

/// Dashboard link, optional filter box, the history list and the message of
/// the selected entry.
pub fn render_history(
    frame: &mut Frame,
    area: Rect,
    submissions: &[&Submission],
    list_state: &mut ListState,
    filter: &LineInput,
    filtering: bool,
    dashboard_url: &str,
) {
    let show_filter = filtering || !filter.text.is_empty();
    let [url_area, filter_area, list_area, detail_area, hint_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(if show_filter { 3 } else { 0 }),
        Constraint::Min(3),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    let url = if dashboard_url.is_empty() {
        Span::styled("not configured", Style::default().fg(Color::DarkGray))
    } else {
        Span::styled(
            dashboard_url.to_string(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::UNDERLINED),
        )
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![Span::raw(" Dashboard: "), url])),
        url_area,
    );

    if show_filter {
        render_input_box(frame, filter_area, "Filter", filter, filtering);
    }

    let items: Vec<ListItem> = submissions
        .iter()
        .map(|s| {
            let (badge, color) = match s.status {
                SubmissionStatus::Submitted => ("ok  ", Color::Green),
                SubmissionStatus::Failed => ("FAIL", Color::Red),
            };
            let kind = match s.kind {
                SubmissionKind::Workflow => "run   ",
                SubmissionKind::Import => "import",
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{badge} "), Style::default().fg(color)),
                Span::styled(
                    format!("{} ", s.created_at),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(format!("{kind} "), Style::default().fg(Color::Yellow)),
                Span::styled(s.name.clone(), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(format!("  {}", s.target)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(tool_block(
            &format!("Submissions ({})", submissions.len()),
            !filtering,
        ))
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(40, 40, 60))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, list_state);

    let detail = list_state
        .selected()
        .and_then(|i| submissions.get(i))
        .map(|s| s.message.clone())
        .unwrap_or_default();
    frame.render_widget(
        Paragraph::new(detail).block(tool_block("Message", false)),
        detail_area,
    );

    render_hints(frame, hint_area, "/:filter  dd:delete  R:reload  :clear");
}
