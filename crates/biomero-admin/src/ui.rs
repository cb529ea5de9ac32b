use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph, Wrap},
};

use biomero_api::payload::ScriptMenuResponse;
use biomero_core::keybinds::LineInput;
use biomero_core::ui::{message_line, render_hints, render_input_box, tool_block};

use crate::Row;
use crate::scripts::ScriptRow;
use crate::settings::{ModelField, Settings};

fn highlight() -> Style {
    Style::default()
        .bg(Color::Rgb(40, 40, 60))
        .add_modifier(Modifier::BOLD)
}

pub fn render_not_admin(frame: &mut Frame, area: Rect, message: &str) {
    let paragraph = Paragraph::new(message_line(message, true)).block(tool_block("Admin", true));
    frame.render_widget(paragraph, area);
}

/// Short name of a row, used in the list and the editor title.
pub fn row_label(row: &Row, settings: &Settings) -> String {
    match row {
        Row::Section(name) => format!("[{name}]"),
        Row::Setting { key, .. } => key.clone(),
        Row::ModelsHeader => "[MODELS]".to_string(),
        Row::Model { index, field } => {
            let name = settings
                .models
                .get(*index)
                .map(|m| m.name.as_str())
                .filter(|n| !n.is_empty())
                .unwrap_or("new model");
            match field {
                ModelField::Name => format!("model {}", index + 1),
                _ => format!("{name} {}", field.label()),
            }
        }
        Row::ConvertersHeader => "[CONVERTERS]".to_string(),
        Row::Converter(i) => format!("converter {}", i + 1),
    }
}

/// The settings editor: one row per section header, key, model field or
/// converter.
pub fn render_settings(
    frame: &mut Frame,
    area: Rect,
    rows: &[(Row, Option<String>)],
    settings: &Settings,
    cursor: usize,
    modified: bool,
    editing: Option<(&str, &LineInput)>,
) {
    let [list_area, edit_area, hint_area] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(if editing.is_some() { 3 } else { 0 }),
        Constraint::Length(1),
    ])
    .areas(area);

    let label_width = rows
        .iter()
        .filter(|(_, value)| value.is_some())
        .map(|(row, _)| row_label(row, settings).len())
        .max()
        .unwrap_or(0);

    let items: Vec<ListItem> = rows
        .iter()
        .map(|(row, value)| {
            let label = row_label(row, settings);
            match value {
                None => ListItem::new(Line::from(Span::styled(
                    label,
                    Style::default()
                        .fg(Color::Blue)
                        .add_modifier(Modifier::BOLD),
                ))),
                Some(value) => {
                    let indent = match row {
                        Row::Model {
                            field: ModelField::Name,
                            ..
                        } => "  ",
                        Row::Model { .. } => "    ",
                        _ => "  ",
                    };
                    ListItem::new(Line::from(vec![
                        Span::raw(indent),
                        Span::styled(
                            format!("{label:<label_width$}  "),
                            Style::default().fg(Color::Yellow),
                        ),
                        Span::raw(value.clone()),
                    ]))
                }
            }
        })
        .collect();

    let title = if modified {
        "BIOMERO settings [modified]"
    } else {
        "BIOMERO settings"
    };
    let mut state = ListState::default();
    if !rows.is_empty() {
        state.select(Some(cursor));
    }
    let list = List::new(items)
        .block(tool_block(title, editing.is_none()))
        .highlight_style(highlight())
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut state);

    if let Some((title, input)) = editing {
        render_input_box(frame, edit_area, title, input, true);
    }
    render_hints(
        frame,
        hint_area,
        "Enter:edit  a:add  dd:delete  s:save  :reset  R:reload",
    );
}

/// Script menu on the left, details of the last requested script on the
/// right.
pub fn render_scripts(
    frame: &mut Frame,
    area: Rect,
    rows: &[ScriptRow],
    cursor: usize,
    query: &LineInput,
    searching: bool,
    details: Option<&ScriptMenuResponse>,
) {
    let [search_area, body_area, hint_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .areas(area);
    let [menu_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
            .areas(body_area);

    render_input_box(frame, search_area, "Search scripts", query, searching);

    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| {
            let indent = "  ".repeat(row.depth);
            let style = if row.is_group {
                Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::raw(indent),
                Span::styled(row.name.clone(), style),
            ]))
        })
        .collect();
    let mut state = ListState::default();
    if !rows.is_empty() {
        state.select(Some(cursor));
    }
    let list = List::new(items)
        .block(tool_block(&format!("Scripts ({})", rows.len()), !searching))
        .highlight_style(highlight())
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, menu_area, &mut state);

    let mut lines = Vec::new();
    if let Some(details) = details {
        for script in &details.script_menu {
            lines.push(Line::from(Span::styled(
                script.name.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            if !script.version.is_empty() {
                lines.push(Line::from(format!("Version: {}", script.version)));
            }
            if !script.authors.is_empty() {
                lines.push(Line::from(format!("Authors: {}", script.authors)));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(script.description.clone()));
        }
        for log in &details.error_logs {
            lines.push(message_line(log, true));
        }
    }
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(tool_block("Details", false)),
        detail_area,
    );

    render_hints(frame, hint_area, "/:search  Enter:details  R:reload");
}
