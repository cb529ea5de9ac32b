use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph, Wrap},
};

use biomero_api::workflows::Workflow;
use biomero_core::keybinds::LineInput;
use biomero_core::tree_view::{TreeView, TreeViewRenderConfig, render_tree_view};
use biomero_core::ui::{render_hints, render_input_box, tool_block};

use crate::InputFocus;
use crate::wizard::{OutputField, Wizard, WizardState, WizardStep};

const HIGHLIGHT_BG: Color = Color::Rgb(40, 40, 60);

fn highlight() -> Style {
    Style::default().bg(HIGHLIGHT_BG).add_modifier(Modifier::BOLD)
}

fn checkbox(checked: bool) -> Span<'static> {
    if checked {
        Span::styled("[x] ", Style::default().fg(Color::Green))
    } else {
        Span::styled("[ ] ", Style::default().fg(Color::DarkGray))
    }
}

// ── Catalogue ────────────────────────────────────────────────────────

/// Render the workflow list with its search box.
pub fn render_catalogue(
    frame: &mut Frame,
    area: Rect,
    workflows: &[&Workflow],
    list_state: &mut ListState,
    search: &LineInput,
    search_active: bool,
    loading: bool,
) {
    let [search_area, list_area, detail_area, hint_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(3),
        Constraint::Length(6),
        Constraint::Length(1),
    ])
    .areas(area);

    render_input_box(frame, search_area, "Search workflows", search, search_active);

    let items: Vec<ListItem> = workflows
        .iter()
        .map(|w| {
            ListItem::new(Line::from(vec![
                Span::styled(&w.name, Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(
                    format!("  {}", w.description),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let title = if loading {
        "Workflows (loading...)".to_string()
    } else {
        format!("Workflows ({})", workflows.len())
    };
    let list = List::new(items)
        .block(tool_block(&title, !search_active))
        .highlight_style(highlight())
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, list_state);

    let detail = list_state
        .selected()
        .and_then(|i| workflows.get(i))
        .map(|w| {
            let mut lines = vec![Line::from(w.description.clone())];
            if let Some(version) = w.metadata.version() {
                lines.push(Line::from(Span::styled(
                    format!("Version {version}"),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            if let Some(url) = &w.github_url {
                lines.push(Line::from(Span::styled(
                    url.clone(),
                    Style::default().fg(Color::Cyan),
                )));
            }
            lines
        })
        .unwrap_or_default();
    frame.render_widget(
        Paragraph::new(detail)
            .wrap(Wrap { trim: true })
            .block(tool_block("Details", false)),
        detail_area,
    );

    render_hints(frame, hint_area, "Enter:run  /:search  R:reload  ?:help");
}

// ── Wizard ───────────────────────────────────────────────────────────

/// Render the submission wizard for one workflow.
pub fn render_wizard(
    frame: &mut Frame,
    area: Rect,
    wizard: &Wizard,
    datasets: &TreeView,
    focus: InputFocus,
    editing: bool,
) {
    let [header_area, body_area, hint_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_step_header(frame, header_area, wizard);

    let hints = match &wizard.state {
        WizardState::Editing(WizardStep::Input) => {
            render_input_step(frame, body_area, wizard, datasets, focus, editing);
            "Tab:next  C-h/C-l:pane  l/h:expand  x:toggle  X/U:all  f/F:filtered  /:filter  Esc:close"
        }
        WizardState::Editing(WizardStep::Parameters) => {
            render_params(frame, body_area, wizard, editing);
            "Tab:next  S-Tab:back  Enter:edit/toggle  Esc:close"
        }
        WizardState::Editing(WizardStep::Output) => {
            render_output(frame, body_area, wizard, editing);
            "Tab:next  S-Tab:back  Enter:edit/toggle  Esc:close"
        }
        WizardState::Editing(WizardStep::Review) => {
            render_review(frame, body_area, wizard);
            "s/Enter:submit  S-Tab:back  Esc:close"
        }
        WizardState::Submitting => {
            render_outcome(frame, body_area, "Submitting workflow...", Color::Yellow);
            ""
        }
        WizardState::Done(message) => {
            render_outcome(frame, body_area, message, Color::Green);
            "Enter/Esc:close"
        }
        WizardState::Failed(message) => {
            render_outcome(frame, body_area, message, Color::Red);
            "Enter:back to review  Esc:close"
        }
    };
    render_hints(frame, hint_area, hints);
}

fn render_step_header(frame: &mut Frame, area: Rect, wizard: &Wizard) {
    let current = wizard.step();
    let mut spans = vec![Span::styled(
        format!(" {} ", wizard.workflow.name),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    for (i, step) in WizardStep::ALL.iter().enumerate() {
        let style = if Some(*step) == current {
            Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::raw(if i == 0 { " " } else { " > " }));
        spans.push(Span::styled(format!("{}. {}", i + 1, step.title()), style));
    }
    if let Some(hint) = &wizard.hint {
        spans.push(Span::raw("   "));
        spans.push(Span::styled(hint.clone(), Style::default().fg(Color::Red)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_input_step(
    frame: &mut Frame,
    area: Rect,
    wizard: &Wizard,
    datasets: &TreeView,
    focus: InputFocus,
    editing: bool,
) {
    let [tree_area, image_area] =
        Layout::horizontal([Constraint::Percentage(45), Constraint::Percentage(55)]).areas(area);

    render_tree_view(
        frame,
        tree_area,
        datasets,
        &TreeViewRenderConfig {
            title: "Datasets",
            focused: focus == InputFocus::Datasets,
            checkboxes: true,
        },
    );

    let images = &wizard.images;
    let [filter_area, list_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(1)]).areas(image_area);
    render_input_box(frame, filter_area, "Filter images", &images.filter, editing);

    let items: Vec<ListItem> = images
        .visible()
        .map(|img| {
            let thumb = if images.has_thumbnail(img.id) { "▣ " } else { "  " };
            ListItem::new(Line::from(vec![
                checkbox(images.is_selected(img.id)),
                Span::styled(thumb, Style::default().fg(Color::Cyan)),
                Span::raw(img.name.clone()),
                Span::styled(format!("  #{}", img.id), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let title = format!(
        "Images ({} of {} selected)",
        images.selected_count(),
        images.images().len()
    );
    let focused = focus == InputFocus::Images;
    let mut state = ListState::default();
    if focused && images.visible_len() > 0 {
        state.select(Some(images.cursor));
    }
    let list = List::new(items)
        .block(tool_block(&title, focused))
        .highlight_style(highlight())
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut state);
}

fn render_params(frame: &mut Frame, area: Rect, wizard: &Wizard, editing: bool) {
    let form = &wizard.form;
    let block = tool_block("Parameters", true);
    if form.is_empty() {
        frame.render_widget(
            Paragraph::new("This workflow takes no parameters.").block(block),
            area,
        );
        return;
    }

    let [list_area, desc_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(3)]).areas(area);

    let label_width = form.fields.iter().map(|f| f.label.len()).max().unwrap_or(0);
    let items: Vec<ListItem> = form
        .fields
        .iter()
        .map(|f| {
            let required = if f.optional { " " } else { "*" };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<width$}{required} ", f.label, width = label_width),
                    Style::default().fg(Color::Yellow),
                ),
                Span::raw(f.display_value()),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    state.select(Some(form.cursor));
    let list = List::new(items)
        .block(block)
        .highlight_style(highlight())
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut state);

    if let Some(field) = form.current() {
        if editing && !field.is_boolean() {
            render_input_box(frame, desc_area, &field.label, &field.text, true);
        } else {
            frame.render_widget(
                Paragraph::new(field.description.as_str())
                    .style(Style::default().fg(Color::DarkGray))
                    .block(tool_block("Description", false)),
                desc_area,
            );
        }
    }
}

fn render_output(frame: &mut Frame, area: Rect, wizard: &Wizard, editing: bool) {
    let output = &wizard.output;
    let items: Vec<ListItem> = OutputField::ALL
        .iter()
        .map(|field| {
            let mut spans = match output.flag(*field) {
                Some(checked) => vec![checkbox(checked)],
                None => vec![Span::raw("    ")],
            };
            let style = if output.is_editable(*field) {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };
            spans.push(Span::styled(field.label(), style));
            if field.is_text() {
                let text = match field {
                    OutputField::DatasetName => &output.dataset_name.text,
                    _ => &output.rename_pattern.text,
                };
                spans.push(Span::styled(format!(": {text}"), Style::default().fg(Color::Cyan)));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let [list_area, edit_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(3)]).areas(area);
    let mut state = ListState::default();
    state.select(Some(output.cursor));
    let list = List::new(items)
        .block(tool_block("Output", true))
        .highlight_style(highlight())
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut state);

    let field = output.current();
    if editing && field.is_text() {
        let input = match field {
            OutputField::DatasetName => &output.dataset_name,
            _ => &output.rename_pattern,
        };
        render_input_box(frame, edit_area, field.label(), input, true);
    }
}

fn render_review(frame: &mut Frame, area: Rect, wizard: &Wizard) {
    let summary = wizard.summary();
    let width = summary.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let lines: Vec<Line> = summary
        .into_iter()
        .map(|(key, value)| {
            Line::from(vec![
                Span::styled(
                    format!("{key:<width$}  "),
                    Style::default().fg(Color::Yellow),
                ),
                Span::raw(value),
            ])
        })
        .collect();
    frame.render_widget(
        Paragraph::new(lines).block(tool_block("Review", true)),
        area,
    );
}

fn render_outcome(frame: &mut Frame, area: Rect, message: &str, color: Color) {
    let paragraph = Paragraph::new(Line::from(Span::styled(
        message.to_string(),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )))
    .wrap(Wrap { trim: true })
    .block(tool_block("Submission", true));
    frame.render_widget(paragraph, area);
}
