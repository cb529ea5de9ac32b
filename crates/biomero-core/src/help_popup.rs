use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};
use unicode_width::UnicodeWidthStr;

use crate::ui::centered_rect;

/// One key binding shown in the help popup, filed under a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpEntry {
    pub section: String,
    pub key: String,
    pub description: String,
}

impl HelpEntry {
    pub fn with_section(
        section: impl Into<String>,
        key: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
            description: description.into(),
        }
    }
}

/// Keys that work everywhere, appended after the active tool's entries.
const GLOBAL_KEYS: &[(&str, &[(&str, &str)])] = &[
    (
        "Navigation",
        &[
            ("j / k", "Move down / up"),
            ("gg / G", "Go to top / bottom"),
            ("Ctrl-d / Ctrl-u", "Half-page down / up"),
            ("h / l", "Collapse / expand folder"),
            ("Ctrl-h / Ctrl-l", "Focus left / right pane"),
            ("gt / gT", "Next / previous tool tab"),
        ],
    ),
    (
        "Selection",
        &[
            ("x", "Toggle selection"),
            ("X / U", "Select / deselect all children"),
        ],
    ),
    (
        "Actions",
        &[
            ("Enter", "Confirm / expand"),
            ("/", "Search / filter"),
            ("R", "Reload from server"),
        ],
    ),
    (
        "Leader (Space)",
        &[
            ("<Space><Space>", "Tool picker"),
            ("<Space>f", "Find (telescope)"),
            ("<Space>r u s a h", "Run / Upload / Scripts / Admin / Status"),
            ("<Space>1-9", "Switch to tool"),
            ("<Space>q", "Quit"),
        ],
    ),
    (
        "Commands",
        &[
            (":q", "Close tool / quit"),
            (":qa", "Quit all"),
            (":reload", "Reload the active tool"),
            ("?", "This help"),
            ("Ctrl-c", "Force quit"),
        ],
    ),
];

pub fn global_help_entries() -> Vec<HelpEntry> {
    GLOBAL_KEYS
        .iter()
        .flat_map(|(section, keys)| {
            keys.iter()
                .map(move |(key, desc)| HelpEntry::with_section(*section, *key, *desc))
        })
        .collect()
}

/// Scrollable key reference. Entries are grouped by section in the order
/// each section first appears, so a tool may contribute to a global section.
#[derive(Debug, Default)]
pub struct HelpPopup {
    pub visible: bool,
    title: String,
    sections: Vec<(String, Vec<HelpEntry>)>,
    key_width: usize,
    scroll: u16,
}

impl HelpPopup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, title: impl Into<String>, entries: Vec<HelpEntry>) {
        self.key_width = entries.iter().map(|e| e.key.width()).max().unwrap_or(0);
        self.sections.clear();
        for entry in entries {
            match self.sections.iter_mut().find(|(name, _)| *name == entry.section) {
                Some((_, group)) => group.push(entry),
                None => self.sections.push((entry.section.clone(), vec![entry])),
            }
        }
        self.title = title.into();
        self.scroll = 0;
        self.visible = true;
    }

    pub fn hide(&mut self) {
        *self = Self::default();
    }

    /// Move the first visible line, clamped to the content.
    pub fn scroll_by(&mut self, delta: i32) {
        let last = self.line_count().saturating_sub(1) as i32;
        self.scroll = (self.scroll as i32 + delta).clamp(0, last.max(0)) as u16;
    }

    /// Headers, entries and the blank line between sections.
    fn line_count(&self) -> usize {
        let entries: usize = self.sections.iter().map(|(_, group)| group.len()).sum();
        entries + self.sections.len() * 2 - usize::from(!self.sections.is_empty())
    }

    fn lines(&self) -> Vec<Line<'static>> {
        let header = Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
        let key_style = Style::default().add_modifier(Modifier::BOLD);
        let mut lines = Vec::with_capacity(self.line_count());
        for (i, (name, group)) in self.sections.iter().enumerate() {
            if i > 0 {
                lines.push(Line::default());
            }
            lines.push(Line::from(Span::styled(format!(" {name}"), header)));
            for entry in group {
                let pad = self.key_width.saturating_sub(entry.key.width());
                lines.push(Line::from(vec![
                    Span::raw(" ".repeat(pad + 2)),
                    Span::styled(entry.key.clone(), key_style),
                    Span::raw("   "),
                    Span::raw(entry.description.clone()),
                ]));
            }
        }
        lines
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        if !self.visible || self.sections.is_empty() {
            return;
        }
        let width = area.width.saturating_sub(8).min(64);
        let height = area
            .height
            .saturating_sub(6)
            .min(self.line_count() as u16 + 2);
        let popup = centered_rect(width, height, area);
        frame.render_widget(Clear, popup);

        let block = Block::default()
            .borders(Borders::ALL)
            .title(Line::from(format!(" {} ", self.title)).centered())
            .title_bottom(
                Line::from(" Esc/q/? close  j/k scroll ")
                    .style(Style::default().add_modifier(Modifier::DIM))
                    .centered(),
            );
        frame.render_widget(
            Paragraph::new(self.lines())
                .block(block)
                .scroll((self.scroll, 0)),
            popup,
        );
    }
}
