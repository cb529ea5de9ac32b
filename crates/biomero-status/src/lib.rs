pub mod ui;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{Frame, layout::Rect, widgets::ListState};
use rusqlite::Connection;
use tracing::{info, warn};

use biomero_core::{
    help_popup::HelpEntry,
    history::{self, Submission, SubmissionStatus},
    keybinds::{Action, InputMode, KeyState, LineInput, process_normal_key},
    telescope::TelescopeItem,
    tool::Tool,
    which_key::WhichKeyEntry,
};

/// Past workflow runs and imports, newest first, plus a pointer to the
/// analytics dashboard.
pub struct StatusTool {
    conn: Connection,
    dashboard_url: String,
    submissions: Vec<Submission>,
    /// Indices into `submissions` after applying the filter.
    filtered: Vec<usize>,
    list_state: ListState,
    filter: LineInput,
    mode: InputMode,
    key_state: KeyState,
    message: Option<String>,
}

impl StatusTool {
    pub fn new(conn: Connection, dashboard_url: impl Into<String>) -> anyhow::Result<Self> {
        history::init_db(&conn)?;
        let mut tool = Self {
            conn,
            dashboard_url: dashboard_url.into(),
            submissions: Vec::new(),
            filtered: Vec::new(),
            list_state: ListState::default(),
            filter: LineInput::default(),
            mode: InputMode::Normal,
            key_state: KeyState::default(),
            message: None,
        };
        tool.reload()?;
        Ok(tool)
    }

    /// Re-read the history table. Other tools write to it through their
    /// own connections.
    fn reload(&mut self) -> anyhow::Result<()> {
        self.submissions = history::list_submissions(&self.conn)?;
        self.apply_filter();
        Ok(())
    }

    fn reload_or_report(&mut self) {
        if let Err(err) = self.reload() {
            warn!(error = %err, "failed to read submission history");
            self.message = Some(format!("Error reading history: {err}"));
        }
    }

    fn apply_filter(&mut self) {
        let query = self.filter.text.trim().to_lowercase();
        self.filtered = self
            .submissions
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                query.is_empty()
                    || s.name.to_lowercase().contains(&query)
                    || s.target.to_lowercase().contains(&query)
            })
            .map(|(i, _)| i)
            .collect();

        if self.filtered.is_empty() {
            self.list_state.select(None);
        } else {
            let sel = self.list_state.selected().unwrap_or(0);
            self.list_state
                .select(Some(sel.min(self.filtered.len() - 1)));
        }
    }

    fn selected(&self) -> Option<&Submission> {
        let sel = self.list_state.selected()?;
        self.submissions.get(*self.filtered.get(sel)?)
    }

    fn visible(&self) -> Vec<&Submission> {
        self.filtered
            .iter()
            .filter_map(|&i| self.submissions.get(i))
            .collect()
    }

    fn move_by(&mut self, delta: isize) {
        if self.filtered.is_empty() {
            return;
        }
        let last = self.filtered.len() - 1;
        let sel = self.list_state.selected().unwrap_or(0);
        let next = sel.saturating_add_signed(delta).min(last);
        self.list_state.select(Some(next));
    }

    fn delete_selected(&mut self) {
        let Some(id) = self.selected().map(|s| s.id) else {
            return;
        };
        match history::delete_submission(&self.conn, id) {
            Ok(()) => {
                self.message = None;
                self.reload_or_report();
            }
            Err(err) => self.message = Some(format!("Error deleting entry: {err}")),
        }
    }

    fn clear(&mut self) {
        match history::clear_submissions(&self.conn) {
            Ok(count) => {
                info!(count, "cleared submission history");
                self.message = Some(format!("Removed {count} entries"));
                self.reload_or_report();
            }
            Err(err) => self.message = Some(format!("Error clearing history: {err}")),
        }
    }

    fn handle_insert_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc => {
                self.filter.clear();
                self.apply_filter();
                self.mode = InputMode::Normal;
                Action::SetMode(InputMode::Normal)
            }
            KeyCode::Enter => {
                self.mode = InputMode::Normal;
                Action::SetMode(InputMode::Normal)
            }
            _ => {
                if self.filter.handle_key(key) {
                    self.apply_filter();
                }
                Action::None
            }
        }
    }
}

impl Tool for StatusTool {
    fn name(&self) -> &str {
        "Status"
    }

    fn description(&self) -> &str {
        "History of workflow runs and imports"
    }

    fn mode(&self) -> InputMode {
        self.mode
    }

    fn init_db(&self, conn: &Connection) -> anyhow::Result<()> {
        history::init_db(conn)
    }

    fn which_key_entries(&self) -> Vec<WhichKeyEntry> {
        vec![WhichKeyEntry::action("c", "Clear history")]
    }

    fn telescope_items(&self) -> Vec<TelescopeItem> {
        self.submissions
            .iter()
            .map(|s| {
                let description = match s.status {
                    SubmissionStatus::Submitted => format!("{} {}", s.kind.as_str(), s.created_at),
                    SubmissionStatus::Failed => format!("{} failed {}", s.kind.as_str(), s.created_at),
                };
                TelescopeItem::new(
                    format!("{} -> {}", s.name, s.target),
                    description,
                    format!("submission:{}", s.id),
                )
            })
            .collect()
    }

    fn handle_telescope_selection(&mut self, id: &str) -> bool {
        let Some(sub_id) = id
            .strip_prefix("submission:")
            .and_then(|s| s.parse::<i64>().ok())
        else {
            return false;
        };
        self.filter.clear();
        self.apply_filter();
        if let Some(pos) = self
            .filtered
            .iter()
            .position(|&i| self.submissions[i].id == sub_id)
        {
            self.list_state.select(Some(pos));
        }
        true
    }

    fn help_entries(&self) -> Vec<HelpEntry> {
        vec![
            HelpEntry::with_section("Status", "/", "Filter by name or target"),
            HelpEntry::with_section("Status", "dd", "Delete entry"),
            HelpEntry::with_section("Status", "R", "Reload history"),
            HelpEntry::with_section("Status", ":clear", "Remove all entries"),
        ]
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        if self.mode == InputMode::Insert {
            return self.handle_insert_key(key);
        }
        let action = process_normal_key(key, &mut self.key_state);
        match action {
            Action::MoveDown(n) => self.move_by(n as isize),
            Action::MoveUp(n) => self.move_by(-(n as isize)),
            Action::HalfPageDown => self.move_by(10),
            Action::HalfPageUp => self.move_by(-10),
            Action::GotoTop => self.move_by(isize::MIN),
            Action::GotoBottom => self.move_by(isize::MAX),
            Action::Delete => self.delete_selected(),
            Action::Refresh => {
                self.message = None;
                self.reload_or_report();
            }
            Action::Search | Action::SetMode(InputMode::Insert) => {
                self.mode = InputMode::Insert;
                return Action::SetMode(InputMode::Insert);
            }
            _ if action.is_global() => return action,
            _ => {}
        }
        Action::None
    }

    fn handle_leader_action(&mut self, key: char) -> Option<Action> {
        if key == 'c' {
            self.clear();
            return Some(Action::None);
        }
        None
    }

    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd.trim() {
            "clear" => {
                self.clear();
                true
            }
            "reload" => {
                self.reload_or_report();
                true
            }
            _ => false,
        }
    }

    fn handle_paste(&mut self, text: &str) -> Action {
        if self.mode == InputMode::Insert {
            self.filter.insert_str(text);
            self.apply_filter();
        }
        Action::None
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let mut state = self.list_state.clone();
        ui::render_history(
            frame,
            area,
            &self.visible(),
            &mut state,
            &self.filter,
            self.mode == InputMode::Insert,
            &self.dashboard_url,
        );
    }

    fn status_message(&self) -> Option<String> {
        self.message.clone()
    }

    fn reset_key_state(&mut self) {
        self.key_state.reset();
    }

    fn on_focus(&mut self) {
        self.reload_or_report();
    }
}
