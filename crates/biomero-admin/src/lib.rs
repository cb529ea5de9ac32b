pub mod scripts;
pub mod settings;
pub mod ui;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{Frame, layout::Rect};
use rusqlite::Connection;
use tracing::{info, warn};

use biomero_api::BiomeroClient;
use biomero_api::executor::{ApiCommand, ApiEvent, ApiExecutor};
use biomero_core::{
    help_popup::HelpEntry,
    keybinds::{Action, InputMode, KeyState, LineInput, process_normal_key},
    telescope::TelescopeItem,
    tool::Tool,
    which_key::WhichKeyEntry,
};

pub use scripts::ScriptsTool;
use settings::{Converter, Model, ModelField, Settings, parse_pair};

const NOT_ADMIN: &str = "Settings are only available to administrators";

/// One line of the settings editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Section(String),
    Setting { section: String, key: String },
    ModelsHeader,
    Model { index: usize, field: ModelField },
    ConvertersHeader,
    Converter(usize),
}

/// Lines of the editor for the current draft.
pub fn rows(settings: &Settings) -> Vec<Row> {
    let mut rows = Vec::new();
    for section in settings.section_names() {
        rows.push(Row::Section(section.to_string()));
        if let Some(keys) = settings.sections.get(section) {
            rows.extend(keys.keys().map(|key| Row::Setting {
                section: section.to_string(),
                key: key.clone(),
            }));
        }
    }

    rows.push(Row::ModelsHeader);
    for (index, model) in settings.models.iter().enumerate() {
        for field in [ModelField::Name, ModelField::Path, ModelField::Repo, ModelField::Job] {
            rows.push(Row::Model { index, field });
        }
        rows.extend(model.extra.keys().map(|key| Row::Model {
            index,
            field: ModelField::Extra(key.clone()),
        }));
    }

    rows.push(Row::ConvertersHeader);
    rows.extend((0..settings.converters.len()).map(Row::Converter));
    rows
}

/// What the line editor is writing to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EditTarget {
    Row(Row),
    /// `key=value` for a new job parameter of a model.
    NewParam(usize),
}

/// BIOMERO server settings editor, for administrators.
pub struct AdminTool {
    executor: ApiExecutor,
    is_admin: bool,
    /// Settings as last loaded or saved.
    snapshot: Option<Settings>,
    draft: Settings,
    cursor: usize,
    edit: Option<EditTarget>,
    input: LineInput,
    loading: bool,
    saving: bool,
    mode: InputMode,
    key_state: KeyState,
    message: Option<(String, bool)>,
}

impl AdminTool {
    pub fn new(client: BiomeroClient) -> Self {
        let is_admin = client.config().user.is_admin;
        Self {
            executor: ApiExecutor::spawn(client),
            is_admin,
            snapshot: None,
            draft: Settings::default(),
            cursor: 0,
            edit: None,
            input: LineInput::default(),
            loading: false,
            saving: false,
            mode: InputMode::Normal,
            key_state: KeyState::default(),
            message: None,
        }
    }

    fn notify(&mut self, message: impl Into<String>, is_error: bool) {
        self.message = Some((message.into(), is_error));
    }

    pub fn is_modified(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| *s != self.draft)
    }

    fn rows(&self) -> Vec<Row> {
        rows(&self.draft)
    }

    fn current_row(&self) -> Option<Row> {
        self.rows().into_iter().nth(self.cursor)
    }

    fn clamp_cursor(&mut self) {
        let len = self.rows().len();
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }

    fn move_to(&mut self, row: &Row) {
        if let Some(pos) = self.rows().iter().position(|r| r == row) {
            self.cursor = pos;
        }
    }

    // ── Server round trips ───────────────────────────────────────────

    fn load(&mut self) {
        if !self.is_admin {
            self.notify(NOT_ADMIN, true);
            return;
        }
        if self.loading {
            return;
        }
        if self.executor.send(ApiCommand::LoadConfig).is_ok() {
            self.loading = true;
            self.notify("Loading settings...", false);
        }
    }

    fn save(&mut self) {
        if !self.is_admin {
            self.notify(NOT_ADMIN, true);
            return;
        }
        if self.snapshot.is_none() || self.saving {
            return;
        }
        if let Err(hint) = self.draft.validate() {
            self.notify(hint, true);
            return;
        }
        let sections = self.draft.to_sections();
        info!(sections = sections.len(), "saving settings");
        if self.executor.send(ApiCommand::SaveConfig(sections)).is_ok() {
            self.saving = true;
            self.notify("Saving settings...", false);
        }
    }

    /// Throw away edits since the last load or save.
    fn reset(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            self.draft = snapshot.clone();
            self.clamp_cursor();
            self.notify("Settings reset", false);
        }
    }

    fn handle_event(&mut self, event: ApiEvent) {
        match event {
            ApiEvent::Config(result) => {
                self.loading = false;
                match result {
                    Ok(sections) => {
                        let settings = Settings::from_sections(&sections);
                        self.snapshot = Some(settings.clone());
                        self.draft = settings;
                        self.clamp_cursor();
                        self.notify("Settings loaded", false);
                    }
                    Err(err) if err.starts_with("server returned 403") => {
                        warn!(error = %err, "settings refused by the server");
                        self.notify(NOT_ADMIN, true);
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to load settings");
                        self.notify(err, true);
                    }
                }
            }
            ApiEvent::ConfigSaved(result) => {
                self.saving = false;
                match result {
                    Ok(message) => {
                        self.snapshot = Some(self.draft.clone());
                        self.notify(message, false);
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to save settings");
                        self.notify(err, true);
                    }
                }
            }
            _ => {}
        }
    }

    // ── Editing ──────────────────────────────────────────────────────

    fn value_of(&self, row: &Row) -> Option<String> {
        match row {
            Row::Setting { section, key } => {
                self.draft.setting(section, key).map(str::to_string)
            }
            Row::Model { index, field } => self.draft.models.get(*index).map(|m| m.get(field)),
            Row::Converter(i) => self
                .draft
                .converters
                .get(*i)
                .map(|c| {
                    if c.key.is_empty() && c.value.is_empty() {
                        String::new()
                    } else {
                        format!("{}={}", c.key, c.value)
                    }
                }),
            _ => None,
        }
    }

    fn start_edit(&mut self, target: EditTarget) -> Action {
        let text = match &target {
            EditTarget::Row(row) => match self.value_of(row) {
                Some(text) => text,
                None => return Action::None,
            },
            EditTarget::NewParam(_) => String::new(),
        };
        self.input = LineInput::with_text(text);
        self.edit = Some(target);
        self.mode = InputMode::Insert;
        Action::SetMode(InputMode::Insert)
    }

    fn commit_edit(&mut self) {
        let Some(target) = self.edit.take() else {
            return;
        };
        let text = self.input.text.clone();
        match target {
            EditTarget::Row(Row::Setting { section, key }) => {
                self.draft.set_setting(&section, &key, text);
            }
            EditTarget::Row(Row::Model { index, field }) => {
                if let Some(model) = self.draft.models.get_mut(index) {
                    model.set(&field, text);
                }
            }
            EditTarget::Row(Row::Converter(i)) => {
                if let Some(converter) = self.draft.converters.get_mut(i) {
                    let (key, value) = parse_pair(&text).unwrap_or((text.trim().to_string(), String::new()));
                    converter.key = key;
                    converter.value = value;
                }
            }
            EditTarget::NewParam(index) => match parse_pair(&text) {
                Some((key, value)) if !key.is_empty() => {
                    if let Some(model) = self.draft.models.get_mut(index) {
                        let field = ModelField::Extra(key);
                        model.set(&field, value);
                        self.move_to(&Row::Model { index, field });
                    }
                }
                _ => self.notify("Job parameters are written as key=value", true),
            },
            EditTarget::Row(_) => {}
        }
    }

    fn add(&mut self) -> Action {
        let Some(row) = self.current_row() else {
            return Action::None;
        };
        match row {
            Row::ModelsHeader => {
                self.draft.models.push(Model::default());
                let row = Row::Model {
                    index: self.draft.models.len() - 1,
                    field: ModelField::Name,
                };
                self.move_to(&row);
                self.start_edit(EditTarget::Row(row))
            }
            Row::Model { index, .. } => self.start_edit(EditTarget::NewParam(index)),
            Row::ConvertersHeader | Row::Converter(_) => {
                self.draft.converters.push(Converter::default());
                let row = Row::Converter(self.draft.converters.len() - 1);
                self.move_to(&row);
                self.start_edit(EditTarget::Row(row))
            }
            _ => Action::None,
        }
    }

    fn delete(&mut self) {
        let Some(row) = self.current_row() else {
            return;
        };
        match row {
            Row::Model {
                index,
                field: ModelField::Extra(key),
            } => {
                if let Some(model) = self.draft.models.get_mut(index) {
                    model.extra.remove(&key);
                }
            }
            Row::Model { index, .. } => {
                if index < self.draft.models.len() {
                    self.draft.models.remove(index);
                }
            }
            Row::Converter(i) => {
                if i < self.draft.converters.len() {
                    self.draft.converters.remove(i);
                }
            }
            _ => return,
        }
        self.clamp_cursor();
    }

    fn handle_insert_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Enter => self.commit_edit(),
            KeyCode::Esc => self.edit = None,
            _ => {
                self.input.handle_key(key);
                return Action::None;
            }
        }
        self.mode = InputMode::Normal;
        Action::SetMode(InputMode::Normal)
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Action {
        let pending = self.key_state.leader_active || self.key_state.pending_key.is_some();
        if !pending && key.modifiers.is_empty() {
            match key.code {
                KeyCode::Char('a') if self.snapshot.is_some() => return self.add(),
                KeyCode::Char('s') => {
                    self.save();
                    return Action::None;
                }
                _ => {}
            }
        }

        let action = process_normal_key(key, &mut self.key_state);
        let len = self.rows().len();
        match action {
            Action::MoveDown(n) => self.cursor = (self.cursor + n).min(len.saturating_sub(1)),
            Action::MoveUp(n) => self.cursor = self.cursor.saturating_sub(n),
            Action::GotoTop => self.cursor = 0,
            Action::GotoBottom => self.cursor = len.saturating_sub(1),
            Action::HalfPageDown => self.cursor = (self.cursor + 10).min(len.saturating_sub(1)),
            Action::HalfPageUp => self.cursor = self.cursor.saturating_sub(10),
            Action::Confirm | Action::Edit | Action::SetMode(InputMode::Insert) => {
                if let Some(row) = self.current_row() {
                    return self.start_edit(EditTarget::Row(row));
                }
            }
            Action::Delete => self.delete(),
            Action::Refresh => self.load(),
            _ if action.is_global() => return action,
            _ => {}
        }
        Action::None
    }

    /// Rows and values for rendering.
    fn view_rows(&self) -> Vec<(Row, Option<String>)> {
        self.rows()
            .into_iter()
            .map(|row| {
                let value = self.value_of(&row);
                (row, value)
            })
            .collect()
    }
}

impl Tool for AdminTool {
    fn name(&self) -> &str {
        "Admin"
    }

    fn description(&self) -> &str {
        "BIOMERO server settings"
    }

    fn mode(&self) -> InputMode {
        self.mode
    }

    fn init_db(&self, _conn: &Connection) -> anyhow::Result<()> {
        Ok(())
    }

    fn which_key_entries(&self) -> Vec<WhichKeyEntry> {
        vec![
            WhichKeyEntry::action("w", "Save settings"),
            WhichKeyEntry::action("x", "Reset to last loaded"),
        ]
    }

    fn telescope_items(&self) -> Vec<TelescopeItem> {
        self.draft
            .models
            .iter()
            .filter(|m| !m.name.is_empty())
            .map(|m| TelescopeItem::new(&m.name, "Workflow model", format!("model:{}", m.name)))
            .collect()
    }

    fn handle_telescope_selection(&mut self, id: &str) -> bool {
        let Some(name) = id.strip_prefix("model:") else {
            return false;
        };
        if let Some(index) = self.draft.models.iter().position(|m| m.name == name) {
            self.move_to(&Row::Model {
                index,
                field: ModelField::Name,
            });
        }
        true
    }

    fn help_entries(&self) -> Vec<HelpEntry> {
        vec![
            HelpEntry::with_section("Admin", "Enter / e", "Edit value"),
            HelpEntry::with_section("Admin", "a", "Add model, job parameter or converter"),
            HelpEntry::with_section("Admin", "dd", "Delete model, parameter or converter"),
            HelpEntry::with_section("Admin", "s / :w", "Save settings"),
            HelpEntry::with_section("Admin", ":reset", "Discard unsaved edits"),
            HelpEntry::with_section("Admin", "R", "Reload from the server"),
        ]
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        match self.mode {
            InputMode::Insert => self.handle_insert_key(key),
            _ => self.handle_normal_key(key),
        }
    }

    fn handle_leader_action(&mut self, key: char) -> Option<Action> {
        match key {
            'w' => self.save(),
            'x' => self.reset(),
            _ => return None,
        }
        Some(Action::None)
    }

    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd.trim() {
            "w" | "write" => self.save(),
            "reset" => self.reset(),
            "reload" => self.load(),
            _ => return false,
        }
        true
    }

    fn handle_paste(&mut self, text: &str) -> Action {
        if self.mode == InputMode::Insert {
            self.input.insert_str(text);
        }
        Action::None
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        if !self.is_admin {
            ui::render_not_admin(frame, area, NOT_ADMIN);
            return;
        }
        let editing = self.edit.as_ref().map(|target| match target {
            EditTarget::Row(row) => format!("Edit {}", ui::row_label(row, &self.draft)),
            EditTarget::NewParam(_) => "New job parameter (key=value)".to_string(),
        });
        ui::render_settings(
            frame,
            area,
            &self.view_rows(),
            &self.draft,
            self.cursor,
            self.is_modified(),
            editing.as_deref().map(|title| (title, &self.input)),
        );
    }

    fn tick(&mut self) {
        for event in self.executor.drain() {
            self.handle_event(event);
        }
    }

    fn status_message(&self) -> Option<String> {
        self.message.as_ref().map(|(text, _)| text.clone())
    }

    fn reset_key_state(&mut self) {
        self.key_state.reset();
    }

    fn on_focus(&mut self) {
        if self.snapshot.is_none() {
            self.load();
        }
    }
}
