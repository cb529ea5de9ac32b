use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{Frame, layout::Rect};
use rusqlite::Connection;
use tracing::warn;

use biomero_api::BiomeroClient;
use biomero_api::executor::{ApiCommand, ApiEvent, ApiExecutor};
use biomero_api::payload::ScriptMenuResponse;
use biomero_core::{
    help_popup::HelpEntry,
    keybinds::{Action, InputMode, KeyState, LineInput, process_normal_key},
    menu_filter::{MenuNode, filter_menu},
    telescope::TelescopeItem,
    tool::Tool,
    which_key::WhichKeyEntry,
};

use crate::ui;

/// A visible line of the script menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRow {
    pub depth: usize,
    pub name: String,
    /// OMERO id of a script. Groups and id-less entries have none.
    pub id: Option<i64>,
    pub is_group: bool,
}

fn flatten(menu: &[MenuNode], depth: usize, out: &mut Vec<ScriptRow>) {
    for node in menu {
        out.push(ScriptRow {
            depth,
            name: node.name.clone(),
            id: node.id,
            is_group: node.is_group(),
        });
        flatten(node.children(), depth + 1, out);
    }
}

/// Browse the OMERO script menu with a live search.
pub struct ScriptsTool {
    executor: ApiExecutor,
    is_admin: bool,
    menu: Vec<MenuNode>,
    rows: Vec<ScriptRow>,
    cursor: usize,
    query: LineInput,
    details: Option<ScriptMenuResponse>,
    loading: bool,
    loaded: bool,
    mode: InputMode,
    key_state: KeyState,
    message: Option<String>,
}

impl ScriptsTool {
    pub fn new(client: BiomeroClient) -> Self {
        let is_admin = client.config().user.is_admin;
        Self {
            executor: ApiExecutor::spawn(client),
            is_admin,
            menu: Vec::new(),
            rows: Vec::new(),
            cursor: 0,
            query: LineInput::default(),
            details: None,
            loading: false,
            loaded: false,
            mode: InputMode::Normal,
            key_state: KeyState::default(),
            message: None,
        }
    }

    /// Recompute the visible rows from the menu and the query.
    fn apply_filter(&mut self) {
        let filtered = filter_menu(&self.menu, self.query.text.trim(), self.is_admin);
        self.rows.clear();
        flatten(&filtered, 0, &mut self.rows);
        self.cursor = self.cursor.min(self.rows.len().saturating_sub(1));
    }

    fn load(&mut self) {
        if self.loading {
            return;
        }
        if self.executor.send(ApiCommand::LoadScripts).is_ok() {
            self.loading = true;
            self.message = Some("Loading scripts...".to_string());
        }
    }

    fn show_details(&mut self) {
        let Some(id) = self.rows.get(self.cursor).and_then(|r| r.id) else {
            return;
        };
        if self.executor.send(ApiCommand::LoadScriptDetails(id)).is_ok() {
            self.details = None;
            self.message = Some("Loading script details...".to_string());
        }
    }

    fn handle_event(&mut self, event: ApiEvent) {
        match event {
            ApiEvent::Scripts(result) => {
                self.loading = false;
                match result {
                    Ok(menu) => {
                        self.menu = menu;
                        self.loaded = true;
                        self.apply_filter();
                        self.message = None;
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to load scripts");
                        self.message = Some(err);
                    }
                }
            }
            ApiEvent::ScriptDetails(result) => match result {
                Ok(details) => {
                    self.details = Some(details);
                    self.message = None;
                }
                Err(err) => {
                    warn!(error = %err, "failed to load script details");
                    self.message = Some(err);
                }
            },
            _ => {}
        }
    }

    fn handle_insert_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => {
                self.mode = InputMode::Normal;
                Action::SetMode(InputMode::Normal)
            }
            _ => {
                if self.query.handle_key(key) {
                    self.apply_filter();
                }
                Action::None
            }
        }
    }
}

impl Tool for ScriptsTool {
    fn name(&self) -> &str {
        "Scripts"
    }

    fn description(&self) -> &str {
        "Search the OMERO script menu"
    }

    fn mode(&self) -> InputMode {
        self.mode
    }

    fn init_db(&self, _conn: &Connection) -> anyhow::Result<()> {
        Ok(())
    }

    fn which_key_entries(&self) -> Vec<WhichKeyEntry> {
        vec![WhichKeyEntry::action("l", "Reload scripts")]
    }

    fn telescope_items(&self) -> Vec<TelescopeItem> {
        let mut rows = Vec::new();
        flatten(&filter_menu(&self.menu, "", self.is_admin), 0, &mut rows);
        rows.into_iter()
            .filter_map(|row| {
                let id = row.id?;
                Some(TelescopeItem::new(row.name, "OMERO script", format!("script:{id}")))
            })
            .collect()
    }

    fn handle_telescope_selection(&mut self, id: &str) -> bool {
        let Some(script_id) = id.strip_prefix("script:").and_then(|s| s.parse::<i64>().ok()) else {
            return false;
        };
        self.query.clear();
        self.apply_filter();
        if let Some(pos) = self.rows.iter().position(|r| r.id == Some(script_id)) {
            self.cursor = pos;
            self.show_details();
        }
        true
    }

    fn help_entries(&self) -> Vec<HelpEntry> {
        vec![
            HelpEntry::with_section("Scripts", "/", "Search script names"),
            HelpEntry::with_section("Scripts", "Enter", "Show script details"),
            HelpEntry::with_section("Scripts", "R", "Reload the menu"),
        ]
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        if self.mode == InputMode::Insert {
            return self.handle_insert_key(key);
        }
        let action = process_normal_key(key, &mut self.key_state);
        let last = self.rows.len().saturating_sub(1);
        match action {
            Action::MoveDown(n) => self.cursor = (self.cursor + n).min(last),
            Action::MoveUp(n) => self.cursor = self.cursor.saturating_sub(n),
            Action::GotoTop => self.cursor = 0,
            Action::GotoBottom => self.cursor = last,
            Action::HalfPageDown => self.cursor = (self.cursor + 10).min(last),
            Action::HalfPageUp => self.cursor = self.cursor.saturating_sub(10),
            Action::Confirm | Action::Expand => self.show_details(),
            Action::Search | Action::SetMode(InputMode::Insert) => {
                self.mode = InputMode::Insert;
                return Action::SetMode(InputMode::Insert);
            }
            Action::Refresh => self.load(),
            _ if action.is_global() => return action,
            _ => {}
        }
        Action::None
    }

    fn handle_leader_action(&mut self, key: char) -> Option<Action> {
        if key == 'l' {
            self.load();
            return Some(Action::None);
        }
        None
    }

    fn handle_paste(&mut self, text: &str) -> Action {
        if self.mode == InputMode::Insert {
            self.query.insert_str(text);
            self.apply_filter();
        }
        Action::None
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        ui::render_scripts(
            frame,
            area,
            &self.rows,
            self.cursor,
            &self.query,
            self.mode == InputMode::Insert,
            self.details.as_ref(),
        );
    }

    fn tick(&mut self) {
        for event in self.executor.drain() {
            self.handle_event(event);
        }
    }

    fn status_message(&self) -> Option<String> {
        self.message.clone()
    }

    fn reset_key_state(&mut self) {
        self.key_state.reset();
    }

    fn on_focus(&mut self) {
        if !self.loaded {
            self.load();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomero_api::ClientConfig;
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn menu() -> Vec<MenuNode> {
        vec![
            MenuNode::group(
                "analysis",
                vec![
                    MenuNode::script(1, "cellpose script"),
                    MenuNode::script(2, "stardist script"),
                ],
            ),
            MenuNode::group("admin", vec![MenuNode::script(3, "cleanup cellpose")]),
        ]
    }

    fn tool(is_admin: bool) -> ScriptsTool {
        let mut config = ClientConfig::default();
        config.user.is_admin = is_admin;
        let mut tool = ScriptsTool::new(BiomeroClient::new(config).unwrap());
        tool.handle_event(ApiEvent::Scripts(Ok(menu())));
        tool
    }

    fn names(tool: &ScriptsTool) -> Vec<&str> {
        tool.rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_admin_groups_hidden_for_users() {
        assert_eq!(
            names(&tool(false)),
            ["analysis", "cellpose script", "stardist script"]
        );
        assert_eq!(tool(true).rows.len(), 5);
    }

    #[test]
    fn test_live_search() {
        let mut tool = tool(true);
        tool.handle_key(key(KeyCode::Char('/')));
        for c in "cell".chars() {
            tool.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(
            names(&tool),
            ["analysis", "cellpose script", "admin", "cleanup cellpose"]
        );
        assert_eq!(tool.rows[1].depth, 1);

        tool.handle_key(key(KeyCode::Esc));
        assert_eq!(tool.mode, InputMode::Normal);
        tool.handle_key(key(KeyCode::Char('G')));
        assert_eq!(tool.rows[tool.cursor].id, Some(3));
    }

    #[test]
    fn test_telescope_lists_scripts_only() {
        let tool = tool(false);
        let ids: Vec<String> = tool.telescope_items().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, ["script:1", "script:2"]);
    }

    #[test]
    fn test_details_only_for_scripts() {
        let mut tool = tool(true);
        tool.show_details();
        assert!(tool.message.is_none(), "cursor is on a group");

        tool.handle_key(key(KeyCode::Char('j')));
        tool.handle_key(key(KeyCode::Enter));
        assert_eq!(tool.message.as_deref(), Some("Loading script details..."));
    }
}
