use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::{Frame, layout::Rect};
use rusqlite::Connection;
use tracing::{info, warn};

use biomero_api::executor::{ApiCommand, ApiEvent, ApiExecutor};
use biomero_api::payload::Group;
use biomero_core::{
    help_popup::{self, HelpPopup},
    keybinds::{Action, InputMode, KeyState, LineInput, process_normal_key},
    telescope::{Telescope, TelescopeItem},
    tool::Tool,
    ui,
    which_key::{self, WhichKey},
};

/// Leader key that opens each tool, by tool name.
const TOOL_KEYS: [(char, &str); 5] = [
    ('r', "Run"),
    ('u', "Upload"),
    ('s', "Scripts"),
    ('a', "Admin"),
    ('h', "Status"),
];

/// Who is logged in, shown in the status bar.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub server: String,
    pub user_name: String,
    pub group_id: i64,
    /// Resolved from the group listing once it arrives.
    pub group_name: Option<String>,
}

impl Session {
    fn label(&self) -> String {
        let user = if self.user_name.is_empty() {
            "anonymous"
        } else {
            self.user_name.as_str()
        };
        match &self.group_name {
            Some(group) => format!("{user}@{group}"),
            None => format!("{user}@group {}", self.group_id),
        }
    }
}

/// The main application state.
pub struct App {
    /// Registry of all available tools.
    tools: Vec<Box<dyn Tool>>,
    /// Index of the currently active tool (None = dashboard).
    active_tool: Option<usize>,
    pub should_quit: bool,
    mode: InputMode,
    which_key: WhichKey,
    help_popup: HelpPopup,
    telescope: Telescope,
    command: LineInput,
    /// Key state for dashboard (persistent so gg/dd work).
    key_state: KeyState,
    session: Session,
    executor: ApiExecutor,
    /// Hub-level message (unknown commands and the like). Cleared on the
    /// next key press.
    message: Option<String>,
}

impl App {
    pub fn new(tools: Vec<Box<dyn Tool>>, session: Session, executor: ApiExecutor) -> Self {
        Self {
            tools,
            active_tool: None,
            should_quit: false,
            mode: InputMode::Normal,
            which_key: WhichKey::new(),
            help_popup: HelpPopup::new(),
            telescope: Telescope::new(),
            command: LineInput::default(),
            key_state: KeyState::default(),
            session,
            executor,
            message: None,
        }
    }

    /// Reset all pending key state (hub + active tool).
    /// Called when the hub takes over input for overlays.
    fn reset_all_key_state(&mut self) {
        self.key_state.reset();
        if let Some(idx) = self.active_tool {
            self.tools[idx].reset_key_state();
        }
    }

    pub fn init_db(&self, conn: &Connection) -> Result<()> {
        for tool in &self.tools {
            tool.init_db(conn)?;
        }
        Ok(())
    }

    /// Ask the server for the group list so the status bar can name the
    /// active group.
    pub fn load_groups(&mut self) {
        if let Err(err) = self.executor.send(ApiCommand::LoadGroups) {
            warn!(error = %err, "could not request groups");
        }
    }

    fn apply_groups(&mut self, groups: &[Group]) {
        self.session.group_name = groups
            .iter()
            .find(|g| g.id == self.session.group_id)
            .map(|g| g.name.clone());
        info!(group = ?self.session.group_name, "active group resolved");
    }

    /// Tick every tool. Background results for inactive tools still have
    /// to be drained, and views sharing the OMERO tree resync here.
    pub fn tick(&mut self) {
        for event in self.executor.drain() {
            match event {
                ApiEvent::Groups(Ok(groups)) => self.apply_groups(&groups),
                ApiEvent::Groups(Err(err)) => warn!(error = %err, "failed to load groups"),
                _ => {}
            }
        }
        for tool in &mut self.tools {
            tool.tick();
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Paste(text) => {
                if let Some(idx) = self.active_tool {
                    let action = self.tools[idx].handle_paste(&text);
                    self.process_action(action);
                }
            }
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        // Ctrl-c always quits
        if key.code == KeyCode::Char('c') && key.modifiers == KeyModifiers::CONTROL {
            self.should_quit = true;
            return;
        }
        self.message = None;

        if self.telescope.visible {
            self.handle_telescope_key(key);
            return;
        }
        if self.which_key.visible {
            self.handle_which_key_input(key);
            return;
        }
        if self.help_popup.visible {
            self.handle_help_key(key);
            return;
        }
        if self.mode == InputMode::Command {
            self.handle_command_key(key);
            return;
        }

        match self.active_tool {
            Some(idx) => {
                let action = self.tools[idx].handle_key(key);
                self.process_action(action);
            }
            None => {
                let action = process_normal_key(key, &mut self.key_state);
                self.process_action(action);
            }
        }
    }

    /// Process an action returned by a tool or global key handler.
    fn process_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.close_or_quit(),
            Action::LeaderKey => self.show_leader_menu(),
            Action::LeaderSequence(c) => self.handle_leader_sequence(c),
            Action::SetMode(mode) => {
                self.mode = mode;
                if mode == InputMode::Command {
                    self.command.clear();
                }
            }
            Action::SwitchTool(idx) => self.switch_to_tool(idx),
            Action::NextTool => {
                if !self.tools.is_empty() {
                    let next = self.active_tool.map_or(0, |i| (i + 1) % self.tools.len());
                    self.switch_to_tool(next);
                }
            }
            Action::PrevTool => {
                if !self.tools.is_empty() {
                    let prev = match self.active_tool {
                        Some(0) | None => self.tools.len() - 1,
                        Some(i) => i - 1,
                    };
                    self.switch_to_tool(prev);
                }
            }
            Action::ToolPicker => self.open_tool_picker(),
            Action::Telescope => self.open_telescope(),
            Action::Help => self.show_help(),
            Action::Notify(message) => self.message = Some(message),
            _ => {}
        }
    }

    fn close_or_quit(&mut self) {
        match self.active_tool.take() {
            Some(idx) => self.tools[idx].on_blur(),
            None => self.should_quit = true,
        }
    }

    fn show_leader_menu(&mut self) {
        self.reset_all_key_state();
        let tool_keys: Vec<(char, &str)> = TOOL_KEYS
            .iter()
            .copied()
            .filter(|(_, name)| self.tools.iter().any(|t| t.name() == *name))
            .collect();
        let mut entries = which_key::hub_leader_entries(&tool_keys);
        if let Some(idx) = self.active_tool {
            entries.splice(0..0, self.tools[idx].which_key_entries());
        }
        self.which_key.show("Leader", entries);
    }

    /// A key pressed after the leader: tool switches first, then whatever
    /// the active tool binds.
    fn handle_leader_sequence(&mut self, c: char) {
        if let Some((_, name)) = TOOL_KEYS.iter().find(|(key, _)| *key == c) {
            if let Some(idx) = self.tools.iter().position(|t| t.name() == *name) {
                self.switch_to_tool(idx);
            }
            return;
        }
        if let Some(idx) = self.active_tool {
            if let Some(action) = self.tools[idx].handle_leader_action(c) {
                self.process_action(action);
            }
        }
    }

    fn handle_which_key_input(&mut self, key: KeyEvent) {
        self.which_key.hide();
        self.reset_all_key_state();
        if let KeyCode::Char(c) = key.code {
            match c {
                'q' => self.process_action(Action::Quit),
                'f' => self.open_telescope(),
                '?' => self.show_help(),
                ' ' => self.open_tool_picker(),
                c @ '1'..='9' => self.switch_to_tool((c as u8 - b'1') as usize),
                c => self.handle_leader_sequence(c),
            }
        }
    }

    fn handle_telescope_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.telescope.close();
                self.reset_all_key_state();
            }
            KeyCode::Enter => {
                if let Some(id) = self.telescope.selected_id() {
                    let id = id.to_string();
                    self.telescope.close();
                    self.reset_all_key_state();
                    self.handle_telescope_selection(&id);
                }
            }
            KeyCode::Up | KeyCode::BackTab => self.telescope.move_up(),
            KeyCode::Down | KeyCode::Tab => self.telescope.move_down(),
            KeyCode::Char(c) => self.telescope.insert_char(c),
            KeyCode::Backspace => self.telescope.backspace(),
            _ => {}
        }
    }

    /// `tool:<name>` switches tools; anything else is offered to each tool
    /// until one claims it, and that tool becomes active.
    fn handle_telescope_selection(&mut self, id: &str) {
        if let Some(name) = id.strip_prefix("tool:") {
            if let Some(idx) = self.tools.iter().position(|t| t.name() == name) {
                self.switch_to_tool(idx);
            }
            return;
        }
        for idx in 0..self.tools.len() {
            if self.tools[idx].handle_telescope_selection(id) {
                if self.active_tool != Some(idx) {
                    self.switch_to_tool(idx);
                }
                return;
            }
        }
    }

    fn handle_command_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.mode = InputMode::Normal;
                self.command.clear();
            }
            KeyCode::Enter => {
                let cmd = self.command.text.trim().to_string();
                self.mode = InputMode::Normal;
                self.command.clear();
                self.execute_command(&cmd);
            }
            KeyCode::Backspace if self.command.text.is_empty() => {
                self.mode = InputMode::Normal;
            }
            _ => {
                self.command.handle_key(key);
            }
        }
    }

    fn execute_command(&mut self, cmd: &str) {
        match cmd {
            "" => {}
            "q" | "quit" => self.close_or_quit(),
            "qa" | "qa!" => self.should_quit = true,
            _ => {
                let handled = self
                    .active_tool
                    .is_some_and(|idx| self.tools[idx].handle_command(cmd));
                if !handled {
                    self.message = Some(format!("Not an editor command: {cmd}"));
                }
            }
        }
    }

    fn switch_to_tool(&mut self, idx: usize) {
        if idx < self.tools.len() {
            if let Some(old) = self.active_tool {
                self.tools[old].on_blur();
            }
            self.active_tool = Some(idx);
            self.tools[idx].on_focus();
            self.mode = InputMode::Normal;
        }
    }

    fn tool_items(&self) -> Vec<TelescopeItem> {
        self.tools
            .iter()
            .map(|t| TelescopeItem::new(t.name(), t.description(), format!("tool:{}", t.name())))
            .collect()
    }

    fn open_tool_picker(&mut self) {
        let items = self.tool_items();
        self.telescope.open("Tool Picker", items);
    }

    /// Search across tools, workflows, destinations, scripts and history.
    fn open_telescope(&mut self) {
        let mut items = self.tool_items();
        for tool in &self.tools {
            items.extend(tool.telescope_items());
        }
        self.telescope.open("Find", items);
    }

    fn show_help(&mut self) {
        self.reset_all_key_state();
        let mut entries = Vec::new();
        if let Some(idx) = self.active_tool {
            entries.extend(self.tools[idx].help_entries());
        }
        entries.extend(help_popup::global_help_entries());

        let title = match self.active_tool {
            Some(idx) => format!("{} Help", self.tools[idx].name()),
            None => "Help".to_string(),
        };
        self.help_popup.show(title, entries);
    }

    fn handle_help_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') => {
                self.help_popup.hide();
                self.reset_all_key_state();
            }
            KeyCode::Char('j') | KeyCode::Down => self.help_popup.scroll_by(1),
            KeyCode::Char('k') | KeyCode::Up => self.help_popup.scroll_by(-1),
            KeyCode::Char('d') if key.modifiers == KeyModifiers::CONTROL => {
                self.help_popup.scroll_by(10)
            }
            KeyCode::Char('u') if key.modifiers == KeyModifiers::CONTROL => {
                self.help_popup.scroll_by(-10)
            }
            _ => {}
        }
    }

    fn status_info(&self) -> String {
        let message = self
            .message
            .clone()
            .or_else(|| self.active_tool.and_then(|i| self.tools[i].status_message()));
        let hint = match self.active_tool {
            Some(_) => "Space: leader  ?:help  :q: close",
            None => "Space: leader  ?:help  :q: quit",
        };
        format!(
            "{}  |  {}",
            self.session.label(),
            message.as_deref().unwrap_or(hint)
        )
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let (tab_area, content_area, status_area) = ui::standard_layout(area);

        let tool_names: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
        if !tool_names.is_empty() {
            ui::render_tab_bar(frame, tab_area, &tool_names, self.active_tool.unwrap_or(0));
        }

        match self.active_tool {
            Some(idx) => self.tools[idx].render(frame, content_area),
            None => self.render_dashboard(frame, content_area),
        }

        if self.mode == InputMode::Command {
            ui::render_command_line(frame, status_area, &self.command.text, self.command.cursor);
        } else {
            let tool_name = self
                .active_tool
                .map(|i| self.tools[i].name())
                .unwrap_or("Dashboard");
            let mode = match self.active_tool {
                Some(idx) => self.tools[idx].mode(),
                None => self.mode,
            };
            ui::render_status_bar(frame, status_area, mode, tool_name, &self.status_info());
        }

        // Overlays (rendered last, on top)
        self.which_key.render(frame, area);
        self.help_popup.render(frame, area);
        self.telescope.render(frame, area);
    }

    fn render_dashboard(&self, frame: &mut Frame, area: Rect) {
        use ratatui::{
            layout::{Alignment, Constraint, Layout},
            style::{Modifier, Style},
            text::{Line, Span},
            widgets::Paragraph,
        };

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let dim = Style::default().add_modifier(Modifier::DIM);
        let key_line = |key: &'static str, text: &'static str| {
            Line::from(vec![Span::styled(key, bold), Span::raw(text)])
        };

        let server = if self.session.server.is_empty() {
            "no server configured".to_string()
        } else {
            self.session.server.clone()
        };
        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled("biomero", bold)),
            Line::from(""),
            Line::from(Span::styled(
                "Run BIOMERO workflows and imports on OMERO",
                dim,
            )),
            Line::from(Span::styled(format!("{server}  ({})", self.session.label()), dim)),
            Line::from(""),
            key_line("  <Space> ", "  Open leader menu"),
            key_line("  <Space><Space> ", "  Tool picker"),
            key_line("  <Space>f ", "  Find (telescope)"),
            key_line("  :q ", "  Quit"),
            Line::from(""),
        ];

        if !self.tools.is_empty() {
            lines.push(Line::from(Span::styled("Available tools:", bold)));
            lines.push(Line::from(""));
            for (i, tool) in self.tools.iter().enumerate() {
                lines.push(Line::from(vec![
                    Span::styled(format!("  {} ", i + 1), bold),
                    Span::styled(
                        tool.name(),
                        Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                    ),
                    Span::styled(format!("  {}", tool.description()), dim),
                ]));
            }
        }

        let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
        let [_, centered, _] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(22),
            Constraint::Fill(1),
        ])
        .areas(area);
        frame.render_widget(paragraph, centered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use biomero_api::{BiomeroClient, ClientConfig};
    use biomero_core::which_key::WhichKeyEntry;

    /// What the hub routed to a fake tool.
    #[derive(Default)]
    struct Calls {
        focused: bool,
        ticks: usize,
        commands: Vec<String>,
        leader: Vec<char>,
    }

    struct FakeTool {
        name: &'static str,
        calls: Rc<RefCell<Calls>>,
        key_state: KeyState,
    }

    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fake"
        }

        fn mode(&self) -> InputMode {
            InputMode::Normal
        }

        fn init_db(&self, _conn: &Connection) -> anyhow::Result<()> {
            Ok(())
        }

        fn which_key_entries(&self) -> Vec<WhichKeyEntry> {
            vec![WhichKeyEntry::action("w", "Tool action")]
        }

        fn telescope_items(&self) -> Vec<TelescopeItem> {
            vec![TelescopeItem::new("item", "", format!("{}:1", self.name))]
        }

        fn handle_telescope_selection(&mut self, id: &str) -> bool {
            id == format!("{}:1", self.name)
        }

        fn handle_key(&mut self, key: KeyEvent) -> Action {
            let action = process_normal_key(key, &mut self.key_state);
            if action.is_global() { action } else { Action::None }
        }

        fn handle_leader_action(&mut self, key: char) -> Option<Action> {
            self.calls.borrow_mut().leader.push(key);
            Some(Action::None)
        }

        fn handle_command(&mut self, cmd: &str) -> bool {
            self.calls.borrow_mut().commands.push(cmd.to_string());
            cmd == "reload"
        }

        fn render(&self, _frame: &mut Frame, _area: Rect) {}

        fn tick(&mut self) {
            self.calls.borrow_mut().ticks += 1;
        }

        fn reset_key_state(&mut self) {
            self.key_state.reset();
        }

        fn on_focus(&mut self) {
            self.calls.borrow_mut().focused = true;
        }

        fn on_blur(&mut self) {
            self.calls.borrow_mut().focused = false;
        }
    }

    /// Hub with Run, Upload and Status fakes, plus what each one was asked to do.
    fn app() -> (App, Vec<Rc<RefCell<Calls>>>) {
        let mut calls = Vec::new();
        let mut tools: Vec<Box<dyn Tool>> = Vec::new();
        for name in ["Run", "Upload", "Status"] {
            let log = Rc::new(RefCell::new(Calls::default()));
            calls.push(log.clone());
            tools.push(Box::new(FakeTool {
                name,
                calls: log,
                key_state: KeyState::default(),
            }));
        }
        let executor = ApiExecutor::spawn(BiomeroClient::new(ClientConfig::default()).unwrap());
        let session = Session {
            server: "https://omero.example.org".into(),
            user_name: "root".into(),
            group_id: 3,
            group_name: None,
        };
        (App::new(tools, session, executor), calls)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_event(Event::Key(KeyEvent::new(code, KeyModifiers::NONE)));
    }

    fn command(app: &mut App, cmd: &str) {
        press(app, KeyCode::Char(':'));
        for c in cmd.chars() {
            press(app, KeyCode::Char(c));
        }
        press(app, KeyCode::Enter);
    }

    #[test]
    fn test_leader_opens_tools_by_letter() {
        let (mut app, calls) = app();
        press(&mut app, KeyCode::Char(' '));
        assert!(app.which_key.visible);
        press(&mut app, KeyCode::Char('u'));
        assert!(!app.which_key.visible);
        assert_eq!(app.active_tool, Some(1));
        assert!(calls[1].borrow().focused);

        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Char('h'));
        assert_eq!(app.active_tool, Some(2));
        assert!(!calls[1].borrow().focused);
    }

    #[test]
    fn test_other_leader_keys_go_to_active_tool() {
        let (mut app, calls) = app();
        app.switch_to_tool(0);
        press(&mut app, KeyCode::Char(' '));
        assert_eq!(app.which_key.entries[0].key, "w");
        press(&mut app, KeyCode::Char('w'));
        assert_eq!(calls[0].borrow().leader, ['w']);
    }

    #[test]
    fn test_commands() {
        let (mut app, calls) = app();
        command(&mut app, "reload");
        assert_eq!(app.message.as_deref(), Some("Not an editor command: reload"));

        app.switch_to_tool(0);
        command(&mut app, "reload");
        assert_eq!(calls[0].borrow().commands, ["reload"]);
        assert!(app.message.is_none());

        command(&mut app, "q");
        assert_eq!(app.active_tool, None);
        assert!(!app.should_quit);
        command(&mut app, "q");
        assert!(app.should_quit);
    }

    #[test]
    fn test_telescope_selection_activates_owner() {
        let (mut app, _) = app();
        app.handle_telescope_selection("Upload:1");
        assert_eq!(app.active_tool, Some(1));
        app.handle_telescope_selection("tool:Status");
        assert_eq!(app.active_tool, Some(2));
    }

    #[test]
    fn test_tick_reaches_every_tool() {
        let (mut app, calls) = app();
        app.switch_to_tool(1);
        app.tick();
        app.tick();
        assert!(calls.iter().all(|p| p.borrow().ticks == 2));
    }

    #[test]
    fn test_group_name_in_status() {
        let (mut app, _) = app();
        assert!(app.status_info().starts_with("root@group 3"));
        app.apply_groups(&[
            Group { id: 1, name: "system".into() },
            Group { id: 3, name: "imaging".into() },
        ]);
        assert!(app.status_info().starts_with("root@imaging"));
    }
}
