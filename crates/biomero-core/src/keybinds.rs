use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Input modes, modeled after vim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Navigation and actions via keybinds.
    #[default]
    Normal,
    /// Text input (search boxes, form fields). Exited with `Esc`.
    Insert,
    /// Command-line mode. Entered with `:`.
    Command,
}

impl InputMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Insert => "INSERT",
            Self::Command => "COMMAND",
        }
    }
}

/// Actions that can result from processing a key event.
/// Tools and the hub return these to signal what should happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The key was consumed but nothing happens.
    None,
    /// Close the current tool or quit the hub.
    Quit,
    SetMode(InputMode),
    MoveDown(usize),
    MoveUp(usize),
    GotoTop,
    GotoBottom,
    HalfPageDown,
    HalfPageUp,
    /// Expand the folder under the cursor (`l`).
    Expand,
    /// Collapse the folder under the cursor or go to its parent (`h`).
    Collapse,
    /// Confirm / toggle the current item (`Enter`).
    Confirm,
    /// Toggle the current item in the selection (`x`).
    ToggleSelect,
    /// Select every child / every filtered item (`X`).
    SelectAll,
    /// Deselect every child / every filtered item (`U`).
    DeselectAll,
    /// Reload data from the server (`R`).
    Refresh,
    /// Delete the current item (`dd`).
    Delete,
    /// Begin editing the current item (`e`).
    Edit,
    /// Enter search/filter mode (`/`).
    Search,
    /// Open which-key leader menu.
    LeaderKey,
    /// A leader key sequence was completed with this key.
    LeaderSequence(char),
    /// Switch to tool by index (0-based).
    SwitchTool(usize),
    NextTool,
    PrevTool,
    ToolPicker,
    Help,
    Telescope,
    /// Submit text in Insert/Command mode (Enter was pressed).
    Submit(String),
    /// Show a message in the status bar.
    Notify(String),
}

impl Action {
    /// Whether the hub rather than the tool must act on this.
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            Action::Quit
                | Action::LeaderKey
                | Action::LeaderSequence(_)
                | Action::SwitchTool(_)
                | Action::NextTool
                | Action::PrevTool
                | Action::ToolPicker
                | Action::Telescope
                | Action::Help
                | Action::Notify(_)
                | Action::SetMode(InputMode::Command)
        )
    }
}

/// Pending key state for multi-key sequences like `gg`, `dd`, `gt`, `gT`.
#[derive(Debug, Default, Clone)]
pub struct KeyState {
    /// Whether the leader key (Space) was just pressed.
    pub leader_active: bool,
    /// Pending first key of a two-key sequence.
    pub pending_key: Option<char>,
}

impl KeyState {
    pub fn reset(&mut self) {
        self.leader_active = false;
        self.pending_key = None;
    }
}

/// Process a key event in Normal mode, accounting for multi-key sequences.
pub fn process_normal_key(key: KeyEvent, state: &mut KeyState) -> Action {
    if state.leader_active {
        state.leader_active = false;
        return match key.code {
            KeyCode::Char(' ') => Action::ToolPicker,
            KeyCode::Char('f') => Action::Telescope,
            KeyCode::Char(c @ '1'..='9') => Action::SwitchTool((c as u8 - b'1') as usize),
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Char(c) => Action::LeaderSequence(c),
            _ => Action::None,
        };
    }

    if let Some(pending) = state.pending_key.take() {
        return match (pending, key.code) {
            ('g', KeyCode::Char('g')) => Action::GotoTop,
            ('g', KeyCode::Char('t')) => Action::NextTool,
            ('g', KeyCode::Char('T')) => Action::PrevTool,
            ('d', KeyCode::Char('d')) => Action::Delete,
            _ => Action::None,
        };
    }

    match key.code {
        KeyCode::Char(' ') => {
            state.leader_active = true;
            Action::LeaderKey
        }
        KeyCode::Char('j') | KeyCode::Down => Action::MoveDown(1),
        KeyCode::Char('k') | KeyCode::Up => Action::MoveUp(1),
        KeyCode::Char('h') | KeyCode::Left if key.modifiers.is_empty() => Action::Collapse,
        KeyCode::Char('l') | KeyCode::Right if key.modifiers.is_empty() => Action::Expand,
        KeyCode::Char('G') => Action::GotoBottom,
        KeyCode::Char('g') => {
            state.pending_key = Some('g');
            Action::None
        }
        KeyCode::Char('d') if key.modifiers == KeyModifiers::CONTROL => Action::HalfPageDown,
        KeyCode::Char('u') if key.modifiers == KeyModifiers::CONTROL => Action::HalfPageUp,
        KeyCode::Char('d') => {
            state.pending_key = Some('d');
            Action::None
        }
        KeyCode::Enter => Action::Confirm,
        KeyCode::Char('x') => Action::ToggleSelect,
        KeyCode::Char('X') => Action::SelectAll,
        KeyCode::Char('U') => Action::DeselectAll,
        KeyCode::Char('R') => Action::Refresh,
        KeyCode::Char('/') => Action::Search,
        KeyCode::Char('e') => Action::Edit,
        KeyCode::Char('i') => Action::SetMode(InputMode::Insert),
        KeyCode::Char(':') => Action::SetMode(InputMode::Command),
        KeyCode::Char('?') => Action::Help,
        KeyCode::Char('q') => Action::Quit,
        _ => Action::None,
    }
}

/// Byte index of the character boundary before `cursor`.
pub fn prev_char_boundary(text: &str, cursor: usize) -> usize {
    text[..cursor]
        .char_indices()
        .next_back()
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Byte index of the character boundary after `cursor`.
pub fn next_char_boundary(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .char_indices()
        .nth(1)
        .map(|(i, _)| cursor + i)
        .unwrap_or(text.len())
}

/// Single-line text buffer with a byte cursor, used by search boxes and
/// form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineInput {
    pub text: String,
    pub cursor: usize,
}

impl LineInput {
    pub fn with_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            cursor: text.len(),
            text,
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn insert_char(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    pub fn insert_str(&mut self, s: &str) {
        for c in s.chars().filter(|c| !c.is_control()) {
            self.insert_char(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            let prev = prev_char_boundary(&self.text, self.cursor);
            self.text.drain(prev..self.cursor);
            self.cursor = prev;
        }
    }

    pub fn left(&mut self) {
        if self.cursor > 0 {
            self.cursor = prev_char_boundary(&self.text, self.cursor);
        }
    }

    pub fn right(&mut self) {
        if self.cursor < self.text.len() {
            self.cursor = next_char_boundary(&self.text, self.cursor);
        }
    }

    /// Apply an editing key. Returns true when the text changed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.insert_char(c);
                true
            }
            KeyCode::Backspace => {
                let before = self.text.len();
                self.backspace();
                before != self.text.len()
            }
            KeyCode::Left => {
                self.left();
                false
            }
            KeyCode::Right => {
                self.right();
                false
            }
            KeyCode::Home => {
                self.cursor = 0;
                false
            }
            KeyCode::End => {
                self.cursor = self.text.len();
                false
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_two_key_sequences() {
        let mut state = KeyState::default();
        assert_eq!(process_normal_key(key(KeyCode::Char('g')), &mut state), Action::None);
        assert_eq!(
            process_normal_key(key(KeyCode::Char('g')), &mut state),
            Action::GotoTop
        );
        process_normal_key(key(KeyCode::Char('d')), &mut state);
        assert_eq!(
            process_normal_key(key(KeyCode::Char('d')), &mut state),
            Action::Delete
        );
    }

    #[test]
    fn test_leader_sequences() {
        let mut state = KeyState::default();
        assert_eq!(
            process_normal_key(key(KeyCode::Char(' ')), &mut state),
            Action::LeaderKey
        );
        assert_eq!(
            process_normal_key(key(KeyCode::Char('2')), &mut state),
            Action::SwitchTool(1)
        );
        process_normal_key(key(KeyCode::Char(' ')), &mut state);
        assert_eq!(
            process_normal_key(key(KeyCode::Char('r')), &mut state),
            Action::LeaderSequence('r')
        );
    }

    #[test]
    fn test_tree_keys() {
        let mut state = KeyState::default();
        assert_eq!(process_normal_key(key(KeyCode::Char('l')), &mut state), Action::Expand);
        assert_eq!(process_normal_key(key(KeyCode::Char('h')), &mut state), Action::Collapse);
        assert_eq!(
            process_normal_key(key(KeyCode::Char('x')), &mut state),
            Action::ToggleSelect
        );
        // Ctrl-h is left to tools for focus switching
        let ctrl_h = KeyEvent::new(KeyCode::Char('h'), KeyModifiers::CONTROL);
        assert_eq!(process_normal_key(ctrl_h, &mut state), Action::None);
    }

    #[test]
    fn test_line_input_editing() {
        let mut input = LineInput::default();
        for c in "héllo".chars() {
            input.insert_char(c);
        }
        assert_eq!(input.text, "héllo");
        input.backspace();
        assert_eq!(input.text, "héll");
        input.left();
        input.left();
        input.left();
        input.insert_char('X');
        assert_eq!(input.text, "hXéll");
        input.right();
        assert_eq!(input.cursor, "hXé".len());
        input.insert_str("\tab");
        assert_eq!(input.text, "hXéabll");
    }
}
