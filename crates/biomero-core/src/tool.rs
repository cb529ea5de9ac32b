use crate::help_popup::HelpEntry;
use crate::keybinds::{Action, InputMode};
use crate::telescope::TelescopeItem;
use crate::which_key::WhichKeyEntry;
use crossterm::event::KeyEvent;
use ratatui::{Frame, layout::Rect};
use rusqlite::Connection;

/// The trait every biomero tool must implement.
/// Tools are embedded views inside the hub, like neovim buffers.
pub trait Tool {
    /// The display name of the tool (e.g., "Run", "Upload").
    fn name(&self) -> &str;

    /// Short description for the tool picker.
    fn description(&self) -> &str;

    /// The tool's current input mode (for status bar display).
    fn mode(&self) -> InputMode;

    /// Initialize the tool's database tables if they don't exist.
    fn init_db(&self, conn: &Connection) -> anyhow::Result<()>;

    /// Which-key entries for this tool's leader group.
    fn which_key_entries(&self) -> Vec<WhichKeyEntry>;

    /// Items this tool contributes to telescope search.
    fn telescope_items(&self) -> Vec<TelescopeItem>;

    /// Jump to an item previously returned by `telescope_items`.
    /// Returns true when the id belonged to this tool.
    fn handle_telescope_selection(&mut self, _id: &str) -> bool {
        false
    }

    /// Help entries specific to this tool (shown alongside global keybinds).
    fn help_entries(&self) -> Vec<HelpEntry> {
        Vec::new()
    }

    /// Handle a key event. Returns an Action describing what happened.
    fn handle_key(&mut self, key: KeyEvent) -> Action;

    /// Handle a `<Space><key>` sequence the hub does not own.
    fn handle_leader_action(&mut self, _key: char) -> Option<Action> {
        None
    }

    /// Handle a `:command` the hub does not own. Returns true if consumed.
    fn handle_command(&mut self, _cmd: &str) -> bool {
        false
    }

    /// Handle bracketed paste text.
    fn handle_paste(&mut self, _text: &str) -> Action {
        Action::None
    }

    /// Render the tool's UI into the given area.
    fn render(&self, frame: &mut Frame, area: Rect);

    /// Called every hub tick (~50ms) to drain background results.
    fn tick(&mut self) {}

    /// One-line status for the hub status bar (last message, progress).
    fn status_message(&self) -> Option<String> {
        None
    }

    /// Reset any pending key state (leader, multi-key sequences).
    /// Called by the hub when it takes over input (overlays open/close).
    fn reset_key_state(&mut self) {}

    /// Called when the tool becomes the active view.
    fn on_focus(&mut self) {}

    /// Called when the tool loses focus.
    fn on_blur(&mut self) {}
}
