pub mod ui;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{Frame, layout::Rect};
use rusqlite::Connection;
use tracing::{info, warn};

use biomero_api::config::UploadSource;
use biomero_api::executor::{ApiCommand, ApiEvent, ApiExecutor, DataSource};
use biomero_api::payload::ImportRequest;
use biomero_api::{ApiError, BiomeroClient};
use biomero_core::{
    help_popup::HelpEntry,
    history::{self, SubmissionKind, SubmissionStatus},
    keybinds::{Action, InputMode, KeyState, process_normal_key},
    selection::SelectionMode,
    store::{NodeCategory, NodeStore, SharedStore, TreeNode},
    telescope::TelescopeItem,
    tool::Tool,
    tree_view::{FetchRequest, TreeView},
    which_key::WhichKeyEntry,
};

const HALF_PAGE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Files,
    Destination,
}

/// Datasets and screens (not their category containers) can receive imports.
fn is_destination(node: &TreeNode) -> bool {
    matches!(
        node.category,
        Some(NodeCategory::Datasets) | Some(NodeCategory::Screens)
    ) && node.entity_id().is_some()
}

/// Queue imports of files from the import mount into an OMERO dataset or
/// screen.
pub struct UploadTool {
    executor: ApiExecutor,
    conn: Connection,
    files: TreeView,
    omero: TreeView,
    pane: Pane,
    importing: bool,
    mode: InputMode,
    key_state: KeyState,
    message: Option<(String, bool)>,
}

impl UploadTool {
    pub fn new(conn: Connection, client: BiomeroClient, omero_store: SharedStore) -> anyhow::Result<Self> {
        history::init_db(&conn)?;
        let files_label = match client.config().upload.source {
            UploadSource::Remote => "Import mount".to_string(),
            UploadSource::Local => client.config().upload.local_root.display().to_string(),
        };
        Ok(Self {
            executor: ApiExecutor::spawn(client),
            conn,
            files: TreeView::new(NodeStore::shared(files_label), SelectionMode::Multi),
            omero: TreeView::new(omero_store, SelectionMode::Single).with_selectable(is_destination),
            pane: Pane::Files,
            importing: false,
            mode: InputMode::Normal,
            key_state: KeyState::default(),
            message: None,
        })
    }

    fn notify(&mut self, message: impl Into<String>, is_error: bool) {
        self.message = Some((message.into(), is_error));
    }

    fn source_of(pane: Pane) -> DataSource {
        match pane {
            Pane::Files => DataSource::ImportFiles,
            Pane::Destination => DataSource::Hierarchy,
        }
    }

    fn view_mut(&mut self, pane: Pane) -> &mut TreeView {
        match pane {
            Pane::Files => &mut self.files,
            Pane::Destination => &mut self.omero,
        }
    }

    fn dispatch(&mut self, pane: Pane, request: Option<FetchRequest>) {
        let Some(request) = request else {
            return;
        };
        let id = request.node.id.clone();
        if let Err(message) = self.executor.fetch(Self::source_of(pane), request) {
            let view = self.view_mut(pane);
            view.store().borrow_mut().apply_fetch(&id, Err(message));
            view.rebuild_flat_view();
        }
    }

    fn load_roots(&mut self) {
        let request = self.files.load_root();
        self.dispatch(Pane::Files, request);
        let request = self.omero.load_root();
        self.dispatch(Pane::Destination, request);
        self.files.rebuild_flat_view();
        self.omero.rebuild_flat_view();
    }

    fn reload(&mut self, pane: Pane) {
        let view = self.view_mut(pane);
        view.selection.clear();
        let request = view.reload();
        self.dispatch(pane, request);
    }

    /// Selected files and `[kind, id]` destination, validated. The kind is
    /// the plural category name (`datasets`, `screens`) the import endpoint
    /// accepts.
    pub fn build_request(&self) -> Result<ImportRequest, ApiError> {
        let files = self.files.selection.ids().to_vec();
        let destinations = self
            .omero
            .selected_nodes()
            .into_iter()
            .filter_map(|node| {
                let category = node.category?;
                let id = node.entity_id()?;
                Some((category.as_str().to_string(), id.to_string()))
            })
            .collect();
        ImportRequest::new(files, destinations)
    }

    fn destination_label(&self) -> String {
        self.omero
            .selected_nodes()
            .first()
            .map(|n| n.label.clone())
            .unwrap_or_default()
    }

    fn submit(&mut self) {
        if self.importing {
            self.notify("An import is already being queued", true);
            return;
        }
        let request = match self.build_request() {
            Ok(request) => request,
            Err(err) => {
                self.notify(err.to_string(), true);
                return;
            }
        };
        info!(
            files = request.upload.selected_local.len(),
            destination = %self.destination_label(),
            "queueing import"
        );
        match self.executor.send(ApiCommand::ImportSelected(request)) {
            Ok(()) => {
                self.importing = true;
                self.notify("Queueing import...", false);
            }
            Err(_) => self.notify("Background worker stopped", true),
        }
    }

    fn handle_event(&mut self, event: ApiEvent) {
        match event {
            ApiEvent::Children {
                source,
                parent_id,
                generation,
                result,
            } => {
                let view = match source {
                    DataSource::ImportFiles => &mut self.files,
                    _ => &mut self.omero,
                };
                view.store()
                    .borrow_mut()
                    .complete_fetch(generation, &parent_id, result);
                view.rebuild_flat_view();
            }
            ApiEvent::ImportQueued(result) => {
                self.importing = false;
                let name = format!("{} item(s)", self.files.selection.len());
                let target = self.destination_label();
                let (status, text) = match &result {
                    Ok(msg) => (SubmissionStatus::Submitted, msg.clone()),
                    Err(err) => (SubmissionStatus::Failed, err.clone()),
                };
                if let Err(err) = history::record_submission(
                    &self.conn,
                    SubmissionKind::Import,
                    &name,
                    &target,
                    status,
                    &text,
                ) {
                    warn!(error = %err, "failed to record import");
                }
                match result {
                    Ok(_) => {
                        info!(%target, "import queued");
                        self.files.selection.clear();
                        self.notify(text, false);
                    }
                    Err(_) => {
                        warn!(%target, error = %text, "import failed");
                        self.notify(text, true);
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_tree_action(&mut self, action: Action) {
        let pane = self.pane;
        match action {
            Action::MoveDown(_) => self.view_mut(pane).move_down(),
            Action::MoveUp(_) => self.view_mut(pane).move_up(),
            Action::GotoTop => self.view_mut(pane).goto_top(),
            Action::GotoBottom => self.view_mut(pane).goto_bottom(),
            Action::HalfPageDown => self.view_mut(pane).half_page_down(HALF_PAGE),
            Action::HalfPageUp => self.view_mut(pane).half_page_up(HALF_PAGE),
            Action::Expand => {
                let request = self.view_mut(pane).expand_selected();
                self.dispatch(pane, request);
            }
            Action::Confirm => {
                let request = self.view_mut(pane).toggle_selected();
                self.dispatch(pane, request);
            }
            Action::Collapse => self.view_mut(pane).collapse_or_parent(),
            Action::ToggleSelect => {
                if !self.view_mut(pane).click_selected() && pane == Pane::Destination {
                    self.notify("Pick a dataset or screen as destination", true);
                }
            }
            Action::SelectAll | Action::DeselectAll => {
                let view = self.view_mut(pane);
                if let Some(id) = view.selected_node_id() {
                    if action == Action::SelectAll {
                        view.select_all_children(&id);
                    } else {
                        view.deselect_all_children(&id);
                    }
                }
            }
            Action::Refresh => self.reload(pane),
            _ => {}
        }
    }
}

impl Tool for UploadTool {
    fn name(&self) -> &str {
        "Upload"
    }

    fn description(&self) -> &str {
        "Import files into OMERO"
    }

    fn mode(&self) -> InputMode {
        self.mode
    }

    fn init_db(&self, conn: &Connection) -> anyhow::Result<()> {
        history::init_db(conn)
    }

    fn which_key_entries(&self) -> Vec<WhichKeyEntry> {
        vec![
            WhichKeyEntry::action("i", "Import selection"),
            WhichKeyEntry::action("c", "Clear selection"),
        ]
    }

    fn telescope_items(&self) -> Vec<TelescopeItem> {
        let store = self.omero.store().borrow();
        let mut items = Vec::new();
        for category in [NodeCategory::Datasets, NodeCategory::Screens] {
            for node in store.children_of(category.as_str()) {
                if is_destination(node) {
                    items.push(TelescopeItem::new(
                        &node.label,
                        format!("Import destination ({})", category.id_prefix()),
                        format!("destination:{}", node.id),
                    ));
                }
            }
        }
        items
    }

    fn handle_telescope_selection(&mut self, id: &str) -> bool {
        let Some(node_id) = id.strip_prefix("destination:") else {
            return false;
        };
        let category = self.omero.store().borrow().get(node_id).and_then(|n| n.category);
        let Some(category) = category else {
            return true;
        };
        let request = self.omero.expand(category.as_str()).into_fetch();
        self.dispatch(Pane::Destination, request);
        if !self.omero.selection.contains(node_id) && !self.omero.click(node_id) {
            return true;
        }
        self.pane = Pane::Destination;
        self.omero.select_node(node_id);
        true
    }

    fn help_entries(&self) -> Vec<HelpEntry> {
        vec![
            HelpEntry::with_section("Upload", "Ctrl-h / Ctrl-l", "Files / destination pane"),
            HelpEntry::with_section("Upload", "l / Enter", "Expand folder"),
            HelpEntry::with_section("Upload", "h", "Collapse or go to parent"),
            HelpEntry::with_section("Upload", "x", "Select file or destination"),
            HelpEntry::with_section("Upload", "X / U", "Select / deselect all children"),
            HelpEntry::with_section("Upload", "s", "Queue the import"),
            HelpEntry::with_section("Upload", "R", "Reload the focused tree"),
        ]
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        let pending = self.key_state.leader_active || self.key_state.pending_key.is_some();
        if !pending {
            match key.code {
                KeyCode::Char('h') if key.modifiers == KeyModifiers::CONTROL => {
                    self.pane = Pane::Files;
                    return Action::None;
                }
                KeyCode::Char('l') if key.modifiers == KeyModifiers::CONTROL => {
                    self.pane = Pane::Destination;
                    return Action::None;
                }
                KeyCode::Tab => {
                    self.pane = match self.pane {
                        Pane::Files => Pane::Destination,
                        Pane::Destination => Pane::Files,
                    };
                    return Action::None;
                }
                KeyCode::Char('s') if key.modifiers.is_empty() => {
                    self.submit();
                    return Action::None;
                }
                _ => {}
            }
        }

        let action = process_normal_key(key, &mut self.key_state);
        if action.is_global() {
            return action;
        }
        self.handle_tree_action(action);
        Action::None
    }

    fn handle_leader_action(&mut self, key: char) -> Option<Action> {
        match key {
            'i' => self.submit(),
            'c' => {
                self.files.selection.clear();
                self.omero.selection.clear();
            }
            _ => return None,
        }
        Some(Action::None)
    }

    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd.trim() {
            "import" => self.submit(),
            "reload" => {
                self.reload(Pane::Files);
                self.reload(Pane::Destination);
            }
            _ => return false,
        }
        true
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        ui::render_upload(frame, area, &self.files, &self.omero, self.pane, self.importing);
    }

    fn tick(&mut self) {
        for event in self.executor.drain() {
            self.handle_event(event);
        }
        // The Run tool expands and reloads the same OMERO store.
        self.omero.sync();
    }

    fn status_message(&self) -> Option<String> {
        if let Some((text, _)) = &self.message {
            return Some(text.clone());
        }
        let files_error = self.files.store().borrow().last_error().map(str::to_string);
        files_error.or_else(|| self.omero.store().borrow().last_error().map(str::to_string))
    }

    fn reset_key_state(&mut self) {
        self.key_state.reset();
    }

    fn on_focus(&mut self) {
        self.load_roots();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomero_api::ClientConfig;
    use biomero_core::db::open_memory_db;
    use biomero_core::store::{ChildRecord, ROOT_ID};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn tool() -> UploadTool {
        let client = BiomeroClient::new(ClientConfig::default()).unwrap();
        let mut tool =
            UploadTool::new(open_memory_db().unwrap(), client, NodeStore::shared("OMERO")).unwrap();

        tool.files.store().borrow_mut().apply_fetch(
            ROOT_ID,
            Ok(vec![
                ChildRecord::folder("run1", "run1").with_category(NodeCategory::Files),
                ChildRecord::leaf("plate.tif", "plate.tif").with_category(NodeCategory::Files),
            ]),
        );
        tool.omero.store().borrow_mut().apply_fetch(
            ROOT_ID,
            Ok(vec![
                ChildRecord::folder("datasets", "Datasets")
                    .with_category(NodeCategory::Datasets)
                    .with_children(vec![
                        ChildRecord::leaf("dataset-7", "Raw").with_category(NodeCategory::Datasets),
                    ]),
                ChildRecord::folder("screens", "Screens")
                    .with_category(NodeCategory::Screens)
                    .with_children(vec![]),
            ]),
        );
        tool.files.rebuild_flat_view();
        tool.omero.rebuild_flat_view();
        tool
    }

    #[test]
    fn test_submit_requires_files_and_destination() {
        let mut tool = tool();
        tool.handle_key(key(KeyCode::Char('s')));
        assert_eq!(tool.status_message().as_deref(), Some("No items selected"));

        // second entry is plate.tif
        tool.handle_key(key(KeyCode::Char('j')));
        tool.handle_key(key(KeyCode::Char('x')));
        tool.handle_key(key(KeyCode::Char('s')));
        assert_eq!(tool.status_message().as_deref(), Some("No destinations selected"));
        assert!(!tool.importing);
    }

    #[test]
    fn test_destination_is_single_dataset_or_screen() {
        let mut tool = tool();
        tool.handle_key(KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL));
        assert_eq!(tool.pane, Pane::Destination);

        // the Datasets container is not a destination
        tool.handle_key(key(KeyCode::Char('x')));
        assert!(tool.omero.selection.is_empty());
        assert_eq!(
            tool.status_message().as_deref(),
            Some("Pick a dataset or screen as destination")
        );

        tool.handle_key(key(KeyCode::Char('l')));
        tool.handle_key(key(KeyCode::Char('j')));
        tool.handle_key(key(KeyCode::Char('x')));
        assert_eq!(tool.omero.selection.ids(), ["dataset-7".to_string()]);

        tool.files.click("plate.tif");
        tool.files.click("run1");
        let request = tool.build_request().unwrap();
        assert_eq!(request.upload.selected_local, ["plate.tif", "run1"]);
        assert_eq!(
            request.upload.selected_omero,
            vec![("datasets".to_string(), "7".to_string())]
        );
    }

    #[test]
    fn test_screen_destination_uses_plural_kind() {
        let mut tool = tool();
        tool.omero.store().borrow_mut().merge(
            "screens",
            vec![ChildRecord::leaf("screen-3", "HCS run").with_category(NodeCategory::Screens)],
        );
        tool.omero.rebuild_flat_view();
        tool.files.click("plate.tif");
        assert!(tool.omero.click("screen-3"));

        let request = tool.build_request().unwrap();
        assert_eq!(
            request.upload.selected_omero,
            vec![("screens".to_string(), "3".to_string())]
        );
    }

    #[test]
    fn test_import_result_is_recorded() {
        let mut tool = tool();
        tool.files.click("plate.tif");
        tool.omero.click("dataset-7");
        tool.importing = true;

        tool.handle_event(ApiEvent::ImportQueued(Ok("Queued 1 import".into())));
        assert!(!tool.importing);
        assert!(tool.files.selection.is_empty());
        assert_eq!(tool.status_message().as_deref(), Some("Queued 1 import"));

        let rows = history::list_submissions(&tool.conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, SubmissionKind::Import);
        assert_eq!(rows[0].target, "Raw");
        assert_eq!(rows[0].name, "1 item(s)");
    }

    #[test]
    fn test_failed_import_keeps_selection() {
        let mut tool = tool();
        tool.files.click("plate.tif");
        tool.handle_event(ApiEvent::ImportQueued(Err("HTTP 500".into())));
        assert_eq!(tool.files.selection.len(), 1);
        let rows = history::list_submissions(&tool.conn).unwrap();
        assert_eq!(rows[0].status, SubmissionStatus::Failed);
    }

    #[test]
    fn test_telescope_destinations() {
        let mut tool = tool();
        let items = tool.telescope_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "destination:dataset-7");

        assert!(tool.handle_telescope_selection("destination:dataset-7"));
        assert_eq!(tool.pane, Pane::Destination);
        assert!(tool.omero.selection.contains("dataset-7"));
        assert_eq!(tool.omero.selected_node_id().as_deref(), Some("dataset-7"));
    }
}
