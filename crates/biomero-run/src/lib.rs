pub mod form;
pub mod images;
pub mod ui;
pub mod wizard;

use std::collections::HashSet;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{Frame, layout::Rect, widgets::ListState};
use rusqlite::Connection;
use tracing::{info, warn};

use biomero_api::executor::{ApiCommand, ApiEvent, ApiExecutor, DataSource};
use biomero_api::workflows::{Workflow, filter_workflows};
use biomero_api::BiomeroClient;
use biomero_core::{
    help_popup::HelpEntry,
    history::{self, SubmissionKind, SubmissionStatus},
    keybinds::{Action, InputMode, KeyState, LineInput, process_normal_key},
    selection::SelectionMode,
    store::{NodeCategory, NodeId, SharedStore, TreeNode},
    telescope::TelescopeItem,
    tool::Tool,
    tree_view::{FetchRequest, TreeView},
    which_key::WhichKeyEntry,
};

use images::ImagePicker;
use wizard::{Wizard, WizardState, WizardStep};

const HALF_PAGE: usize = 20;

/// What the Insert-mode buffer is editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditContext {
    /// Catalogue search box.
    Search,
    /// Filename filter of the image list.
    ImageFilter,
    /// Text of the parameter under the cursor.
    Param,
    /// Output dataset name or rename pattern.
    OutputText,
}

/// Which pane of the Input step has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFocus {
    Datasets,
    Images,
}

fn is_dataset(node: &TreeNode) -> bool {
    !node.is_folder && node.category == Some(NodeCategory::Datasets)
}

/// Browse the BIOMERO workflow catalogue and submit workflow runs.
pub struct RunTool {
    executor: ApiExecutor,
    conn: Connection,
    workflows: Vec<Workflow>,
    filtered: Vec<usize>,
    list_state: ListState,
    search: LineInput,
    loading: bool,
    loaded: bool,
    wizard: Option<Wizard>,
    datasets: TreeView,
    input_focus: InputFocus,
    /// Datasets whose images were requested since the last store reset.
    images_requested: HashSet<NodeId>,
    /// Store generation `images_requested` belongs to.
    images_generation: u64,
    edit: Option<EditContext>,
    mode: InputMode,
    key_state: KeyState,
    message: Option<(String, bool)>,
}

impl RunTool {
    pub fn new(conn: Connection, client: BiomeroClient, store: SharedStore) -> anyhow::Result<Self> {
        history::init_db(&conn)?;
        Ok(Self {
            executor: ApiExecutor::spawn(client),
            conn,
            workflows: Vec::new(),
            filtered: Vec::new(),
            list_state: ListState::default(),
            search: LineInput::default(),
            loading: false,
            loaded: false,
            wizard: None,
            datasets: TreeView::new(store, SelectionMode::Multi).with_selectable(is_dataset),
            input_focus: InputFocus::Datasets,
            images_requested: HashSet::new(),
            images_generation: 0,
            edit: None,
            mode: InputMode::Normal,
            key_state: KeyState::default(),
            message: None,
        })
    }

    fn notify(&mut self, message: impl Into<String>, is_error: bool) {
        self.message = Some((message.into(), is_error));
    }

    // ── Catalogue ────────────────────────────────────────────────────

    fn load_workflows(&mut self) {
        if self.loading {
            return;
        }
        match self.executor.send(ApiCommand::LoadWorkflows) {
            Ok(()) => {
                self.loading = true;
                self.notify("Loading workflows...", false);
            }
            Err(_) => self.notify("Background worker stopped", true),
        }
    }

    fn apply_search(&mut self) {
        self.filtered = filter_workflows(&self.workflows, self.search.text.trim());
        if self.filtered.is_empty() {
            self.list_state.select(None);
        } else {
            let sel = self.list_state.selected().unwrap_or(0);
            self.list_state
                .select(Some(sel.min(self.filtered.len() - 1)));
        }
    }

    fn selected_workflow(&self) -> Option<&Workflow> {
        let sel = self.list_state.selected()?;
        self.workflows.get(*self.filtered.get(sel)?)
    }

    fn move_selection(&mut self, delta: isize) {
        if self.filtered.is_empty() {
            return;
        }
        let sel = self.list_state.selected().unwrap_or(0) as isize;
        let last = self.filtered.len() as isize - 1;
        self.list_state.select(Some((sel + delta).clamp(0, last) as usize));
    }

    fn open_wizard(&mut self) {
        let Some(workflow) = self.selected_workflow().cloned() else {
            return;
        };
        info!(workflow = %workflow.name, "opening workflow wizard");
        self.wizard = Some(Wizard::new(workflow));
        self.input_focus = InputFocus::Datasets;
        self.datasets.selection.clear();
        let request = self.datasets.load_root();
        self.dispatch(DataSource::Hierarchy, request);
        self.datasets.rebuild_flat_view();
    }

    fn close_wizard(&mut self) {
        if self
            .wizard
            .as_ref()
            .is_some_and(|w| w.state == WizardState::Submitting)
        {
            self.notify("Wait for the submission to finish", true);
            return;
        }
        self.wizard = None;
    }

    // ── Background work ──────────────────────────────────────────────

    fn dispatch(&mut self, source: DataSource, request: Option<FetchRequest>) {
        let Some(request) = request else {
            return;
        };
        let id = request.node.id.clone();
        if let Err(message) = self.executor.fetch(source, request) {
            self.datasets
                .store()
                .borrow_mut()
                .apply_fetch(&id, Err(message));
        }
    }

    /// Follow the dataset selection: request images of newly chosen
    /// datasets and rebuild the image list.
    fn sync_datasets(&mut self) {
        let Some(wizard) = self.wizard.as_mut() else {
            return;
        };
        wizard.datasets = self.datasets.selection.ids().to_vec();
        self.request_images();
        self.refresh_images();
    }

    /// Fetch images of every chosen dataset not yet requested in the
    /// current store generation. A reset (ours or Upload's) empties the
    /// store, so everything is requested again.
    fn request_images(&mut self) {
        let Some(wizard) = self.wizard.as_ref() else {
            return;
        };
        let store = self.datasets.store().clone();
        let generation = store.borrow().generation();
        if generation != self.images_generation {
            self.images_requested.clear();
            self.images_generation = generation;
        }

        let mut requests = Vec::new();
        for dataset in &wizard.datasets {
            if self.images_requested.contains(dataset) {
                continue;
            }
            // Unknown until the hierarchy is back, retried on the next store change
            if let Some(node) = store.borrow_mut().begin_refetch(dataset) {
                self.images_requested.insert(dataset.clone());
                requests.push(FetchRequest { node, generation });
            }
        }
        for request in requests {
            self.dispatch(DataSource::DatasetImages, Some(request));
        }
    }

    fn refresh_images(&mut self) {
        let Some(wizard) = self.wizard.as_mut() else {
            return;
        };
        let images = ImagePicker::collect_images(&self.datasets.store().borrow(), &wizard.datasets);
        let fresh = wizard.images.set_images(images);
        if !fresh.is_empty() {
            if let Err(err) = self.executor.send(ApiCommand::LoadThumbnails(fresh)) {
                warn!(error = %err, "could not request thumbnails");
                self.notify("Background worker stopped", true);
            }
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
                let failed = result.is_err();
                let applied = self
                    .datasets
                    .store()
                    .borrow_mut()
                    .complete_fetch(generation, &parent_id, result);
                if applied && failed && source == DataSource::DatasetImages {
                    self.images_requested.remove(&parent_id);
                }
                self.datasets.rebuild_flat_view();
                if source == DataSource::DatasetImages {
                    self.refresh_images();
                }
            }
            ApiEvent::Workflows(result) => {
                self.loading = false;
                match result {
                    Ok(workflows) => {
                        let count = workflows.len();
                        self.workflows = workflows;
                        self.loaded = true;
                        self.apply_search();
                        self.notify(format!("Loaded {count} workflows"), false);
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to load workflows");
                        self.notify(format!("Error loading workflows: {err}"), true);
                    }
                }
            }
            ApiEvent::WorkflowSubmitted { workflow, result } => {
                let target = self
                    .wizard
                    .as_ref()
                    .map(|w| format!("{} images", w.images.selected_count()))
                    .unwrap_or_default();
                let (status, text) = match &result {
                    Ok(msg) => (SubmissionStatus::Submitted, msg.clone()),
                    Err(err) => (SubmissionStatus::Failed, err.clone()),
                };
                match status {
                    SubmissionStatus::Submitted => info!(%workflow, "workflow submitted"),
                    SubmissionStatus::Failed => warn!(%workflow, error = %text, "workflow submission failed"),
                }
                if let Err(err) = history::record_submission(
                    &self.conn,
                    SubmissionKind::Workflow,
                    &workflow,
                    &target,
                    status,
                    &text,
                ) {
                    warn!(error = %err, "failed to record submission");
                }
                self.notify(text, status == SubmissionStatus::Failed);
                if let Some(wizard) = self.wizard.as_mut() {
                    wizard.finish(result);
                }
            }
            ApiEvent::Thumbnails(Ok(ids)) => {
                if let Some(wizard) = self.wizard.as_mut() {
                    wizard.images.mark_thumbnails(ids);
                }
            }
            ApiEvent::Thumbnails(Err(err)) => {
                warn!(error = %err, "failed to load thumbnails");
            }
            _ => {}
        }
    }

    fn submit(&mut self) {
        let Some(wizard) = self.wizard.as_mut() else {
            return;
        };
        match wizard.begin_submit() {
            Ok(request) => {
                info!(workflow = %request.workflow_name, "queueing workflow run");
                if self.executor.send(ApiCommand::RunWorkflow(request)).is_err() {
                    wizard.finish(Err("Background worker stopped".to_string()));
                }
            }
            Err(hint) => self.notify(hint, true),
        }
    }

    // ── Insert mode ──────────────────────────────────────────────────

    fn start_edit(&mut self, context: EditContext) -> Action {
        self.edit = Some(context);
        self.mode = InputMode::Insert;
        Action::SetMode(InputMode::Insert)
    }

    fn edit_buffer(&mut self) -> Option<&mut LineInput> {
        match self.edit? {
            EditContext::Search => Some(&mut self.search),
            EditContext::ImageFilter => self.wizard.as_mut().map(|w| &mut w.images.filter),
            EditContext::Param => self
                .wizard
                .as_mut()
                .and_then(|w| w.form.current_mut())
                .filter(|f| !f.is_boolean())
                .map(|f| &mut f.text),
            EditContext::OutputText => self
                .wizard
                .as_mut()
                .and_then(|w| w.output.current_text_mut()),
        }
    }

    fn after_edit(&mut self) {
        match self.edit {
            Some(EditContext::Search) => self.apply_search(),
            Some(EditContext::ImageFilter) => {
                if let Some(wizard) = self.wizard.as_mut() {
                    wizard.images.apply_filter();
                }
            }
            _ => {}
        }
    }

    fn handle_insert_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => {
                self.edit = None;
                self.mode = InputMode::Normal;
                Action::SetMode(InputMode::Normal)
            }
            _ => {
                let changed = self
                    .edit_buffer()
                    .map(|buf| buf.handle_key(key))
                    .unwrap_or(false);
                if changed {
                    self.after_edit();
                }
                Action::None
            }
        }
    }

    // ── Normal mode ──────────────────────────────────────────────────

    fn handle_catalogue_key(&mut self, key: KeyEvent) -> Action {
        let action = process_normal_key(key, &mut self.key_state);
        match action {
            Action::MoveDown(n) => self.move_selection(n as isize),
            Action::MoveUp(n) => self.move_selection(-(n as isize)),
            Action::GotoTop => self.move_selection(isize::MIN / 2),
            Action::GotoBottom => self.move_selection(isize::MAX / 2),
            Action::HalfPageDown => self.move_selection(HALF_PAGE as isize / 2),
            Action::HalfPageUp => self.move_selection(-(HALF_PAGE as isize) / 2),
            Action::Confirm | Action::Expand => self.open_wizard(),
            Action::Search | Action::SetMode(InputMode::Insert) => {
                return self.start_edit(EditContext::Search);
            }
            Action::Refresh => self.load_workflows(),
            _ if action.is_global() => return action,
            _ => {}
        }
        Action::None
    }

    fn sequence_pending(&self) -> bool {
        self.key_state.leader_active || self.key_state.pending_key.is_some()
    }

    fn handle_wizard_key(&mut self, key: KeyEvent) -> Action {
        if !self.sequence_pending() {
            if let Some(action) = self.handle_wizard_shortcut(key) {
                return action;
            }
        }
        let Some(state) = self.wizard.as_ref().map(|w| w.state.clone()) else {
            return Action::None;
        };
        let action = process_normal_key(key, &mut self.key_state);
        if action.is_global() {
            return action;
        }
        match state {
            WizardState::Editing(WizardStep::Input) => match self.input_focus {
                InputFocus::Datasets => self.handle_dataset_action(action),
                InputFocus::Images => self.handle_image_action(action),
            },
            WizardState::Editing(WizardStep::Parameters) => self.handle_param_action(action),
            WizardState::Editing(WizardStep::Output) => self.handle_output_action(action),
            WizardState::Editing(WizardStep::Review) => {
                if action == Action::Confirm {
                    self.submit();
                }
                Action::None
            }
            WizardState::Submitting => Action::None,
            WizardState::Done(_) => {
                if action == Action::Confirm {
                    self.close_wizard();
                }
                Action::None
            }
            WizardState::Failed(_) => {
                if action == Action::Confirm {
                    if let Some(wizard) = self.wizard.as_mut() {
                        wizard.back();
                    }
                }
                Action::None
            }
        }
    }

    /// Wizard keys that bypass the normal-mode key table.
    fn handle_wizard_shortcut(&mut self, key: KeyEvent) -> Option<Action> {
        let step = self.wizard.as_ref()?.step();
        match key.code {
            KeyCode::Esc => self.close_wizard(),
            KeyCode::Tab | KeyCode::Char('n') if key.modifiers.is_empty() => {
                if let Some(wizard) = self.wizard.as_mut() {
                    if !wizard.next() {
                        if let Some(hint) = wizard.hint.clone() {
                            self.notify(hint, true);
                        }
                    }
                }
            }
            KeyCode::BackTab | KeyCode::Char('p') => {
                if let Some(wizard) = self.wizard.as_mut() {
                    wizard.back();
                }
            }
            KeyCode::Char('s') if step == Some(WizardStep::Review) => self.submit(),
            KeyCode::Char('h') | KeyCode::Char('l')
                if key.modifiers == KeyModifiers::CONTROL && step == Some(WizardStep::Input) =>
            {
                self.input_focus = if key.code == KeyCode::Char('h') {
                    InputFocus::Datasets
                } else {
                    InputFocus::Images
                };
            }
            KeyCode::Char('f')
                if step == Some(WizardStep::Input) && self.input_focus == InputFocus::Images =>
            {
                if let Some(wizard) = self.wizard.as_mut() {
                    wizard.images.select_filtered();
                }
            }
            KeyCode::Char('F')
                if step == Some(WizardStep::Input) && self.input_focus == InputFocus::Images =>
            {
                if let Some(wizard) = self.wizard.as_mut() {
                    wizard.images.deselect_filtered();
                }
            }
            _ => return None,
        }
        Some(Action::None)
    }

    fn handle_dataset_action(&mut self, action: Action) -> Action {
        match action {
            Action::MoveDown(_) => self.datasets.move_down(),
            Action::MoveUp(_) => self.datasets.move_up(),
            Action::GotoTop => self.datasets.goto_top(),
            Action::GotoBottom => self.datasets.goto_bottom(),
            Action::HalfPageDown => self.datasets.half_page_down(HALF_PAGE),
            Action::HalfPageUp => self.datasets.half_page_up(HALF_PAGE),
            Action::Expand => {
                let request = self.datasets.expand_selected();
                self.dispatch(DataSource::Hierarchy, request);
            }
            Action::Collapse => self.datasets.collapse_or_parent(),
            Action::Confirm => {
                let is_folder = self.datasets.selected_entry().is_some_and(|e| e.is_folder);
                if is_folder {
                    let request = self.datasets.toggle_selected();
                    self.dispatch(DataSource::Hierarchy, request);
                } else if self.datasets.click_selected() {
                    self.sync_datasets();
                }
            }
            Action::ToggleSelect => {
                if self.datasets.click_selected() {
                    self.sync_datasets();
                }
            }
            Action::SelectAll | Action::DeselectAll => {
                if let Some(id) = self.datasets.selected_node_id() {
                    if action == Action::SelectAll {
                        self.datasets.select_all_children(&id);
                    } else {
                        self.datasets.deselect_all_children(&id);
                    }
                    self.sync_datasets();
                }
            }
            Action::Refresh => {
                self.datasets.selection.clear();
                let request = self.datasets.reload();
                self.dispatch(DataSource::Hierarchy, request);
                self.sync_datasets();
            }
            _ => {}
        }
        Action::None
    }

    fn handle_image_action(&mut self, action: Action) -> Action {
        if action == Action::Search {
            return self.start_edit(EditContext::ImageFilter);
        }
        let Some(wizard) = self.wizard.as_mut() else {
            return Action::None;
        };
        let images = &mut wizard.images;
        match action {
            Action::MoveDown(_) => images.move_down(),
            Action::MoveUp(_) => images.move_up(),
            Action::GotoTop => images.cursor = 0,
            Action::GotoBottom => images.cursor = images.visible_len().saturating_sub(1),
            Action::Confirm | Action::ToggleSelect => images.toggle_current(),
            Action::SelectAll => images.select_all(),
            Action::DeselectAll => images.deselect_all(),
            _ => {}
        }
        Action::None
    }

    fn handle_param_action(&mut self, action: Action) -> Action {
        let Some(wizard) = self.wizard.as_mut() else {
            return Action::None;
        };
        match action {
            Action::MoveDown(_) => wizard.form.move_down(),
            Action::MoveUp(_) => wizard.form.move_up(),
            Action::GotoTop => wizard.form.cursor = 0,
            Action::GotoBottom => wizard.form.cursor = wizard.form.fields.len().saturating_sub(1),
            Action::Confirm | Action::ToggleSelect | Action::Edit | Action::SetMode(InputMode::Insert) => {
                let editable = wizard.form.current().is_some_and(|f| !f.is_boolean());
                if editable {
                    return self.start_edit(EditContext::Param);
                }
                wizard.form.toggle_current();
            }
            _ => {}
        }
        Action::None
    }

    fn handle_output_action(&mut self, action: Action) -> Action {
        let Some(wizard) = self.wizard.as_mut() else {
            return Action::None;
        };
        match action {
            Action::MoveDown(_) => wizard.output.move_down(),
            Action::MoveUp(_) => wizard.output.move_up(),
            Action::GotoTop => wizard.output.cursor = 0,
            Action::GotoBottom => wizard.output.cursor = wizard::OutputField::ALL.len() - 1,
            Action::Confirm | Action::ToggleSelect | Action::Edit | Action::SetMode(InputMode::Insert) => {
                if wizard.output.current_text_mut().is_some() {
                    return self.start_edit(EditContext::OutputText);
                }
                if !wizard.output.toggle_current() {
                    self.notify("Name an output dataset first", true);
                }
            }
            _ => {}
        }
        Action::None
    }
}

impl Tool for RunTool {
    fn name(&self) -> &str {
        "Run"
    }

    fn description(&self) -> &str {
        "Browse and run BIOMERO workflows"
    }

    fn mode(&self) -> InputMode {
        self.mode
    }

    fn init_db(&self, conn: &Connection) -> anyhow::Result<()> {
        history::init_db(conn)
    }

    fn which_key_entries(&self) -> Vec<WhichKeyEntry> {
        vec![WhichKeyEntry::action("w", "Reload workflows")]
    }

    fn telescope_items(&self) -> Vec<TelescopeItem> {
        self.workflows
            .iter()
            .map(|w| TelescopeItem::new(&w.name, &w.description, format!("workflow:{}", w.name)))
            .collect()
    }

    fn handle_telescope_selection(&mut self, id: &str) -> bool {
        let Some(name) = id.strip_prefix("workflow:") else {
            return false;
        };
        let Some(index) = self.workflows.iter().position(|w| w.name == name) else {
            return false;
        };
        self.search.clear();
        self.apply_search();
        if let Some(pos) = self.filtered.iter().position(|&i| i == index) {
            self.list_state.select(Some(pos));
        }
        if self.wizard.is_none() {
            self.open_wizard();
        }
        true
    }

    fn help_entries(&self) -> Vec<HelpEntry> {
        vec![
            HelpEntry::with_section("Catalogue", "j / k", "Move between workflows"),
            HelpEntry::with_section("Catalogue", "/", "Search name or description"),
            HelpEntry::with_section("Catalogue", "Enter", "Start the workflow wizard"),
            HelpEntry::with_section("Catalogue", "R", "Reload workflows"),
            HelpEntry::with_section("Wizard", "Tab / n", "Next step"),
            HelpEntry::with_section("Wizard", "S-Tab / p", "Previous step"),
            HelpEntry::with_section("Wizard", "Esc", "Close the wizard"),
            HelpEntry::with_section("Wizard", "s / Enter", "Submit (Review step)"),
            HelpEntry::with_section("Input", "Ctrl-h / Ctrl-l", "Datasets / images pane"),
            HelpEntry::with_section("Input", "h / l", "Collapse / expand"),
            HelpEntry::with_section("Input", "x", "Toggle dataset or image"),
            HelpEntry::with_section("Input", "X / U", "Select / deselect all"),
            HelpEntry::with_section("Input", "f / F", "Select / deselect filtered images"),
            HelpEntry::with_section("Input", "/", "Filter image names"),
            HelpEntry::with_section("Form", "Enter / e", "Edit field or toggle switch"),
        ]
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        match self.mode {
            InputMode::Insert => self.handle_insert_key(key),
            InputMode::Normal => {
                if self.wizard.is_some() {
                    self.handle_wizard_key(key)
                } else {
                    self.handle_catalogue_key(key)
                }
            }
            InputMode::Command => Action::None,
        }
    }

    fn handle_leader_action(&mut self, key: char) -> Option<Action> {
        match key {
            'w' => {
                self.load_workflows();
                Some(Action::None)
            }
            _ => None,
        }
    }

    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd.trim() {
            "reload" => {
                self.load_workflows();
                true
            }
            _ => false,
        }
    }

    fn handle_paste(&mut self, text: &str) -> Action {
        if self.mode == InputMode::Insert {
            if let Some(buf) = self.edit_buffer() {
                buf.insert_str(text);
                self.after_edit();
            }
        }
        Action::None
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        match &self.wizard {
            Some(wizard) => ui::render_wizard(
                frame,
                area,
                wizard,
                &self.datasets,
                self.input_focus,
                self.mode == InputMode::Insert,
            ),
            None => {
                let visible: Vec<&Workflow> = self
                    .filtered
                    .iter()
                    .filter_map(|&i| self.workflows.get(i))
                    .collect();
                let mut state = self.list_state.clone();
                ui::render_catalogue(
                    frame,
                    area,
                    &visible,
                    &mut state,
                    &self.search,
                    self.edit == Some(EditContext::Search),
                    self.loading,
                );
            }
        }
    }

    fn tick(&mut self) {
        for event in self.executor.drain() {
            self.handle_event(event);
        }
        // The store is shared with the Upload tool.
        if self.datasets.sync() && self.wizard.is_some() {
            self.request_images();
            self.refresh_images();
        }
    }

    fn status_message(&self) -> Option<String> {
        self.message.as_ref().map(|(text, _)| text.clone())
    }

    fn reset_key_state(&mut self) {
        self.key_state.reset();
    }

    fn on_focus(&mut self) {
        if !self.loaded {
            self.load_workflows();
        }
        self.datasets.rebuild_flat_view();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomero_api::ClientConfig;
    use biomero_api::payload::WorkflowMetadata;
    use biomero_core::db::open_memory_db;
    use biomero_core::store::{ChildRecord, NodeStore, ROOT_ID};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn tool() -> RunTool {
        let client = BiomeroClient::new(ClientConfig::default()).unwrap();
        let mut tool = RunTool::new(open_memory_db().unwrap(), client, NodeStore::shared("OMERO")).unwrap();
        let workflows = ["cellpose", "stardist", "cellexpansion"]
            .into_iter()
            .map(|name| Workflow::from_parts(name.to_string(), WorkflowMetadata::default(), None))
            .collect();
        tool.handle_event(ApiEvent::Workflows(Ok(workflows)));
        tool
    }

    fn seed_hierarchy(tool: &mut RunTool) {
        let store = tool.datasets.store().clone();
        let mut store = store.borrow_mut();
        store.apply_fetch(
            ROOT_ID,
            Ok(vec![
                ChildRecord::folder("datasets", "Datasets")
                    .with_category(NodeCategory::Datasets)
                    .with_children(vec![
                        ChildRecord::leaf("dataset-1", "DS1").with_category(NodeCategory::Datasets),
                    ]),
            ]),
        );
    }

    #[test]
    fn test_live_search() {
        let mut tool = tool();
        assert_eq!(tool.filtered.len(), 3);
        assert_eq!(tool.handle_key(key(KeyCode::Char('/'))), Action::SetMode(InputMode::Insert));
        for c in "cell".chars() {
            tool.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(tool.filtered, vec![0, 2]);
        tool.handle_key(key(KeyCode::Backspace));
        tool.handle_key(key(KeyCode::Backspace));
        tool.handle_key(key(KeyCode::Backspace));
        tool.handle_key(key(KeyCode::Backspace));
        assert_eq!(tool.filtered.len(), 3);
        assert_eq!(tool.handle_key(key(KeyCode::Esc)), Action::SetMode(InputMode::Normal));
    }

    #[test]
    fn test_globals_bubble_up() {
        let mut tool = tool();
        assert_eq!(tool.handle_key(key(KeyCode::Char('?'))), Action::Help);
        assert_eq!(tool.handle_key(key(KeyCode::Char('q'))), Action::Quit);
    }

    #[test]
    fn test_wizard_input_flow() {
        let mut tool = tool();
        tool.handle_key(key(KeyCode::Enter));
        assert!(tool.wizard.is_some());
        seed_hierarchy(&mut tool);
        tool.datasets.rebuild_flat_view();

        // Datasets container, expand it and select DS1
        tool.handle_key(key(KeyCode::Char('l')));
        tool.handle_key(key(KeyCode::Char('j')));
        tool.handle_key(key(KeyCode::Char('x')));
        assert_eq!(tool.wizard.as_ref().unwrap().datasets, vec!["dataset-1".to_string()]);
        assert!(tool.datasets.store().borrow().is_pending("dataset-1"));

        tool.handle_event(ApiEvent::Children {
            source: DataSource::DatasetImages,
            parent_id: "dataset-1".into(),
            generation: 0,
            result: Ok(vec![
                ChildRecord::leaf("image-1", "a.tif").with_category(NodeCategory::Images),
                ChildRecord::leaf("image-2", "b.tif").with_category(NodeCategory::Images),
            ]),
        });
        let wizard = tool.wizard.as_ref().unwrap();
        assert_eq!(wizard.images.selected_ids(), vec![1, 2]);

        tool.handle_key(KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL));
        assert_eq!(tool.input_focus, InputFocus::Images);
        tool.handle_key(key(KeyCode::Char('U')));
        tool.handle_key(key(KeyCode::Tab));
        assert_eq!(tool.wizard.as_ref().unwrap().step(), Some(WizardStep::Input));
        assert_eq!(tool.status_message().as_deref(), Some("Select at least one image"));

        tool.handle_key(key(KeyCode::Char('x')));
        tool.handle_key(key(KeyCode::Tab));
        assert_eq!(tool.wizard.as_ref().unwrap().step(), Some(WizardStep::Parameters));
    }

    #[test]
    fn test_failed_image_fetch_can_be_retried() {
        let mut tool = tool();
        tool.handle_key(key(KeyCode::Enter));
        seed_hierarchy(&mut tool);
        tool.datasets.rebuild_flat_view();
        tool.handle_key(key(KeyCode::Char('l')));
        tool.handle_key(key(KeyCode::Char('j')));
        tool.handle_key(key(KeyCode::Char('x')));

        tool.handle_event(ApiEvent::Children {
            source: DataSource::DatasetImages,
            parent_id: "dataset-1".into(),
            generation: 0,
            result: Err("timeout".into()),
        });
        assert!(!tool.images_requested.contains("dataset-1"));
        assert_eq!(
            tool.datasets.store().borrow().last_error(),
            Some("Error fetching DS1: timeout")
        );
    }

    #[test]
    fn test_images_are_requested_again_after_shared_reset() {
        let mut tool = tool();
        tool.handle_key(key(KeyCode::Enter));
        seed_hierarchy(&mut tool);
        tool.datasets.rebuild_flat_view();
        tool.handle_key(key(KeyCode::Char('l')));
        tool.handle_key(key(KeyCode::Char('j')));
        tool.handle_key(key(KeyCode::Char('x')));
        tool.handle_event(ApiEvent::Children {
            source: DataSource::DatasetImages,
            parent_id: "dataset-1".into(),
            generation: 0,
            result: Ok(vec![ChildRecord::leaf("image-1", "a.tif").with_category(NodeCategory::Images)]),
        });
        assert!(tool.datasets.store().borrow().contains("image-1"));

        // Upload reloads the shared tree, then the hierarchy comes back
        tool.datasets.store().borrow_mut().reset();
        seed_hierarchy(&mut tool);
        tool.tick();

        let store = tool.datasets.store().clone();
        assert!(store.borrow().is_pending("dataset-1"));
        assert!(tool.images_requested.contains("dataset-1"));
        assert!(tool.wizard.as_ref().unwrap().images.selected_ids().is_empty());

        // A late answer from before the reset does not refill the store
        tool.handle_event(ApiEvent::Children {
            source: DataSource::DatasetImages,
            parent_id: "dataset-1".into(),
            generation: 0,
            result: Ok(vec![ChildRecord::leaf("image-9", "old.tif").with_category(NodeCategory::Images)]),
        });
        assert!(!store.borrow().contains("image-9"));
        assert!(store.borrow().is_pending("dataset-1"));

        let generation = store.borrow().generation();
        tool.handle_event(ApiEvent::Children {
            source: DataSource::DatasetImages,
            parent_id: "dataset-1".into(),
            generation,
            result: Ok(vec![ChildRecord::leaf("image-2", "b.tif").with_category(NodeCategory::Images)]),
        });
        assert!(store.borrow().contains("image-2"));
        assert!(!store.borrow().is_pending("dataset-1"));
    }

    #[test]
    fn test_thumbnail_request_failure_is_reported() {
        let mut tool = tool();
        tool.handle_key(key(KeyCode::Enter));
        seed_hierarchy(&mut tool);
        tool.datasets.rebuild_flat_view();
        tool.handle_key(key(KeyCode::Char('l')));
        tool.handle_key(key(KeyCode::Char('j')));
        tool.handle_key(key(KeyCode::Char('x')));

        tool.executor = ApiExecutor::disconnected();
        tool.handle_event(ApiEvent::Children {
            source: DataSource::DatasetImages,
            parent_id: "dataset-1".into(),
            generation: 0,
            result: Ok(vec![ChildRecord::leaf("image-1", "a.tif").with_category(NodeCategory::Images)]),
        });
        assert_eq!(tool.status_message().as_deref(), Some("Background worker stopped"));
    }

    #[test]
    fn test_submission_is_recorded() {
        let mut tool = tool();
        tool.handle_key(key(KeyCode::Enter));
        tool.wizard.as_mut().unwrap().state = WizardState::Submitting;
        tool.handle_event(ApiEvent::WorkflowSubmitted {
            workflow: "cellpose".into(),
            result: Ok("Script started".into()),
        });
        assert_eq!(
            tool.wizard.as_ref().unwrap().state,
            WizardState::Done("Script started".into())
        );
        let rows = history::list_submissions(&tool.conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "cellpose");
        assert_eq!(rows[0].status, SubmissionStatus::Submitted);

        tool.handle_key(key(KeyCode::Enter));
        assert!(tool.wizard.is_none());
    }

    #[test]
    fn test_telescope_opens_workflow() {
        let mut tool = tool();
        assert!(!tool.handle_telescope_selection("tool:Run"));
        assert!(tool.handle_telescope_selection("workflow:stardist"));
        assert_eq!(tool.wizard.as_ref().unwrap().workflow.name, "stardist");
    }
}
