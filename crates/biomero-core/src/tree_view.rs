use std::collections::HashSet;

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use unicode_width::UnicodeWidthStr;

use crate::selection::{Selection, SelectionMode};
use crate::store::{NodeId, NodeStore, ROOT_ID, SharedStore, TreeNode};

// ── FlatEntry ────────────────────────────────────────────────────────

/// One visible line of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEntry {
    pub node_id: NodeId,
    pub depth: usize,
    pub name: String,
    pub is_folder: bool,
    pub is_expanded: bool,
    pub is_loading: bool,
    pub has_children: bool,
    /// For each depth level 0..depth, whether a vertical guide line (│) should
    /// be drawn. True when the ancestor at that depth has more siblings below.
    pub guide_depths: Vec<bool>,
}

// ── Expand results ───────────────────────────────────────────────────

/// A fetch the owning tool must dispatch to its adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub node: TreeNode,
    /// Store generation the fetch was started under.
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// Children were already known; the folder is simply open now.
    Expanded,
    /// Children are unknown. The node is marked pending and the request
    /// must be sent to the adapter.
    Fetch(FetchRequest),
    /// A fetch for this folder is already in flight.
    Joined,
    NotAFolder,
    Missing,
}

impl ExpandOutcome {
    pub fn into_fetch(self) -> Option<FetchRequest> {
        match self {
            Self::Fetch(req) => Some(req),
            _ => None,
        }
    }
}

// ── TreeView ─────────────────────────────────────────────────────────

/// View state over a [`NodeStore`]: which folders are open, the cursor,
/// and the current selection. The flat list is derived from the store and
/// rebuilt after every change.
pub struct TreeView {
    store: SharedStore,
    expanded: HashSet<NodeId>,
    pub flat_view: Vec<FlatEntry>,
    pub cursor: usize,
    pub selection: Selection,
    selectable: fn(&TreeNode) -> bool,
    /// Store revision the flat list was built from.
    built_at: u64,
}

impl TreeView {
    pub fn new(store: SharedStore, mode: SelectionMode) -> Self {
        let mut expanded = HashSet::new();
        expanded.insert(ROOT_ID.to_string());
        let mut view = Self {
            store,
            expanded,
            flat_view: Vec::new(),
            cursor: 0,
            selection: Selection::new(mode),
            selectable: |_| true,
            built_at: 0,
        };
        view.rebuild_flat_view();
        view
    }

    /// Restrict which nodes can be selected (e.g. only datasets).
    pub fn with_selectable(mut self, selectable: fn(&TreeNode) -> bool) -> Self {
        self.selectable = selectable;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    /// Request the top level. Issues a fetch only while the root is unloaded.
    pub fn load_root(&mut self) -> Option<FetchRequest> {
        self.expand(ROOT_ID).into_fetch()
    }

    /// Open a folder, starting a fetch when its children are unknown.
    pub fn expand(&mut self, id: &str) -> ExpandOutcome {
        let outcome = {
            let mut store = self.store.borrow_mut();
            match store.get(id).map(|n| n.is_folder) {
                None => return ExpandOutcome::Missing,
                Some(false) => return ExpandOutcome::NotAFolder,
                Some(true) => {}
            }
            self.expanded.insert(id.to_string());
            if store.is_pending(id) {
                ExpandOutcome::Joined
            } else if let Some(node) = store.begin_fetch(id) {
                ExpandOutcome::Fetch(FetchRequest {
                    node,
                    generation: store.generation(),
                })
            } else {
                ExpandOutcome::Expanded
            }
        };
        self.rebuild_flat_view();
        outcome
    }

    /// Close a folder. The root stays open. A fetch still in flight for the
    /// folder is not cancelled and merges when it arrives.
    pub fn collapse(&mut self, id: &str) {
        if id == ROOT_ID {
            return;
        }
        if self.expanded.remove(id) {
            self.rebuild_flat_view();
        }
    }

    pub fn toggle(&mut self, id: &str) -> ExpandOutcome {
        if self.is_expanded(id) && id != ROOT_ID {
            self.collapse(id);
            ExpandOutcome::Expanded
        } else {
            self.expand(id)
        }
    }

    /// Forget loaded children and fetch the top level again.
    pub fn reload(&mut self) -> Option<FetchRequest> {
        self.store.borrow_mut().reset();
        self.expanded.retain(|id| id == ROOT_ID);
        self.cursor = 0;
        self.load_root()
    }

    // ── Cursor ───────────────────────────────────────────────────────

    pub fn selected_entry(&self) -> Option<&FlatEntry> {
        self.flat_view.get(self.cursor)
    }

    pub fn selected_node_id(&self) -> Option<NodeId> {
        self.selected_entry().map(|e| e.node_id.clone())
    }

    pub fn move_down(&mut self) {
        if self.cursor + 1 < self.flat_view.len() {
            self.cursor += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn goto_top(&mut self) {
        self.cursor = 0;
    }

    pub fn goto_bottom(&mut self) {
        self.cursor = self.flat_view.len().saturating_sub(1);
    }

    pub fn half_page_down(&mut self, visible_lines: usize) {
        let half = (visible_lines / 2).max(1);
        self.cursor = (self.cursor + half).min(self.flat_view.len().saturating_sub(1));
    }

    pub fn half_page_up(&mut self, visible_lines: usize) {
        let half = (visible_lines / 2).max(1);
        self.cursor = self.cursor.saturating_sub(half);
    }

    pub fn expand_selected(&mut self) -> Option<FetchRequest> {
        let id = self.selected_node_id()?;
        if self.is_expanded(&id) {
            return None;
        }
        self.expand(&id).into_fetch()
    }

    pub fn toggle_selected(&mut self) -> Option<FetchRequest> {
        let id = self.selected_node_id()?;
        self.toggle(&id).into_fetch()
    }

    /// Collapse the folder under the cursor, or jump to its parent line.
    pub fn collapse_or_parent(&mut self) {
        let Some(entry) = self.selected_entry().cloned() else {
            return;
        };
        if entry.is_folder && entry.is_expanded {
            self.collapse(&entry.node_id);
            return;
        }
        if entry.depth == 0 {
            return;
        }
        if let Some(pos) = self.flat_view[..self.cursor]
            .iter()
            .rposition(|e| e.depth + 1 == entry.depth)
        {
            self.cursor = pos;
        }
    }

    pub fn select_node(&mut self, id: &str) {
        if let Some(pos) = self.flat_view.iter().position(|e| e.node_id == id) {
            self.cursor = pos;
        }
    }

    // ── Selection ────────────────────────────────────────────────────

    pub fn is_selectable(&self, id: &str) -> bool {
        self.store
            .borrow()
            .get(id)
            .is_some_and(|n| (self.selectable)(n))
    }

    /// Toggle (or, in single mode, replace) the selection with `id`.
    pub fn click(&mut self, id: &str) -> bool {
        if !self.is_selectable(id) {
            return false;
        }
        self.selection.click(id);
        true
    }

    pub fn click_selected(&mut self) -> bool {
        match self.selected_node_id() {
            Some(id) => self.click(&id),
            None => false,
        }
    }

    fn selectable_children(&self, id: &str) -> Vec<NodeId> {
        let store = self.store.borrow();
        store
            .children_of(id)
            .into_iter()
            .filter(|n| n.id != id && (self.selectable)(n))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Add every loaded, selectable child of `id` to the selection.
    pub fn select_all_children(&mut self, id: &str) {
        let ids = self.selectable_children(id);
        self.selection.select_all(ids);
    }

    /// Remove every child of `id` from the selection.
    pub fn deselect_all_children(&mut self, id: &str) {
        let ids = self.selectable_children(id);
        self.selection.deselect_all(ids);
    }

    /// Selected nodes, in selection order, cloned out of the store.
    pub fn selected_nodes(&self) -> Vec<TreeNode> {
        let store = self.store.borrow();
        self.selection
            .ids()
            .iter()
            .filter_map(|id| store.get(id).cloned())
            .collect()
    }

    // ── Flattening ───────────────────────────────────────────────────

    /// Rebuild only if the store changed since the last build, for example
    /// through another view on the same store. Returns true if it rebuilt.
    pub fn sync(&mut self) -> bool {
        if self.store.borrow().revision() == self.built_at {
            return false;
        }
        self.rebuild_flat_view();
        true
    }

    /// Rebuild the flat list from the store, keeping the cursor on the same
    /// node when it is still visible.
    pub fn rebuild_flat_view(&mut self) {
        let old_id = self.selected_node_id();
        self.flat_view.clear();
        {
            let store = self.store.borrow();
            self.built_at = store.revision();
            let mut path = HashSet::new();
            path.insert(ROOT_ID.to_string());
            flatten_children(
                &store,
                ROOT_ID,
                &self.expanded,
                0,
                &[],
                &mut path,
                &mut self.flat_view,
            );
        }

        if let Some(id) = old_id {
            if let Some(pos) = self.flat_view.iter().position(|e| e.node_id == id) {
                self.cursor = pos;
                return;
            }
        }
        if self.cursor >= self.flat_view.len() {
            self.cursor = self.flat_view.len().saturating_sub(1);
        }
    }
}

/// Walk the children of `parent_id`, descending into expanded folders.
/// A child listing its own parent (or any ancestor on the current path) is
/// skipped so malformed payloads cannot recurse forever.
fn flatten_children(
    store: &NodeStore,
    parent_id: &str,
    expanded: &HashSet<NodeId>,
    depth: usize,
    parent_guides: &[bool],
    path: &mut HashSet<NodeId>,
    out: &mut Vec<FlatEntry>,
) {
    let visible: Vec<&TreeNode> = store
        .children_of(parent_id)
        .into_iter()
        .filter(|n| n.id != parent_id && !path.contains(&n.id))
        .collect();

    for (i, node) in visible.iter().enumerate() {
        let is_last = i + 1 == visible.len();
        let is_expanded = node.is_folder && expanded.contains(&node.id);

        out.push(FlatEntry {
            node_id: node.id.clone(),
            depth,
            name: node.label.clone(),
            is_folder: node.is_folder,
            is_expanded,
            is_loading: store.is_pending(&node.id),
            has_children: node.children.as_ref().is_some_and(|c| !c.is_empty()),
            guide_depths: parent_guides.to_vec(),
        });

        if is_expanded {
            let mut child_guides = parent_guides.to_vec();
            child_guides.push(!is_last);
            path.insert(node.id.clone());
            flatten_children(
                store,
                &node.id,
                expanded,
                depth + 1,
                &child_guides,
                path,
                out,
            );
            path.remove(&node.id);
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────────

const GUIDE_STYLE: Style = Style::new().fg(Color::DarkGray);
const SELECTED_BG: Color = Color::Gray;

/// Configuration for rendering a tree view.
pub struct TreeViewRenderConfig<'a> {
    pub title: &'a str,
    pub focused: bool,
    /// Draw `[x]` / `[ ]` before selectable entries.
    pub checkboxes: bool,
}

/// Render the tree into the given area, with a loading hint while the root
/// is being fetched and the last fetch error on the bottom line.
pub fn render_tree_view(
    frame: &mut Frame,
    area: Rect,
    view: &TreeView,
    config: &TreeViewRenderConfig<'_>,
) {
    let border_color = if config.focused {
        Color::Blue
    } else {
        Color::DarkGray
    };
    let title = if view.selection.is_empty() {
        format!(" {} ", config.title)
    } else {
        format!(" {} ({} selected) ", config.title, view.selection.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let store = view.store.borrow();
    let error = store.last_error().map(str::to_string);
    let tree_area = match error {
        Some(ref message) if inner.height > 1 => {
            let error_area = Rect {
                y: inner.y + inner.height - 1,
                height: 1,
                ..inner
            };
            frame.render_widget(
                Paragraph::new(Span::styled(
                    message.clone(),
                    Style::default().fg(Color::Red),
                )),
                error_area,
            );
            Rect {
                height: inner.height - 1,
                ..inner
            }
        }
        _ => inner,
    };

    if view.flat_view.is_empty() {
        let hint = if store.is_pending(ROOT_ID) {
            "  Loading..."
        } else {
            "  Nothing here."
        };
        frame.render_widget(
            Paragraph::new(hint).style(Style::default().fg(Color::DarkGray)),
            tree_area,
        );
        return;
    }

    let visible_lines = tree_area.height as usize;
    let scroll_offset = if view.cursor >= visible_lines {
        view.cursor - visible_lines + 1
    } else {
        0
    };

    let lines: Vec<Line> = view
        .flat_view
        .iter()
        .enumerate()
        .skip(scroll_offset)
        .take(visible_lines)
        .map(|(idx, entry)| {
            let selectable = store.get(&entry.node_id).is_some_and(|n| (view.selectable)(n));
            let category_icon = store
                .get(&entry.node_id)
                .and_then(|n| n.category)
                .map(|c| c.icon());
            render_entry_line(
                entry,
                idx == view.cursor,
                view.selection.contains(&entry.node_id),
                selectable && config.checkboxes,
                category_icon,
                tree_area.width,
            )
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), tree_area);
}

fn render_entry_line(
    entry: &FlatEntry,
    is_cursor: bool,
    is_selected: bool,
    checkbox: bool,
    category_icon: Option<&'static str>,
    area_width: u16,
) -> Line<'static> {
    let base_style = if is_cursor {
        Style::default()
            .bg(SELECTED_BG)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    } else if is_selected {
        Style::default().fg(Color::Green)
    } else if entry.is_folder {
        Style::default().fg(Color::Blue)
    } else {
        Style::default().fg(Color::White)
    };

    let mut spans: Vec<Span<'static>> = Vec::new();

    for d in 0..entry.depth {
        if entry.guide_depths.get(d).copied().unwrap_or(false) {
            let guide_style = if is_cursor {
                GUIDE_STYLE.bg(SELECTED_BG)
            } else {
                GUIDE_STYLE
            };
            spans.push(Span::styled("\u{2502} ", guide_style));
        } else {
            spans.push(Span::styled("  ", base_style));
        }
    }

    let icon = if entry.is_folder {
        if entry.is_expanded {
            "\u{25BC} "
        } else {
            "\u{25B6} "
        }
    } else {
        category_icon.unwrap_or("\u{25CF} ")
    };
    spans.push(Span::styled(icon, base_style));

    if checkbox {
        let mark = if is_selected { "[x] " } else { "[ ] " };
        spans.push(Span::styled(mark, base_style));
    }
    spans.push(Span::styled(entry.name.clone(), base_style));

    if entry.is_loading {
        spans.push(Span::styled(
            "  loading...",
            base_style.add_modifier(Modifier::DIM | Modifier::ITALIC),
        ));
    }

    if is_cursor {
        let content_width: usize = spans.iter().map(|s| s.content.width()).sum();
        let remaining = (area_width as usize).saturating_sub(content_width);
        if remaining > 0 {
            spans.push(Span::styled(
                " ".repeat(remaining),
                Style::default().bg(SELECTED_BG),
            ));
        }
    }

    Line::from(spans)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChildRecord, NodeCategory};

    fn view_with_top_level(children: Vec<ChildRecord>) -> TreeView {
        let store = NodeStore::shared("OMERO");
        let mut view = TreeView::new(store, SelectionMode::Multi);
        let req = view.load_root().expect("root fetch");
        view.store().borrow_mut().apply_fetch(&req.node.id, Ok(children));
        view.rebuild_flat_view();
        view
    }

    fn names(view: &TreeView) -> Vec<&str> {
        view.flat_view.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_root_starts_expanded_and_fetches_once() {
        let store = NodeStore::shared("root");
        let mut view = TreeView::new(store, SelectionMode::Multi);
        assert!(view.is_expanded(ROOT_ID));
        assert!(view.load_root().is_some());
        assert!(view.load_root().is_none());
    }

    #[test]
    fn test_expand_fetches_unloaded_folder() {
        let mut view = view_with_top_level(vec![ChildRecord::folder("p1", "P1")]);
        assert_eq!(names(&view), vec!["P1"]);

        let outcome = view.expand("p1");
        let ExpandOutcome::Fetch(req) = outcome else {
            panic!("expected a fetch, got {outcome:?}");
        };
        assert_eq!(req.node.id, "p1");
        assert!(view.flat_view[0].is_loading);

        view.store()
            .borrow_mut()
            .apply_fetch("p1", Ok(vec![ChildRecord::leaf("d1", "DS1")]));
        view.rebuild_flat_view();

        assert_eq!(names(&view), vec!["P1", "DS1"]);
        assert_eq!(view.flat_view[1].depth, 1);
        assert!(!view.flat_view[0].is_loading);
    }

    #[test]
    fn test_reexpand_loaded_folder_issues_no_fetch() {
        let mut view = view_with_top_level(vec![ChildRecord::folder("p1", "P1")]);
        let req = view.expand("p1").into_fetch().unwrap();
        view.store().borrow_mut().apply_fetch(&req.node.id, Ok(Vec::new()));

        view.collapse("p1");
        assert_eq!(view.expand("p1"), ExpandOutcome::Expanded);
    }

    #[test]
    fn test_duplicate_expand_joins_pending_fetch() {
        let mut view = view_with_top_level(vec![ChildRecord::folder("p1", "P1")]);
        assert!(matches!(view.expand("p1"), ExpandOutcome::Fetch(_)));
        view.collapse("p1");
        assert_eq!(view.expand("p1"), ExpandOutcome::Joined);
    }

    #[test]
    fn test_collapse_before_result_still_merges() {
        let mut view = view_with_top_level(vec![ChildRecord::folder("p1", "P1")]);
        let req = view.expand("p1").into_fetch().unwrap();
        view.collapse("p1");

        view.store()
            .borrow_mut()
            .apply_fetch(&req.node.id, Ok(vec![ChildRecord::leaf("d1", "DS1")]));
        view.rebuild_flat_view();

        // Hidden while collapsed, but merged into the index
        assert_eq!(names(&view), vec!["P1"]);
        assert_eq!(
            view.store().borrow().get("p1").unwrap().children,
            Some(vec!["d1".to_string()])
        );
        assert_eq!(view.expand("p1"), ExpandOutcome::Expanded);
        assert_eq!(names(&view), vec!["P1", "DS1"]);
    }

    #[test]
    fn test_expand_leaf_and_missing() {
        let mut view = view_with_top_level(vec![ChildRecord::leaf("f", "file.tif")]);
        assert_eq!(view.expand("f"), ExpandOutcome::NotAFolder);
        assert_eq!(view.expand("nope"), ExpandOutcome::Missing);
    }

    #[test]
    fn test_self_referencing_child_is_skipped() {
        let mut view = view_with_top_level(vec![ChildRecord::folder("a", "A")]);
        view.expand("a");
        view.store().borrow_mut().apply_fetch(
            "a",
            Ok(vec![ChildRecord::folder("a", "A"), ChildRecord::leaf("b", "B")]),
        );
        view.rebuild_flat_view();
        assert_eq!(names(&view), vec!["A", "B"]);
    }

    #[test]
    fn test_ancestor_cycle_terminates() {
        let mut view = view_with_top_level(vec![ChildRecord::folder("a", "A")]);
        // a -> b -> a
        view.store().borrow_mut().merge(
            "a",
            vec![ChildRecord::folder("b", "B").with_children(vec![
                ChildRecord::folder("a", "A").with_children(vec![ChildRecord::folder("b", "B")]),
            ])],
        );
        assert_eq!(view.expand("a"), ExpandOutcome::Expanded);
        assert_eq!(view.expand("b"), ExpandOutcome::Expanded);
        assert_eq!(names(&view), vec!["A", "B"]);
    }

    #[test]
    fn test_guide_depths() {
        let mut view = view_with_top_level(vec![
            ChildRecord::folder("a", "a").with_children(vec![
                ChildRecord::leaf("a1", "a1"),
                ChildRecord::leaf("a2", "a2"),
            ]),
            ChildRecord::leaf("b", "b"),
        ]);
        view.expand("a");

        assert_eq!(names(&view), vec!["a", "a1", "a2", "b"]);
        assert_eq!(view.flat_view[0].guide_depths, Vec::<bool>::new());
        assert_eq!(view.flat_view[1].guide_depths, vec![true]);
        assert_eq!(view.flat_view[2].guide_depths, vec![true]);
        assert_eq!(view.flat_view[3].guide_depths, Vec::<bool>::new());
    }

    #[test]
    fn test_navigation_and_collapse_to_parent() {
        let mut view = view_with_top_level(vec![
            ChildRecord::folder("a", "a").with_children(vec![ChildRecord::leaf("a1", "a1")]),
            ChildRecord::leaf("b", "b"),
        ]);
        view.expand("a");

        view.move_down();
        assert_eq!(view.selected_node_id().as_deref(), Some("a1"));
        view.collapse_or_parent();
        assert_eq!(view.selected_node_id().as_deref(), Some("a"));
        view.collapse_or_parent();
        assert!(!view.is_expanded("a"));
        assert_eq!(view.flat_view.len(), 2);

        view.goto_bottom();
        assert_eq!(view.selected_node_id().as_deref(), Some("b"));
        view.move_down();
        assert_eq!(view.cursor, 1);
        view.goto_top();
        assert_eq!(view.cursor, 0);
    }

    #[test]
    fn test_cursor_follows_node_after_rebuild() {
        let mut view = view_with_top_level(vec![
            ChildRecord::folder("a", "a"),
            ChildRecord::leaf("b", "b"),
        ]);
        view.goto_bottom();
        let req = view.expand("a").into_fetch().unwrap();
        view.store()
            .borrow_mut()
            .apply_fetch(&req.node.id, Ok(vec![ChildRecord::leaf("a1", "a1")]));
        view.rebuild_flat_view();
        assert_eq!(view.selected_node_id().as_deref(), Some("b"));
    }

    #[test]
    fn test_selectable_filter_and_children_actions() {
        let store = NodeStore::shared("OMERO");
        let mut view = TreeView::new(store, SelectionMode::Multi)
            .with_selectable(|n| n.category == Some(NodeCategory::Datasets));
        view.load_root();
        view.store().borrow_mut().apply_fetch(
            ROOT_ID,
            Ok(vec![ChildRecord::folder("project-1", "P").with_children(vec![
                ChildRecord::leaf("dataset-1", "D1").with_category(NodeCategory::Datasets),
                ChildRecord::leaf("dataset-2", "D2").with_category(NodeCategory::Datasets),
            ])]),
        );
        view.rebuild_flat_view();

        assert!(!view.click("project-1"));
        assert!(view.click("dataset-2"));

        view.select_all_children("project-1");
        assert_eq!(view.selection.len(), 2);

        let nodes = view.selected_nodes();
        assert_eq!(nodes[0].id, "dataset-2");
        assert_eq!(nodes[1].id, "dataset-1");

        view.deselect_all_children("project-1");
        assert!(view.selection.is_empty());
    }

    #[test]
    fn test_reload_resets_store() {
        let mut view = view_with_top_level(vec![ChildRecord::leaf("x", "x")]);
        assert_eq!(view.flat_view.len(), 1);
        let req = view.reload();
        assert!(req.is_some());
        assert!(view.flat_view.is_empty());
        assert!(view.store().borrow().is_pending(ROOT_ID));
    }

    #[test]
    fn test_sync_picks_up_changes_from_another_view() {
        let first = view_with_top_level(vec![ChildRecord::folder("p1", "P1")]);
        let mut second = TreeView::new(first.store().clone(), SelectionMode::Single);
        assert!(!second.sync(), "built from the current revision");
        assert_eq!(names(&second), ["P1"]);

        first
            .store()
            .borrow_mut()
            .merge(ROOT_ID, vec![ChildRecord::folder("p1", "P1"), ChildRecord::leaf("d1", "DS1")]);
        assert!(second.sync());
        assert_eq!(names(&second), ["P1", "DS1"]);
        assert!(!second.sync());
    }
}
