//! Flat node index backing every lazily materialized tree.
//!
//! Nodes are keyed by a string id and reference their children by id, so a
//! fetch for one folder only touches that folder's entry and its direct
//! children. The store also tracks which folders have a fetch in flight and
//! the last fetch error, and is shared between tools as a [`SharedStore`].

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, warn};

/// Key of a node in the index.
pub type NodeId = String;

/// Id of the synthetic root entry every store contains.
pub const ROOT_ID: &str = "root";

/// Store handle shared between tools on the UI thread.
pub type SharedStore = Rc<RefCell<NodeStore>>;

// ── NodeCategory ─────────────────────────────────────────────────────

/// What kind of remote or local object a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    Projects,
    Datasets,
    Screens,
    Plates,
    Images,
    Files,
    Orphaned,
}

impl NodeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Datasets => "datasets",
            Self::Screens => "screens",
            Self::Plates => "plates",
            Self::Images => "images",
            Self::Files => "files",
            Self::Orphaned => "orphaned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "projects" => Some(Self::Projects),
            "datasets" => Some(Self::Datasets),
            "screens" => Some(Self::Screens),
            "plates" => Some(Self::Plates),
            "images" => Some(Self::Images),
            "files" => Some(Self::Files),
            "orphaned" => Some(Self::Orphaned),
            _ => None,
        }
    }

    /// Id prefix used for entities of this category (`dataset-12`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Projects => "project",
            Self::Datasets => "dataset",
            Self::Screens => "screen",
            Self::Plates => "plate",
            Self::Images => "image",
            Self::Files => "file",
            Self::Orphaned => "orphaned",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Projects => "\u{25A3} ",
            Self::Datasets => "\u{25A4} ",
            Self::Screens => "\u{25A6} ",
            Self::Plates => "\u{25A9} ",
            Self::Images => "\u{25AB} ",
            Self::Files => "\u{25CF} ",
            Self::Orphaned => "\u{25CC} ",
        }
    }
}

// ── TreeNode ─────────────────────────────────────────────────────────

/// One entry of the index.
///
/// `children` is `None` until the folder has been fetched. A completed fetch
/// that returned nothing is stored as `Some(vec![])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: NodeId,
    pub label: String,
    pub is_folder: bool,
    pub children: Option<Vec<NodeId>>,
    pub category: Option<NodeCategory>,
    pub child_count: Option<u64>,
}

impl TreeNode {
    pub fn folder(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            is_folder: true,
            children: None,
            category: None,
            child_count: None,
        }
    }

    pub fn leaf(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            is_folder: false,
            children: Some(Vec::new()),
            category: None,
            child_count: None,
        }
    }

    /// Numeric OMERO id encoded in a `kind-123` node id.
    pub fn entity_id(&self) -> Option<i64> {
        entity_id(&self.id)
    }
}

/// Parse the numeric suffix of a `kind-123` id.
pub fn entity_id(node_id: &str) -> Option<i64> {
    node_id.rsplit_once('-')?.1.parse().ok()
}

/// Build the node id of an OMERO entity.
pub fn entity_node_id(category: NodeCategory, id: i64) -> NodeId {
    format!("{}-{}", category.id_prefix(), id)
}

// ── ChildRecord ──────────────────────────────────────────────────────

/// A child as produced by a fetch adapter, before it is merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRecord {
    pub id: NodeId,
    pub label: String,
    pub is_folder: bool,
    pub category: Option<NodeCategory>,
    pub child_count: Option<u64>,
    /// Grandchildren delivered by the same payload.
    pub preloaded: Option<Vec<ChildRecord>>,
}

impl ChildRecord {
    pub fn folder(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            is_folder: true,
            category: None,
            child_count: None,
            preloaded: None,
        }
    }

    pub fn leaf(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            is_folder: false,
            ..Self::folder(id, label)
        }
    }

    pub fn with_category(mut self, category: NodeCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_child_count(mut self, count: u64) -> Self {
        self.child_count = Some(count);
        self
    }

    pub fn with_children(mut self, children: Vec<ChildRecord>) -> Self {
        self.preloaded = Some(children);
        self
    }
}

// ── NodeStore ────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct NodeStore {
    nodes: HashMap<NodeId, TreeNode>,
    pending: HashSet<NodeId>,
    last_error: Option<String>,
    root_label: String,
    /// Bumped on every change to the index.
    revision: u64,
    /// Bumped on every reset. Fetches started before a reset complete with
    /// an older generation and are dropped.
    generation: u64,
}

impl NodeStore {
    pub fn new(root_label: impl Into<String>) -> Self {
        let root_label = root_label.into();
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID.to_string(), TreeNode::folder(ROOT_ID, &root_label));
        Self {
            nodes,
            pending: HashSet::new(),
            last_error: None,
            root_label,
            revision: 0,
            generation: 0,
        }
    }

    pub fn shared(root_label: impl Into<String>) -> SharedStore {
        Rc::new(RefCell::new(Self::new(root_label)))
    }

    /// Views sharing the store compare this to know when to rebuild.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Tag to send along with a fetch, see [`complete_fetch`](Self::complete_fetch).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_label(&self) -> &str {
        &self.root_label
    }

    /// Direct children of a node in fetch order. Unknown ids are skipped.
    pub fn children_of(&self, id: &str) -> Vec<&TreeNode> {
        self.nodes
            .get(id)
            .and_then(|n| n.children.as_ref())
            .map(|ids| ids.iter().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether the node's children have been loaded (or it is a leaf).
    pub fn is_materialized(&self, id: &str) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| !n.is_folder || n.children.is_some())
    }

    /// A folder that was never fetched and has no fetch in flight.
    pub fn needs_fetch(&self, id: &str) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| n.is_folder && n.children.is_none())
            && !self.pending.contains(id)
    }

    /// Mark a fetch for `id` as in flight. Returns the node to fetch, or
    /// `None` when no fetch should be issued (already loaded, already
    /// pending, not a folder, unknown id).
    pub fn begin_fetch(&mut self, id: &str) -> Option<TreeNode> {
        if !self.needs_fetch(id) {
            return None;
        }
        self.pending.insert(id.to_string());
        self.nodes.get(id).cloned()
    }

    /// Mark a fetch as in flight even if the node is already loaded.
    /// Used for explicit refreshes and for side loads such as dataset images.
    pub fn begin_refetch(&mut self, id: &str) -> Option<TreeNode> {
        if self.pending.contains(id) {
            return None;
        }
        let node = self.nodes.get(id).cloned()?;
        self.pending.insert(id.to_string());
        Some(node)
    }

    /// Union the records into the index and make them the parent's children.
    ///
    /// Every record is inserted (overwriting an entry with the same id), the
    /// parent's child list is replaced by the record ids in order, and any
    /// other entry is left as it was. Preloaded grandchildren are merged
    /// recursively under their record.
    pub fn merge(&mut self, parent_id: &str, records: Vec<ChildRecord>) {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let ChildRecord {
                id,
                label,
                is_folder,
                category,
                child_count,
                preloaded,
            } = record;

            self.nodes.insert(
                id.clone(),
                TreeNode {
                    id: id.clone(),
                    label,
                    is_folder,
                    children: if is_folder { None } else { Some(Vec::new()) },
                    category,
                    child_count,
                },
            );
            if let Some(grandchildren) = preloaded {
                self.merge(&id, grandchildren);
            }
            ids.push(id);
        }

        let parent = self
            .nodes
            .entry(parent_id.to_string())
            .or_insert_with(|| TreeNode::folder(parent_id, parent_id));
        parent.children = Some(ids);
        self.revision += 1;
    }

    /// Complete a fetch started with [`begin_fetch`](Self::begin_fetch).
    ///
    /// On failure the index is left untouched and the message is kept for
    /// display; the folder stays unmaterialized so expanding it retries.
    pub fn apply_fetch(&mut self, parent_id: &str, result: Result<Vec<ChildRecord>, String>) {
        self.pending.remove(parent_id);
        match result {
            Ok(records) => {
                debug!(parent = parent_id, count = records.len(), "merging children");
                self.merge(parent_id, records);
            }
            Err(message) => {
                warn!(parent = parent_id, error = %message, "fetch failed");
                let label = self
                    .nodes
                    .get(parent_id)
                    .map(|n| n.label.as_str())
                    .unwrap_or(parent_id);
                self.last_error = Some(format!("Error fetching {label}: {message}"));
            }
        }
    }

    /// Complete a fetch that was started under `generation`. Results from
    /// before the last [`reset`](Self::reset) are dropped so they neither
    /// clear the pending flag of a newer fetch nor refill the index.
    /// Returns whether the result was applied.
    pub fn complete_fetch(
        &mut self,
        generation: u64,
        parent_id: &str,
        result: Result<Vec<ChildRecord>, String>,
    ) -> bool {
        if generation != self.generation {
            debug!(
                parent = parent_id,
                generation,
                current = self.generation,
                "dropping fetch started before reset"
            );
            return false;
        }
        self.apply_fetch(parent_id, result);
        true
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Drop everything except an unloaded root. Fetches still in flight
    /// belong to the old generation and are ignored when they complete.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.nodes.insert(
            ROOT_ID.to_string(),
            TreeNode::folder(ROOT_ID, &self.root_label),
        );
        self.pending.clear();
        self.last_error = None;
        self.revision += 1;
        self.generation += 1;
    }

    /// Ids of every descendant of `id` that satisfies `pred`, depth first.
    pub fn descendants_where(&self, id: &str, pred: impl Fn(&TreeNode) -> bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for child in self.children_of(&current).into_iter().rev() {
                if child.id == current {
                    continue;
                }
                if pred(child) {
                    out.push(child.id.clone());
                }
                stack.push(child.id.clone());
            }
        }
        out
    }
}

// ── Tests ────────────────────────────────────────────────────────────
