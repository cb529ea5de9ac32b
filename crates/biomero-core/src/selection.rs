use crate::store::NodeId;

/// How clicks on a tree or list change the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// At most one id. Clicking another id replaces it.
    Single,
    /// Any number of ids. Clicking toggles membership.
    Multi,
}

/// Ordered set of selected node ids.
#[derive(Debug, Clone)]
pub struct Selection {
    mode: SelectionMode,
    ids: Vec<NodeId>,
}

impl Selection {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            ids: Vec::new(),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    /// Apply a click on `id`.
    ///
    /// Multi mode toggles the id. Single mode selects exactly `id`, or
    /// clears the selection when `id` was the selected one.
    pub fn click(&mut self, id: &str) {
        match self.mode {
            SelectionMode::Multi => {
                if let Some(pos) = self.ids.iter().position(|s| s == id) {
                    self.ids.remove(pos);
                } else {
                    self.ids.push(id.to_string());
                }
            }
            SelectionMode::Single => {
                if self.contains(id) {
                    self.ids.clear();
                } else {
                    self.ids = vec![id.to_string()];
                }
            }
        }
    }

    /// Add every id not yet selected. A no-op in single mode.
    pub fn select_all<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.mode == SelectionMode::Single {
            return;
        }
        for id in ids {
            let id = id.as_ref();
            if !self.contains(id) {
                self.ids.push(id.to_string());
            }
        }
    }

    /// Remove the given ids, keeping everything else selected.
    pub fn deselect_all<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let remove: Vec<String> = ids.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.ids.retain(|id| !remove.contains(id));
    }

    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.ids.retain(|id| keep(id));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
