//! Search filtering for the nested script menu.

use serde::{Deserialize, Serialize};

/// A node of the script menu: a group when `ul` is present, otherwise a
/// script leaf. Leaves usually carry their OMERO id, but not always.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ul: Option<Vec<MenuNode>>,
}

impl MenuNode {
    pub fn group(name: impl Into<String>, children: Vec<MenuNode>) -> Self {
        Self {
            id: None,
            name: name.into(),
            ul: Some(children),
        }
    }

    pub fn script(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            ul: None,
        }
    }

    pub fn is_group(&self) -> bool {
        self.ul.is_some()
    }

    pub fn children(&self) -> &[MenuNode] {
        self.ul.as_deref().unwrap_or_default()
    }

    /// Ids of every script below this node.
    pub fn script_ids(&self) -> Vec<i64> {
        let mut out = Vec::new();
        collect_ids(self, &mut out);
        out
    }
}

fn collect_ids(node: &MenuNode, out: &mut Vec<i64>) {
    if let Some(id) = node.id {
        out.push(id);
    }
    for child in node.children() {
        collect_ids(child, out);
    }
}

/// Case-insensitive substring test. An empty needle matches everything.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Filter the menu down to scripts whose name contains `query`.
///
/// Groups survive only when at least one descendant script matches, except
/// that an empty query keeps the menu as it is. Groups whose name contains
/// "admin" are always removed when the viewer is not an administrator.
pub fn filter_menu(menu: &[MenuNode], query: &str, viewer_is_admin: bool) -> Vec<MenuNode> {
    let query = query.to_lowercase();
    menu.iter()
        .filter_map(|node| filter_node(node, &query, viewer_is_admin))
        .collect()
}

fn filter_node(node: &MenuNode, query: &str, viewer_is_admin: bool) -> Option<MenuNode> {
    if !node.is_group() {
        return contains_ignore_case(&node.name, query).then(|| node.clone());
    }

    if !viewer_is_admin && node.name.to_lowercase().contains("admin") {
        return None;
    }

    let children: Vec<MenuNode> = node
        .children()
        .iter()
        .filter_map(|child| filter_node(child, query, viewer_is_admin))
        .collect();

    if query.is_empty() || !children.is_empty() {
        Some(MenuNode {
            id: node.id,
            name: node.name.clone(),
            ul: Some(children),
        })
    } else {
        None
    }
}
