//! Fetch adapters: given a folder node, produce its direct children.
//!
//! Each adapter makes at most one request per call and never touches the
//! node store itself; the caller merges the records.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use biomero_core::store::{ChildRecord, NodeCategory, ROOT_ID, TreeNode};
use tracing::debug;

use crate::client::BiomeroClient;
use crate::error::ApiError;

#[async_trait]
pub trait FetchAdapter: Send + Sync {
    async fn fetch_children(&self, node: &TreeNode) -> Result<Vec<ChildRecord>, ApiError>;
}

// ── OMERO hierarchy ──────────────────────────────────────────────────

/// Projects, datasets, screens and plates of the active group.
pub struct OmeroHierarchyAdapter {
    client: BiomeroClient,
}

impl OmeroHierarchyAdapter {
    pub fn new(client: BiomeroClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchAdapter for OmeroHierarchyAdapter {
    async fn fetch_children(&self, node: &TreeNode) -> Result<Vec<ChildRecord>, ApiError> {
        if node.id == ROOT_ID {
            return self.client.tree_top_level().await?.into_records();
        }
        let payload = match (node.category, node.entity_id()) {
            (Some(NodeCategory::Projects), Some(id)) => self.client.project_datasets(id).await?,
            (Some(NodeCategory::Screens), Some(id)) => self.client.screen_plates(id).await?,
            _ => {
                debug!(node = %node.id, "no children endpoint for node");
                return Ok(Vec::new());
            }
        };
        payload.into_records()
    }
}

/// Images of a dataset, loaded under the dataset node.
pub struct DatasetImagesAdapter {
    client: BiomeroClient,
}

impl DatasetImagesAdapter {
    pub fn new(client: BiomeroClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchAdapter for DatasetImagesAdapter {
    async fn fetch_children(&self, node: &TreeNode) -> Result<Vec<ChildRecord>, ApiError> {
        match (node.category, node.entity_id()) {
            (Some(NodeCategory::Datasets), Some(id)) => {
                self.client.dataset_images(id).await?.into_records()
            }
            _ => Ok(Vec::new()),
        }
    }
}

// ── Import sources ───────────────────────────────────────────────────

/// The server-side import mount, browsed through `local_file_browser`.
pub struct RemoteFolderAdapter {
    client: BiomeroClient,
}

impl RemoteFolderAdapter {
    pub fn new(client: BiomeroClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchAdapter for RemoteFolderAdapter {
    async fn fetch_children(&self, node: &TreeNode) -> Result<Vec<ChildRecord>, ApiError> {
        let folder = (node.id != ROOT_ID).then_some(node.id.as_str());
        self.client.folder_contents(folder).await?.into_records()
    }
}

/// A directory on this machine. Node ids are `/`-separated paths relative
/// to `root`; hidden entries are skipped.
pub struct LocalFsAdapter {
    root: PathBuf,
}

impl LocalFsAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, node_id: &str) -> Result<PathBuf, ApiError> {
        if node_id == ROOT_ID {
            return Ok(self.root.clone());
        }
        let relative = Path::new(node_id);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(ApiError::validation(format!("Invalid folder: {node_id}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FetchAdapter for LocalFsAdapter {
    async fn fetch_children(&self, node: &TreeNode) -> Result<Vec<ChildRecord>, ApiError> {
        let dir = self.resolve(&node.id)?;
        let prefix = if node.id == ROOT_ID {
            String::new()
        } else {
            format!("{}/", node.id)
        };

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let is_folder = entry.file_type().await?.is_dir();
            items.push((name, is_folder));
        }
        items.sort();

        Ok(items
            .into_iter()
            .map(|(name, is_folder)| {
                let id = format!("{prefix}{name}");
                let record = if is_folder {
                    ChildRecord::folder(id, name)
                } else {
                    ChildRecord::leaf(id, name)
                };
                record.with_category(NodeCategory::Files)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomero_core::store::NodeStore;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("biomero-adapter-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("plate1/wells")).unwrap();
        std::fs::write(dir.join("b.tif"), b"").unwrap();
        std::fs::write(dir.join("a.tif"), b"").unwrap();
        std::fs::write(dir.join(".hidden"), b"").unwrap();
        std::fs::write(dir.join("plate1/w1.tif"), b"").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_local_fs_lists_root_and_subfolders() {
        let dir = scratch_dir("list");
        let adapter = LocalFsAdapter::new(&dir);

        let root = TreeNode::folder(ROOT_ID, "Files");
        let records = adapter.fetch_children(&root).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a.tif", "b.tif", "plate1"]);
        assert!(records[2].is_folder);
        assert!(!records[0].is_folder);

        let plate = TreeNode::folder("plate1", "plate1");
        let records = adapter.fetch_children(&plate).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["plate1/w1.tif", "plate1/wells"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_local_fs_results_merge_into_store() {
        let dir = scratch_dir("merge");
        let adapter = LocalFsAdapter::new(&dir);
        let mut store = NodeStore::new("Files");

        let root = store.begin_fetch(ROOT_ID).unwrap();
        let result = adapter.fetch_children(&root).await.map_err(|e| e.to_string());
        store.apply_fetch(ROOT_ID, result);
        assert!(store.is_materialized(ROOT_ID));
        assert!(store.needs_fetch("plate1"));

        let plate = store.begin_fetch("plate1").unwrap();
        let result = adapter.fetch_children(&plate).await.map_err(|e| e.to_string());
        store.apply_fetch("plate1", result);
        assert_eq!(store.children_of("plate1").len(), 2);
        assert_eq!(store.children_of(ROOT_ID).len(), 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_local_fs_errors() {
        let dir = scratch_dir("errors");
        let adapter = LocalFsAdapter::new(&dir);

        let escape = TreeNode::folder("../etc", "etc");
        assert!(matches!(
            adapter.fetch_children(&escape).await,
            Err(ApiError::Validation(_))
        ));

        let missing = TreeNode::folder("nope", "nope");
        assert!(matches!(
            adapter.fetch_children(&missing).await,
            Err(ApiError::Io(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_hierarchy_adapters_skip_nodes_without_endpoint() {
        let client = BiomeroClient::new(Default::default()).unwrap();
        let hierarchy = OmeroHierarchyAdapter::new(client.clone());
        let images = DatasetImagesAdapter::new(client);

        let mut dataset = TreeNode::leaf("dataset-3", "DS");
        dataset.category = Some(NodeCategory::Datasets);
        assert!(hierarchy.fetch_children(&dataset).await.unwrap().is_empty());

        let mut project = TreeNode::folder("project-3", "P");
        project.category = Some(NodeCategory::Projects);
        assert!(images.fetch_children(&project).await.unwrap().is_empty());
    }

    fn client_for(base_url: String) -> BiomeroClient {
        let mut config = crate::config::ClientConfig::default();
        config.server.base_url = base_url;
        BiomeroClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_server_error_reaches_the_store() {
        let url = crate::fake_server::respond_with(500, r#"{"error": "OMERO is down"}"#);
        let adapter = OmeroHierarchyAdapter::new(client_for(url));
        let mut store = NodeStore::new("OMERO");

        let root = store.begin_fetch(ROOT_ID).unwrap();
        let err = adapter.fetch_children(&root).await.unwrap_err();
        assert!(
            matches!(&err, ApiError::Status { status: 500, message } if message == "OMERO is down"),
            "{err:?}"
        );

        store.apply_fetch(ROOT_ID, Err(err.to_string()));
        assert_eq!(
            store.last_error(),
            Some("Error fetching OMERO: server returned 500: OMERO is down")
        );
        assert!(store.needs_fetch(ROOT_ID));
    }

    #[tokio::test]
    async fn test_dataset_images_forbidden() {
        let url = crate::fake_server::respond_with(403, "not json");
        let adapter = DatasetImagesAdapter::new(client_for(url));

        let mut dataset = TreeNode::leaf("dataset-3", "DS");
        dataset.category = Some(NodeCategory::Datasets);
        let err = adapter.fetch_children(&dataset).await.unwrap_err();
        assert!(err.is_forbidden());
        // No JSON error body: falls back to the reason phrase
        assert_eq!(err.to_string(), "server returned 403: Forbidden");
    }
}
