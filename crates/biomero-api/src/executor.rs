use std::sync::mpsc;
use std::thread;

use biomero_core::menu_filter::MenuNode;
use biomero_core::store::{ChildRecord, NodeId, TreeNode};
use biomero_core::tree_view::FetchRequest;
use tracing::error;

use crate::adapter::{
    DatasetImagesAdapter, FetchAdapter, LocalFsAdapter, OmeroHierarchyAdapter, RemoteFolderAdapter,
};
use crate::client::BiomeroClient;
use crate::config::UploadSource;
use crate::payload::{ConfigSections, Group, ImportRequest, RunWorkflowRequest, ScriptMenuResponse};
use crate::workflows::{Workflow, load_catalogue};

/// Which adapter answers a children fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Hierarchy,
    DatasetImages,
    /// The import source picked in `upload.source`.
    ImportFiles,
}

/// Command sent from the UI thread to the executor thread.
#[derive(Debug)]
pub enum ApiCommand {
    FetchChildren {
        source: DataSource,
        node: TreeNode,
        generation: u64,
    },
    LoadWorkflows,
    RunWorkflow(RunWorkflowRequest),
    ImportSelected(ImportRequest),
    LoadConfig,
    SaveConfig(ConfigSections),
    LoadGroups,
    LoadScripts,
    LoadScriptDetails(i64),
    LoadThumbnails(Vec<i64>),
}

/// Result received from the executor thread. Errors are already rendered
/// to strings for display.
#[derive(Debug)]
pub enum ApiEvent {
    Children {
        source: DataSource,
        parent_id: NodeId,
        /// Echoed from the request; see `NodeStore::complete_fetch`.
        generation: u64,
        result: Result<Vec<ChildRecord>, String>,
    },
    Workflows(Result<Vec<Workflow>, String>),
    WorkflowSubmitted {
        workflow: String,
        result: Result<String, String>,
    },
    ImportQueued(Result<String, String>),
    Config(Result<ConfigSections, String>),
    ConfigSaved(Result<String, String>),
    Groups(Result<Vec<Group>, String>),
    Scripts(Result<Vec<MenuNode>, String>),
    ScriptDetails(Result<ScriptMenuResponse, String>),
    Thumbnails(Result<Vec<i64>, String>),
}

/// Sender/Receiver pair for communicating with the executor.
pub struct ApiExecutor {
    sender: mpsc::Sender<ApiCommand>,
    receiver: mpsc::Receiver<ApiEvent>,
}

struct Adapters {
    hierarchy: OmeroHierarchyAdapter,
    images: DatasetImagesAdapter,
    files: Box<dyn FetchAdapter>,
}

impl Adapters {
    fn new(client: &BiomeroClient) -> Self {
        let upload = &client.config().upload;
        let files: Box<dyn FetchAdapter> = match upload.source {
            UploadSource::Remote => Box::new(RemoteFolderAdapter::new(client.clone())),
            UploadSource::Local => Box::new(LocalFsAdapter::new(upload.local_root.clone())),
        };
        Self {
            hierarchy: OmeroHierarchyAdapter::new(client.clone()),
            images: DatasetImagesAdapter::new(client.clone()),
            files,
        }
    }

    fn get(&self, source: DataSource) -> &dyn FetchAdapter {
        match source {
            DataSource::Hierarchy => &self.hierarchy,
            DataSource::DatasetImages => &self.images,
            DataSource::ImportFiles => self.files.as_ref(),
        }
    }
}

impl ApiExecutor {
    /// Spawn the background executor thread with a tokio runtime.
    pub fn spawn(client: BiomeroClient) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ApiCommand>();
        let (event_tx, event_rx) = mpsc::channel::<ApiEvent>();

        thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(err) => {
                    error!(error = %err, "failed to start executor runtime");
                    return;
                }
            };

            rt.block_on(async move {
                let adapters = Adapters::new(&client);
                while let Ok(cmd) = cmd_rx.recv() {
                    let event = execute(&client, &adapters, cmd).await;
                    if event_tx.send(event).is_err() {
                        break; // UI thread dropped the receiver
                    }
                }
            });
        });

        Self {
            sender: cmd_tx,
            receiver: event_rx,
        }
    }

    /// An executor whose worker is already gone: every command fails to
    /// send and no event ever arrives.
    pub fn disconnected() -> Self {
        let (sender, _) = mpsc::channel::<ApiCommand>();
        let (_, receiver) = mpsc::channel::<ApiEvent>();
        Self { sender, receiver }
    }

    /// Send a command (non-blocking).
    pub fn send(&self, cmd: ApiCommand) -> Result<(), mpsc::SendError<ApiCommand>> {
        self.sender.send(cmd)
    }

    /// Queue a children fetch produced by a tree view.
    pub fn fetch(&self, source: DataSource, request: FetchRequest) -> Result<(), String> {
        self.send(ApiCommand::FetchChildren {
            source,
            node: request.node,
            generation: request.generation,
        })
        .map_err(|_| "background worker stopped".to_string())
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Option<ApiEvent> {
        self.receiver.try_recv().ok()
    }

    /// Every event that arrived since the last tick.
    pub fn drain(&self) -> Vec<ApiEvent> {
        self.receiver.try_iter().collect()
    }
}

async fn execute(client: &BiomeroClient, adapters: &Adapters, cmd: ApiCommand) -> ApiEvent {
    match cmd {
        ApiCommand::FetchChildren {
            source,
            node,
            generation,
        } => {
            let result = adapters
                .get(source)
                .fetch_children(&node)
                .await
                .map_err(|e| e.to_string());
            ApiEvent::Children {
                source,
                parent_id: node.id,
                generation,
                result,
            }
        }
        ApiCommand::LoadWorkflows => {
            ApiEvent::Workflows(load_catalogue(client).await.map_err(|e| e.to_string()))
        }
        ApiCommand::RunWorkflow(request) => {
            let result = client
                .run_workflow(&request)
                .await
                .map(|reply| reply.text())
                .map_err(|e| e.to_string());
            ApiEvent::WorkflowSubmitted {
                workflow: request.workflow_name,
                result,
            }
        }
        ApiCommand::ImportSelected(request) => ApiEvent::ImportQueued(
            client
                .import_selected(&request)
                .await
                .map(|reply| reply.text())
                .map_err(|e| e.to_string()),
        ),
        ApiCommand::LoadConfig => ApiEvent::Config(client.get_config().await.map_err(|e| {
            if e.is_forbidden() {
                "Settings are only available to administrators".to_string()
            } else {
                e.to_string()
            }
        })),
        ApiCommand::SaveConfig(sections) => ApiEvent::ConfigSaved(
            client
                .save_config(&sections)
                .await
                .map(|reply| reply.text())
                .map_err(|e| e.to_string()),
        ),
        ApiCommand::LoadGroups => {
            ApiEvent::Groups(client.list_groups().await.map_err(|e| e.to_string()))
        }
        ApiCommand::LoadScripts => {
            ApiEvent::Scripts(client.list_scripts().await.map_err(|e| e.to_string()))
        }
        ApiCommand::LoadScriptDetails(id) => ApiEvent::ScriptDetails(
            client
                .script_details(&[id])
                .await
                .map_err(|e| e.to_string()),
        ),
        ApiCommand::LoadThumbnails(ids) => {
            ApiEvent::Thumbnails(client.thumbnails(&ids).await.map_err(|e| e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use biomero_core::store::{NodeStore, ROOT_ID};
    use std::time::Duration;

    #[test]
    fn test_local_children_round_trip_through_worker() {
        let dir = std::env::temp_dir().join(format!("biomero-executor-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("run1")).unwrap();
        std::fs::write(dir.join("image.tif"), b"").unwrap();

        let mut config = ClientConfig::default();
        config.upload.source = UploadSource::Local;
        config.upload.local_root = dir.clone();
        let executor = ApiExecutor::spawn(BiomeroClient::new(config).unwrap());

        let mut store = NodeStore::new("Files");
        let node = store.begin_fetch(ROOT_ID).unwrap();
        let generation = store.generation();
        executor
            .fetch(DataSource::ImportFiles, FetchRequest { node, generation })
            .unwrap();

        let event = executor
            .receiver
            .recv_timeout(Duration::from_secs(10))
            .unwrap();
        let (source, parent_id, echoed, result) = match event {
            ApiEvent::Children {
                source,
                parent_id,
                generation,
                result,
            } => (source, parent_id, generation, result),
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(source, DataSource::ImportFiles);
        assert_eq!(echoed, generation);
        assert!(store.complete_fetch(echoed, &parent_id, result));

        let labels: Vec<&str> = store
            .children_of(ROOT_ID)
            .iter()
            .map(|n| n.label.as_str())
            .collect();
        assert_eq!(labels, ["image.tif", "run1"]);
        assert!(!store.has_pending());

        let _ = std::fs::remove_dir_all(&dir);
    }

    fn recv(executor: &ApiExecutor) -> ApiEvent {
        executor
            .receiver
            .recv_timeout(Duration::from_secs(10))
            .unwrap()
    }

    #[test]
    fn test_forbidden_config_reads_as_not_admin() {
        let mut config = ClientConfig::default();
        config.server.base_url =
            crate::fake_server::respond_with(403, r#"{"error": "Unauthorized request"}"#);
        let executor = ApiExecutor::spawn(BiomeroClient::new(config).unwrap());

        executor.send(ApiCommand::LoadConfig).unwrap();
        match recv(&executor) {
            ApiEvent::Config(Err(message)) => {
                assert_eq!(message, "Settings are only available to administrators")
            }
            other => panic!("unexpected event: {other:?}"),
        }

        executor.send(ApiCommand::LoadScripts).unwrap();
        match recv(&executor) {
            ApiEvent::Scripts(Err(message)) => {
                assert_eq!(message, "server returned 403: Unauthorized request")
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
