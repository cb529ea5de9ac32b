//! Wire types for the OMERO.web and BIOMERO endpoints.
//!
//! Tree payloads are decoded into [`FetchPayload`], which maps each known
//! shape to child records exhaustively. A body that matches none of the
//! expected shapes is kept as [`FetchPayload::Unknown`] and reported as an
//! error instead of being read as an empty listing.

use std::collections::BTreeMap;

use biomero_core::store::{ChildRecord, NodeCategory, entity_node_id};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

// ── Tree payloads ────────────────────────────────────────────────────

/// A project, dataset, screen, plate or image as listed by the webclient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "childCount", default)]
    pub child_count: u64,
    #[serde(rename = "ownerId", default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedSummary {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "childCount", default)]
    pub child_count: u64,
}

/// Body of `tree_top_level`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopLevelPayload {
    #[serde(default)]
    pub projects: Option<Vec<EntitySummary>>,
    #[serde(default)]
    pub datasets: Option<Vec<EntitySummary>>,
    #[serde(default)]
    pub screens: Option<Vec<EntitySummary>>,
    #[serde(default)]
    pub plates: Option<Vec<EntitySummary>>,
    #[serde(default)]
    pub orphaned: Option<OrphanedSummary>,
}

impl TopLevelPayload {
    fn is_recognised(&self) -> bool {
        self.projects.is_some()
            || self.datasets.is_some()
            || self.screens.is_some()
            || self.plates.is_some()
            || self.orphaned.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderItem {
    /// Path relative to the import mount.
    pub id: String,
    pub name: String,
    pub is_folder: bool,
}

/// Body of `local_file_browser`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderContents {
    pub contents: Vec<FolderItem>,
    #[serde(default)]
    pub folder_id: Option<String>,
}

/// Which endpoint a tree body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    TopLevel,
    Datasets,
    Plates,
    Images,
    Folder,
}

/// A decoded tree body.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchPayload {
    TopLevel(TopLevelPayload),
    Datasets(Vec<EntitySummary>),
    Plates(Vec<EntitySummary>),
    Images(Vec<EntitySummary>),
    Folder(FolderContents),
    Unknown { kind: PayloadKind, body: Value },
}

#[derive(Deserialize)]
struct DatasetsBody {
    datasets: Vec<EntitySummary>,
}

#[derive(Deserialize)]
struct PlatesBody {
    plates: Vec<EntitySummary>,
}

#[derive(Deserialize)]
struct ImagesBody {
    images: Vec<EntitySummary>,
}

impl FetchPayload {
    pub fn decode(kind: PayloadKind, body: Value) -> Self {
        let decoded = match kind {
            PayloadKind::TopLevel => serde_json::from_value::<TopLevelPayload>(body.clone())
                .ok()
                .filter(TopLevelPayload::is_recognised)
                .map(Self::TopLevel),
            PayloadKind::Datasets => serde_json::from_value::<DatasetsBody>(body.clone())
                .ok()
                .map(|b| Self::Datasets(b.datasets)),
            PayloadKind::Plates => serde_json::from_value::<PlatesBody>(body.clone())
                .ok()
                .map(|b| Self::Plates(b.plates)),
            PayloadKind::Images => serde_json::from_value::<ImagesBody>(body.clone())
                .ok()
                .map(|b| Self::Images(b.images)),
            PayloadKind::Folder => serde_json::from_value::<FolderContents>(body.clone())
                .ok()
                .map(Self::Folder),
        };
        decoded.unwrap_or(Self::Unknown { kind, body })
    }

    /// Child records for the node the payload was fetched for.
    pub fn into_records(self) -> Result<Vec<ChildRecord>, ApiError> {
        match self {
            Self::TopLevel(top) => Ok(top_level_records(top)),
            Self::Datasets(items) => Ok(entity_records(items, NodeCategory::Datasets)),
            Self::Plates(items) => Ok(entity_records(items, NodeCategory::Plates)),
            Self::Images(items) => Ok(entity_records(items, NodeCategory::Images)),
            Self::Folder(folder) => Ok(folder
                .contents
                .into_iter()
                .map(|item| {
                    let record = if item.is_folder {
                        ChildRecord::folder(item.id, item.name)
                    } else {
                        ChildRecord::leaf(item.id, item.name)
                    };
                    record.with_category(NodeCategory::Files)
                })
                .collect()),
            Self::Unknown { kind, body } => Err(ApiError::payload(format!(
                "unrecognised {kind:?} body: {}",
                preview(&body)
            ))),
        }
    }
}

fn preview(body: &Value) -> String {
    let text = body.to_string();
    match text.char_indices().nth(120) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text,
    }
}

/// Projects and screens are folders when they have children. Datasets,
/// plates and images are leaves of the hierarchy tree.
fn entity_record(item: EntitySummary, category: NodeCategory) -> ChildRecord {
    let id = entity_node_id(category, item.id);
    let record = match category {
        NodeCategory::Projects | NodeCategory::Screens if item.child_count > 0 => {
            ChildRecord::folder(id, item.name)
        }
        _ => ChildRecord::leaf(id, item.name),
    };
    record
        .with_category(category)
        .with_child_count(item.child_count)
}

fn entity_records(items: Vec<EntitySummary>, category: NodeCategory) -> Vec<ChildRecord> {
    items
        .into_iter()
        .map(|item| entity_record(item, category))
        .collect()
}

fn top_level_records(top: TopLevelPayload) -> Vec<ChildRecord> {
    let container = |category: NodeCategory, label: &str, items: Option<Vec<EntitySummary>>| {
        let children = entity_records(items.unwrap_or_default(), category);
        ChildRecord::folder(category.as_str(), label)
            .with_category(category)
            .with_child_count(children.len() as u64)
            .with_children(children)
    };

    let orphaned_label = top
        .orphaned
        .as_ref()
        .map(|o| o.name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("Orphaned Images")
        .to_string();

    vec![
        container(NodeCategory::Projects, "Projects", top.projects),
        container(NodeCategory::Datasets, "Datasets", top.datasets),
        container(NodeCategory::Screens, "Screens", top.screens),
        container(NodeCategory::Plates, "Plates", top.plates),
        ChildRecord::leaf(NodeCategory::Orphaned.as_str(), orphaned_label)
            .with_category(NodeCategory::Orphaned),
    ]
}

// ── BIOMERO payloads ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowList {
    pub workflows: Vec<String>,
}

/// Kind of a workflow input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
    String,
    Number,
    Boolean,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_input_type")]
    pub input_type: InputType,
    #[serde(default)]
    pub optional: bool,
    #[serde(rename = "default-value", default)]
    pub default_value: Option<Value>,
}

fn default_input_type() -> InputType {
    InputType::String
}

/// A workflow descriptor as served by `{workflows}{name}/metadata/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Vec<WorkflowInput>,
    #[serde(rename = "workflow-version", default)]
    pub workflow_version: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Descriptor fields this client does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl WorkflowMetadata {
    pub fn version(&self) -> Option<&str> {
        self.workflow_version
            .as_deref()
            .or(self.version.as_deref())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubUrl {
    #[serde(default)]
    pub url: Option<String>,
}

/// `{"status": "success", "message": ..}` or `{"error": ..}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ServerMessage {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.as_deref().is_none_or(|s| s == "success")
    }

    /// The human-readable part of the reply.
    pub fn text(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.status.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunWorkflowRequest {
    pub workflow_name: String,
    pub params: serde_json::Map<String, Value>,
}

/// Body of `import_selected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRequest {
    pub upload: ImportSelection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSelection {
    #[serde(rename = "selectedLocal")]
    pub selected_local: Vec<String>,
    /// `[kind, id]` pairs such as `["datasets", "12"]`.
    #[serde(rename = "selectedOmero")]
    pub selected_omero: Vec<(String, String)>,
}

impl ImportRequest {
    /// Build the request, rejecting empty selections with the same messages
    /// the server uses.
    pub fn new(files: Vec<String>, destinations: Vec<(String, String)>) -> Result<Self, ApiError> {
        if files.is_empty() {
            return Err(ApiError::validation("No items selected"));
        }
        if destinations.is_empty() {
            return Err(ApiError::validation("No destinations selected"));
        }
        Ok(Self {
            upload: ImportSelection {
                selected_local: files,
                selected_omero: destinations,
            },
        })
    }
}

/// BIOMERO settings: section name to key/value pairs, as in the INI file.
pub type ConfigSections = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEnvelope {
    #[serde(default)]
    pub config: ConfigSections,
}

// ── OMERO payloads ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Group {
    #[serde(rename = "@id")]
    pub id: i64,
    #[serde(rename = "Name", default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupList {
    #[serde(default)]
    pub data: Vec<Group>,
}

/// One entry of `get_script_menu`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptDetails {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptMenuResponse {
    #[serde(default)]
    pub script_menu: Vec<ScriptDetails>,
    #[serde(default)]
    pub error_logs: Vec<String>,
}

/// Message from an `{"error": ..}` body, if the body has that shape.
pub fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ServerMessage>(body)
        .ok()
        .and_then(|m| m.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_containers() {
        let body = json!({
            "projects": [
                {"id": 1, "name": "P1", "childCount": 2, "ownerId": 3},
                {"id": 2, "name": "Empty", "childCount": 0}
            ],
            "datasets": [{"id": 7, "name": "Loose", "childCount": 5}],
            "screens": [],
            "plates": [{"id": 9, "name": "Plate A"}],
            "orphaned": {"name": "Orphaned Images", "childCount": 4}
        });
        let records = FetchPayload::decode(PayloadKind::TopLevel, body)
            .into_records()
            .unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["projects", "datasets", "screens", "plates", "orphaned"]);
        assert!(!records[4].is_folder);

        let projects = records[0].preloaded.as_ref().unwrap();
        assert_eq!(projects[0].id, "project-1");
        assert!(projects[0].is_folder);
        assert!(!projects[1].is_folder, "childless project is a leaf");

        let datasets = records[1].preloaded.as_ref().unwrap();
        assert_eq!(datasets[0].id, "dataset-7");
        assert!(!datasets[0].is_folder);
        assert_eq!(datasets[0].category, Some(NodeCategory::Datasets));
        assert_eq!(records[2].preloaded.as_deref(), Some(&[][..]));
    }

    #[test]
    fn test_entity_lists() {
        let body = json!({"datasets": [{"id": 4, "name": "DS4", "childCount": 10}]});
        let records = FetchPayload::decode(PayloadKind::Datasets, body)
            .into_records()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "dataset-4");
        assert_eq!(records[0].child_count, Some(10));

        let body = json!({"images": [{"id": 11, "name": "cells.tif"}]});
        let records = FetchPayload::decode(PayloadKind::Images, body)
            .into_records()
            .unwrap();
        assert_eq!(records[0].id, "image-11");
        assert_eq!(records[0].category, Some(NodeCategory::Images));
    }

    #[test]
    fn test_folder_contents() {
        let body = json!({
            "contents": [
                {"name": "plates", "is_folder": true, "id": "screens/plates"},
                {"name": "a.tif", "is_folder": false, "id": "screens/a.tif"}
            ],
            "folder_id": "screens"
        });
        let records = FetchPayload::decode(PayloadKind::Folder, body)
            .into_records()
            .unwrap();
        assert_eq!(records[0], ChildRecord::folder("screens/plates", "plates").with_category(NodeCategory::Files));
        assert!(!records[1].is_folder);
    }

    #[test]
    fn test_unknown_shapes_are_errors() {
        let payload = FetchPayload::decode(PayloadKind::Datasets, json!({"items": []}));
        assert!(matches!(payload, FetchPayload::Unknown { .. }));
        assert!(matches!(payload.into_records(), Err(ApiError::Payload(_))));

        let payload = FetchPayload::decode(PayloadKind::TopLevel, json!({"message": "hi"}));
        assert!(matches!(payload, FetchPayload::Unknown { .. }));
    }

    #[test]
    fn test_workflow_metadata() {
        let meta: WorkflowMetadata = serde_json::from_value(json!({
            "name": "cellpose",
            "description": "Nuclei segmentation",
            "workflow-version": "1.3.1",
            "schema-version": "0.7",
            "inputs": [
                {"id": "cytomine_host", "type": "String", "optional": false},
                {"id": "diameter", "name": "Diameter", "type": "Number",
                 "optional": true, "default-value": 0},
                {"id": "use_gpu", "type": "Boolean", "default-value": true},
                {"id": "model", "type": "Enum"}
            ]
        }))
        .unwrap();
        assert_eq!(meta.version(), Some("1.3.1"));
        assert_eq!(meta.inputs.len(), 4);
        assert_eq!(meta.inputs[1].input_type, InputType::Number);
        assert_eq!(meta.inputs[2].default_value, Some(json!(true)));
        assert_eq!(meta.inputs[3].input_type, InputType::Other);
        assert!(meta.extra.contains_key("schema-version"));
    }

    #[test]
    fn test_import_request_validation() {
        let err = ImportRequest::new(vec![], vec![("datasets".into(), "1".into())]).unwrap_err();
        assert_eq!(err.to_string(), "No items selected");
        let err = ImportRequest::new(vec!["a.tif".into()], vec![]).unwrap_err();
        assert_eq!(err.to_string(), "No destinations selected");

        let req = ImportRequest::new(vec!["a.tif".into()], vec![("screens".into(), "2".into())]).unwrap();
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"upload": {"selectedLocal": ["a.tif"], "selectedOmero": [["screens", "2"]]}})
        );
    }

    #[test]
    fn test_server_messages() {
        let ok: ServerMessage = serde_json::from_str(
            r#"{"status": "success", "message": "Successfully queued 2 items for import"}"#,
        )
        .unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.text(), "Successfully queued 2 items for import");

        assert_eq!(
            error_message(r#"{"error": "workflow_name is required"}"#).as_deref(),
            Some("workflow_name is required")
        );
        assert_eq!(error_message("<html>"), None);
    }
}
