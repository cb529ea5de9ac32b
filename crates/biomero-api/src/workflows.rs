use futures::future::join_all;
use tracing::{info, warn};

use crate::client::BiomeroClient;
use crate::error::ApiError;
use crate::payload::WorkflowMetadata;
use biomero_core::menu_filter::contains_ignore_case;

pub const NO_DESCRIPTION: &str = "No description available";

/// A workflow offered by the BIOMERO server.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    pub name: String,
    pub description: String,
    pub metadata: WorkflowMetadata,
    pub github_url: Option<String>,
}

impl Workflow {
    pub fn from_parts(name: String, metadata: WorkflowMetadata, github_url: Option<String>) -> Self {
        let description = metadata
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());
        Self {
            name,
            description,
            metadata,
            github_url,
        }
    }
}

/// Fetch the workflow list, then every workflow's metadata and GitHub URL
/// concurrently. A workflow whose metadata fails to load is listed with
/// empty metadata rather than dropped.
pub async fn load_catalogue(client: &BiomeroClient) -> Result<Vec<Workflow>, ApiError> {
    let names = client.workflow_names().await?;

    let details = join_all(names.iter().map(|name| async move {
        let (metadata, github) =
            futures::join!(client.workflow_metadata(name), client.workflow_github(name));
        let metadata = metadata.unwrap_or_else(|err| {
            warn!(workflow = %name, error = %err, "failed to load workflow metadata");
            WorkflowMetadata::default()
        });
        let github = github.unwrap_or_else(|err| {
            warn!(workflow = %name, error = %err, "failed to load workflow GitHub URL");
            None
        });
        (metadata, github)
    }))
    .await;

    let catalogue: Vec<Workflow> = names
        .into_iter()
        .zip(details)
        .map(|(name, (metadata, github))| Workflow::from_parts(name, metadata, github))
        .collect();
    info!(count = catalogue.len(), "loaded workflow catalogue");
    Ok(catalogue)
}

/// Indices of the workflows whose name or description contains `query`.
pub fn filter_workflows(workflows: &[Workflow], query: &str) -> Vec<usize> {
    workflows
        .iter()
        .enumerate()
        .filter(|(_, w)| {
            query.is_empty()
                || contains_ignore_case(&w.name, query)
                || contains_ignore_case(&w.description, query)
        })
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow(name: &str, description: Option<&str>) -> Workflow {
        let metadata = WorkflowMetadata {
            description: description.map(str::to_string),
            ..Default::default()
        };
        Workflow::from_parts(name.to_string(), metadata, None)
    }

    #[test]
    fn test_description_fallback() {
        assert_eq!(workflow("a", None).description, NO_DESCRIPTION);
        assert_eq!(workflow("a", Some("  ")).description, NO_DESCRIPTION);
        assert_eq!(workflow("a", Some("Segment")).description, "Segment");
    }

    #[test]
    fn test_filter_workflows() {
        let all = vec![
            workflow("cellpose", Some("Nuclei segmentation")),
            workflow("stardist", Some("Star-convex SEGMENTATION")),
            workflow("cellexpansion", None),
        ];
        assert_eq!(filter_workflows(&all, ""), vec![0, 1, 2]);
        assert_eq!(filter_workflows(&all, "CELL"), vec![0, 2]);
        assert_eq!(filter_workflows(&all, "segment"), vec![0, 1]);
        assert!(filter_workflows(&all, "zzz").is_empty());
    }
}
