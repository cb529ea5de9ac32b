use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::payload::{
    ConfigEnvelope, ConfigSections, FetchPayload, GithubUrl, Group, GroupList, ImportRequest,
    PayloadKind, RunWorkflowRequest, ScriptMenuResponse, ServerMessage, WorkflowList,
    WorkflowMetadata, error_message,
};
use biomero_core::menu_filter::MenuNode;

/// Authenticated JSON client for one OMERO.web server.
#[derive(Debug, Clone)]
pub struct BiomeroClient {
    http: Client,
    config: ClientConfig,
}

impl BiomeroClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn cookie_header(&self) -> String {
        let server = &self.config.server;
        let mut cookies = Vec::new();
        if !server.session_id.is_empty() {
            cookies.push(format!("sessionid={}", server.session_id));
        }
        if !server.csrf_token.is_empty() {
            cookies.push(format!("csrftoken={}", server.csrf_token));
        }
        cookies.join("; ")
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        let cookies = self.cookie_header();
        let builder = builder.header(header::ACCEPT, "application/json");
        if cookies.is_empty() {
            builder
        } else {
            builder.header(header::COOKIE, cookies)
        }
    }

    /// `page`, `group` and the `_` cache-buster sent with every tree request.
    fn tree_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("page", "0".to_string()),
            ("group", self.config.user.group_id.to_string()),
            ("_", chrono::Utc::now().timestamp_millis().to_string()),
        ]
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = error_message(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.config.url(path);
        debug!(%url, "GET");
        let response = self.authed(self.http.get(&url)).query(query).send().await?;
        Self::read_json(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.config.url(path);
        debug!(%url, "POST");
        let response = self
            .authed(self.http.post(&url))
            .header("X-CSRFToken", &self.config.server.csrf_token)
            .json(body)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn tree_payload(
        &self,
        kind: PayloadKind,
        path: &str,
        mut query: Vec<(&'static str, String)>,
    ) -> Result<FetchPayload, ApiError> {
        query.extend(self.tree_params());
        let body: Value = self.get_json(path, &query).await?;
        Ok(FetchPayload::decode(kind, body))
    }

    // ── Tree endpoints ───────────────────────────────────────────────

    pub async fn tree_top_level(&self) -> Result<FetchPayload, ApiError> {
        let user_id = self.config.user.user_id.to_string();
        self.tree_payload(
            PayloadKind::TopLevel,
            &self.config.endpoints.tree_top_level,
            vec![("id", user_id.clone()), ("experimenter_id", user_id)],
        )
        .await
    }

    pub async fn project_datasets(&self, project_id: i64) -> Result<FetchPayload, ApiError> {
        self.tree_payload(
            PayloadKind::Datasets,
            &self.config.endpoints.api_datasets,
            vec![("id", project_id.to_string())],
        )
        .await
    }

    pub async fn screen_plates(&self, screen_id: i64) -> Result<FetchPayload, ApiError> {
        self.tree_payload(
            PayloadKind::Plates,
            &self.config.endpoints.api_plates,
            vec![("id", screen_id.to_string())],
        )
        .await
    }

    pub async fn dataset_images(&self, dataset_id: i64) -> Result<FetchPayload, ApiError> {
        self.tree_payload(
            PayloadKind::Images,
            &self.config.endpoints.api_images,
            vec![("id", dataset_id.to_string())],
        )
        .await
    }

    /// List a folder of the server import mount. `None` lists the mount root.
    pub async fn folder_contents(&self, folder_id: Option<&str>) -> Result<FetchPayload, ApiError> {
        let query = match folder_id {
            Some(id) => vec![("folder_id", id.to_string())],
            None => Vec::new(),
        };
        self.tree_payload(
            PayloadKind::Folder,
            &self.config.endpoints.local_file_browser,
            query,
        )
        .await
    }

    // ── Workflows ────────────────────────────────────────────────────

    pub async fn workflow_names(&self) -> Result<Vec<String>, ApiError> {
        let list: WorkflowList = self.get_json(&self.config.endpoints.workflows, &[]).await?;
        Ok(list.workflows)
    }

    fn workflow_path(&self, name: &str, leaf: &str) -> String {
        format!(
            "{}/{}/{}/",
            self.config.endpoints.workflows.trim_end_matches('/'),
            name,
            leaf
        )
    }

    pub async fn workflow_metadata(&self, name: &str) -> Result<WorkflowMetadata, ApiError> {
        self.get_json(&self.workflow_path(name, "metadata"), &[]).await
    }

    pub async fn workflow_github(&self, name: &str) -> Result<Option<String>, ApiError> {
        let github: GithubUrl = self.get_json(&self.workflow_path(name, "github"), &[]).await?;
        Ok(github.url.filter(|u| !u.is_empty()))
    }

    pub async fn run_workflow(&self, request: &RunWorkflowRequest) -> Result<ServerMessage, ApiError> {
        info!(workflow = %request.workflow_name, "submitting workflow");
        let reply: ServerMessage = self
            .post_json(&self.config.endpoints.run_workflow, request)
            .await?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(ApiError::payload(reply.text()))
        }
    }

    // ── Admin ────────────────────────────────────────────────────────

    pub async fn get_config(&self) -> Result<ConfigSections, ApiError> {
        let envelope: ConfigEnvelope = self.get_json(&self.config.endpoints.get_config, &[]).await?;
        Ok(envelope.config)
    }

    pub async fn save_config(&self, sections: &ConfigSections) -> Result<ServerMessage, ApiError> {
        info!(sections = sections.len(), "saving BIOMERO settings");
        let envelope = ConfigEnvelope {
            config: sections.clone(),
        };
        self.post_json(&self.config.endpoints.save_config, &envelope)
            .await
    }

    // ── Import ───────────────────────────────────────────────────────

    pub async fn import_selected(&self, request: &ImportRequest) -> Result<ServerMessage, ApiError> {
        info!(
            files = request.upload.selected_local.len(),
            destinations = request.upload.selected_omero.len(),
            "queueing import"
        );
        let reply: ServerMessage = self
            .post_json(&self.config.endpoints.import_selected, request)
            .await?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(ApiError::payload(reply.text()))
        }
    }

    // ── OMERO ────────────────────────────────────────────────────────

    pub async fn list_groups(&self) -> Result<Vec<Group>, ApiError> {
        let list: GroupList = self.get_json(&self.config.endpoints.groups, &[]).await?;
        Ok(list.data)
    }

    /// Scripts menu as nested `ul` groups.
    pub async fn list_scripts(&self) -> Result<Vec<MenuNode>, ApiError> {
        self.get_json(&self.config.endpoints.scripts, &[]).await
    }

    pub async fn script_details(&self, script_ids: &[i64]) -> Result<ScriptMenuResponse, ApiError> {
        let ids = script_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.get_json(&self.config.endpoints.script_menu, &[("script_ids", ids)])
            .await
    }

    /// Ids of the images that have a thumbnail on the server.
    pub async fn thumbnails(&self, image_ids: &[i64]) -> Result<Vec<i64>, ApiError> {
        if image_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query: Vec<(&str, String)> = image_ids.iter().map(|id| ("id", id.to_string())).collect();
        let body: serde_json::Map<String, Value> =
            self.get_json(&self.config.endpoints.thumbnails, &query).await?;
        let mut ids: Vec<i64> = body
            .iter()
            .filter(|(_, v)| v.as_str().is_some_and(|s| !s.is_empty()))
            .filter_map(|(k, _)| k.parse().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(toml: &str) -> BiomeroClient {
        BiomeroClient::new(ClientConfig::from_toml_str(toml).unwrap()).unwrap()
    }

    #[test]
    fn test_cookie_header() {
        let c = client(
            r#"
            [server]
            session_id = "s1"
            csrf_token = "t1"
            "#,
        );
        assert_eq!(c.cookie_header(), "sessionid=s1; csrftoken=t1");
        assert_eq!(client("").cookie_header(), "");
    }

    #[test]
    fn test_tree_params() {
        let c = client("[user]\ngroup_id = 53\n");
        let params = c.tree_params();
        assert_eq!(params[0], ("page", "0".to_string()));
        assert_eq!(params[1], ("group", "53".to_string()));
        assert_eq!(params[2].0, "_");
        assert!(params[2].1.parse::<i64>().is_ok());
    }

    #[test]
    fn test_workflow_paths() {
        let c = client("");
        assert_eq!(
            c.workflow_path("cellpose", "metadata"),
            "/omero_boost/api/biomero/workflows/cellpose/metadata/"
        );
        assert_eq!(
            c.config().url(&c.workflow_path("cellpose", "github")),
            "http://localhost:4080/omero_boost/api/biomero/workflows/cellpose/github/"
        );
    }
}
