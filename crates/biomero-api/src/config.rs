//! Client configuration.
//!
//! Loaded from `<config dir>/biomero/config.toml` (or the file named by
//! `BIOMERO_CONFIG`), then overridden by `BIOMERO__SECTION__KEY`
//! environment variables. Every field has a default so a missing file
//! yields a usable, if unauthenticated, configuration.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "BIOMERO_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub user: UserConfig,
    pub endpoints: EndpointConfig,
    pub http: HttpConfig,
    pub upload: UploadConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// OMERO.web `sessionid` cookie.
    pub session_id: String,
    /// Django `csrftoken` cookie, also sent as `X-CSRFToken` on POSTs.
    pub csrf_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4080".to_string(),
            session_id: String::new(),
            csrf_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub user_id: i64,
    pub group_id: i64,
    pub is_admin: bool,
    pub name: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            user_id: -1,
            group_id: -1,
            is_admin: false,
            name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub tree_top_level: String,
    pub api_datasets: String,
    pub api_plates: String,
    pub api_images: String,
    pub local_file_browser: String,
    pub workflows: String,
    pub run_workflow: String,
    pub get_config: String,
    pub save_config: String,
    pub import_selected: String,
    pub groups: String,
    pub thumbnails: String,
    pub scripts: String,
    pub script_menu: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            tree_top_level: "/webclient/api/tree/top_level/".into(),
            api_datasets: "/webclient/api/datasets/".into(),
            api_plates: "/webclient/api/plates/".into(),
            api_images: "/webclient/api/images/".into(),
            local_file_browser: "/omero_boost/get_folder_contents/".into(),
            workflows: "/omero_boost/api/biomero/workflows/".into(),
            run_workflow: "/omero_boost/api/biomero/workflows/run/".into(),
            get_config: "/omero_boost/api/biomero/admin/config/".into(),
            save_config: "/omero_boost/api/biomero/admin/config/save/".into(),
            import_selected: "/omero_boost/api/import_selected/".into(),
            groups: "/api/v0/m/experimentergroups/".into(),
            thumbnails: "/webgateway/get_thumbnails/".into(),
            scripts: "/webclient/list_scripts/".into(),
            script_menu: "/omero_boost/get_script_menu/".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Where the Upload tool browses for files to import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadSource {
    /// The server-side import mount, listed through `local_file_browser`.
    #[default]
    Remote,
    /// A directory on this machine.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub source: UploadSource,
    pub local_root: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            source: UploadSource::Remote,
            local_root: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load from the default location plus environment overrides.
    pub fn load() -> Result<Self, ApiError> {
        Self::load_from(config_path().as_deref())
    }

    /// Load from an explicit file (which may be absent) plus environment
    /// overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ApiError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix("BIOMERO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ApiError> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// `base_url` joined with an endpoint path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.server.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn is_authenticated(&self) -> bool {
        !self.server.session_id.is_empty()
    }
}

/// The config file in use: `BIOMERO_CONFIG` if set, else the XDG config dir.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    ProjectDirs::from("", "", "biomero").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let cfg = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.http.timeout_secs, 30);
        assert_eq!(cfg.endpoints.api_images, "/webclient/api/images/");
        assert_eq!(cfg.upload.source, UploadSource::Remote);
        assert_eq!(cfg.user.group_id, -1);
        assert!(!cfg.is_authenticated());
    }

    #[test]
    fn test_partial_sections() {
        let cfg = ClientConfig::from_toml_str(
            r#"
            [server]
            base_url = "https://omero.example.org/"
            session_id = "abc"

            [user]
            user_id = 3
            group_id = 53
            is_admin = true

            [upload]
            source = "local"
            local_root = "/data/import"

            [endpoints]
            workflows = "/custom/workflows/"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.csrf_token, "");
        assert!(cfg.is_authenticated());
        assert_eq!(cfg.user.group_id, 53);
        assert!(cfg.user.is_admin);
        assert_eq!(cfg.upload.source, UploadSource::Local);
        assert_eq!(cfg.upload.local_root, PathBuf::from("/data/import"));
        assert_eq!(cfg.endpoints.workflows, "/custom/workflows/");
        assert_eq!(cfg.endpoints.run_workflow, "/omero_boost/api/biomero/workflows/run/");
        assert_eq!(
            cfg.url(&cfg.endpoints.workflows),
            "https://omero.example.org/custom/workflows/"
        );
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let path = std::env::temp_dir().join("biomero-config-test-does-not-exist.toml");
        let cfg = ClientConfig::load_from(Some(&path)).unwrap();
        assert_eq!(cfg.logging.level, "info");
    }
}
