use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DockError, Result};

/// Default registry endpoint when none is configured.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry-1.docker.io";

/// Default token endpoint when none is configured.
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";

/// Pull strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullerKind {
    /// Fetch manifests and layer blobs from a remote registry (default).
    Registry,
    /// Read layers from a local `docker save` archive.
    Local,
}

impl Default for PullerKind {
    fn default() -> Self {
        Self::Registry
    }
}

impl std::fmt::Display for PullerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry => write!(f, "registry"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for PullerKind {
    type Err = DockError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "registry" => Ok(Self::Registry),
            "local" => Ok(Self::Local),
            _ => Err(DockError::Config(format!(
                "unknown puller kind: '{}' (supported: registry, local)",
                s
            ))),
        }
    }
}

/// Image store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for cached layers and metadata
    pub store_dir: PathBuf,

    /// Pull strategy
    #[serde(default)]
    pub puller: PullerKind,

    /// Registry endpoint, e.g. "https://registry-1.docker.io"
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// Token endpoint, e.g. "https://auth.docker.io/token"
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Account name passed to the token endpoint, if any
    #[serde(default)]
    pub account: Option<String>,

    /// Directory holding local image archives (local puller only)
    #[serde(default)]
    pub local_archives_dir: PathBuf,
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./store"),
            puller: PullerKind::Registry,
            registry_url: default_registry_url(),
            auth_url: default_auth_url(),
            account: None,
            local_archives_dir: PathBuf::from("./images"),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            DockError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = serde_yaml::from_str(&data)?;
        Ok(config)
    }
}
