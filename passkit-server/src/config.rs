//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub database_path: PathBuf,
    /// Public base URL of this service, embedded into every served pass as
    /// its `webServiceURL`.
    pub web_service_url: String,
    /// Base URL of the pass signer sidecar.
    pub signer_url: String,
    pub apns_production_url: String,
    pub apns_sandbox_url: String,
    /// Cap on concurrent in-flight pushes per fan-out batch.
    pub max_concurrent_pushes: usize,
    pub scheduler_interval_secs: u64,
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8710".to_string(),
            database_path: PathBuf::from("passkit.db"),
            web_service_url: "http://127.0.0.1:8710/v1".to_string(),
            signer_url: "http://127.0.0.1:8720".to_string(),
            apns_production_url: "https://api.push.apple.com".to_string(),
            apns_sandbox_url: "https://api.sandbox.push.apple.com".to_string(),
            max_concurrent_pushes: 32,
            scheduler_interval_secs: 60,
            max_payload_size: 65_536,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
