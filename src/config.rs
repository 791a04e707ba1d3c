//! Controller configuration
//!
//! Loaded from a mounted YAML file (ConfigMap) with sensible defaults, so
//! the operator also runs with no config at all.

use serde::{Deserialize, Serialize};

fn default_namespace() -> String {
    "clustergate-system".to_string()
}

fn default_http_bind_address() -> String {
    "0.0.0.0:8082".to_string()
}

/// Main controller configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Namespace the operator runs in; script check Jobs are created here
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Registers the cloud-controller-manager check. Enable on
    /// cloud-provider clusters.
    #[serde(default, rename = "enableCloudControllerManager")]
    pub enable_cloud_controller_manager: bool,

    /// Bind address for the readiness/metrics HTTP server
    #[serde(default = "default_http_bind_address", rename = "httpBindAddress")]
    pub http_bind_address: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            enable_cloud_controller_manager: false,
            http_bind_address: default_http_bind_address(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a mounted ConfigMap file
    pub fn from_mounted_file(config_path: &str) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;

        let config: ControllerConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.namespace.trim().is_empty() {
            return Err(anyhow::anyhow!("namespace must not be empty"));
        }
        if self.http_bind_address.trim().is_empty() {
            return Err(anyhow::anyhow!("httpBindAddress must not be empty"));
        }
        Ok(())
    }
}
