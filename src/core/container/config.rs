use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    /// Container CLI binary (`docker`, `podman`, or an absolute path).
    #[serde(default = "default_runtime_binary")]
    pub runtime_binary: String,

    /// Container names are `<name_prefix>-<session token>`.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Docker network for connector containers. `None` uses the engine default.
    #[serde(default)]
    pub network: Option<String>,

    #[serde(default)]
    pub max_memory_mb: u64,

    /// Seconds a container gets between SIGTERM and SIGKILL when discarded.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_runtime_binary() -> String {
    NativePlatform::container_cli().to_string()
}
fn default_name_prefix() -> String {
    "silo-connector".to_string()
}
fn default_stop_grace_secs() -> u64 {
    10
}

/// Label namespace owned by the runner; user labels may not shadow it.
pub(crate) const RESERVED_LABEL_PREFIX: &str = "silo-runner.";

/// Networks that would break connector isolation.
const DISALLOWED_NETWORKS: &[&str] = &["host"];

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime_binary: default_runtime_binary(),
            name_prefix: default_name_prefix(),
            network: None,
            max_memory_mb: 0,
            stop_grace_secs: default_stop_grace_secs(),
            labels: BTreeMap::new(),
        }
    }
}

impl ContainerConfig {
    /// Strip settings that would let a connector escape its sandbox.
    pub fn sanitize(mut self) -> Self {
        if let Some(network) = self.network.as_deref()
            && DISALLOWED_NETWORKS.contains(&network)
        {
            info!(
                "Ignoring disallowed connector network '{}', using engine default",
                network
            );
            self.network = None;
        }

        let original_count = self.labels.len();
        self.labels
            .retain(|key, _| !key.starts_with(RESERVED_LABEL_PREFIX));
        if self.labels.len() != original_count {
            info!(
                "Stripped {} reserved labels from container config",
                original_count - self.labels.len()
            );
        }

        if self.name_prefix.trim().is_empty() {
            self.name_prefix = default_name_prefix();
        }
        self
    }

    pub fn container_name(&self, session: &str) -> String {
        format!("{}-{}", self.name_prefix, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_platform_cli() {
        let config = ContainerConfig::default();
        assert_eq!(config.runtime_binary, NativePlatform::container_cli());
        assert_eq!(config.name_prefix, "silo-connector");
        assert!(config.network.is_none());
        assert_eq!(config.max_memory_mb, 0);
        assert_eq!(config.stop_grace_secs, 10);
    }

    #[test]
    fn sanitize_drops_host_network() {
        let config = ContainerConfig {
            network: Some("host".to_string()),
            ..ContainerConfig::default()
        }
        .sanitize();
        assert!(config.network.is_none());

        let config = ContainerConfig {
            network: Some("connectors".to_string()),
            ..ContainerConfig::default()
        }
        .sanitize();
        assert_eq!(config.network.as_deref(), Some("connectors"));
    }

    #[test]
    fn sanitize_strips_reserved_labels() {
        let mut labels = BTreeMap::new();
        labels.insert("team".to_string(), "privacy".to_string());
        labels.insert("silo-runner.session".to_string(), "spoofed".to_string());
        let config = ContainerConfig {
            labels,
            ..ContainerConfig::default()
        }
        .sanitize();
        assert_eq!(config.labels.len(), 1);
        assert!(config.labels.contains_key("team"));
    }

    #[test]
    fn parse_valid_toml_config() {
        let content = r#"
runtime_binary = "podman"
network = "connectors"
max_memory_mb = 512
stop_grace_secs = 3

[labels]
owner = "privacy-eng"
"#;
        let config: ContainerConfig = toml::from_str(content).unwrap();
        assert_eq!(config.runtime_binary, "podman");
        assert_eq!(config.network.as_deref(), Some("connectors"));
        assert_eq!(config.max_memory_mb, 512);
        assert_eq!(config.stop_grace_secs, 3);
        assert_eq!(config.labels["owner"], "privacy-eng");
        assert_eq!(config.name_prefix, "silo-connector");
    }

    #[test]
    fn container_name_uses_prefix_and_session() {
        let config = ContainerConfig::default();
        assert_eq!(config.container_name("abcdefghij"), "silo-connector-abcdefghij");
    }
}
