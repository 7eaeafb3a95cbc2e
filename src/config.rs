use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::container::ContainerConfig;
use crate::core::workflow::{ActivityOptions, EngineEndpoint};
use crate::platform::{NativePlatform, Platform};

pub const CONFIG_FILE_NAME: &str = "silo-runner.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// `sqlite://<path>` or `sqlite::memory:`. Defaults to a database in the
    /// data directory.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_task_queue")]
    pub task_queue: String,
}

fn default_task_queue() -> String {
    "docker-runner".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            task_queue: default_task_queue(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of the channels between the protocol pipeline stages.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    64
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub activity: ActivityOptions,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl WorkerConfig {
    /// Load from the process environment.
    pub async fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok()).await
    }

    /// Read `silo-runner.toml` (if present), then apply environment
    /// overrides looked up through `env`.
    pub async fn load_with<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = env("SILO_RUNNER_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(NativePlatform::data_dir);
        let config_path = env("SILO_RUNNER_CONFIG")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME));

        let mut config = Self::from_file(&config_path).await?;
        config.data_dir = data_dir;
        config.apply_env(env)?;
        config.container = config.container.sanitize();
        EngineEndpoint::parse(&config.engine_endpoint())
            .context("Invalid workflow engine endpoint")?;

        info!(
            "Loaded worker config: listen={}:{}, engine={}, task_queue={}, data_dir={}, pipeline_capacity={}",
            config.server.host,
            config.server.port,
            config.engine_endpoint(),
            config.engine.task_queue,
            config.data_dir.display(),
            config.pipeline.capacity
        );
        Ok(config)
    }

    async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No {} found, using defaults.", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = env("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{}'", port))?;
        }
        // TEMPORAL is the name older deployments use for the same setting.
        if let Some(endpoint) = env("WORKFLOW_ENGINE").or_else(|| env("TEMPORAL"))
            && !endpoint.trim().is_empty()
        {
            self.engine.endpoint = Some(endpoint.trim().to_string());
        }
        Ok(())
    }

    pub fn engine_endpoint(&self) -> String {
        match &self.engine.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("sqlite://{}", self.data_dir.join("workflows.db").display()),
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("silo-runner.db")
    }

    pub fn activity_options(&self) -> ActivityOptions {
        self.activity.clone()
    }
}
