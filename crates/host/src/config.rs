use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use toolbridge_sdk::{ClientConfig, ToolClient, TransportConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub server: ListenConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamKind {
    Http,
    Stdio,
}

/// Where the tool server lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_transport")]
    pub transport: UpstreamKind,

    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_transport() -> UpstreamKind {
    UpstreamKind::Http
}

fn default_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            url: default_url(),
            command: None,
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    pub fn client_config(&self) -> Result<ClientConfig> {
        let transport = match self.transport {
            UpstreamKind::Http => TransportConfig::Http {
                base_url: self
                    .url
                    .parse()
                    .with_context(|| format!("Invalid upstream url '{}'", self.url))?,
            },
            UpstreamKind::Stdio => {
                let Some(command) = self.command.clone() else {
                    bail!("upstream.command is required for the stdio transport");
                };
                TransportConfig::Stdio {
                    command,
                    args: self.args.clone(),
                }
            }
        };

        Ok(ClientConfig {
            transport: Some(transport),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }

    /// Human-readable upstream target for status output
    pub fn describe(&self) -> String {
        match self.transport {
            UpstreamKind::Http => self.url.clone(),
            UpstreamKind::Stdio => {
                let mut parts = vec![self.command.clone().unwrap_or_default()];
                parts.extend(self.args.iter().cloned());
                format!("stdio:{}", parts.join(" "))
            }
        }
    }
}

impl HostConfig {
    /// Load configuration file if it exists, otherwise use defaults
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!(
                path = %config_path.display(),
                "Configuration file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read configuration file")?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration file")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub client: ToolClient,
    pub upstream: String,
}

impl AppState {
    /// Connect to the configured upstream.
    ///
    /// A stdio upstream is spawned here and lives as long as the state.
    pub fn new(config: &HostConfig) -> Result<Self> {
        let client = ToolClient::from_config(config.upstream.client_config()?)
            .context("Failed to create upstream client")?;

        Ok(Self {
            client,
            upstream: config.upstream.describe(),
        })
    }
}
