//! Configuration types for the toolbridge SDK.

use std::time::Duration;
use url::Url;

/// Which transport a client talks through. Chosen once, when the client is
/// built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// HTTP exchange endpoint of a running server.
    Http {
        /// Base URL of the server; envelopes are posted to `<base>/mcp/message`.
        base_url: Url,
    },
    /// Server spawned as a child process speaking over its stdin/stdout.
    Stdio {
        /// Executable to run.
        command: String,
        /// Arguments passed to the executable.
        args: Vec<String>,
    },
}

/// Configuration for the toolbridge client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Transport selection, `None` for an unconfigured client.
    pub transport: Option<TransportConfig>,
    /// Per-request timeout (HTTP transport).
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a new configuration for the given transport.
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport: Some(transport),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: None,
            timeout: Duration::from_secs(30),
        }
    }
}
