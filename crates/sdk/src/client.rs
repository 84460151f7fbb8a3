//! Main client for the toolbridge SDK.

use crate::config::{ClientConfig, TransportConfig};
use crate::error::{ClientError, ClientResult};
use crate::transport::{HttpTransport, StdioTransport, Transport};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use toolbridge_core::{
    CallToolParams, CallToolResult, InvocationResult, ListToolsResult, RequestId, RpcRequest,
    ToolDescriptor,
};
use tracing::{debug, warn};
use url::Url;

/// Client for discovering and invoking tools on a remote server.
///
/// Cloning is cheap; clones share the transport and the id sequence.
#[derive(Clone)]
pub struct ToolClient {
    transport: Option<Arc<dyn Transport>>,
    next_id: Arc<AtomicI64>,
}

impl ToolClient {
    /// Create a new client builder.
    pub fn builder() -> ToolClientBuilder {
        ToolClientBuilder::new()
    }

    /// Create a client over an already constructed transport.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_transport(Some(Arc::new(transport)))
    }

    /// Create a client from configuration.
    ///
    /// A stdio transport spawns its server here, so this must run inside a
    /// Tokio runtime.
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        let transport: Option<Arc<dyn Transport>> = match config.transport {
            None => None,
            Some(TransportConfig::Http { base_url }) => {
                Some(Arc::new(HttpTransport::new(&base_url, config.timeout)?))
            }
            Some(TransportConfig::Stdio { command, args }) => Some(Arc::new(
                StdioTransport::spawn(&command, &args)?.with_timeout(config.timeout),
            )),
        };
        Ok(Self::from_transport(transport))
    }

    fn from_transport(transport: Option<Arc<dyn Transport>>) -> Self {
        Self {
            transport,
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// True when a transport is configured.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn next_id(&self) -> RequestId {
        RequestId::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn transport(&self) -> ClientResult<&Arc<dyn Transport>> {
        self.transport
            .as_ref()
            .ok_or(ClientError::TransportUnavailable)
    }

    /// Fetch the server's tool catalogue, in registration order.
    pub async fn list_tools(&self) -> ClientResult<Vec<ToolDescriptor>> {
        let transport = self.transport()?;
        let request = RpcRequest::list_tools(self.next_id());
        debug!(transport = transport.kind(), id = ?request.id, "Listing tools");

        let result = transport
            .exchange(request)
            .await?
            .into_outcome()
            .map_err(ClientError::Remote)?;
        let list: ListToolsResult =
            serde_json::from_value(result).map_err(|e| ClientError::Protocol(e.to_string()))?;
        Ok(list.tools)
    }

    /// Invoke a tool.
    ///
    /// An error envelope from the server (unknown tool, bad arguments, a
    /// failing tool) comes back as the failure outcome of the
    /// `InvocationResult`; `Err` is reserved for calls that never completed.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> ClientResult<InvocationResult> {
        let transport = self.transport()?;
        let id = self.next_id();
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let request = RpcRequest::call_tool(id.clone(), &params)?;
        debug!(transport = transport.kind(), %id, tool = name, "Calling tool");

        let response = transport.exchange(request).await?;
        if response.id.as_ref() != Some(&id) {
            warn!(%id, got = ?response.id, "Response id does not match request");
        }

        let outcome = match response.into_outcome() {
            Ok(result) => Ok(serde_json::from_value::<CallToolResult>(result)
                .map_err(|e| ClientError::Protocol(e.to_string()))?),
            Err(error) => {
                debug!(%id, tool = name, code = %error.code.as_str(), "Tool call failed");
                Err(error)
            }
        };

        Ok(InvocationResult { id, outcome })
    }
}

impl std::fmt::Debug for ToolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolClient")
            .field("transport", &self.transport.as_ref().map(|t| t.kind()))
            .finish()
    }
}

/// Builder for creating a ToolClient.
pub struct ToolClientBuilder {
    http: Option<String>,
    stdio: Option<(String, Vec<String>)>,
    timeout: Duration,
}

impl ToolClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            http: None,
            stdio: None,
            timeout: ClientConfig::default().timeout,
        }
    }

    /// Talk to a server over HTTP at `base_url`.
    pub fn http(mut self, base_url: impl Into<String>) -> Self {
        self.http = Some(base_url.into());
        self.stdio = None;
        self
    }

    /// Spawn `command` and talk to it over stdio.
    pub fn stdio<I, S>(mut self, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stdio = Some((command.into(), args.into_iter().map(Into::into).collect()));
        self.http = None;
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client.
    ///
    /// Without a transport the client still builds; its calls fail with
    /// [`ClientError::TransportUnavailable`].
    pub fn build(self) -> ClientResult<ToolClient> {
        let transport = match (self.http, self.stdio) {
            (Some(url), _) => Some(TransportConfig::Http {
                base_url: Url::parse(&url)?,
            }),
            (None, Some((command, args))) => Some(TransportConfig::Stdio { command, args }),
            (None, None) => None,
        };

        ToolClient::from_config(ClientConfig {
            transport,
            timeout: self.timeout,
        })
    }
}

impl Default for ToolClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
