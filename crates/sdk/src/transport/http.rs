//! HTTP transport for the toolbridge SDK.

use super::Transport;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use reqwest::header::CONTENT_TYPE;
use toolbridge_core::{RpcRequest, RpcResponse, MAX_MESSAGE_BYTES};
use tracing::debug;
use url::Url;

/// Exchange endpoint, relative to the server base URL
const MESSAGE_PATH: &str = "/mcp/message";

/// Posts each envelope to the server's exchange endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Create a new HTTP transport for the server at `base_url`.
    pub fn new(base_url: &Url, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        let endpoint = base_url.join(MESSAGE_PATH)?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, request: RpcRequest) -> ClientResult<RpcResponse> {
        debug!(url = %self.endpoint, method = %request.method, "POST request");

        let body = serde_json::to_vec(&request)?;
        if body.len() > MAX_MESSAGE_BYTES {
            return Err(ClientError::Protocol(format!(
                "Request is {} bytes, over the {} byte message limit",
                body.len(),
                MAX_MESSAGE_BYTES
            )));
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}
