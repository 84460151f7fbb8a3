//! Transport layer for the toolbridge SDK.

pub mod http;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use crate::error::ClientResult;
use async_trait::async_trait;
use toolbridge_core::{RpcRequest, RpcResponse};

/// Carries one request envelope to a server and returns its response.
///
/// Implementations report connection-level faults as
/// [`ClientError::Transport`](crate::ClientError::Transport); an error
/// envelope from the server is a successful exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, request: RpcRequest) -> ClientResult<RpcResponse>;

    /// Short name used in logs
    fn kind(&self) -> &'static str;
}
