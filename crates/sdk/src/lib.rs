//! # toolbridge SDK
//!
//! Client for toolbridge tool servers, over HTTP or a spawned stdio process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use toolbridge_sdk::{ToolClient, ClientResult};
//!
//! #[tokio::main]
//! async fn main() -> ClientResult<()> {
//!     let client = ToolClient::builder()
//!         .http("http://localhost:8080")
//!         .build()?;
//!
//!     for tool in client.list_tools().await? {
//!         println!("{}: {}", tool.name, tool.description);
//!     }
//!
//!     let mut args = serde_json::Map::new();
//!     args.insert("a".into(), 10.into());
//!     args.insert("b".into(), 2.into());
//!
//!     let result = client.call_tool("divide", args).await?;
//!     match &result.outcome {
//!         Ok(_) => println!("10 / 2 = {}", result.text().unwrap_or_default()),
//!         Err(e) => println!("failed: {}", e),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Stdio
//!
//! ```rust,no_run
//! # async fn example() -> toolbridge_sdk::ClientResult<()> {
//! let client = toolbridge_sdk::ToolClient::builder()
//!     .stdio("toolbridge-mcp", ["--stdio"])
//!     .build()?;
//! let tools = client.list_tools().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod transport;

// Re-exports for convenience
pub use client::{ToolClient, ToolClientBuilder};
pub use config::{ClientConfig, TransportConfig};
pub use error::{ClientError, ClientResult};
pub use transport::{HttpTransport, StdioTransport, Transport};

// Re-export core types that are commonly used
pub use toolbridge_core::{
    CallToolResult, ContentBlock, ErrorCode, InvocationResult, ParamSpec, ParamType, RequestId,
    RpcError, ToolDescriptor,
};
