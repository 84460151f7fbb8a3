// Core types and dispatch machinery for the toolbridge protocol

pub mod executor;
pub mod framing;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod types;

pub use executor::{Arguments, ToolExecutor};
pub use framing::{EnvelopeCodec, Frame, MAX_MESSAGE_BYTES};
pub use handler::{ArgValue, ToolArgs, ToolError, ToolHandler, ToolOutput};
pub use protocol::{
    CallToolParams, ErrorCode, InvocationResult, ListToolsResult, RequestId, RpcError, RpcRequest,
    RpcResponse,
};
pub use registry::{RegisteredTool, RegistryError, ToolEntry, ToolRegistry};
pub use types::*;
