// MCP tool server: providers, dispatcher and the stdio / HTTP+SSE bindings

pub mod config;
pub mod http;
pub mod server;
pub mod tools;

pub use config::ServerConfig;
pub use server::McpServer;
