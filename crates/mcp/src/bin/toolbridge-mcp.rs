// Standalone MCP server binary

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use toolbridge_mcp::tools::{default_registry, FileWorkspace, KeyValueStore};
use toolbridge_mcp::{http, McpServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "toolbridge-mcp")]
#[command(about = "Tool server speaking the toolbridge protocol over HTTP+SSE or stdio", long_about = None)]
struct Args {
    /// Serve over stdin/stdout instead of HTTP
    #[arg(long)]
    stdio: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "toolbridge.toml")]
    config: PathBuf,

    /// Host to bind to (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory used by the file tools (overrides the config file)
    #[arg(short, long, env = "TOOLBRIDGE_WORKSPACE")]
    workspace_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the protocol in stdio mode, so logs always go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolbridge=info,tower_http=debug".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::info!("Toolbridge MCP server starting...");

    let mut config = ServerConfig::load(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.workspace_dir {
        config.workspace.dir = dir;
    }

    let workspace = Arc::new(FileWorkspace::new(&config.workspace.dir)?);
    tracing::info!("Workspace directory: {}", workspace.root().display());

    let registry = default_registry(workspace, Arc::new(KeyValueStore::new()))?;
    tracing::info!("Registered {} tools", registry.len());

    let server = Arc::new(McpServer::new(registry));

    if args.stdio {
        server.serve_stdio().await?;
    } else {
        http::serve(&config.listen_addr(), server).await?;
    }

    Ok(())
}
