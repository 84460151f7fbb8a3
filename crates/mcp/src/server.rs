// Request dispatcher shared by both bindings, plus the stdio binding

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use toolbridge_core::protocol::{methods, InitializeResult, ServerInfo};
use toolbridge_core::{
    CallToolParams, CallToolResult, EnvelopeCodec, Frame, ListToolsResult, RequestId, RpcError,
    RpcRequest, RpcResponse, ToolExecutor, ToolRegistry,
};

pub use toolbridge_core::MAX_MESSAGE_BYTES;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Transport-agnostic request handler.
///
/// Both bindings hand it raw messages and write back whatever response it
/// produces; it never fails at the Rust level.
pub struct McpServer {
    executor: Arc<ToolExecutor>,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self::from_executor(Arc::new(ToolExecutor::new(Arc::new(registry))))
    }

    pub fn from_executor(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// Handle one raw envelope (a stdio line or an HTTP body).
    ///
    /// Returns `None` for notifications.
    pub async fn handle_message(&self, raw: &str) -> Option<RpcResponse> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed JSON envelope");
                return Some(RpcResponse::error(
                    None,
                    RpcError::parse_error(format!("Invalid JSON: {}", e)),
                ));
            }
        };

        // Keep the id when the rest of the envelope is unusable
        let id = value.get("id").and_then(RequestId::from_value);

        match serde_json::from_value::<RpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid request envelope");
                Some(RpcResponse::error(
                    id,
                    RpcError::parse_error(format!("Invalid request envelope: {}", e)),
                ))
            }
        }
    }

    /// Handle an already-decoded request
    pub async fn handle_request(&self, request: RpcRequest) -> Option<RpcResponse> {
        tracing::debug!(method = %request.method, id = ?request.id, "Dispatching request");

        let outcome = self.dispatch(&request.method, request.params).await;

        match request.id {
            Some(id) => Some(RpcResponse::from_outcome(Some(id), outcome)),
            None => {
                if let Err(e) = outcome {
                    tracing::debug!(method = %request.method, error = %e, "Notification failed");
                }
                None
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            methods::INITIALIZE => encode(self.initialize()),
            methods::PING => Ok(serde_json::json!({})),
            methods::LIST_TOOLS | methods::TOOLS_LIST => encode(ListToolsResult {
                tools: self.executor.registry().list(),
            }),
            methods::CALL_TOOL | methods::TOOLS_CALL => {
                let params = call_params(params)?;
                encode(self.call_tool(params).await?)
            }
            other => {
                tracing::warn!(method = %other, "Unknown method");
                Err(RpcError::method_not_found(other))
            }
        }
    }

    /// Run a tool on the blocking pool so file I/O never stalls the runtime
    pub async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, RpcError> {
        let executor = self.executor.clone();
        let name = params.name.clone();

        tokio::task::spawn_blocking(move || executor.execute(&params.name, &params.arguments))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(tool = %name, error = %e, "Tool task aborted");
                Err(RpcError::execution(format!(
                    "Tool '{}' did not complete: {}",
                    name, e
                )))
            })
    }

    fn initialize(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: serde_json::json!({ "tools": { "listChanged": false } }),
        }
    }

    /// Serve newline-delimited JSON over process stdin/stdout
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        tracing::info!(
            tools = self.executor.registry().len(),
            "MCP server listening on stdio"
        );
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON over any reader/writer pair.
    ///
    /// Every line is handled on its own task, so responses may be written in
    /// a different order than the requests arrived. A single writer task owns
    /// the output so lines never interleave. Returns once the reader hits EOF
    /// and every in-flight request has been answered.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<RpcResponse>();

        let writer_task = tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, EnvelopeCodec::new());
            while let Some(response) = rx.recv().await {
                let line = serde_json::to_string(&response)
                    .context("Failed to encode response")?;
                sink.send(line).await.context("Failed to write response")?;
            }
            Ok::<_, anyhow::Error>(())
        });

        // The codec caps each line, so an oversized line is never held in memory
        let mut frames = FramedRead::new(reader, EnvelopeCodec::new());

        while let Some(frame) = frames.next().await {
            let line = match frame.context("Failed to read from input")? {
                Frame::Line(line) => line,
                Frame::Oversized => {
                    tracing::warn!(limit = MAX_MESSAGE_BYTES, "Message too large");
                    let _ = tx.send(RpcResponse::error(
                        None,
                        RpcError::parse_error(format!(
                            "Message too large (limit {} bytes)",
                            MAX_MESSAGE_BYTES
                        )),
                    ));
                    continue;
                }
                Frame::NotUtf8 => {
                    tracing::warn!("Message is not valid UTF-8");
                    let _ = tx.send(RpcResponse::error(
                        None,
                        RpcError::parse_error("Message is not valid UTF-8"),
                    ));
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let server = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = server.handle_message(&line).await {
                    // Receiver only goes away if the writer failed
                    let _ = tx.send(response);
                }
            });
        }

        tracing::info!("Input closed, draining in-flight requests");
        drop(tx);
        writer_task.await.context("Writer task panicked")??;
        Ok(())
    }
}

fn call_params(params: Option<Value>) -> Result<CallToolParams, RpcError> {
    let params = params.ok_or_else(|| RpcError::invalid_argument("callTool requires params"))?;
    serde_json::from_value(params)
        .map_err(|e| RpcError::invalid_argument(format!("Invalid callTool params: {}", e)))
}

fn encode<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value)
        .map_err(|e| RpcError::execution(format!("Failed to encode result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use toolbridge_core::ErrorCode;

    use crate::tools::{calculator, storage, KeyValueStore};

    fn server() -> Arc<McpServer> {
        let mut registry = ToolRegistry::new();
        registry.register_all(calculator::tools()).unwrap();
        registry
            .register_all(storage::tools(Arc::new(KeyValueStore::new())))
            .unwrap();
        Arc::new(McpServer::new(registry))
    }

    async fn roundtrip(server: &McpServer, raw: &str) -> Value {
        let response = server.handle_message(raw).await.expect("expected a response");
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_list_tools_in_registration_order() {
        let resp = roundtrip(&server(), r#"{"id": 1, "method": "listTools"}"#).await;
        assert_eq!(resp["id"], 1);
        let tools = resp["result"]["tools"].as_array().unwrap();
        assert_eq!(tools[0]["name"], "add");
        assert_eq!(tools[0]["parameters"][0], json!({"name": "a", "type": "number", "required": true}));
        assert_eq!(tools.len(), 12);
    }

    #[tokio::test]
    async fn test_call_tool_success() {
        let resp = roundtrip(
            &server(),
            r#"{"id": "x-1", "method": "callTool", "params": {"name": "divide", "arguments": {"a": 10, "b": 2}}}"#,
        )
        .await;
        assert_eq!(resp["id"], "x-1");
        assert_eq!(resp["result"], json!({"content": [{"type": "text", "text": "5.0"}]}));
        assert!(resp.get("error").is_none());
    }

    #[tokio::test]
    async fn test_call_tool_failure_is_error_envelope() {
        let resp = roundtrip(
            &server(),
            r#"{"id": 2, "method": "tools/call", "params": {"name": "divide", "arguments": {"a": 1, "b": 0}}}"#,
        )
        .await;
        assert_eq!(resp["id"], 2);
        assert_eq!(resp["error"]["code"], "TOOL_EXECUTION_ERROR");
        assert_eq!(resp["error"]["message"], "Cannot divide by zero");
        assert!(resp.get("result").is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let resp = roundtrip(
            &server(),
            r#"{"id": 3, "method": "callTool", "params": {"name": "teleport"}}"#,
        )
        .await;
        assert_eq!(resp["error"]["code"], "TOOL_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let resp = roundtrip(&server(), r#"{"id": 4, "method": "resources/list"}"#).await;
        assert_eq!(resp["id"], 4);
        assert_eq!(resp["error"]["code"], "METHOD_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let resp = roundtrip(&server(), "{not json").await;
        assert_eq!(resp["id"], Value::Null);
        assert_eq!(resp["error"]["code"], "PARSE_ERROR");
    }

    #[tokio::test]
    async fn test_missing_method_keeps_id() {
        let resp = roundtrip(&server(), r#"{"id": 9, "params": {}}"#).await;
        assert_eq!(resp["id"], 9);
        assert_eq!(resp["error"]["code"], "PARSE_ERROR");
    }

    #[tokio::test]
    async fn test_bad_call_params() {
        let resp = roundtrip(&server(), r#"{"id": 5, "method": "callTool", "params": {"arguments": {}}}"#).await;
        assert_eq!(resp["error"]["code"], "INVALID_ARGUMENT");

        let resp = roundtrip(&server(), r#"{"id": 6, "method": "callTool"}"#).await;
        assert_eq!(resp["error"]["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let server = server();
        assert!(server
            .handle_message(r#"{"method": "notifications/initialized"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let resp = roundtrip(&server(), r#"{"id": 1, "method": "initialize", "params": {}}"#).await;
        assert_eq!(resp["result"]["serverInfo"]["name"], "toolbridge-mcp");
        assert!(resp["result"]["capabilities"]["tools"].is_object());

        let resp = roundtrip(&server(), r#"{"id": 2, "method": "ping"}"#).await;
        assert_eq!(resp["result"], json!({}));
    }

    #[tokio::test]
    async fn test_call_tool_direct() {
        let params = CallToolParams {
            name: "sqrt".to_string(),
            arguments: json!({"number": 16}).as_object().cloned().unwrap(),
        };
        let result = server().call_tool(params).await.unwrap();
        assert_eq!(result.first_text(), Some("4.0"));

        let params = CallToolParams {
            name: "sqrt".to_string(),
            arguments: json!({"number": -4}).as_object().cloned().unwrap(),
        };
        let err = server().call_tool(params).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolExecutionError);
    }

    #[tokio::test]
    async fn test_stdio_session_survives_bad_lines() {
        let (client, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let session = tokio::spawn(server().serve(server_read, server_write));

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"garbage\n\n{\"id\": 1, \"method\": \"nope\"}\n{\"id\": 2, \"method\": \"callTool\", \"params\": {\"name\": \"add\", \"arguments\": {\"a\": 1, \"b\": 2}}}\n")
            .await
            .unwrap();
        client_write.shutdown().await.unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let mut responses = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            responses.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        session.await.unwrap().unwrap();

        assert_eq!(responses.len(), 3);
        let by_id = |id: Value| responses.iter().find(|r| r["id"] == id).cloned().unwrap();
        assert_eq!(by_id(Value::Null)["error"]["code"], "PARSE_ERROR");
        assert_eq!(by_id(json!(1))["error"]["code"], "METHOD_NOT_FOUND");
        assert_eq!(by_id(json!(2))["result"]["content"][0]["text"], "3.0");
    }

    #[tokio::test]
    async fn test_stdio_rejects_invalid_utf8() {
        let (client, server_io) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let session = tokio::spawn(server().serve(server_read, server_write));

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(&[0xff, 0xfe, b'\n']).await.unwrap();
        client_write.write_all(b"{\"id\": 7, \"method\": \"ping\"}\n").await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let mut responses = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            responses.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        session.await.unwrap().unwrap();

        assert_eq!(responses.len(), 2);
        assert!(responses.iter().any(|r| r["error"]["code"] == "PARSE_ERROR"));
        assert!(responses.iter().any(|r| r["id"] == 7 && r["result"] == json!({})));
    }

    /// Feed `input` to a stdio session, close it, and collect every response
    async fn stdio_session(input: Vec<u8>) -> Vec<Value> {
        let (client, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let session = tokio::spawn(server().serve(server_read, server_write));

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(&input).await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let mut responses = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            responses.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        session.await.unwrap().unwrap();
        responses
    }

    #[tokio::test]
    async fn test_stdio_oversized_line_is_parse_error_and_session_continues() {
        let mut input = vec![b'x'; MAX_MESSAGE_BYTES + 10];
        input.push(b'\n');
        input.extend_from_slice(b"{\"id\": 8, \"method\": \"ping\"}\n");

        let responses = stdio_session(input).await;
        assert_eq!(responses.len(), 2);
        let too_large = responses.iter().find(|r| r["id"].is_null()).unwrap();
        assert_eq!(too_large["error"]["code"], "PARSE_ERROR");
        assert!(too_large["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Message too large"));
        assert!(responses.iter().any(|r| r["id"] == 8 && r["result"] == json!({})));
    }

    #[tokio::test]
    async fn test_stdio_unterminated_oversized_input() {
        let responses = stdio_session(vec![b'{'; MAX_MESSAGE_BYTES * 3]).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], "PARSE_ERROR");
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let prefix = r#"{"id": 3, "method": "ping", "params": {"pad": ""#;
        let suffix = r#""}}"#;
        let pad = MAX_MESSAGE_BYTES - prefix.len() - suffix.len();
        let line = format!("{}{}{}\n", prefix, "p".repeat(pad), suffix);
        assert_eq!(line.len(), MAX_MESSAGE_BYTES + 1);

        let responses = stdio_session(line.into_bytes()).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 3);
        assert_eq!(responses[0]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_non_integer_ids_are_echoed() {
        let resp = roundtrip(&server(), r#"{"id": 1.5, "method": "ping"}"#).await;
        assert_eq!(resp["id"], json!(1.5));
        assert_eq!(resp["result"], json!({}));

        let resp = roundtrip(&server(), r#"{"id": 18446744073709551615, "method": "ping"}"#).await;
        assert_eq!(resp["id"], json!(18446744073709551615u64));

        let resp = roundtrip(&server(), r#"{"id": 2.5, "method": "nope"}"#).await;
        assert_eq!(resp["id"], json!(2.5));
        assert_eq!(resp["error"]["code"], "METHOD_NOT_FOUND");
    }
}
