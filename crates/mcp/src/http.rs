// HTTP + SSE binding

use crate::server::McpServer;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use toolbridge_core::{RpcError, RpcResponse, MAX_MESSAGE_BYTES};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Path of the request/response exchange endpoint
pub const MESSAGE_PATH: &str = "/mcp/message";
/// Path of the server-to-client event stream
pub const SSE_PATH: &str = "/sse";

/// Start the HTTP binding on `addr`
pub async fn serve(addr: &str, server: Arc<McpServer>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        tools = server.executor().registry().len(),
        "MCP server listening on http://{}",
        addr
    );

    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    Ok(())
}

/// Create the MCP router
pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route(SSE_PATH, get(open_event_stream))
        .route(MESSAGE_PATH, post(exchange))
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_BYTES))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(server)
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// One envelope in, one envelope out.
///
/// The body is taken raw so that malformed envelopes still get a
/// `PARSE_ERROR` envelope instead of an HTTP rejection.
async fn exchange(
    State(server): State<Arc<McpServer>>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    tracing::debug!(session = ?query.session_id, bytes = body.len(), "Exchange request");

    let response = match std::str::from_utf8(&body) {
        Ok(raw) => server.handle_message(raw).await,
        Err(_) => Some(RpcResponse::error(
            None,
            RpcError::parse_error("Message is not valid UTF-8"),
        )),
    };

    match response {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Long-lived event stream for server-initiated notifications.
///
/// The first event tells the client where to post envelopes; tool results
/// are never delivered here.
async fn open_event_stream(
    State(_server): State<Arc<McpServer>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = uuid::Uuid::new_v4();
    tracing::info!(session = %session_id, "Event stream opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}?sessionId={}", MESSAGE_PATH, session_id));

    let events = stream::once(async move { Ok(endpoint) }).chain(stream::pending());

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "UP",
        "service": env!("CARGO_PKG_NAME"),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

async fn service_info() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "toolbridge MCP server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "sse": SSE_PATH,
            "mcp": MESSAGE_PATH,
        },
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{calculator, storage, KeyValueStore};
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use toolbridge_core::ToolRegistry;
    use tower::ServiceExt;

    fn app() -> Router {
        let mut registry = ToolRegistry::new();
        registry.register_all(calculator::tools()).unwrap();
        registry
            .register_all(storage::tools(Arc::new(KeyValueStore::new())))
            .unwrap();
        router(Arc::new(McpServer::new(registry)))
    }

    async fn post_message(app: Router, body: impl Into<Body>) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(MESSAGE_PATH)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body.into())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_call_tool_over_http() {
        let (status, body) = post_message(
            app(),
            json!({"id": 11, "method": "callTool", "params": {"name": "sqrt", "arguments": {"number": 16}}})
                .to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 11);
        assert_eq!(body["result"]["content"][0]["text"], "4.0");
    }

    #[tokio::test]
    async fn test_list_tools_over_http() {
        let (_, body) = post_message(app(), r#"{"id": "l", "method": "listTools"}"#).await;
        assert_eq!(body["id"], "l");
        assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error_not_http_error() {
        let (status, body) = post_message(app(), "{\"id\": 1,").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"]["code"], "PARSE_ERROR");

        let (status, body) = post_message(app(), vec![0xffu8, 0x00]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"]["code"], "PARSE_ERROR");
    }

    #[tokio::test]
    async fn test_body_over_message_limit_is_rejected() {
        let content = "x".repeat(MAX_MESSAGE_BYTES);
        let body = json!({"id": 1, "method": "callTool",
            "params": {"name": "writeFile", "arguments": {"filename": "big", "content": content}}});
        let (status, _) = post_message(app(), body.to_string()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let (status, body) = post_message(
            app(),
            json!({"id": 2, "method": "callTool", "params": {"name": "count", "arguments": {}}})
                .to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 2);
    }

    #[tokio::test]
    async fn test_unknown_method_over_http() {
        let (_, body) = post_message(app(), r#"{"id": 3, "method": "prompts/list"}"#).await;
        assert_eq!(body["error"]["code"], "METHOD_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_notification_is_accepted() {
        let (status, body) =
            post_message(app(), r#"{"method": "notifications/initialized"}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_event_stream_announces_endpoint() {
        let response = app()
            .oneshot(Request::builder().uri(SSE_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        let mut data = response.into_body().into_data_stream();
        let first = data.next().await.unwrap().unwrap();
        let text = String::from_utf8(first.to_vec()).unwrap();
        assert!(text.starts_with("event: endpoint\n"));
        assert!(text.contains("data: /mcp/message?sessionId="));
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "UP");
    }
}
