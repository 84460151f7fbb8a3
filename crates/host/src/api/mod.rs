use crate::config::{AppState, HostConfig};
use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use toolbridge_sdk::ClientError;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Start the API server
pub async fn serve(addr: &str, config: HostConfig) -> Result<()> {
    let state = AppState::new(&config)?;
    tracing::info!(upstream = %state.upstream, "Upstream tool server configured");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handlers::status))
        .route("/api/health", get(handlers::health_check))
        .route("/api/tools", get(handlers::list_tools))
        .route("/api/tools/{name}", post(handlers::call_tool))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Custom error type for API handlers
pub struct ApiError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ApiError {
    pub fn bad_request(error: impl Into<anyhow::Error>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
        }
    }

    /// Map a failed upstream call by whether the tool server answered at all
    pub fn upstream(error: ClientError) -> Self {
        tracing::error!(error = %error, code = error.code().as_str(), "Upstream call failed");
        let (status, context) = match &error {
            e if e.is_transport() => (StatusCode::BAD_GATEWAY, "Upstream tool server unavailable"),
            ClientError::Remote(_) => (
                StatusCode::BAD_GATEWAY,
                "Upstream tool server returned an error",
            ),
            ClientError::Protocol(_) | ClientError::Json(_) => (
                StatusCode::BAD_GATEWAY,
                "Upstream tool server sent an invalid response",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Upstream client misconfigured",
            ),
        };
        Self {
            status,
            error: anyhow::Error::new(error).context(context),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_msg = self.error.to_string();
        let details = self
            .error
            .chain()
            .skip(1)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(": ");

        let response = if details.is_empty() {
            ErrorResponse::new(error_msg)
        } else {
            ErrorResponse::with_details(error_msg, details)
        };

        (self.status, Json(response)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
