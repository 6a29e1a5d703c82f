use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use rmcp::model::{ErrorCode, ErrorData};
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp::protocol::{rpc_error, FramingError, JsonRpcResponse, SERVER_ERROR};

/// Plain-text body for every session-resolution failure.
pub const INVALID_SESSION_MESSAGE: &str = "Invalid or missing session ID";

/// Errors raised while routing a request on the `/mcp` endpoint
///
/// Session-resolution failures answer with a plain-text `400`. Everything else
/// is framed as a JSON-RPC error object with a `null` id so clients can parse
/// it with the same code path as a regular reply.
#[derive(Debug, Error)]
pub enum McpHttpError {
    #[error("Missing session ID")]
    MissingSession,

    #[error("Invalid session ID: {0}")]
    InvalidSession(String),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("Unsupported Media Type: Content-Type must be application/json")]
    UnsupportedMediaType,

    #[error("Not Acceptable: Client must accept text/event-stream")]
    NotAcceptable,

    #[error("Bad Request: Unsupported protocol version {0}")]
    UnsupportedProtocolVersion(String),

    #[error("Conflict: Only one SSE stream is allowed per session")]
    StreamConflict,

    #[error("Bad Request: Server not initialized")]
    NotInitialized,

    #[error("Invalid Request: Server already initialized")]
    AlreadyInitialized,

    #[error("Invalid Request: Only one initialization request is allowed")]
    BatchedInitialize,

    /// The engine refused the initialize request; no session was created.
    #[error("Initialization rejected: {}", .0.message)]
    InitializeRejected(ErrorData),

    #[error("Internal server error")]
    Internal,
}

impl McpHttpError {
    fn status(&self) -> StatusCode {
        match self {
            McpHttpError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            McpHttpError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            McpHttpError::StreamConflict => StatusCode::CONFLICT,
            McpHttpError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_data(&self) -> ErrorData {
        match self {
            McpHttpError::Framing(e) => e.to_error_data(),
            McpHttpError::AlreadyInitialized | McpHttpError::BatchedInitialize => {
                rpc_error(ErrorCode::INVALID_REQUEST, self.to_string())
            }
            McpHttpError::InitializeRejected(data) => data.clone(),
            McpHttpError::Internal => rpc_error(ErrorCode::INTERNAL_ERROR, self.to_string()),
            _ => rpc_error(SERVER_ERROR, self.to_string()),
        }
    }
}

impl IntoResponse for McpHttpError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self {
            McpHttpError::MissingSession | McpHttpError::InvalidSession(_) => {
                (status, INVALID_SESSION_MESSAGE).into_response()
            }
            other => {
                let body = JsonRpcResponse::error(Value::Null, other.error_data());
                (status, Json(body)).into_response()
            }
        }
    }
}

/// Error types for protocol engine operations
///
/// Each variant maps onto a JSON-RPC error code through the
/// `From<McpServiceError>` implementation for [`rmcp::ErrorData`].
///
/// | McpServiceError Variant | MCP Error Code      |
/// |-------------------------|---------------------|
/// | InvalidParams           | INVALID_PARAMS      |
/// | ToolNotFound            | INVALID_PARAMS      |
/// | MethodNotFound          | METHOD_NOT_FOUND    |
/// | Closed                  | INTERNAL_ERROR      |
/// | Internal                | INTERNAL_ERROR      |
#[derive(Debug, Error)]
pub enum McpServiceError {
    /// The request parameters do not match what the method expects.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool {0} not found")]
    ToolNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// The engine was already released by session teardown.
    #[error("Engine is closed")]
    Closed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for McpServiceError {
    fn from(err: serde_json::Error) -> Self {
        McpServiceError::Internal(err.to_string())
    }
}

impl From<McpServiceError> for ErrorData {
    fn from(err: McpServiceError) -> Self {
        let code = match &err {
            McpServiceError::InvalidParams(_) | McpServiceError::ToolNotFound(_) => {
                ErrorCode::INVALID_PARAMS
            }
            McpServiceError::MethodNotFound(_) => ErrorCode::METHOD_NOT_FOUND,
            McpServiceError::Closed | McpServiceError::Internal(_) => ErrorCode::INTERNAL_ERROR,
        };

        rpc_error(code, err.to_string())
    }
}

/// Access guard failures
#[derive(Debug, Error)]
pub enum McpAuthError {
    #[error("Authorization header is required")]
    MissingAuthorizationHeader,

    #[error("Authorization header must be 'Bearer <token>'")]
    InvalidAuthorizationFormat,

    #[error("Invalid access token")]
    InvalidToken,
}

impl IntoResponse for McpAuthError {
    fn into_response(self) -> Response {
        let error_code = match self {
            McpAuthError::MissingAuthorizationHeader => "missing_token",
            McpAuthError::InvalidAuthorizationFormat => "invalid_request",
            McpAuthError::InvalidToken => "invalid_token",
        };

        let body = json!({
            "error": error_code,
            "error_description": self.to_string(),
        });

        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        response
    }
}

/// Startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid port number, got '{0}'")]
    InvalidPort(String),

    #[error("HOST must be a valid IP address, got '{0}'")]
    InvalidHost(String),
}
