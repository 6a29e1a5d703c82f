//! JSON-RPC framing for the Streamable HTTP endpoint
//!
//! Turns raw POST bodies into [`ClientMessage`]s and carries the outgoing
//! [`JsonRpcResponse`] and [`JsonRpcNotification`] shapes. Message
//! interpretation belongs to the protocol engine; this module only knows the
//! envelope.

use rmcp::model::{ErrorCode, ErrorData};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Header carrying the server-assigned session identifier.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header a client uses to state the negotiated protocol revision.
pub const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Protocol revisions the server speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

pub const LATEST_PROTOCOL_VERSION: &str = SUPPORTED_PROTOCOL_VERSIONS[0];

pub const INITIALIZE_METHOD: &str = "initialize";

/// Server-defined JSON-RPC code used for transport-level rejections.
pub const SERVER_ERROR: ErrorCode = ErrorCode(-32000);

pub fn is_supported_version(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}

/// Builds a JSON-RPC error object.
pub fn rpc_error(code: ErrorCode, message: impl Into<String>) -> ErrorData {
    let message: String = message.into();
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid Request: {0}")]
    Invalid(String),
}

impl FramingError {
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            FramingError::Parse(_) => rpc_error(ErrorCode::PARSE_ERROR, self.to_string()),
            FramingError::Invalid(_) => rpc_error(ErrorCode::INVALID_REQUEST, self.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorData>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: ErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_result(id: Value, result: Result<Value, ErrorData>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::error(id, error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One message sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// Reply to a server-initiated request; carries only the id we care about.
    Response { id: Value },
}

impl ClientMessage {
    pub fn from_value(value: Value) -> Result<Self, FramingError> {
        let object = value
            .as_object()
            .ok_or_else(|| FramingError::Invalid("message must be a JSON object".to_string()))?;

        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(FramingError::Invalid(
                "jsonrpc field must be \"2.0\"".to_string(),
            ));
        }

        if object.contains_key("method") {
            if !object.get("method").is_some_and(Value::is_string) {
                return Err(FramingError::Invalid("method must be a string".to_string()));
            }

            return match object.get("id") {
                None => Ok(ClientMessage::Notification(serde_json::from_value(value)?)),
                Some(id) if id.is_string() || id.is_number() => {
                    Ok(ClientMessage::Request(serde_json::from_value(value)?))
                }
                Some(_) => Err(FramingError::Invalid(
                    "id must be a string or a number".to_string(),
                )),
            };
        }

        match object.get("id") {
            Some(id) if object.contains_key("result") || object.contains_key("error") => {
                Ok(ClientMessage::Response { id: id.clone() })
            }
            _ => Err(FramingError::Invalid(
                "message is neither a request, a notification nor a response".to_string(),
            )),
        }
    }

    pub fn is_initialize(&self) -> bool {
        matches!(self, ClientMessage::Request(request) if request.method == INITIALIZE_METHOD)
    }

    pub fn is_request(&self) -> bool {
        matches!(self, ClientMessage::Request(_))
    }
}

/// A decoded POST body.
#[derive(Debug, Clone)]
pub struct InboundBody {
    pub messages: Vec<ClientMessage>,
    /// The body was a JSON array; replies go back as an array too.
    pub batched: bool,
}

impl InboundBody {
    pub fn contains_initialize(&self) -> bool {
        self.messages.iter().any(ClientMessage::is_initialize)
    }

    pub fn has_requests(&self) -> bool {
        self.messages.iter().any(ClientMessage::is_request)
    }
}

pub fn parse_body(bytes: &[u8]) -> Result<InboundBody, FramingError> {
    let value: Value = serde_json::from_slice(bytes)?;

    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(FramingError::Invalid("empty batch".to_string()));
            }
            let messages = items
                .into_iter()
                .map(ClientMessage::from_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(InboundBody {
                messages,
                batched: true,
            })
        }
        other => Ok(InboundBody {
            messages: vec![ClientMessage::from_value(other)?],
            batched: false,
        }),
    }
}
