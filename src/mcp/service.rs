//! MCP protocol engine for the railway server
//!
//! [`PingService`] interprets decoded JSON-RPC methods for one session and
//! exposes a single `ping` tool. It is created per session by
//! [`PingServiceFactory`] and talks back to the client only through its
//! [`TransportHandle`].
//!
//! # Supported methods
//!
//! * `initialize` - validates client info and negotiates the protocol version
//! * `ping` - protocol liveness check, returns `{}`
//! * `tools/list` - lists the `ping` tool
//! * `tools/call` - runs `ping`, answering `pong` or `pong: <message>`

use async_trait::async_trait;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolResult, Content, ErrorData, Implementation, ProtocolVersion, ServerCapabilities,
    ServerInfo, Tool,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::McpServiceError;
use crate::mcp::engine::{EngineFactory, ProtocolEngine};
use crate::mcp::protocol::{is_supported_version, LATEST_PROTOCOL_VERSION};
use crate::mcp::transport::TransportHandle;

pub const SERVER_NAME: &str = "railway-mcp";

const PING_TOOL: &str = "ping";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    protocol_version: String,
    #[serde(rename = "capabilities")]
    _capabilities: Map<String, Value>,
    client_info: ClientInfo,
}

#[derive(Debug, Deserialize)]
struct ClientInfo {
    name: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct PingArgs {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Default)]
struct EngineState {
    initialized: AtomicBool,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct PingService {
    transport: TransportHandle,
    state: Arc<EngineState>,
}

impl PingService {
    pub fn new(transport: TransportHandle) -> Self {
        Self {
            transport,
            state: Arc::new(EngineState::default()),
        }
    }

    /// True once the client sent `notifications/initialized`.
    pub fn is_initialized(&self) -> bool {
        self.state.initialized.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Tool definition advertised by `tools/list`
    pub fn ping_tool() -> Tool {
        let schema = json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Optional text echoed back after 'pong'"
                }
            }
        });
        let schema_map = match schema {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Tool {
            name: PING_TOOL.into(),
            title: Some("Ping".to_string()),
            description: Some("Returns 'pong'".into()),
            input_schema: Arc::new(schema_map),
            output_schema: None,
            annotations: None,
            icons: None,
        }
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, McpServiceError> {
        let params: InitializeParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| McpServiceError::InvalidParams(e.to_string()))?;

        let protocol_version = if is_supported_version(&params.protocol_version) {
            params.protocol_version.as_str()
        } else {
            LATEST_PROTOCOL_VERSION
        };

        tracing::info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            requested = %params.protocol_version,
            negotiated = protocol_version,
            "Client initializing"
        );

        let info = self.get_info();
        Ok(json!({
            "protocolVersion": protocol_version,
            "capabilities": info.capabilities,
            "serverInfo": info.server_info,
            "instructions": info.instructions,
        }))
    }

    fn call_tool(&self, params: Option<Value>) -> Result<Value, McpServiceError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| McpServiceError::InvalidParams(e.to_string()))?;

        if params.name != PING_TOOL {
            return Err(McpServiceError::ToolNotFound(params.name));
        }

        let args: PingArgs = match params.arguments {
            Some(arguments) => serde_json::from_value(Value::Object(arguments))
                .map_err(|e| McpServiceError::InvalidParams(e.to_string()))?,
            None => PingArgs::default(),
        };

        let text = match args.message.as_deref() {
            Some(message) if !message.is_empty() => format!("pong: {}", message),
            _ => "pong".to_string(),
        };

        self.transport.notify(
            "notifications/message",
            Some(json!({
                "level": "info",
                "logger": PING_TOOL,
                "data": text,
            })),
        );

        let result = CallToolResult::success(vec![Content::text(text)]);
        Ok(serde_json::to_value(&result)?)
    }

    fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, McpServiceError> {
        if self.is_closed() {
            return Err(McpServiceError::Closed);
        }

        match method {
            "initialize" => self.initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": [Self::ping_tool()] })),
            "tools/call" => self.call_tool(params),
            other => Err(McpServiceError::MethodNotFound(other.to_string())),
        }
    }
}

#[async_trait]
impl ProtocolEngine for PingService {
    async fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, ErrorData> {
        self.dispatch(method, params).map_err(Into::into)
    }

    async fn handle_notification(&self, method: &str, _params: Option<Value>) {
        match method {
            "notifications/initialized" => {
                self.state.initialized.store(true, Ordering::Release);
                tracing::debug!("Client finished initialization");
            }
            "notifications/cancelled" => tracing::debug!("Client cancelled a request"),
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    async fn close(&self) {
        if !self.state.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Ping engine released");
        }
    }
}

impl ServerHandler for PingService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_logging()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                website_url: None,
                icons: None,
            },
            instructions: Some("Call the 'ping' tool to check connectivity".to_string()),
        }
    }
}

/// Builds one [`PingService`] per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingServiceFactory;

impl EngineFactory for PingServiceFactory {
    fn create(&self, transport: TransportHandle) -> Arc<dyn ProtocolEngine> {
        Arc::new(PingService::new(transport))
    }
}
