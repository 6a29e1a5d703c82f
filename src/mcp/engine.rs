//! Seam between the session transport and the protocol engine
//!
//! A fresh [`ProtocolEngine`] is built for every candidate session by an
//! [`EngineFactory`]. The engine only sees decoded JSON-RPC methods and can
//! reach the client solely through the [`TransportHandle`] it was created with.

use async_trait::async_trait;
use rmcp::model::ErrorData;
use serde_json::Value;
use std::sync::Arc;

use crate::mcp::transport::TransportHandle;

#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Answers one client request. `Err` becomes a JSON-RPC error reply.
    async fn handle_request(&self, method: &str, params: Option<Value>)
        -> Result<Value, ErrorData>;

    /// Consumes one client notification.
    async fn handle_notification(&self, method: &str, params: Option<Value>);

    /// Releases engine resources. Must tolerate repeated calls and calls made
    /// after the transport has started its own teardown.
    async fn close(&self);
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, transport: TransportHandle) -> Arc<dyn ProtocolEngine>;
}
