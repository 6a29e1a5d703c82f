pub mod test_helpers {
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Request},
        response::Response,
        Router,
    };
    use rmcp::model::ErrorData;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::app::{build_app, MCP_PATH};
    use crate::mcp::protocol::{parse_body, MCP_SESSION_ID_HEADER};
    use crate::mcp::{
        EngineFactory, McpSession, PendingSession, PingService, ProtocolEngine, TransportHandle,
    };
    use crate::middleware::AuthConfig;
    use crate::AppState;

    /// [`PingService`] wrapper that counts how often sessions release their engine
    pub struct RecordingEngine {
        inner: PingService,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProtocolEngine for RecordingEngine {
        async fn handle_request(
            &self,
            method: &str,
            params: Option<Value>,
        ) -> Result<Value, ErrorData> {
            self.inner.handle_request(method, params).await
        }

        async fn handle_notification(&self, method: &str, params: Option<Value>) {
            self.inner.handle_notification(method, params).await
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close().await
        }
    }

    #[derive(Clone, Default)]
    pub struct RecordingFactory {
        created: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl RecordingFactory {
        pub fn created_count(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }

        pub fn closed_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl EngineFactory for RecordingFactory {
        fn create(&self, transport: TransportHandle) -> Arc<dyn ProtocolEngine> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(RecordingEngine {
                inner: PingService::new(transport),
                closes: Arc::clone(&self.closes),
            })
        }
    }

    pub fn initialize_request(id: i64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            }
        })
    }

    pub fn tool_call_request(id: i64, name: &str, arguments: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        })
    }

    /// Runs a handshake outside HTTP and returns the unregistered session
    pub async fn initialized_session(factory: &dyn EngineFactory) -> McpSession {
        let body = parse_body(initialize_request(1).to_string().as_bytes())
            .expect("initialize request should parse");
        let (session, _) = PendingSession::new(factory)
            .initialize(body)
            .await
            .expect("handshake should succeed");
        session
    }

    /// Builds the full router around a fresh registry
    pub fn test_app(factory: Arc<dyn EngineFactory>, auth: AuthConfig) -> (Router, AppState) {
        let state = AppState::new(factory);
        (build_app(state.clone(), auth), state)
    }

    pub fn post_request(session_id: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(MCP_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream");
        if let Some(id) = session_id {
            builder = builder.header(MCP_SESSION_ID_HEADER, id);
        }
        builder
            .body(Body::from(body.to_string()))
            .expect("valid request")
    }

    pub fn get_request(session_id: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("GET")
            .uri(MCP_PATH)
            .header(header::ACCEPT, "text/event-stream");
        if let Some(id) = session_id {
            builder = builder.header(MCP_SESSION_ID_HEADER, id);
        }
        builder.body(Body::empty()).expect("valid request")
    }

    pub fn delete_request(session_id: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("DELETE").uri(MCP_PATH);
        if let Some(id) = session_id {
            builder = builder.header(MCP_SESSION_ID_HEADER, id);
        }
        builder.body(Body::empty()).expect("valid request")
    }

    pub async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body")
            .to_vec()
    }

    pub async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).expect("Failed to parse JSON")
    }

    pub async fn body_text(response: Response) -> String {
        String::from_utf8(body_bytes(response).await).expect("Body is not UTF-8")
    }

    pub fn response_session_id(response: &Response) -> Option<String> {
        response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    /// Performs the initialize handshake over HTTP and returns the session id
    pub async fn initialize_session(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(post_request(None, &initialize_request(1)))
            .await
            .expect("Failed to execute request");
        assert!(
            response.status().is_success(),
            "initialize failed: {}",
            response.status()
        );
        response_session_id(&response).expect("initialize response carries a session id")
    }
}
