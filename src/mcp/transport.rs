//! Per-session transport adapter
//!
//! A session starts life as a [`PendingSession`]: an engine bound to a fresh
//! [`TransportHandle`] but without an identifier. Only a successful
//! `initialize` turns it into an [`McpSession`], and the identifier is minted
//! at that moment. A pending session that never completes its handshake is
//! discarded without ever becoming visible to other requests.
//!
//! # Lifecycle
//!
//! ```text
//! PendingSession::new ──initialize ok──> McpSession ──close()──> released
//!        │
//!        └──initialize rejected──> discard()
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use uuid::Uuid;

use crate::error::{McpHttpError, McpServiceError};
use crate::mcp::engine::{EngineFactory, ProtocolEngine};
use crate::mcp::protocol::{
    ClientMessage, InboundBody, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};

/// Buffered server→client messages per session before a slow stream lags.
const OUTBOUND_CAPACITY: usize = 64;

/// The engine's view of its transport
///
/// Cloneable; every clone publishes onto the same session stream and shares
/// the same cancellation token.
#[derive(Clone)]
pub struct TransportHandle {
    outbound: broadcast::Sender<String>,
    ct: CancellationToken,
}

impl Default for TransportHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportHandle {
    pub fn new() -> Self {
        let (outbound, _) = broadcast::channel(OUTBOUND_CAPACITY);
        Self {
            outbound,
            ct: CancellationToken::new(),
        }
    }

    /// Publishes a notification on the session's server→client stream.
    ///
    /// Returns `false` when no stream is attached; the message is dropped.
    pub fn notify(&self, method: &str, params: Option<Value>) -> bool {
        let notification = JsonRpcNotification::new(method, params);
        match serde_json::to_string(&notification) {
            Ok(payload) => self.outbound.send(payload).is_ok(),
            Err(e) => {
                tracing::error!(error = %e, method, "Failed to encode notification");
                false
            }
        }
    }

    /// Engine-initiated shutdown. Converges on the same teardown as DELETE.
    pub fn shutdown(&self) {
        self.ct.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.ct.is_cancelled()
    }
}

/// A transport/engine pair that has not completed its handshake yet.
pub struct PendingSession {
    transport: TransportHandle,
    engine: Arc<dyn ProtocolEngine>,
}

impl PendingSession {
    pub fn new(factory: &dyn EngineFactory) -> Self {
        let transport = TransportHandle::new();
        let engine = factory.create(transport.clone());
        Self { transport, engine }
    }

    /// Runs the initialize handshake carried by `body`
    ///
    /// # Returns
    ///
    /// * `Ok((session, reply))` - handshake accepted, identifier assigned
    /// * `Err(McpHttpError)` - body is not a lone initialize request or the
    ///   engine rejected it; the pair has already been released
    pub async fn initialize(
        self,
        body: InboundBody,
    ) -> Result<(McpSession, JsonRpcResponse), McpHttpError> {
        let request = match self.take_initialize(body) {
            Ok(request) => request,
            Err(e) => {
                self.discard().await;
                return Err(e);
            }
        };

        let result = self
            .engine
            .handle_request(&request.method, request.params)
            .await;

        match result {
            Ok(value) => {
                let session = McpSession {
                    id: Uuid::new_v4().to_string(),
                    transport: self.transport,
                    engine: self.engine,
                    inbound: Mutex::new(()),
                    stream_attached: AtomicBool::new(false),
                    closed: AtomicBool::new(false),
                    created_at: Instant::now(),
                };
                Ok((session, JsonRpcResponse::success(request.id, value)))
            }
            Err(error) => {
                self.discard().await;
                Err(McpHttpError::InitializeRejected(error))
            }
        }
    }

    fn take_initialize(&self, body: InboundBody) -> Result<JsonRpcRequest, McpHttpError> {
        if !body.contains_initialize() {
            return Err(McpHttpError::NotInitialized);
        }
        if body.messages.len() > 1 {
            return Err(McpHttpError::BatchedInitialize);
        }

        match body.messages.into_iter().next() {
            Some(ClientMessage::Request(request)) => Ok(request),
            _ => Err(McpHttpError::NotInitialized),
        }
    }

    /// Releases a pair whose handshake never completed.
    pub async fn discard(self) {
        self.transport.ct.cancel();
        self.engine.close().await;
    }
}

/// A live session: the transport adapter owning one engine
pub struct McpSession {
    id: String,
    transport: TransportHandle,
    engine: Arc<dyn ProtocolEngine>,
    // Serializes POST processing so messages run in arrival order.
    inbound: Mutex<()>,
    stream_attached: AtomicBool,
    closed: AtomicBool,
    created_at: Instant,
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("age_secs", &self.created_at.elapsed().as_secs())
            .finish()
    }
}

impl McpSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn age_secs(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }

    /// True once teardown ran or any close trigger fired.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.transport.ct.is_cancelled()
    }

    /// Processes every message in a follow-up POST body in order.
    ///
    /// Returns one reply per request; notifications and client responses
    /// produce none.
    pub async fn handle_messages(&self, body: InboundBody) -> Vec<JsonRpcResponse> {
        let _turn = self.inbound.lock().await;
        let mut replies = Vec::new();

        for message in body.messages {
            match message {
                ClientMessage::Request(request) => {
                    tracing::debug!(
                        session_id = %self.id,
                        method = %request.method,
                        "Dispatching request"
                    );
                    let result = if self.is_closed() {
                        Err(McpServiceError::Closed.into())
                    } else {
                        self.engine
                            .handle_request(&request.method, request.params)
                            .await
                    };
                    let reply = JsonRpcResponse::from_result(request.id, result);
                    if let Some(error) = &reply.error {
                        tracing::debug!(
                            session_id = %self.id,
                            method = %request.method,
                            error = %error.message,
                            "Request failed"
                        );
                    }
                    replies.push(reply);
                }
                ClientMessage::Notification(notification) => {
                    self.engine
                        .handle_notification(&notification.method, notification.params)
                        .await;
                }
                ClientMessage::Response { id } => {
                    tracing::debug!(session_id = %self.id, id = %id, "Ignoring client response");
                }
            }
        }

        replies
    }

    /// Attaches the standalone server→client stream.
    ///
    /// # Returns
    ///
    /// * `Ok(receiver)` - the stream's message source
    /// * `Err(McpHttpError::StreamConflict)` - a stream is already attached
    pub fn attach_stream(&self) -> Result<broadcast::Receiver<String>, McpHttpError> {
        if self
            .stream_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(McpHttpError::StreamConflict);
        }
        Ok(self.transport.outbound.subscribe())
    }

    /// Resolves once any close trigger has fired.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.transport.ct.clone().cancelled_owned()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.transport.ct.clone()
    }

    /// Ordered teardown: mark closed, end streams, release the engine.
    ///
    /// Runs its effects at most once; later calls return `false`.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.transport.ct.cancel();
        self.engine.close().await;
        tracing::debug!(
            session_id = %self.id,
            age_secs = self.age_secs(),
            "Session transport closed"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::parse_body;
    use async_trait::async_trait;
    use rmcp::model::ErrorData;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingEngine {
        closes: AtomicUsize,
        notifications: AtomicUsize,
    }

    #[async_trait]
    impl ProtocolEngine for CountingEngine {
        async fn handle_request(
            &self,
            method: &str,
            params: Option<Value>,
        ) -> Result<Value, ErrorData> {
            match method {
                "initialize" if params.is_some() => Ok(json!({"ok": true})),
                "initialize" => Err(crate::error::McpServiceError::InvalidParams(
                    "missing params".to_string(),
                )
                .into()),
                other => Ok(json!({ "method": other })),
            }
        }

        async fn handle_notification(&self, _method: &str, _params: Option<Value>) {
            self.notifications.fetch_add(1, Ordering::SeqCst);
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct SharedFactory(Arc<CountingEngine>);

    impl EngineFactory for SharedFactory {
        fn create(&self, _transport: TransportHandle) -> Arc<dyn ProtocolEngine> {
            self.0.clone()
        }
    }

    fn body(raw: &str) -> InboundBody {
        parse_body(raw.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn successful_handshake_assigns_identifier() {
        let engine = Arc::new(CountingEngine::default());
        let pending = PendingSession::new(&SharedFactory(engine.clone()));

        let (session, reply) = pending
            .initialize(body(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#))
            .await
            .unwrap();

        assert!(Uuid::parse_str(session.id()).is_ok());
        assert_eq!(reply.id, json!(1));
        assert!(!reply.is_error());
        assert_eq!(engine.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_handshake_releases_engine() {
        let engine = Arc::new(CountingEngine::default());
        let pending = PendingSession::new(&SharedFactory(engine.clone()));

        let err = pending
            .initialize(body(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#))
            .await
            .unwrap_err();

        assert!(matches!(err, McpHttpError::InitializeRejected(_)));
        assert_eq!(engine.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_initialize_body_is_not_a_handshake() {
        let engine = Arc::new(CountingEngine::default());
        let pending = PendingSession::new(&SharedFactory(engine.clone()));

        let err = pending
            .initialize(body(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#))
            .await
            .unwrap_err();

        assert!(matches!(err, McpHttpError::NotInitialized));
        assert_eq!(engine.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batched_initialize_is_rejected() {
        let engine = Arc::new(CountingEngine::default());
        let pending = PendingSession::new(&SharedFactory(engine.clone()));

        let err = pending
            .initialize(body(
                r#"[{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}},
                    {"jsonrpc":"2.0","id":2,"method":"ping"}]"#,
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, McpHttpError::BatchedInitialize));
    }

    #[tokio::test]
    async fn close_runs_once_and_blocks_further_requests() {
        let engine = Arc::new(CountingEngine::default());
        let (session, _) = PendingSession::new(&SharedFactory(engine.clone()))
            .initialize(body(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#))
            .await
            .unwrap();

        let (first, second) = tokio::join!(session.close(), session.close());
        assert!(first ^ second);
        assert_eq!(engine.closes.load(Ordering::SeqCst), 1);
        assert!(session.cancellation_token().is_cancelled());

        let replies = session
            .handle_messages(body(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#))
            .await;
        assert!(replies[0].is_error());
    }

    #[tokio::test]
    async fn only_requests_produce_replies() {
        let engine = Arc::new(CountingEngine::default());
        let (session, _) = PendingSession::new(&SharedFactory(engine.clone()))
            .initialize(body(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#))
            .await
            .unwrap();

        let replies = session
            .handle_messages(body(
                r#"[{"jsonrpc":"2.0","method":"notifications/initialized"},
                    {"jsonrpc":"2.0","id":"b","method":"tools/list"},
                    {"jsonrpc":"2.0","id":9,"result":{}}]"#,
            ))
            .await;

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, json!("b"));
        assert_eq!(engine.notifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_stream_conflicts() {
        let engine = Arc::new(CountingEngine::default());
        let (session, _) = PendingSession::new(&SharedFactory(engine))
            .initialize(body(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#))
            .await
            .unwrap();

        let _rx = session.attach_stream().unwrap();
        assert!(matches!(
            session.attach_stream(),
            Err(McpHttpError::StreamConflict)
        ));
    }

    #[tokio::test]
    async fn notify_reaches_attached_stream() {
        let transport = TransportHandle::new();
        assert!(!transport.notify("notifications/message", None));

        let mut rx = transport.outbound.subscribe();
        assert!(transport.notify("notifications/message", Some(json!({"level": "info"}))));
        let payload: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(payload["method"], "notifications/message");

        transport.shutdown();
        assert!(transport.is_closed());
    }
}
