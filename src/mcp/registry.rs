//! Thread-safe session registry
//!
//! Maps session identifiers to live [`McpSession`]s. The registry is an
//! explicitly constructed value shared through [`crate::AppState`]; it starts
//! empty and [`SessionRegistry::shutdown_all`] releases whatever is left.
//! All mutation goes through a single `RwLock` so `register`, `remove` and
//! `lookup` are atomic with respect to each other.

use crate::mcp::transport::McpSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Session already registered: {0}")]
    AlreadyRegistered(String),
}

/// Registry of live sessions keyed by session identifier
///
/// Cloning is cheap; every clone refers to the same map.
///
/// # Examples
///
/// ```rust,no_run
/// use railway_mcp::mcp::registry::SessionRegistry;
///
/// # async fn example() {
/// let registry = SessionRegistry::new();
/// assert!(registry.lookup("unknown").await.is_none());
/// assert!(!registry.terminate("unknown").await);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<McpSession>>>>,
}

impl SessionRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session that just completed its handshake
    ///
    /// Also starts a watcher that tears the session down once any close
    /// trigger fires (stream disconnect, engine shutdown).
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<McpSession>)` - Session is now reachable by its id
    /// * `Err(RegistryError::AlreadyRegistered)` - Id collision; the candidate
    ///   session has been closed
    pub async fn register(&self, session: McpSession) -> Result<Arc<McpSession>, RegistryError> {
        let id = session.id().to_string();
        let session = Arc::new(session);

        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&id) {
                drop(sessions);
                session.close().await;
                return Err(RegistryError::AlreadyRegistered(id));
            }
            sessions.insert(id.clone(), Arc::clone(&session));
        }

        let registry = self.clone();
        let closed = session.closed();
        let watched_id = id.clone();
        tokio::spawn(async move {
            closed.await;
            registry.terminate(&watched_id).await;
        });

        tracing::info!(session_id = %id, "Session registered");
        Ok(session)
    }

    /// Looks up a live session
    ///
    /// Sessions whose teardown has already been triggered are reported as
    /// missing.
    pub async fn lookup(&self, id: &str) -> Option<Arc<McpSession>> {
        self.sessions
            .read()
            .await
            .get(id)
            .filter(|session| !session.is_closed())
            .map(Arc::clone)
    }

    /// Removes a session from the map without closing it. Idempotent.
    pub async fn remove(&self, id: &str) -> Option<Arc<McpSession>> {
        self.sessions.write().await.remove(id)
    }

    /// Removes and closes a session
    ///
    /// Every close trigger ends up here. Only the caller that actually removes
    /// the entry runs the teardown, so it happens at most once per session.
    ///
    /// # Returns
    ///
    /// * `true` - This call tore the session down
    /// * `false` - No such session (never issued or already removed)
    pub async fn terminate(&self, id: &str) -> bool {
        let Some(session) = self.remove(id).await else {
            return false;
        };

        session.close().await;
        tracing::info!(session_id = %id, "Session terminated");
        true
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Closes every registered session, leaving the registry empty
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();

        for (id, session) in sessions {
            if session.close().await {
                tracing::info!(session_id = %id, "Session closed during shutdown");
            }
        }
    }
}
