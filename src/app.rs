//! Router assembly and shutdown
//!
//! Layer order, outermost first: trace, access guard, CORS, handlers. The
//! guard sees every request, including CORS preflights and `/health`.

use axum::{
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::mcp::handlers::{health, mcp_delete, mcp_get, mcp_post};
use crate::mcp::protocol::{MCP_PROTOCOL_VERSION_HEADER, MCP_SESSION_ID_HEADER};
use crate::mcp::SessionRegistry;
use crate::middleware::{bearer_auth_middleware, AuthConfig};
use crate::AppState;

pub const MCP_PATH: &str = "/mcp";

/// CORS policy for the MCP endpoint
///
/// Authorization and the MCP headers must be listed explicitly; browsers do
/// not cover them with a wildcard.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(MCP_SESSION_ID_HEADER),
            HeaderName::from_static(MCP_PROTOCOL_VERSION_HEADER),
        ])
        .expose_headers([HeaderName::from_static(MCP_SESSION_ID_HEADER)])
        .max_age(Duration::from_secs(3600))
}

pub fn build_app(state: AppState, auth: AuthConfig) -> Router {
    Router::new()
        .route(MCP_PATH, post(mcp_post).get(mcp_get).delete(mcp_delete))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors_layer())
        .layer(middleware::from_fn_with_state(auth, bearer_auth_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Resolves on Ctrl-C or SIGTERM, after closing every session
///
/// Closing the sessions ends their SSE streams, which lets
/// `axum::serve(..).with_graceful_shutdown(..)` finish.
pub async fn shutdown_signal(sessions: SessionRegistry) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    close_sessions(&sessions).await;
}

/// Terminates every live session on the way out.
pub async fn close_sessions(sessions: &SessionRegistry) {
    let live = sessions.len().await;
    tracing::info!(sessions = live, "Shutdown requested, closing sessions");
    sessions.shutdown_all().await;
}
