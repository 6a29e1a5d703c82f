//! Stateful MCP sessions over Streamable HTTP
//!
//! A stream of independent HTTP requests on `/mcp` is bound to long-lived
//! sessions identified by the `mcp-session-id` header.
//!
//! # Architecture
//!
//! - [`SessionRegistry`] - Thread-safe map from session id to live session
//! - [`PendingSession`] / [`McpSession`] - Per-session transport adapter
//! - [`ProtocolEngine`] / [`EngineFactory`] - Seam to the protocol engine
//! - [`PingService`] - The engine shipped with the server
//! - [`mcp_post`], [`mcp_get`], [`mcp_delete`] - HTTP request router
//!
//! # Example
//!
//! ```rust,no_run
//! use railway_mcp::{app::build_app, mcp::PingServiceFactory, middleware::AuthConfig, AppState};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(Arc::new(PingServiceFactory));
//! let app = build_app(state.clone(), AuthConfig::disabled());
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//!
//! state.sessions.shutdown_all().await;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod transport;

pub use engine::{EngineFactory, ProtocolEngine};
pub use handlers::{mcp_delete, mcp_get, mcp_post};
pub use registry::{RegistryError, SessionRegistry};
pub use service::{PingService, PingServiceFactory};
pub use transport::{McpSession, PendingSession, TransportHandle};
