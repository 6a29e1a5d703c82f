use railway_mcp::{app, config::ServerConfig, mcp, AppState};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "railway_mcp=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::debug!(?config, "Loaded configuration");

    let state = AppState::new(Arc::new(mcp::PingServiceFactory));
    let app = app::build_app(state.clone(), config.auth_config());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("MCP server on http://{}{}", addr, app::MCP_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(app::shutdown_signal(state.sessions.clone()))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
