use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::warn;

use crate::error::ConfigError;
use crate::middleware::AuthConfig;

pub const DEFAULT_PORT: u16 = 3000;

pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

#[derive(Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub auth_token: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            auth_token: None,
        }
    }
}

impl ServerConfig {
    /// Reads `HOST`, `PORT` and `MCP_AUTH_TOKEN`
    ///
    /// Blank `HOST`/`PORT` fall back to their defaults; only an empty
    /// `MCP_AUTH_TOKEN` leaves the access guard disabled.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = match non_empty_var("HOST") {
            Some(value) => value
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidHost(value))?,
            None => DEFAULT_HOST,
        };

        let port = match non_empty_var("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(value))?,
            None => DEFAULT_PORT,
        };

        // Kept verbatim; the access guard compares it byte for byte.
        let auth_token = env::var("MCP_AUTH_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());
        if auth_token.is_none() {
            warn!("MCP_AUTH_TOKEN not set; requests are not authenticated");
        }

        Ok(Self {
            host,
            port,
            auth_token,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.auth_token.clone())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
