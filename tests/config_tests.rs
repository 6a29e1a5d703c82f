use std::{collections::HashMap, env};

use railway_mcp::{
    config::{ServerConfig, DEFAULT_HOST, DEFAULT_PORT},
    error::ConfigError,
};
use serial_test::serial;

#[derive(Default)]
struct EnvGuard {
    original: HashMap<String, Option<String>>,
}

impl EnvGuard {
    fn set(&mut self, key: &str, value: impl Into<String>) {
        self.original
            .entry(key.to_string())
            .or_insert_with(|| env::var(key).ok());
        env::set_var(key, value.into());
    }

    fn remove(&mut self, key: &str) {
        self.original
            .entry(key.to_string())
            .or_insert_with(|| env::var(key).ok());
        env::remove_var(key);
    }

    fn clear_server_vars(&mut self) {
        for key in ["HOST", "PORT", "MCP_AUTH_TOKEN"] {
            self.remove(key);
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.original.drain() {
            match value {
                Some(v) => env::set_var(&key, v),
                None => env::remove_var(&key),
            }
        }
    }
}

#[test]
#[serial]
fn defaults_apply_when_unset() {
    let mut env_guard = EnvGuard::default();
    env_guard.clear_server_vars();

    let config = ServerConfig::from_env().expect("defaults are valid");

    assert_eq!(config.host, DEFAULT_HOST);
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.socket_addr().to_string(), "0.0.0.0:3000");
    assert!(config.auth_token.is_none());
    assert!(!config.auth_config().is_enabled());
}

#[test]
#[serial]
fn reads_port_host_and_token() {
    let mut env_guard = EnvGuard::default();
    env_guard.set("HOST", "127.0.0.1");
    env_guard.set("PORT", "8081");
    env_guard.set("MCP_AUTH_TOKEN", "s3cret");

    let config = ServerConfig::from_env().unwrap();

    assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8081");
    assert_eq!(config.auth_token.as_deref(), Some("s3cret"));
    assert!(config.auth_config().is_enabled());
}

#[test]
#[serial]
fn invalid_port_is_rejected() {
    let mut env_guard = EnvGuard::default();
    env_guard.clear_server_vars();

    env_guard.set("PORT", "not-a-port");
    assert!(matches!(
        ServerConfig::from_env(),
        Err(ConfigError::InvalidPort(ref value)) if value == "not-a-port"
    ));

    env_guard.set("PORT", "70000");
    assert!(matches!(
        ServerConfig::from_env(),
        Err(ConfigError::InvalidPort(_))
    ));
}

#[test]
#[serial]
fn invalid_host_is_rejected() {
    let mut env_guard = EnvGuard::default();
    env_guard.clear_server_vars();
    env_guard.set("HOST", "localhost:80");

    assert!(matches!(
        ServerConfig::from_env(),
        Err(ConfigError::InvalidHost(_))
    ));
}

#[test]
#[serial]
fn blank_values_fall_back() {
    let mut env_guard = EnvGuard::default();
    env_guard.set("HOST", "  ");
    env_guard.set("PORT", "");
    env_guard.set("MCP_AUTH_TOKEN", "");

    let config = ServerConfig::from_env().unwrap();

    assert_eq!(config.host, DEFAULT_HOST);
    assert_eq!(config.port, DEFAULT_PORT);
    assert!(config.auth_token.is_none());
    assert!(!config.auth_config().is_enabled());
}

#[test]
#[serial]
fn auth_token_is_kept_verbatim() {
    let mut env_guard = EnvGuard::default();
    env_guard.clear_server_vars();
    env_guard.set("MCP_AUTH_TOKEN", " padded ");

    let config = ServerConfig::from_env().unwrap();

    assert_eq!(config.auth_token.as_deref(), Some(" padded "));
    assert!(config.auth_config().is_enabled());
}

#[test]
#[serial]
fn debug_output_redacts_token() {
    let mut env_guard = EnvGuard::default();
    env_guard.clear_server_vars();
    env_guard.set("MCP_AUTH_TOKEN", "do-not-print");

    let config = ServerConfig::from_env().unwrap();
    let rendered = format!("{:?}", config);

    assert!(!rendered.contains("do-not-print"));
    assert!(rendered.contains("<redacted>"));
    assert!(!format!("{:?}", config.auth_config()).contains("do-not-print"));
}
