use crate::error::McpAuthError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Server-wide bearer credential for the access guard
///
/// When no token is configured every request passes.
#[derive(Clone, Default)]
pub struct AuthConfig {
    token: Option<Arc<str>>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl AuthConfig {
    /// An empty token counts as unset. Any other value is matched verbatim.
    pub fn new(token: Option<String>) -> Self {
        let token = token.filter(|t| !t.is_empty()).map(Arc::from);
        Self { token }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Checks the `Authorization` header against the configured token
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), McpAuthError> {
        let Some(expected) = self.token.as_deref() else {
            return Ok(());
        };

        let presented = extract_bearer_token(headers)?;
        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(McpAuthError::InvalidToken)
        }
    }
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, McpAuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(McpAuthError::MissingAuthorizationHeader)?
        .to_str()
        .map_err(|_| McpAuthError::InvalidAuthorizationFormat)?;

    auth_header
        .strip_prefix("Bearer ")
        .ok_or(McpAuthError::InvalidAuthorizationFormat)
}

/// Access guard wrapping the whole router
///
/// Runs before CORS and before any session lookup; a rejected request never
/// reaches the router.
pub async fn bearer_auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, McpAuthError> {
    if let Err(err) = auth.verify(request.headers()) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            reason = %err,
            "MCP request rejected by access guard"
        );
        return Err(err);
    }

    Ok(next.run(request).await)
}
