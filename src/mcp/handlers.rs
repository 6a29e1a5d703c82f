//! HTTP request handlers for the `/mcp` endpoint
//!
//! Each handler resolves the `mcp-session-id` header against the
//! [`SessionRegistry`](crate::mcp::SessionRegistry) and forwards the request to
//! the session's transport. A POST without the header is the only way to
//! create a session.
//!
//! | Method | Header valid | Header unknown | Header absent        |
//! |--------|--------------|----------------|----------------------|
//! | POST   | forward      | 400            | new-session attempt  |
//! | GET    | open stream  | 400            | 400                  |
//! | DELETE | terminate    | 400            | 400                  |

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::error::McpHttpError;
use crate::mcp::protocol::{
    is_supported_version, parse_body, InboundBody, MCP_PROTOCOL_VERSION_HEADER,
    MCP_SESSION_ID_HEADER,
};
use crate::mcp::transport::{McpSession, PendingSession};
use crate::AppState;

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Extract session ID from headers.
///
/// A header that is not visible ASCII yields an empty id, which never matches
/// a registered session.
fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .map(|value| value.to_str().map(str::to_owned).unwrap_or_default())
}

fn check_content_type(headers: &HeaderMap) -> Result<(), McpHttpError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"));

    if is_json {
        Ok(())
    } else {
        Err(McpHttpError::UnsupportedMediaType)
    }
}

fn check_protocol_version(headers: &HeaderMap) -> Result<(), McpHttpError> {
    match headers
        .get(MCP_PROTOCOL_VERSION_HEADER)
        .map(|v| v.to_str().unwrap_or_default())
    {
        Some(version) if !is_supported_version(version) => Err(
            McpHttpError::UnsupportedProtocolVersion(version.to_string()),
        ),
        _ => Ok(()),
    }
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return true;
    };

    accept.split(',').any(|part| {
        let media = part.split(';').next().unwrap_or_default().trim();
        matches!(media, "text/event-stream" | "text/*" | "*/*")
    })
}

fn with_session_header(mut response: Response, id: &str) -> Response {
    match HeaderValue::from_str(id) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(HeaderName::from_static(MCP_SESSION_ID_HEADER), value);
        }
        Err(e) => {
            tracing::warn!(session_id = %id, error = %e, "Session id is not a valid header");
        }
    }
    response
}

async fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<McpSession>, McpHttpError> {
    let id = session_id(headers).ok_or(McpHttpError::MissingSession)?;

    match state.sessions.lookup(&id).await {
        Some(session) => Ok(session),
        None => {
            tracing::debug!(session_id = %id, "Unknown session");
            Err(McpHttpError::InvalidSession(id))
        }
    }
}

/// POST /mcp - client→server messages
///
/// # Returns
///
/// * `200 OK` with the JSON-RPC reply (an array for batched bodies)
/// * `202 Accepted` when the body carried no requests
/// * `400 Bad Request` for unknown sessions, malformed bodies or a failed
///   handshake
/// * `415 Unsupported Media Type` when the body is not JSON
pub async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, McpHttpError> {
    check_content_type(&headers)?;

    if session_id(&headers).is_none() {
        let body = parse_body(&body)?;
        return create_session(&state, body).await;
    }

    let session = resolve_session(&state, &headers).await?;
    check_protocol_version(&headers)?;
    let body = parse_body(&body)?;

    if body.contains_initialize() {
        return Err(McpHttpError::AlreadyInitialized);
    }

    let batched = body.batched;
    let has_requests = body.has_requests();
    let replies = session.handle_messages(body).await;

    let response = if !has_requests {
        StatusCode::ACCEPTED.into_response()
    } else if batched {
        Json(replies).into_response()
    } else {
        match replies.into_iter().next() {
            Some(reply) => Json(reply).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        }
    };

    Ok(with_session_header(response, session.id()))
}

/// New-session path: handshake, then register, then reply.
///
/// Registration completes before the reply is built, so the client's next
/// request carrying the returned id always finds the session.
async fn create_session(state: &AppState, body: InboundBody) -> Result<Response, McpHttpError> {
    let pending = PendingSession::new(state.engine_factory.as_ref());

    let (session, reply) = pending.initialize(body).await.inspect_err(|e| {
        tracing::warn!(error = %e, "Rejected session handshake");
    })?;

    let session = state.sessions.register(session).await.map_err(|e| {
        tracing::error!(error = %e, "Session registry invariant violated");
        McpHttpError::Internal
    })?;

    Ok(with_session_header(Json(reply).into_response(), session.id()))
}

/// GET /mcp - server→client notification stream
///
/// # Returns
///
/// * `200 OK` with a `text/event-stream` body
/// * `400 Bad Request` when the session header is missing or unknown
/// * `406 Not Acceptable` when the client does not accept SSE
/// * `409 Conflict` when the session already has a stream
pub async fn mcp_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, McpHttpError> {
    let session = resolve_session(&state, &headers).await?;
    check_protocol_version(&headers)?;

    if !accepts_event_stream(&headers) {
        return Err(McpHttpError::NotAcceptable);
    }

    let rx = session.attach_stream()?;
    tracing::info!(session_id = %session.id(), "SSE stream opened");

    let stream = session_stream(&session, rx);
    let response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
        .into_response();

    Ok(with_session_header(response, session.id()))
}

/// Turns the session's outbound channel into SSE events.
///
/// The stream ends when the session closes. Dropping it (client disconnect)
/// cancels the session, which routes into the registry teardown.
fn session_stream(
    session: &McpSession,
    rx: broadcast::Receiver<String>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let session_id = session.id().to_string();
    let guard = session.cancellation_token().drop_guard();

    BroadcastStream::new(rx)
        .filter_map(move |item| {
            let event = match item {
                Ok(payload) => Some(Ok(Event::default().event("message").data(payload))),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(session_id = %session_id, skipped, "SSE stream lagged");
                    None
                }
            };
            futures::future::ready(event)
        })
        .take_until(session.closed())
        .map(move |event| {
            let _guard = &guard;
            event
        })
}

/// DELETE /mcp - explicit session termination
///
/// # Returns
///
/// * `200 OK` once the session has been torn down
/// * `400 Bad Request` when the session header is missing, unknown or
///   already terminated
pub async fn mcp_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, McpHttpError> {
    let session = resolve_session(&state, &headers).await?;
    check_protocol_version(&headers)?;

    let id = session.id().to_string();
    drop(session);

    if !state.sessions.terminate(&id).await {
        // Another close trigger won the race.
        return Err(McpHttpError::InvalidSession(id));
    }

    Ok(StatusCode::OK.into_response())
}

/// GET /health - liveness probe with the live session count
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.len().await,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn content_type_must_be_json() {
        assert!(check_content_type(&headers(&[("content-type", "application/json")])).is_ok());
        assert!(check_content_type(&headers(&[(
            "content-type",
            "application/json; charset=utf-8"
        )]))
        .is_ok());
        assert!(check_content_type(&headers(&[("content-type", "text/plain")])).is_err());
        assert!(check_content_type(&HeaderMap::new()).is_err());
    }

    #[test]
    fn accept_header_negotiation() {
        assert!(accepts_event_stream(&HeaderMap::new()));
        assert!(accepts_event_stream(&headers(&[(
            "accept",
            "application/json, text/event-stream"
        )])));
        assert!(accepts_event_stream(&headers(&[("accept", "*/*")])));
        assert!(!accepts_event_stream(&headers(&[("accept", "application/json")])));
    }

    #[test]
    fn protocol_version_header_is_optional_but_checked() {
        assert!(check_protocol_version(&HeaderMap::new()).is_ok());
        assert!(check_protocol_version(&headers(&[("mcp-protocol-version", "2025-03-26")])).is_ok());
        assert!(matches!(
            check_protocol_version(&headers(&[("mcp-protocol-version", "2020-01-01")])),
            Err(McpHttpError::UnsupportedProtocolVersion(_))
        ));
    }

    #[test]
    fn session_id_extraction() {
        assert_eq!(session_id(&HeaderMap::new()), None);
        assert_eq!(
            session_id(&headers(&[("mcp-session-id", "abc")])),
            Some("abc".to_string())
        );
    }
}
