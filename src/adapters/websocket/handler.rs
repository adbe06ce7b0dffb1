//! WebSocket upgrade handler.
//!
//! Handles the HTTP → WebSocket upgrade and drives one connection:
//! 1. Authenticate the bearer token
//! 2. Admit through the connection manager (rate limits, capacity)
//! 3. Pump outbound frames from the manager's channel to the socket
//! 4. Feed inbound text frames to the manager until disconnect
//! 5. Close through the manager so collaborations and presence are released

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, FromRef, Query, State,
    },
    http::{header, HeaderMap},
    response::Response,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::connection_manager::{ConnectionManager, Outbound};
use super::messages::ServerMessage;
use crate::domain::connection::CloseReason;
use crate::domain::foundation::ConnectionId;
use crate::ports::{IdentityError, IdentityVerifier};

/// How long the writer gets to flush after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub connections: Arc<ConnectionManager>,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl WebSocketState {
    pub fn new(connections: Arc<ConnectionManager>, identity: Arc<dyn IdentityVerifier>) -> Self {
        Self {
            connections,
            identity,
        }
    }
}

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// Token from `?token=` or, failing that, an `Authorization: Bearer` header.
fn extract_token(params: &ConnectParams, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = params.token.as_deref().filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws?token=<jwt>`
///
/// Authentication and admission happen after the upgrade so a refused
/// client gets a close frame with code 1008 and a reason it can show.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<WebSocketState>,
) -> Response {
    let token = extract_token(&params, &headers);
    ws.on_upgrade(move |socket| handle_socket(socket, addr, token, state))
}

async fn refuse(mut socket: WebSocket, reason: CloseReason) {
    let frame = CloseFrame {
        code: reason.code(),
        reason: Cow::Owned(reason.description()),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!("Failed to send refusal close frame: {}", e);
    }
}

async fn handle_socket(
    socket: WebSocket,
    addr: SocketAddr,
    token: Option<String>,
    state: WebSocketState,
) {
    let verified = match token {
        Some(token) => state.identity.verify(&token).await,
        None => Err(IdentityError::MissingToken),
    };
    let user_id = match verified {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::info!(peer = %addr, error = %e, "Rejected unauthenticated connection");
            refuse(socket, CloseReason::PolicyViolation(e.to_string())).await;
            return;
        }
    };

    let source_ip = addr.ip().to_string();
    let admitted = match state.connections.admit(&source_ip, user_id).await {
        Ok(admitted) => admitted,
        Err(e) => {
            tracing::info!(peer = %addr, error = %e, "Connection refused");
            refuse(socket, CloseReason::PolicyViolation(e.message)).await;
            return;
        }
    };

    let connection_id = admitted.connection_id;
    let (sink, mut receiver) = socket.split();
    let mut writer = tokio::spawn(write_outbound(sink, admitted.outbound, connection_id));

    loop {
        tokio::select! {
            _ = &mut writer => {
                tracing::debug!(connection_id = %connection_id, "Writer stopped");
                break;
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if state.connections.handle_inbound(&connection_id, &text).await.is_err() {
                            // Closed elsewhere (idle reap or shutdown).
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(connection_id = %connection_id, "Received unsupported binary frame");
                        let reply = ServerMessage::error("UNSUPPORTED_FRAME", "Binary frames are not supported");
                        let _ = state.connections.send_to(&connection_id, &reply).await;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Protocol pings are answered by axum; both count as activity.
                        state.connections.touch(&connection_id);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %connection_id, "Client closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, "Receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    state.connections.close(&connection_id, CloseReason::Normal).await;
    if !writer.is_finished()
        && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err()
    {
        writer.abort();
    }
}

/// Forward queued frames to the socket until a close frame or a send error.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    connection_id: ConnectionId,
) {
    while let Some(item) = outbound.recv().await {
        let (message, last) = match item {
            Outbound::Text(text) => (Message::Text(text.to_string()), false),
            Outbound::Ping => (Message::Ping(Vec::new()), false),
            Outbound::Close { code, reason } => (
                Message::Close(Some(CloseFrame {
                    code,
                    reason: Cow::Owned(reason),
                })),
                true,
            ),
        };
        if let Err(e) = sink.send(message).await {
            tracing::debug!(connection_id = %connection_id, "Send error, closing connection: {}", e);
            break;
        }
        if last {
            break;
        }
    }
}

/// Create axum router for the WebSocket endpoint.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// peer address is available for per-IP limits.
pub fn websocket_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    WebSocketState: FromRef<S>,
{
    Router::new().route("/ws", get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_prefers_query_parameter() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        let params = ConnectParams {
            token: Some("from-query".to_string()),
        };
        assert_eq!(extract_token(&params, &headers).as_deref(), Some("from-query"));
    }

    #[test]
    fn token_falls_back_to_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(
            extract_token(&ConnectParams::default(), &headers).as_deref(),
            Some("abc.def")
        );
    }

    #[test]
    fn missing_or_blank_token_is_none() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        let params = ConnectParams {
            token: Some(String::new()),
        };
        assert_eq!(extract_token(&params, &headers), None);
    }

    #[test]
    fn websocket_router_creates_route() {
        let _router = websocket_router::<WebSocketState>();
    }
}
