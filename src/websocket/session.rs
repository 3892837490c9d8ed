//! WebSocket upgrade handler and per-connection pumps.
//!
//! # Responsibilities
//! - Identify the caller and apply admission caps before upgrading
//! - Register the connection with the hub
//! - Run the read pump (inbound frames, liveness) and the write pump (outbound queue)
//!
//! # Design Decisions
//! - A rejected caller never gets a handshake; the response is a plain 503 or 429
//! - An invalid token makes the caller anonymous instead of failing the upgrade
//! - Either pump ending tears down the other; unregister is always sent

use axum::{
    body::Bytes,
    extract::{
        ws::{close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Extension, RawQuery, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::auth::{bearer_token, AuthGuard};
use crate::error::GatewayError;
use crate::http::context::{Caller, RequestContext};
use crate::http::server::AppState;
use crate::websocket::connection::{ConnectionHandle, ConnectionId, Liveness, Outbound};
use crate::websocket::hub::{HubHandle, Inbound};
use crate::websocket::message::WsMessage;

/// `GET <websocket.path>`
pub async fn ws_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            return ctx
                .error(GatewayError::BadRequest(rejection.body_text()))
                .into_response()
        }
    };

    let caller = identify(&state.auth, &headers, query_token(query.as_deref()).as_deref());
    let user_id = caller.as_ref().map(|c| c.user_id);

    if let Err(e) = state.hub.admit(user_id) {
        tracing::warn!(
            request_id = %ctx.request_id,
            user_id = user_id.unwrap_or(0),
            client_ip = %ctx.client_ip,
            reason = %e,
            "WebSocket connection rejected"
        );
        return ctx.error(e).into_response();
    }

    let hub = state.hub.clone();
    let max_message_size = hub.config().max_message_size;
    upgrade
        .max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| run_session(socket, hub, caller, ctx))
}

fn query_token(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

/// Bearer header first, then the `token` query parameter.
fn identify(auth: &AuthGuard, headers: &HeaderMap, query_token: Option<&str>) -> Option<Caller> {
    if !auth.is_enabled() {
        return None;
    }
    let token = bearer_token(headers).ok().or(query_token)?;
    match auth.verify(token) {
        Ok(claims) => Some(Caller::from(&claims)),
        Err(e) => {
            tracing::debug!(error = %e, "WebSocket token rejected, continuing as anonymous");
            None
        }
    }
}

async fn run_session(socket: WebSocket, hub: HubHandle, caller: Option<Caller>, ctx: RequestContext) {
    let config = hub.config().clone();
    let id = ConnectionId::new();
    let user_id = caller.as_ref().map(|c| c.user_id);
    let (tx, rx) = mpsc::channel(config.send_queue_size);
    let liveness = Arc::new(Liveness::new());
    let (mut sink, stream) = socket.split();

    let handle = ConnectionHandle::new(id, user_id, tx, liveness.clone());
    if let Err(e) = hub.register(handle).await {
        tracing::warn!(connection_id = %id, request_id = %ctx.request_id, reason = %e, "WebSocket registration refused");
        let frame = CloseFrame {
            code: close_code::AGAIN,
            reason: e.user_message().into(),
        };
        let _ = time::timeout(config.write_wait(), sink.send(Message::Close(Some(frame)))).await;
        return;
    }

    tracing::debug!(
        connection_id = %id,
        request_id = %ctx.request_id,
        user_id = user_id.unwrap_or(0),
        client_ip = %ctx.client_ip,
        "WebSocket session started"
    );

    let (closed_tx, closed_rx) = oneshot::channel();
    let writer = tokio::spawn(write_pump(sink, rx, config.write_wait(), id, closed_tx));

    read_pump(stream, &hub, id, user_id, &liveness, config.pong_wait(), closed_rx).await;

    hub.unregister(id);
    let _ = time::timeout(config.write_wait(), writer).await;
    tracing::debug!(connection_id = %id, "WebSocket session ended");
}

async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    hub: &HubHandle,
    id: ConnectionId,
    user_id: Option<i64>,
    liveness: &Liveness,
    pong_wait: Duration,
    mut writer_closed: oneshot::Receiver<()>,
) {
    loop {
        let next = tokio::select! {
            next = time::timeout(pong_wait, stream.next()) => next,
            _ = &mut writer_closed => break,
        };

        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = %id, error = %e, "WebSocket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::info!(connection_id = %id, "No traffic within pong wait, closing");
                break;
            }
        };

        liveness.touch();
        match message {
            Message::Text(text) => match serde_json::from_str::<WsMessage>(text.as_str()) {
                Ok(message) => {
                    let inbound = Inbound::Client {
                        from: id,
                        user_id,
                        message,
                    };
                    if !hub.submit(inbound).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %id, error = %e, "Dropping malformed WebSocket message");
                }
            },
            Message::Close(_) => break,
            // Pings are answered by the protocol layer; pongs only refresh liveness.
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    write_wait: Duration,
    id: ConnectionId,
    closed: oneshot::Sender<()>,
) {
    while let Some(frame) = rx.recv().await {
        let message = match frame {
            Outbound::Text(text) => Message::Text(text.into()),
            Outbound::Ping => Message::Ping(Bytes::new()),
        };
        match time::timeout(write_wait, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %id, error = %e, "WebSocket write error");
                break;
            }
            Err(_) => {
                tracing::warn!(connection_id = %id, "WebSocket write deadline exceeded");
                break;
            }
        }
    }

    // Queue closed by the hub, or the socket failed.
    let _ = time::timeout(write_wait, sink.send(Message::Close(None))).await;
    let _ = closed.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use axum::http::{header, HeaderValue};

    fn guard() -> AuthGuard {
        AuthGuard::new(&AuthConfig {
            enabled: true,
            jwt_secret: "ws-secret".into(),
            ..AuthConfig::default()
        })
    }

    fn token(guard: &AuthGuard, user_id: i64) -> String {
        let caller = Caller {
            user_id,
            username: "reader".into(),
            email: "reader@example.com".into(),
        };
        guard.issue(&caller).unwrap().token
    }

    #[test]
    fn test_query_token_parsing() {
        assert_eq!(query_token(Some("token=abc&x=1")).as_deref(), Some("abc"));
        assert_eq!(query_token(Some("x=1")), None);
        assert_eq!(query_token(Some("token=")), None);
        assert_eq!(query_token(None), None);
    }

    #[test]
    fn test_identify_prefers_header_then_query() {
        let guard = guard();
        let header_token = token(&guard, 1);
        let query = token(&guard, 2);

        let mut headers = HeaderMap::new();
        assert_eq!(identify(&guard, &headers, Some(&query)).unwrap().user_id, 2);

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", header_token)).unwrap(),
        );
        assert_eq!(identify(&guard, &headers, Some(&query)).unwrap().user_id, 1);
    }

    #[test]
    fn test_invalid_token_is_anonymous() {
        let guard = guard();
        assert!(identify(&guard, &HeaderMap::new(), Some("not-a-jwt")).is_none());

        let disabled = AuthGuard::new(&AuthConfig {
            enabled: false,
            jwt_secret: "ws-secret".into(),
            ..AuthConfig::default()
        });
        let valid = token(&guard, 3);
        assert!(identify(&disabled, &HeaderMap::new(), Some(&valid)).is_none());
    }
}
