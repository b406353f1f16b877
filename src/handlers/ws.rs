// src/handlers/ws.rs
use crate::auth::{request_token, AuthError, JwtVerifier};
use crate::error::ChatError;
use crate::gateway::{ClientEvent, ServerEvent, OUTBOX_CAPACITY};
use crate::models::auth::Identity;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
struct HandshakeQuery {
    token: Option<String>,
}

pub fn ws_routes() -> Router {
    Router::new().route("/ws", get(websocket_handler))
}

/// The handshake is refused before the upgrade when the credential is
/// missing or invalid; the client only sees the failed connection.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HandshakeQuery>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    if !origin_allowed(&state.config.allowed_origins, &headers) {
        tracing::warn!(origin = ?headers.get(header::ORIGIN), "rejecting socket from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    let identity = match authenticate_handshake(&state.verifier, params.token.as_deref(), &headers) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting socket handshake");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| websocket(socket, state, identity))
}

pub fn authenticate_handshake(
    verifier: &JwtVerifier,
    payload_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<Identity, AuthError> {
    let token = request_token(payload_token, headers).ok_or(AuthError::MissingToken)?;
    verifier.verify(&token)
}

/// Requests without an `Origin` header come from non-browser clients and are
/// let through; the credential still applies.
pub fn origin_allowed(allowed: &[String], headers: &HeaderMap) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match headers.get(header::ORIGIN).map(|v| v.to_str()) {
        None => true,
        Some(Ok(origin)) => {
            let origin = origin.trim_end_matches('/');
            allowed.iter().any(|a| a == "*" || a == origin)
        }
        Some(Err(_)) => false,
    }
}

async fn websocket(stream: WebSocket, state: Arc<AppState>, identity: Identity) {
    let (mut sender, mut receiver) = stream.split();
    // A client that cannot keep up is dropped by the registry, which closes
    // this outbox and ends the writer below.
    let (outbox, mut events) = tokio::sync::mpsc::channel::<ServerEvent>(OUTBOX_CAPACITY);

    let gateway = state.gateway.clone();
    let user_id = identity.user_id.clone();
    let connection = gateway.connect(identity, outbox).await;

    let mut writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize socket event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => gateway.handle(connection, event).await,
                    Err(e) => {
                        gateway
                            .report_error(connection, ChatError::Validation(format!("unrecognized event: {}", e)), None)
                            .await
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                // pings are answered by the transport
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %connection, "socket read failed: {}", e);
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    gateway.disconnect(connection).await;
    writer.abort();
    tracing::info!(connection_id = %connection, user_id = %user_id, "socket closed");
}
