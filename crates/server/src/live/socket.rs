//! WebSocket live channel
//!
//! GET /live?token=<session token>
//!
//! The upgrade is authenticated up front (browsers cannot set headers on a
//! WebSocket handshake, so the token may come as a query parameter). After
//! that the client speaks [`ClientEvent`]s:
//!
//! - `join` binds this connection to the caller's identity; joining as
//!   anyone else is answered with `joinRefused`.
//! - `messagePublished` asks for fan-out of a message the client just
//!   persisted. The message is looked up in the store first and the stored
//!   copy is what gets broadcast, so nothing reaches other endpoints
//!   without having been persisted.
//!
//! When the socket closes the endpoint leaves the registry.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use chat_common::{ClientEvent, Identity, Message, ServerEvent};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::registry::Endpoint;
use crate::auth::middleware::bearer_token;
use crate::config::AppState;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
pub struct LiveParams {
    pub token: Option<String>,
}

pub async fn live_socket(
    ws: WebSocketUpgrade,
    Query(params): Query<LiveParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response> {
    let token = match params.token {
        Some(token) => token,
        None => bearer_token(&headers)?.to_string(),
    };

    let identity = state
        .auth
        .validate_session(&token)
        .await
        .map_err(|_| Error::LoginFail)?;

    info!("[Live] Upgrade for {}", identity.id);

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let (mut sink, mut stream) = socket.split();
    let (endpoint, mut outbox) = Endpoint::new();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("[Live] Failed to encode event: {}", e);
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                handle_client_event(&state, &identity, &endpoint, text.as_str()).await;
            }
            Ok(WsMessage::Close(frame)) => {
                debug!("[Live] {} closed: {:?}", endpoint.id(), frame);
                break;
            }
            Ok(WsMessage::Binary(data)) => {
                warn!("[Live] Ignoring {} byte binary frame", data.len());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("[Live] Socket error on {}: {}", endpoint.id(), e);
                break;
            }
        }
    }

    state.registry.leave(endpoint.id());
    writer.abort();
    info!("[Live] Connection for {} ended", identity.id);
}

fn reply_error(endpoint: &Endpoint, message: impl Into<String>) {
    let message = message.into();
    debug!("[Live] -> {} error: {}", endpoint.id(), message);
    let _ = endpoint.push(ServerEvent::Error { message });
}

async fn handle_client_event(state: &AppState, identity: &Identity, endpoint: &Endpoint, text: &str) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            reply_error(endpoint, format!("Invalid event: {e}"));
            return;
        }
    };

    match event {
        ClientEvent::Join { identity: requested } => {
            if requested != identity.id {
                warn!(
                    "[Live] {} tried to join as {}",
                    identity.id, requested
                );
                let _ = endpoint.push(ServerEvent::JoinRefused {
                    identity: requested,
                    message: "Cannot join as another identity".into(),
                });
                return;
            }
            state.registry.join(&identity.id, endpoint);
            let _ = endpoint.push(ServerEvent::Joined { identity: requested });
        }
        ClientEvent::MessagePublished { message } => {
            announce(state, identity, endpoint, message).await;
        }
    }
}

async fn announce(state: &AppState, identity: &Identity, endpoint: &Endpoint, message: Message) {
    if state.registry.identity_of(endpoint.id()).is_none() {
        reply_error(endpoint, "Join before publishing");
        return;
    }
    if message.sender_id != identity.id && message.receiver_id != identity.id {
        reply_error(endpoint, "Not a party to this message");
        return;
    }

    match state.store.get(message.id).await {
        Ok(Some(stored))
            if stored.sender_id == message.sender_id
                && stored.receiver_id == message.receiver_id =>
        {
            state.broadcaster.publish(&stored);
        }
        Ok(_) => {
            warn!("[Live] Refusing to announce unpersisted message {}", message.id);
            reply_error(endpoint, format!("Message {} is not persisted", message.id));
        }
        Err(e) => {
            warn!("[Live] Lookup for message {} failed: {}", message.id, e);
            reply_error(endpoint, "Storage unavailable");
        }
    }
}
