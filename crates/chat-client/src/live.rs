//! WebSocket link to the identity channel
//!
//! One writer task drains queued [`ClientEvent`]s onto the socket; one
//! reader task turns `messageReceived` pushes into a plain stream of
//! [`Message`]s and tracks join acknowledgements for [`LiveLink::join`].
//! Plain `error` events (e.g. a refused announce) are only logged; a join
//! fails only on the `joinRefused` answer naming the identity it asked for.

use crate::error::{ClientError, Result};
use crate::transport::LiveLink;
use async_trait::async_trait;
use chat_common::{ClientEvent, IdentityId, Message, ServerEvent};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkStatus {
    Connected,
    Joined(IdentityId),
    Refused { identity: IdentityId, message: String },
    Closed,
}

pub struct WsLiveLink {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    status: watch::Receiver<LinkStatus>,
}

impl WsLiveLink {
    /// Connect to `url` (e.g. `ws://host:3001/live`), authenticating with
    /// `token`. Returns the link and the stream of pushed messages.
    pub async fn connect(url: &str, token: &str) -> Result<(Self, mpsc::UnboundedReceiver<Message>)> {
        let url = format!("{}?token={}", url, urlencoding::encode(token));
        let (socket, _) = connect_async(url).await?;
        let (mut write, mut read) = socket.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<Message>();
        let (status_tx, status) = watch::channel(LinkStatus::Connected);

        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode live event: {}", e);
                        continue;
                    }
                };
                if write.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Live connection error: {}", e);
                        break;
                    }
                };

                match serde_json::from_str::<ServerEvent>(text.as_str()) {
                    Ok(ServerEvent::MessageReceived { message }) => {
                        if inbound_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(ServerEvent::Joined { identity }) => {
                        info!("Joined live channel as {}", identity);
                        let _ = status_tx.send(LinkStatus::Joined(identity));
                    }
                    Ok(ServerEvent::JoinRefused { identity, message }) => {
                        warn!("Join as {} refused: {}", identity, message);
                        let _ = status_tx.send(LinkStatus::Refused { identity, message });
                    }
                    Ok(ServerEvent::Error { message }) => {
                        warn!("Live channel error: {}", message);
                    }
                    Err(e) => debug!("Skipping unreadable live event: {}", e),
                }
            }
            let _ = status_tx.send(LinkStatus::Closed);
            debug!("Live connection closed");
        });

        Ok((Self { outbound, status }, inbound))
    }

    fn queue(&self, event: ClientEvent) -> Result<()> {
        self.outbound
            .send(event)
            .map_err(|_| ClientError::Live("connection closed".into()))
    }
}

#[async_trait]
impl LiveLink for WsLiveLink {
    /// Resolves once the server acknowledges the binding
    async fn join(&self, identity: &IdentityId) -> Result<()> {
        let mut status = self.status.clone();
        let _ = status.borrow_and_update();

        self.queue(ClientEvent::Join {
            identity: identity.clone(),
        })?;

        let wait = async {
            loop {
                if status.changed().await.is_err() {
                    return Err(ClientError::Live("connection closed".into()));
                }
                let current = status.borrow_and_update().clone();
                match current {
                    LinkStatus::Joined(id) if &id == identity => return Ok(()),
                    LinkStatus::Refused { identity: id, message } if &id == identity => {
                        return Err(ClientError::JoinRefused(message))
                    }
                    LinkStatus::Closed => {
                        return Err(ClientError::Live("connection closed".into()))
                    }
                    _ => {}
                }
            }
        };

        tokio::time::timeout(JOIN_TIMEOUT, wait)
            .await
            .map_err(|_| ClientError::Live("join timed out".into()))?
    }

    async fn announce(&self, message: &Message) -> Result<()> {
        self.queue(ClientEvent::MessagePublished {
            message: message.clone(),
        })
    }
}
