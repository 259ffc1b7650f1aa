//! Seams between the session driver and the network

use crate::error::Result;
use async_trait::async_trait;
use chat_common::{IdentityId, Message};
use std::sync::Arc;

/// Durable side: the message store's HTTP API
#[async_trait]
pub trait MessageApi: Send + Sync {
    /// Persist a message from the authenticated identity to `to`
    async fn append(&self, to: &IdentityId, text: &str) -> Result<Message>;

    /// Full conversation with `peer`, oldest first
    async fn history(&self, peer: &IdentityId) -> Result<Vec<Message>>;
}

/// Live side: the identity channel
#[async_trait]
pub trait LiveLink: Send + Sync {
    async fn join(&self, identity: &IdentityId) -> Result<()>;

    /// Ask the server to fan out an already-persisted message
    async fn announce(&self, message: &Message) -> Result<()>;
}

#[async_trait]
impl<T: MessageApi + ?Sized> MessageApi for Arc<T> {
    async fn append(&self, to: &IdentityId, text: &str) -> Result<Message> {
        (**self).append(to, text).await
    }

    async fn history(&self, peer: &IdentityId) -> Result<Vec<Message>> {
        (**self).history(peer).await
    }
}

#[async_trait]
impl<T: LiveLink + ?Sized> LiveLink for Arc<T> {
    async fn join(&self, identity: &IdentityId) -> Result<()> {
        (**self).join(identity).await
    }

    async fn announce(&self, message: &Message) -> Result<()> {
        (**self).announce(message).await
    }
}
