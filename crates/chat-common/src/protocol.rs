//! Live channel wire protocol
//!
//! Frames are JSON objects tagged by an `event` field:
//!
//! ```text
//! client -> server   {"event":"join","identity":"u1"}
//! client -> server   {"event":"messagePublished","message":{...}}
//! server -> client   {"event":"joined","identity":"u1"}
//! server -> client   {"event":"messageReceived","message":{...}}
//! server -> client   {"event":"error","message":"..."}
//! ```
//!
//! Message payloads are normalized at this boundary. Older clients send the
//! sender and receiver either as bare ids or as expanded user records, and
//! use `_id` / `senderId` spellings; [`WireMessage`] accepts all of them and
//! converts into the fixed [`Message`] shape.

use crate::models::{IdentityId, Message, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),
}

/// Client -> server events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Bind this connection to an identity for live delivery
    Join { identity: IdentityId },
    /// Advisory: a message was persisted and should be fanned out
    #[serde(alias = "send_message")]
    MessagePublished { message: Message },
}

/// Server -> client events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    Joined { identity: IdentityId },
    #[serde(alias = "receive_message")]
    MessageReceived { message: Message },
    /// Answer to a `join` naming someone other than the authenticated caller
    JoinRefused { identity: IdentityId, message: String },
    Error { message: String },
}

/// A sender/receiver reference as found on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParticipantRef {
    Id(String),
    Record {
        #[serde(alias = "_id")]
        id: String,
    },
}

impl ParticipantRef {
    fn into_id(self) -> IdentityId {
        match self {
            ParticipantRef::Id(id) | ParticipantRef::Record { id } => IdentityId::new(id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Num(i64),
    Text(String),
}

/// Every message shape accepted on input
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    #[serde(default, alias = "_id")]
    id: Option<WireId>,
    #[serde(default, alias = "senderId", alias = "sender_id")]
    sender: Option<ParticipantRef>,
    #[serde(default, alias = "receiverId", alias = "receiver_id")]
    receiver: Option<ParticipantRef>,
    text: String,
    #[serde(alias = "createdAt")]
    created_at: DateTime<Utc>,
}

impl TryFrom<WireMessage> for Message {
    type Error = ProtocolError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let id = match wire.id {
            Some(WireId::Num(n)) => MessageId(n),
            Some(WireId::Text(s)) => s
                .parse::<i64>()
                .map(MessageId)
                .map_err(|_| ProtocolError::Malformed(format!("non-numeric id {s:?}")))?,
            None => return Err(ProtocolError::Malformed("missing id".into())),
        };
        let sender_id = wire
            .sender
            .ok_or_else(|| ProtocolError::Malformed("missing sender".into()))?
            .into_id();
        let receiver_id = wire
            .receiver
            .ok_or_else(|| ProtocolError::Malformed("missing receiver".into()))?
            .into_id();

        Ok(Message {
            id,
            sender_id,
            receiver_id,
            text: wire.text,
            created_at: wire.created_at,
        })
    }
}
