use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque participant id, issued by the identity service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for IdentityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Participant role. Only affects grouping in listings, never delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "admin")]
    Operator,
    #[serde(alias = "student")]
    Learner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Operator => "operator",
            Role::Learner => "learner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "operator" | "admin" => Ok(Role::Operator),
            "learner" | "student" => Ok(Role::Learner),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Directory entry for a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: IdentityId,
    pub role: Role,
    pub display_name: String,
    pub email: String,
}

/// Store-assigned message id; the only deduplication key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted direct message. Immutable once created.
///
/// Deserialization goes through [`crate::WireMessage`], so every accepted
/// input shape lands in this one form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "crate::protocol::WireMessage")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: IdentityId,
    pub receiver_id: IdentityId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Total order within a conversation: creation time, ties broken by id
    pub fn order_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }

    /// True if this message travels between `a` and `b`, in either direction
    pub fn involves(&self, a: &IdentityId, b: &IdentityId) -> bool {
        (&self.sender_id == a && &self.receiver_id == b)
            || (&self.sender_id == b && &self.receiver_id == a)
    }

    /// The other party, from the point of view of `local`
    pub fn counterpart(&self, local: &IdentityId) -> Option<&IdentityId> {
        if &self.sender_id == local {
            Some(&self.receiver_id)
        } else if &self.receiver_id == local {
            Some(&self.sender_id)
        } else {
            None
        }
    }
}
