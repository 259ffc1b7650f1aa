//! Shared types for CourseChat
//!
//! Everything the server and the client must agree on lives here: the
//! message value type, participant identities, the live-channel wire
//! protocol, and the on-disk storage layout.

pub mod models;
pub mod paths;
pub mod protocol;

pub use models::{Identity, IdentityId, Message, MessageId, Role};
pub use protocol::{ClientEvent, ProtocolError, ServerEvent, WireMessage};
