//! CourseChat client
//!
//! Everything a front end needs to show one conversation at a time: a
//! session state machine that guards against stale history, a reconciler
//! that merges history, own sends and live pushes without duplicates, and
//! HTTP/WebSocket transports for the server.

pub mod client;
pub mod error;
pub mod http;
pub mod live;
pub mod reconcile;
pub mod session;
pub mod transport;

pub use client::ChatClient;
pub use error::{ClientError, Result};
pub use http::{AuthSession, HttpMessageApi};
pub use live::WsLiveLink;
pub use reconcile::{Merge, Timeline};
pub use session::{ConversationSession, Delivery, FetchOutcome, FetchTicket, Phase, SendTicket};
pub use transport::{LiveLink, MessageApi};
