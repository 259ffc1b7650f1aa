//! Identity-addressed live delivery
//!
//! - [`registry`] maps identities to their open endpoints (tabs/devices)
//! - [`broadcast`] fans a persisted message out to both parties' endpoints
//! - [`socket`] is the WebSocket surface clients join through

pub mod broadcast;
pub mod registry;
pub mod socket;

pub use broadcast::{Broadcaster, DeliveryReport};
pub use registry::{ChannelRegistry, DeliveryFailure, Endpoint, EndpointId};
pub use socket::live_socket;
