//! Identity Channel Registry
//!
//! The only shared mutable state on the server. Both indexes are sharded
//! `DashMap`s, so join/leave/lookup for one identity never waits on an
//! unrelated identity. Calls for a given endpoint come from that endpoint's
//! own connection task and are therefore sequential.

use chat_common::{IdentityId, ServerEvent};
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(Uuid);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events queued per endpoint before pushes start failing
pub const ENDPOINT_QUEUE: usize = 256;

/// A live push to one endpoint failed
#[derive(Debug, Error)]
pub enum DeliveryFailure {
    #[error("Delivery to endpoint {0} failed: receiver dropped")]
    Closed(EndpointId),
    #[error("Delivery to endpoint {0} failed: queue full")]
    Full(EndpointId),
}

/// Handle to one live connection. Pushes are queued FIFO, so events
/// pushed in sequence reach the connection in that order. A connection that
/// stops draining its queue loses pushes instead of growing it.
#[derive(Debug, Clone)]
pub struct Endpoint {
    id: EndpointId,
    sink: mpsc::Sender<ServerEvent>,
}

impl Endpoint {
    /// New endpoint plus the receiving half its connection task drains
    pub fn new() -> (Self, mpsc::Receiver<ServerEvent>) {
        Self::with_capacity(ENDPOINT_QUEUE)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (sink, rx) = mpsc::channel(capacity);
        (
            Self {
                id: EndpointId(Uuid::new_v4()),
                sink,
            },
            rx,
        )
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn push(&self, event: ServerEvent) -> Result<(), DeliveryFailure> {
        self.sink.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::Full(self.id),
            TrySendError::Closed(_) => DeliveryFailure::Closed(self.id),
        })
    }
}

struct Binding {
    identity: IdentityId,
    endpoint: Endpoint,
}

#[derive(Default)]
pub struct ChannelRegistry {
    by_identity: DashMap<IdentityId, HashSet<EndpointId>>,
    endpoints: DashMap<EndpointId, Binding>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `endpoint` to `identity`. Joining the same pair twice is a
    /// no-op; joining under a new identity moves the binding.
    pub fn join(&self, identity: &IdentityId, endpoint: &Endpoint) {
        let previous = self.endpoints.insert(
            endpoint.id(),
            Binding {
                identity: identity.clone(),
                endpoint: endpoint.clone(),
            },
        );

        if let Some(prev) = previous {
            if &prev.identity == identity {
                debug!("[Registry] {} already joined as {}", endpoint.id(), identity);
                return;
            }
            self.detach(&prev.identity, endpoint.id());
        }

        self.by_identity
            .entry(identity.clone())
            .or_default()
            .insert(endpoint.id());

        info!("[Registry] {} joined as {}", endpoint.id(), identity);
    }

    /// Remove a binding. Unknown handles are ignored.
    pub fn leave(&self, endpoint_id: EndpointId) {
        if let Some((_, binding)) = self.endpoints.remove(&endpoint_id) {
            self.detach(&binding.identity, endpoint_id);
            info!("[Registry] {} left ({})", endpoint_id, binding.identity);
        }
    }

    fn detach(&self, identity: &IdentityId, endpoint_id: EndpointId) {
        if let Some(mut set) = self.by_identity.get_mut(identity) {
            set.remove(&endpoint_id);
        }
        self.by_identity.remove_if(identity, |_, set| set.is_empty());
    }

    /// Current live endpoints for `identity`, possibly empty
    pub fn endpoints_for(&self, identity: &IdentityId) -> Vec<Endpoint> {
        let ids: Vec<EndpointId> = match self.by_identity.get(identity) {
            Some(set) => set.iter().copied().collect(),
            None => return Vec::new(),
        };

        ids.into_iter()
            .filter_map(|id| self.endpoints.get(&id).map(|b| b.endpoint.clone()))
            .collect()
    }

    /// Identity an endpoint is joined as, if any
    pub fn identity_of(&self, endpoint_id: EndpointId) -> Option<IdentityId> {
        self.endpoints
            .get(&endpoint_id)
            .map(|b| b.identity.clone())
    }

    pub fn binding_count(&self) -> usize {
        self.endpoints.len()
    }
}
