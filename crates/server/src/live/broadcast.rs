//! Delivery Broadcaster
//!
//! Live delivery is best-effort. A push that fails is logged and dropped;
//! the durable history is the authoritative fallback.

use chat_common::{Message, ServerEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::registry::ChannelRegistry;

/// Outcome of one publish, for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Broadcaster {
    registry: Arc<ChannelRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry }
    }

    /// Push `message` to every live endpoint of its sender and receiver,
    /// each endpoint once.
    pub fn publish(&self, message: &Message) -> DeliveryReport {
        let mut targets = self.registry.endpoints_for(&message.sender_id);
        targets.extend(self.registry.endpoints_for(&message.receiver_id));

        let mut seen = HashSet::with_capacity(targets.len());
        let mut report = DeliveryReport::default();

        for endpoint in targets {
            if !seen.insert(endpoint.id()) {
                continue;
            }
            let event = ServerEvent::MessageReceived {
                message: message.clone(),
            };
            match endpoint.push(event) {
                Ok(()) => {
                    debug!("[Broadcast] message {} -> {}", message.id, endpoint.id());
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!("[Broadcast] {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "[Broadcast] message {} delivered to {} endpoints ({} failed)",
            message.id, report.delivered, report.failed
        );

        report
    }
}
