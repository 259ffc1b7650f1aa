//! Conversation session
//!
//! Client-side state for one local identity: which peer is selected, the
//! visible timeline for that peer, whether a send is in flight, and a
//! per-peer backlog of messages that arrived for conversations not on
//! screen.
//!
//! The session is synchronous. Anything that waits on the network (history
//! fetches, sends) is split into a `begin`/`complete` pair joined by a
//! ticket. Each selection bumps a generation counter and history carrying
//! an older generation is discarded. Sends are numbered instead: only the
//! send holding the gate can release it, and the gate survives reopening
//! the same peer.

use crate::error::{ClientError, Result};
use crate::reconcile::{Merge, Timeline};
use chat_common::{IdentityId, Message};
use std::collections::HashMap;
use tracing::debug;

/// Most messages kept per off-screen peer
pub const BACKLOG_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading { peer: IdentityId },
    Live { peer: IdentityId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub peer: IdentityId,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    pub peer: IdentityId,
    pub text: String,
    send_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied { inserted: usize },
    StaleFetchDiscarded,
}

/// What happened to a message handed to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Added to the visible timeline
    Merged,
    /// Already known, dropped
    Duplicate,
    /// Belongs to a conversation not on screen; kept for later
    Backlogged,
    /// Does not involve the local identity
    Ignored,
}

#[derive(Debug)]
pub struct ConversationSession {
    local: IdentityId,
    phase: Phase,
    generation: u64,
    timeline: Timeline,
    send_seq: u64,
    in_flight: Option<u64>,
    backlog: HashMap<IdentityId, Timeline>,
}

impl ConversationSession {
    pub fn new(local: IdentityId) -> Self {
        Self {
            local,
            phase: Phase::Idle,
            generation: 0,
            timeline: Timeline::new(),
            send_seq: 0,
            in_flight: None,
            backlog: HashMap::new(),
        }
    }

    pub fn local(&self) -> &IdentityId {
        &self.local
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Selected peer, whether or not history has arrived
    pub fn peer(&self) -> Option<&IdentityId> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Loading { peer } | Phase::Live { peer } => Some(peer),
        }
    }

    pub fn visible(&self) -> &[Message] {
        self.timeline.as_slice()
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn can_send(&self) -> bool {
        matches!(self.phase, Phase::Live { .. }) && self.in_flight.is_none()
    }

    /// Switch to `peer`. Anything buffered for that peer becomes the
    /// starting timeline; the caller must fetch history with the ticket.
    pub fn select(&mut self, peer: IdentityId) -> Result<FetchTicket> {
        if peer == self.local {
            return Err(ClientError::Validation(
                "Cannot open a conversation with yourself".into(),
            ));
        }

        // A send to the peer being reopened still gates the composer
        if self.peer() != Some(&peer) {
            self.in_flight = None;
        }
        self.park_current();
        self.generation += 1;
        self.timeline = self.backlog.remove(&peer).unwrap_or_default();
        self.phase = Phase::Loading { peer: peer.clone() };

        debug!(
            "Selected {} (generation {}, {} buffered)",
            peer,
            self.generation,
            self.timeline.len()
        );

        Ok(FetchTicket {
            peer,
            generation: self.generation,
        })
    }

    /// Merge fetched history. Merging, not replacing, keeps live pushes that
    /// beat the fetch.
    pub fn complete_fetch(&mut self, ticket: &FetchTicket, history: Vec<Message>) -> FetchOutcome {
        if ticket.generation != self.generation {
            debug!(
                "Discarding history for {} (generation {} < {})",
                ticket.peer, ticket.generation, self.generation
            );
            return FetchOutcome::StaleFetchDiscarded;
        }

        let local = &self.local;
        let peer = &ticket.peer;
        let inserted = self
            .timeline
            .extend(history.into_iter().filter(|m| m.involves(local, peer)));

        self.phase = Phase::Live {
            peer: ticket.peer.clone(),
        };
        FetchOutcome::Applied { inserted }
    }

    /// History fetch failed. The selection is dropped; what was already
    /// buffered for the peer survives for the next attempt.
    pub fn fail_fetch(&mut self, ticket: &FetchTicket) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        self.park_current();
        self.generation += 1;
        self.phase = Phase::Idle;
        true
    }

    pub fn begin_send(&mut self, text: &str) -> Result<SendTicket> {
        let peer = match &self.phase {
            Phase::Live { peer } => peer.clone(),
            Phase::Loading { .. } => return Err(ClientError::NotLive),
            Phase::Idle => return Err(ClientError::NoConversation),
        };
        if self.in_flight.is_some() {
            return Err(ClientError::SendInFlight);
        }
        if text.trim().is_empty() {
            return Err(ClientError::Validation("Message text is empty".into()));
        }

        self.send_seq += 1;
        self.in_flight = Some(self.send_seq);
        Ok(SendTicket {
            peer,
            text: text.to_string(),
            send_id: self.send_seq,
        })
    }

    /// The store accepted the message: append it (or buffer it, if the
    /// user has since moved to another conversation)
    pub fn complete_send(&mut self, ticket: &SendTicket, message: Message) -> Delivery {
        self.release_send(ticket);
        self.receive(message)
    }

    pub fn abort_send(&mut self, ticket: &SendTicket) {
        self.release_send(ticket);
    }

    // Only the send that holds the gate may release it
    fn release_send(&mut self, ticket: &SendTicket) {
        if self.in_flight == Some(ticket.send_id) {
            self.in_flight = None;
        }
    }

    /// Route a message from any source (live push, send result)
    pub fn receive(&mut self, message: Message) -> Delivery {
        let Some(other) = message.counterpart(&self.local).cloned() else {
            debug!("Ignoring message {} for another identity", message.id);
            return Delivery::Ignored;
        };

        if self.peer() == Some(&other) {
            return match self.timeline.merge(message) {
                Merge::Inserted(_) => Delivery::Merged,
                Merge::Duplicate => Delivery::Duplicate,
            };
        }

        let buffered = self.backlog.entry(other).or_default();
        let delivery = match buffered.merge(message) {
            Merge::Inserted(_) => Delivery::Backlogged,
            Merge::Duplicate => Delivery::Duplicate,
        };
        buffered.retain_latest(BACKLOG_LIMIT);
        delivery
    }

    pub fn backlog_len(&self, peer: &IdentityId) -> usize {
        self.backlog.get(peer).map(Timeline::len).unwrap_or(0)
    }

    /// Peers with buffered messages, and how many
    pub fn backlog_peers(&self) -> Vec<(IdentityId, usize)> {
        let mut peers: Vec<_> = self
            .backlog
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(p, t)| (p.clone(), t.len()))
            .collect();
        peers.sort();
        peers
    }

    /// Tear down: nothing in flight survives
    pub fn close(&mut self) {
        self.generation += 1;
        self.phase = Phase::Idle;
        self.timeline = Timeline::new();
        self.in_flight = None;
        self.backlog.clear();
    }

    // Visible messages of the outgoing peer go back to its backlog so a
    // later select shows them before the fetch lands
    fn park_current(&mut self) {
        let Some(peer) = self.peer().cloned() else {
            return;
        };
        let timeline = std::mem::take(&mut self.timeline);
        if timeline.is_empty() {
            return;
        }
        let buffered = self.backlog.entry(peer).or_default();
        buffered.extend(timeline.into_vec());
        buffered.retain_latest(BACKLOG_LIMIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_common::MessageId;
    use chrono::{TimeZone, Utc};

    fn msg(id: i64, from: &str, to: &str) -> Message {
        Message {
            id: MessageId(id),
            sender_id: from.into(),
            receiver_id: to.into(),
            text: format!("m{id}"),
            created_at: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
        }
    }

    fn ids(s: &ConversationSession) -> Vec<i64> {
        s.visible().iter().map(|m| m.id.0).collect()
    }

    fn live_with(peer: &str, history: Vec<Message>) -> ConversationSession {
        let mut s = ConversationSession::new("u1".into());
        let ticket = s.select(peer.into()).unwrap();
        s.complete_fetch(&ticket, history);
        s
    }

    #[test]
    fn select_then_fetch_goes_live() {
        let mut s = ConversationSession::new("u1".into());
        assert_eq!(s.phase(), &Phase::Idle);

        let ticket = s.select("u2".into()).unwrap();
        assert_eq!(s.phase(), &Phase::Loading { peer: "u2".into() });
        assert!(!s.can_send());

        let outcome = s.complete_fetch(&ticket, vec![msg(1, "u1", "u2"), msg(2, "u2", "u1")]);
        assert_eq!(outcome, FetchOutcome::Applied { inserted: 2 });
        assert_eq!(s.phase(), &Phase::Live { peer: "u2".into() });
        assert_eq!(ids(&s), vec![1, 2]);
        assert!(s.can_send());
    }

    #[test]
    fn cannot_select_self() {
        let mut s = ConversationSession::new("u1".into());
        assert!(matches!(
            s.select("u1".into()),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn stale_fetch_is_discarded() {
        let mut s = ConversationSession::new("u1".into());
        let for_b = s.select("b".into()).unwrap();
        let for_c = s.select("c".into()).unwrap();

        assert_eq!(
            s.complete_fetch(&for_b, vec![msg(1, "u1", "b")]),
            FetchOutcome::StaleFetchDiscarded
        );
        assert!(s.visible().is_empty());
        assert_eq!(s.phase(), &Phase::Loading { peer: "c".into() });

        s.complete_fetch(&for_c, vec![msg(2, "c", "u1")]);
        assert_eq!(ids(&s), vec![2]);
    }

    #[test]
    fn reselecting_same_peer_still_invalidates_older_fetch() {
        let mut s = ConversationSession::new("u1".into());
        let first = s.select("b".into()).unwrap();
        let second = s.select("b".into()).unwrap();
        assert_eq!(
            s.complete_fetch(&first, vec![]),
            FetchOutcome::StaleFetchDiscarded
        );
        assert_eq!(
            s.complete_fetch(&second, vec![]),
            FetchOutcome::Applied { inserted: 0 }
        );
    }

    #[test]
    fn history_from_other_conversations_is_filtered_out() {
        let s = live_with(
            "u2",
            vec![msg(1, "u1", "u2"), msg(2, "u1", "u3"), msg(3, "u4", "u2")],
        );
        assert_eq!(ids(&s), vec![1]);
    }

    #[test]
    fn live_push_during_load_survives_history_merge() {
        let mut s = ConversationSession::new("u1".into());
        let ticket = s.select("u2".into()).unwrap();

        // Push beats the fetch; the fetch also contains it
        assert_eq!(s.receive(msg(5, "u2", "u1")), Delivery::Merged);
        let outcome = s.complete_fetch(&ticket, vec![msg(4, "u1", "u2"), msg(5, "u2", "u1")]);

        assert_eq!(outcome, FetchOutcome::Applied { inserted: 1 });
        assert_eq!(ids(&s), vec![4, 5]);
    }

    #[test]
    fn own_send_then_echo_shows_once() {
        let mut s = live_with("u2", vec![]);
        let ticket = s.begin_send("hello").unwrap();
        assert!(!s.can_send());

        assert_eq!(s.complete_send(&ticket, msg(7, "u1", "u2")), Delivery::Merged);
        assert!(s.can_send());
        assert_eq!(s.receive(msg(7, "u1", "u2")), Delivery::Duplicate);
        assert_eq!(ids(&s), vec![7]);
    }

    #[test]
    fn send_requires_live_conversation_and_text() {
        let mut s = ConversationSession::new("u1".into());
        assert!(matches!(s.begin_send("hi"), Err(ClientError::NoConversation)));

        let ticket = s.select("u2".into()).unwrap();
        assert!(matches!(s.begin_send("hi"), Err(ClientError::NotLive)));

        s.complete_fetch(&ticket, vec![]);
        assert!(matches!(s.begin_send("   "), Err(ClientError::Validation(_))));

        let _pending = s.begin_send("hi").unwrap();
        assert!(matches!(s.begin_send("again"), Err(ClientError::SendInFlight)));
    }

    #[test]
    fn aborted_send_reenables_sending() {
        let mut s = live_with("u2", vec![]);
        let ticket = s.begin_send("hi").unwrap();
        s.abort_send(&ticket);
        assert!(s.can_send());
        assert!(s.visible().is_empty());
    }

    #[test]
    fn reselecting_same_peer_keeps_send_gate() {
        let mut s = live_with("u2", vec![]);
        let ticket = s.begin_send("first").unwrap();

        let refetch = s.select("u2".into()).unwrap();
        s.complete_fetch(&refetch, vec![]);

        assert!(!s.can_send());
        assert!(s.is_sending());
        assert!(matches!(s.begin_send("second"), Err(ClientError::SendInFlight)));

        assert_eq!(s.complete_send(&ticket, msg(5, "u1", "u2")), Delivery::Merged);
        assert!(s.can_send());
        assert_eq!(ids(&s), vec![5]);
    }

    #[test]
    fn stale_send_does_not_release_newer_gate() {
        let mut s = live_with("b", vec![]);
        let to_b = s.begin_send("to b").unwrap();

        let for_c = s.select("c".into()).unwrap();
        s.complete_fetch(&for_c, vec![]);
        let to_c = s.begin_send("to c").unwrap();

        s.abort_send(&to_b);
        assert!(!s.can_send());

        s.complete_send(&to_c, msg(4, "u1", "c"));
        assert!(s.can_send());
    }

    #[test]
    fn send_completing_after_switch_lands_in_backlog() {
        let mut s = live_with("b", vec![]);
        let ticket = s.begin_send("to b").unwrap();

        let for_c = s.select("c".into()).unwrap();
        s.complete_fetch(&for_c, vec![]);

        assert_eq!(s.complete_send(&ticket, msg(3, "u1", "b")), Delivery::Backlogged);
        assert!(s.visible().is_empty());
        assert_eq!(s.backlog_len(&"b".into()), 1);
        assert!(s.can_send());
    }

    #[test]
    fn off_screen_messages_are_buffered_until_selected() {
        let mut s = live_with("b", vec![]);

        assert_eq!(s.receive(msg(1, "c", "u1")), Delivery::Backlogged);
        assert_eq!(s.receive(msg(2, "c", "u1")), Delivery::Backlogged);
        assert_eq!(s.receive(msg(2, "c", "u1")), Delivery::Duplicate);
        assert_eq!(s.receive(msg(3, "x", "y")), Delivery::Ignored);
        assert!(s.visible().is_empty());
        assert_eq!(s.backlog_peers(), vec![("c".into(), 2)]);

        let ticket = s.select("c".into()).unwrap();
        assert_eq!(ids(&s), vec![1, 2]);
        assert_eq!(s.backlog_len(&"c".into()), 0);

        // The fetch repeats both and adds one more
        let outcome = s.complete_fetch(
            &ticket,
            vec![msg(1, "c", "u1"), msg(2, "c", "u1"), msg(4, "u1", "c")],
        );
        assert_eq!(outcome, FetchOutcome::Applied { inserted: 1 });
        assert_eq!(ids(&s), vec![1, 2, 4]);
    }

    #[test]
    fn leaving_a_conversation_parks_its_messages() {
        let mut s = live_with("b", vec![msg(1, "b", "u1")]);
        s.select("c".into()).unwrap();
        assert_eq!(s.backlog_len(&"b".into()), 1);

        s.select("b".into()).unwrap();
        assert_eq!(ids(&s), vec![1]);
    }

    #[test]
    fn failed_fetch_returns_to_idle() {
        let mut s = ConversationSession::new("u1".into());
        let ticket = s.select("b".into()).unwrap();
        s.receive(msg(1, "b", "u1"));

        assert!(s.fail_fetch(&ticket));
        assert_eq!(s.phase(), &Phase::Idle);
        assert!(s.visible().is_empty());
        assert_eq!(s.backlog_len(&"b".into()), 1);

        // Too late now
        assert_eq!(
            s.complete_fetch(&ticket, vec![]),
            FetchOutcome::StaleFetchDiscarded
        );
        assert!(!s.fail_fetch(&ticket));
    }

    #[test]
    fn close_discards_everything() {
        let mut s = ConversationSession::new("u1".into());
        let ticket = s.select("b".into()).unwrap();
        s.receive(msg(1, "c", "u1"));
        s.close();

        assert_eq!(
            s.complete_fetch(&ticket, vec![msg(2, "b", "u1")]),
            FetchOutcome::StaleFetchDiscarded
        );
        assert_eq!(s.phase(), &Phase::Idle);
        assert!(s.backlog_peers().is_empty());
    }

    #[test]
    fn backlog_is_bounded() {
        let mut s = ConversationSession::new("u1".into());
        for i in 0..(BACKLOG_LIMIT as i64 + 10) {
            s.receive(msg(i, "c", "u1"));
        }
        assert_eq!(s.backlog_len(&"c".into()), BACKLOG_LIMIT);
    }
}
