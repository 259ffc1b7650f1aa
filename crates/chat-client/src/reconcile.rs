//! Reconciler
//!
//! Messages reach a conversation view three ways: the history fetch, the
//! optimistic append after our own send, and live pushes (including the
//! echo of our own send). [`Timeline::merge`] is the single rule that keeps
//! the view free of duplicates and sorted by `(created_at, id)` no matter
//! which path delivers a message first.

use chat_common::{Message, MessageId};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Inserted at this index
    Inserted(usize),
    /// Already present (same id); nothing changed
    Duplicate,
}

/// Ordered, id-deduplicated message sequence
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, message: Message) -> Merge {
        if self.ids.contains(&message.id) {
            return Merge::Duplicate;
        }

        // Usually an append; binary search covers out-of-order arrival
        let key = message.order_key();
        let index = self.messages.partition_point(|m| m.order_key() < key);

        self.ids.insert(message.id);
        self.messages.insert(index, message);
        Merge::Inserted(index)
    }

    /// Merge a batch; returns how many were new
    pub fn extend(&mut self, batch: impl IntoIterator<Item = Message>) -> usize {
        batch
            .into_iter()
            .map(|m| self.merge(m))
            .filter(|merge| matches!(merge, Merge::Inserted(_)))
            .count()
    }

    /// Drop the oldest entries beyond `limit`
    pub fn retain_latest(&mut self, limit: usize) {
        if self.messages.len() <= limit {
            return;
        }
        let excess = self.messages.len() - limit;
        for m in self.messages.drain(..excess) {
            self.ids.remove(&m.id);
        }
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_vec(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: i64, secs: i64) -> Message {
        Message {
            id: MessageId(id),
            sender_id: "a".into(),
            receiver_id: "b".into(),
            text: format!("m{id}"),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn ids(t: &Timeline) -> Vec<i64> {
        t.as_slice().iter().map(|m| m.id.0).collect()
    }

    // Heap's algorithm
    fn permutations(items: Vec<Message>) -> Vec<Vec<Message>> {
        fn go(k: usize, items: &mut Vec<Message>, out: &mut Vec<Vec<Message>>) {
            if k == 1 {
                out.push(items.clone());
                return;
            }
            go(k - 1, items, out);
            for i in 0..k - 1 {
                if k % 2 == 0 {
                    items.swap(i, k - 1);
                } else {
                    items.swap(0, k - 1);
                }
                go(k - 1, items, out);
            }
        }
        let mut items = items;
        let mut out = Vec::new();
        let k = items.len();
        go(k, &mut items, &mut out);
        out
    }

    #[test]
    fn optimistic_append_then_echo_yields_one_entry() {
        let mut t = Timeline::new();
        assert_eq!(t.merge(msg(1, 10)), Merge::Inserted(0));
        assert_eq!(t.merge(msg(1, 10)), Merge::Duplicate);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn any_arrival_order_yields_sorted_view() {
        // Two messages share a timestamp; the id breaks the tie
        let set = vec![msg(1, 10), msg(2, 20), msg(3, 20), msg(4, 5), msg(5, 30)];
        let all = permutations(set);
        assert_eq!(all.len(), 120);

        for order in all {
            let mut t = Timeline::new();
            for m in order.iter().cloned() {
                t.merge(m);
            }
            // Replaying the same deliveries must change nothing
            assert_eq!(t.extend(order), 0);
            assert_eq!(ids(&t), vec![4, 1, 2, 3, 5]);
        }
    }

    #[test]
    fn late_push_lands_before_newer_history() {
        let mut t = Timeline::new();
        t.merge(msg(9, 90));
        let inserted = t.extend(vec![msg(3, 30), msg(9, 90), msg(5, 50)]);
        assert_eq!(inserted, 2);
        assert_eq!(ids(&t), vec![3, 5, 9]);
    }

    #[test]
    fn retain_latest_forgets_dropped_ids() {
        let mut t = Timeline::new();
        t.extend((1..=5).map(|i| msg(i, i * 10)));
        t.retain_latest(2);
        assert_eq!(ids(&t), vec![4, 5]);
        assert!(!t.contains(MessageId(1)));
        assert_eq!(t.merge(msg(1, 10)), Merge::Inserted(0));
    }
}
