//! Session driver
//!
//! [`ChatClient`] wires a [`ConversationSession`] to a [`MessageApi`] and a
//! [`LiveLink`]. The session lock is only taken between awaits, so network
//! latency never blocks live deliveries.

use crate::error::Result;
use crate::session::{ConversationSession, Delivery, FetchOutcome, Phase};
use crate::transport::{LiveLink, MessageApi};
use chat_common::{IdentityId, Message};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct ChatClient<A, L> {
    local: IdentityId,
    api: A,
    live: L,
    session: Mutex<ConversationSession>,
}

impl<A: MessageApi, L: LiveLink> ChatClient<A, L> {
    pub fn new(local: IdentityId, api: A, live: L) -> Self {
        Self {
            session: Mutex::new(ConversationSession::new(local.clone())),
            local,
            api,
            live,
        }
    }

    pub fn local(&self) -> &IdentityId {
        &self.local
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Bind the live link to the local identity
    pub async fn join(&self) -> Result<()> {
        self.live.join(&self.local).await
    }

    /// Select `peer` and load its history. Always refetches, even when the
    /// peer was open before.
    pub async fn open(&self, peer: IdentityId) -> Result<FetchOutcome> {
        let ticket = self.session.lock().select(peer)?;

        match self.api.history(&ticket.peer).await {
            Ok(history) => {
                let outcome = self.session.lock().complete_fetch(&ticket, history);
                if outcome == FetchOutcome::StaleFetchDiscarded {
                    debug!("History for {} arrived after a newer selection", ticket.peer);
                }
                Ok(outcome)
            }
            Err(e) => {
                self.session.lock().fail_fetch(&ticket);
                Err(e)
            }
        }
    }

    /// Persist, show, then announce. Announce failures are logged only: the
    /// message is stored and the peer sees it on its next fetch.
    pub async fn send(&self, text: &str) -> Result<Message> {
        let ticket = self.session.lock().begin_send(text)?;

        let message = match self.api.append(&ticket.peer, &ticket.text).await {
            Ok(message) => message,
            Err(e) => {
                self.session.lock().abort_send(&ticket);
                return Err(e);
            }
        };

        self.session.lock().complete_send(&ticket, message.clone());

        if let Err(e) = self.live.announce(&message).await {
            warn!("Failed to announce message {}: {}", message.id, e);
        }

        Ok(message)
    }

    pub fn receive(&self, message: Message) -> Delivery {
        self.session.lock().receive(message)
    }

    /// Feed live pushes into the session until the link closes
    pub async fn run_live(&self, mut pushes: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = pushes.recv().await {
            let id = message.id;
            let delivery = self.receive(message);
            debug!("Live message {}: {:?}", id, delivery);
        }
        debug!("Live stream for {} ended", self.local);
    }

    /// After a reconnect: join again and refetch the open conversation,
    /// covering anything pushed while disconnected
    pub async fn rejoin(&self) -> Result<Option<FetchOutcome>> {
        self.join().await?;
        let peer = self.session.lock().peer().cloned();
        match peer {
            Some(peer) => self.open(peer).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn close(&self) {
        self.session.lock().close();
    }

    pub fn phase(&self) -> Phase {
        self.session.lock().phase().clone()
    }

    /// Snapshot of the visible conversation
    pub fn visible(&self) -> Vec<Message> {
        self.session.lock().visible().to_vec()
    }

    pub fn can_send(&self) -> bool {
        self.session.lock().can_send()
    }

    pub fn backlog_peers(&self) -> Vec<(IdentityId, usize)> {
        self.session.lock().backlog_peers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use async_trait::async_trait;
    use chat_common::MessageId;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// In-memory store; history for `gated` waits for `release`
    struct FakeApi {
        local: IdentityId,
        next_id: AtomicI64,
        messages: Mutex<Vec<Message>>,
        gated: Option<IdentityId>,
        release: Notify,
        fail_append: AtomicBool,
    }

    impl FakeApi {
        fn new(local: &str) -> Self {
            Self {
                local: local.into(),
                next_id: AtomicI64::new(1),
                messages: Mutex::new(Vec::new()),
                gated: None,
                release: Notify::new(),
                fail_append: AtomicBool::new(false),
            }
        }

        fn gate(mut self, peer: &str) -> Self {
            self.gated = Some(peer.into());
            self
        }

        fn store(&self, from: &str, to: &str, text: &str) -> Message {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let message = Message {
                id: MessageId(id),
                sender_id: from.into(),
                receiver_id: to.into(),
                text: text.to_string(),
                created_at: Utc::now() + ChronoDuration::milliseconds(id),
            };
            self.messages.lock().push(message.clone());
            message
        }
    }

    #[async_trait]
    impl MessageApi for FakeApi {
        async fn append(&self, to: &IdentityId, text: &str) -> Result<Message> {
            if self.fail_append.load(Ordering::SeqCst) {
                return Err(ClientError::Server {
                    status: 500,
                    message: "down".into(),
                });
            }
            Ok(self.store(self.local.as_str(), to.as_str(), text))
        }

        async fn history(&self, peer: &IdentityId) -> Result<Vec<Message>> {
            if self.gated.as_ref() == Some(peer) {
                self.release.notified().await;
            }
            let local = &self.local;
            Ok(self
                .messages
                .lock()
                .iter()
                .filter(|m| m.involves(local, peer))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeLive {
        announced: Mutex<Vec<MessageId>>,
        joins: AtomicI64,
        broken: AtomicBool,
    }

    #[async_trait]
    impl LiveLink for FakeLive {
        async fn join(&self, _identity: &IdentityId) -> Result<()> {
            self.joins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn announce(&self, message: &Message) -> Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(ClientError::Live("connection closed".into()));
            }
            self.announced.lock().push(message.id);
            Ok(())
        }
    }

    fn texts(client: &ChatClient<Arc<FakeApi>, Arc<FakeLive>>) -> Vec<String> {
        client.visible().into_iter().map(|m| m.text).collect()
    }

    #[tokio::test]
    async fn open_loads_history_and_goes_live() {
        let api = Arc::new(FakeApi::new("u1"));
        api.store("u2", "u1", "hi");
        api.store("u3", "u1", "elsewhere");
        let client = ChatClient::new("u1".into(), api, Arc::new(FakeLive::default()));

        let outcome = client.open("u2".into()).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Applied { inserted: 1 });
        assert_eq!(client.phase(), Phase::Live { peer: "u2".into() });
        assert_eq!(texts(&client), vec!["hi"]);
    }

    #[tokio::test]
    async fn send_persists_shows_then_announces() {
        let api = Arc::new(FakeApi::new("u1"));
        let live = Arc::new(FakeLive::default());
        let client = ChatClient::new("u1".into(), api.clone(), live.clone());
        client.open("u2".into()).await.unwrap();

        let sent = client.send("hello").await.unwrap();

        assert_eq!(texts(&client), vec!["hello"]);
        assert_eq!(*live.announced.lock(), vec![sent.id]);
        assert_eq!(api.messages.lock().len(), 1);

        // The server echoes it back to our own endpoint
        assert_eq!(client.receive(sent), Delivery::Duplicate);
        assert_eq!(client.visible().len(), 1);
    }

    #[tokio::test]
    async fn announce_failure_does_not_fail_send() {
        let api = Arc::new(FakeApi::new("u1"));
        let live = Arc::new(FakeLive::default());
        live.broken.store(true, Ordering::SeqCst);
        let client = ChatClient::new("u1".into(), api.clone(), live);
        client.open("u2".into()).await.unwrap();

        client.send("still stored").await.unwrap();

        assert_eq!(texts(&client), vec!["still stored"]);
        assert_eq!(api.messages.lock().len(), 1);
        assert!(client.can_send());
    }

    #[tokio::test]
    async fn failed_persist_leaves_view_untouched() {
        let api = Arc::new(FakeApi::new("u1"));
        api.fail_append.store(true, Ordering::SeqCst);
        let live = Arc::new(FakeLive::default());
        let client = ChatClient::new("u1".into(), api, live.clone());
        client.open("u2".into()).await.unwrap();

        let err = tokio_test::assert_err!(client.send("lost").await);

        assert!(matches!(err, ClientError::Server { status: 500, .. }));
        assert!(client.visible().is_empty());
        assert!(live.announced.lock().is_empty());
        assert!(client.can_send());
    }

    #[tokio::test]
    async fn slow_history_for_old_peer_is_discarded() {
        let api = Arc::new(FakeApi::new("u1").gate("b"));
        api.store("b", "u1", "from b");
        api.store("c", "u1", "from c");
        let client = Arc::new(ChatClient::new(
            "u1".into(),
            api.clone(),
            Arc::new(FakeLive::default()),
        ));

        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.open("b".into()).await }
        });
        while client.phase() != (Phase::Loading { peer: "b".into() }) {
            tokio::task::yield_now().await;
        }

        client.open("c".into()).await.unwrap();
        api.release.notify_one();

        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome, FetchOutcome::StaleFetchDiscarded);
        assert_eq!(client.phase(), Phase::Live { peer: "c".into() });
        assert_eq!(texts(&client), vec!["from c"]);
    }

    #[tokio::test]
    async fn live_pushes_route_by_conversation() {
        let api = Arc::new(FakeApi::new("u1"));
        let client = Arc::new(ChatClient::new(
            "u1".into(),
            api.clone(),
            Arc::new(FakeLive::default()),
        ));
        client.open("b".into()).await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let runner = tokio::spawn({
            let client = client.clone();
            async move { client.run_live(rx).await }
        });

        let from_b = api.store("b", "u1", "for view");
        let from_c = api.store("c", "u1", "for later");
        tx.send(from_b.clone()).unwrap();
        tx.send(from_c).unwrap();
        tx.send(from_b).unwrap();
        drop(tx);
        runner.await.unwrap();

        assert_eq!(texts(&client), vec!["for view"]);
        assert_eq!(client.backlog_peers(), vec![("c".into(), 1)]);

        client.open("c".into()).await.unwrap();
        assert_eq!(texts(&client), vec!["for later"]);
    }

    #[tokio::test]
    async fn rejoin_refetches_open_conversation() {
        let api = Arc::new(FakeApi::new("u1"));
        let live = Arc::new(FakeLive::default());
        let client = ChatClient::new("u1".into(), api.clone(), live.clone());

        assert_eq!(client.rejoin().await.unwrap(), None);

        client.open("b".into()).await.unwrap();
        // Missed while disconnected
        api.store("b", "u1", "missed");

        let outcome = client.rejoin().await.unwrap();
        assert_eq!(outcome, Some(FetchOutcome::Applied { inserted: 1 }));
        assert_eq!(texts(&client), vec!["missed"]);
        assert_eq!(live.joins.load(Ordering::SeqCst), 2);
    }
}
