//! One live chat connection: identity, outbound queue and the reader/writer
//! loops bridging the transport to the hub and the message store.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::ws::Message;
use chrono::Utc;
use forum_shared::{Identity, WsMessage, GUEST_PREFIX};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use rand::Rng;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use super::frame;
use super::hub::Hub;
use crate::store::{MessageStore, NewChatMessage};

pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

const GUEST_SUFFIX_LEN: usize = 6;
const GUEST_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Who is on the other end of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatIdentity {
    Member { user_id: i64, username: String },
    /// Unauthenticated and read-only.
    Guest { name: String },
}

impl ChatIdentity {
    /// Synthesize a guest identity such as `Guest_k3x9a0`.
    pub fn guest() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..GUEST_SUFFIX_LEN)
            .map(|_| GUEST_ALPHABET[rng.gen_range(0..GUEST_ALPHABET.len())] as char)
            .collect();
        ChatIdentity::Guest {
            name: format!("{GUEST_PREFIX}_{suffix}"),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            ChatIdentity::Member { username, .. } => username,
            ChatIdentity::Guest { name } => name,
        }
    }

    pub fn user_id(&self) -> i64 {
        match self {
            ChatIdentity::Member { user_id, .. } => *user_id,
            ChatIdentity::Guest { .. } => 0,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, ChatIdentity::Guest { .. })
    }
}

impl From<Identity> for ChatIdentity {
    fn from(identity: Identity) -> Self {
        ChatIdentity::Member {
            user_id: identity.user_id,
            username: identity.username,
        }
    }
}

/// Items queued for the writer loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Chat(WsMessage),
    /// Liveness probe, written as a transport ping.
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    Full,
    Closed,
}

/// Shared view of a session. The hub keeps one in its registry; the session's
/// loops hold the others. The transport itself is owned by the loops.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    identity: ChatIdentity,
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    done: CancellationToken,
    missed_probes: AtomicU32,
}

impl SessionHandle {
    pub fn new(identity: ChatIdentity, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Arc::new(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            identity,
            outbound: Mutex::new(Some(tx)),
            done: CancellationToken::new(),
            missed_probes: AtomicU32::new(0),
        });
        (handle, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &ChatIdentity {
        &self.identity
    }

    /// Fires once, when the session is closed.
    pub fn done(&self) -> &CancellationToken {
        &self.done
    }

    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    fn lock_outbound(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<Outbound>>> {
        self.outbound.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Non-blocking enqueue.
    pub(crate) fn try_deliver(&self, item: Outbound) -> Delivery {
        let guard = self.lock_outbound();
        let Some(tx) = guard.as_ref() else {
            return Delivery::Closed;
        };
        match tx.try_send(item) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub(crate) fn sender(&self) -> Option<mpsc::Sender<Outbound>> {
        self.lock_outbound().clone()
    }

    /// Drop the queue and fire the done-signal. Returns false if already closed.
    pub(crate) fn close(&self) -> bool {
        let was_open = self.lock_outbound().take().is_some();
        self.done.cancel();
        was_open
    }

    /// Any inbound traffic proves the peer is alive.
    pub(crate) fn acknowledge(&self) {
        self.missed_probes.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_probe(&self) {
        self.missed_probes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn missed_probes(&self) -> u32 {
        self.missed_probes.load(Ordering::Relaxed)
    }
}

/// Drive a registered session until it ends: the writer runs on its own task,
/// the reader on the caller's.
pub async fn run<S, R, E>(
    hub: Hub,
    store: Arc<dyn MessageStore>,
    session: Arc<SessionHandle>,
    outbound: mpsc::Receiver<Outbound>,
    sink: S,
    stream: R,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: std::fmt::Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let writer = tokio::spawn(write_loop(hub.clone(), session.clone(), outbound, sink));
    read_loop(hub, store, session, stream).await;
    if let Err(e) = writer.await {
        tracing::error!(error = %e, "Session writer task failed");
    }
}

pub async fn read_loop<R, E>(hub: Hub, store: Arc<dyn MessageStore>, session: Arc<SessionHandle>, mut stream: R)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let max_frame_size = hub.config().max_frame_size;

    loop {
        let next = tokio::select! {
            _ = session.done().cancelled() => break,
            next = stream.next() => next,
        };
        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                tracing::debug!(session_id = session.id(), error = %e, "Read failed");
                break;
            }
            None => break,
        };

        session.acknowledge();
        match frame {
            Message::Text(text) => {
                handle_payload(&hub, store.as_ref(), &session, text.as_str().as_bytes(), max_frame_size).await
            }
            Message::Binary(data) => handle_payload(&hub, store.as_ref(), &session, &data, max_frame_size).await,
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => break,
        }
    }

    hub.unregister(session.id()).await;
}

async fn handle_payload(
    hub: &Hub,
    store: &dyn MessageStore,
    session: &SessionHandle,
    payload: &[u8],
    max_frame_size: usize,
) {
    let (user_id, username) = match session.identity() {
        ChatIdentity::Member { user_id, username } => (*user_id, username.clone()),
        ChatIdentity::Guest { .. } => {
            tracing::trace!(session_id = session.id(), "Dropping frame from read-only session");
            return;
        }
    };

    let content = match frame::parse_content(payload, max_frame_size) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(session_id = session.id(), error = %e, "Dropping inbound frame");
            return;
        }
    };

    let now = Utc::now();
    let record = NewChatMessage {
        content: content.clone(),
        username: username.clone(),
        user_id,
        created_at: now,
    };
    if let Err(e) = store.save(record).await {
        // Live delivery does not depend on durability.
        tracing::error!(session_id = session.id(), error = %e, "Failed to persist chat message");
    }

    hub.broadcast(WsMessage::chat(content, username, user_id, now)).await;
}

pub async fn write_loop<S>(hub: Hub, session: Arc<SessionHandle>, mut outbound: mpsc::Receiver<Outbound>, mut sink: S)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let write_timeout = hub.config().write_timeout;

    loop {
        let item = tokio::select! {
            biased;
            _ = session.done().cancelled() => break,
            item = outbound.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let frame = match item {
            Outbound::Chat(message) => match serde_json::to_string(&message) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode chat frame");
                    continue;
                }
            },
            Outbound::Ping => Message::Ping(Bytes::new()),
        };

        match tokio::time::timeout(write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(session_id = session.id(), error = %e, "Write failed");
                break;
            }
            Err(_) => {
                tracing::warn!(session_id = session.id(), "Write deadline exceeded");
                break;
            }
        }
    }

    let _ = tokio::time::timeout(write_timeout, sink.send(Message::Close(None))).await;
    hub.unregister(session.id()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::hub::HubConfig;
    use crate::db::init_database;
    use crate::store::{SqliteMessageStore, StoreError};
    use async_trait::async_trait;
    use chrono::DateTime;
    use forum_shared::{ChatMessage, MessageKind};
    use futures_channel::mpsc as fmpsc;
    use std::time::Duration;

    fn store() -> Arc<SqliteMessageStore> {
        Arc::new(SqliteMessageStore::new(init_database(":memory:").unwrap()))
    }

    fn member(id: i64, name: &str) -> ChatIdentity {
        ChatIdentity::Member {
            user_id: id,
            username: name.to_string(),
        }
    }

    fn text(content: &str) -> Result<Message, std::io::Error> {
        Ok(Message::Text(serde_json::json!({ "content": content }).to_string().into()))
    }

    async fn recv_chat(rx: &mut mpsc::Receiver<Outbound>) -> WsMessage {
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(Outbound::Chat(msg))) => msg,
            other => panic!("expected chat frame, got {other:?}"),
        }
    }

    /// Store that refuses every write.
    struct ReadOnlyStore;

    #[async_trait]
    impl MessageStore for ReadOnlyStore {
        async fn save(&self, _message: NewChatMessage) -> Result<ChatMessage, StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        async fn recent(&self, _limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
            Ok(Vec::new())
        }
        async fn before(&self, _before: DateTime<Utc>, _limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn guest_names_are_synthesized() {
        let guest = ChatIdentity::guest();
        let name = guest.display_name();
        assert!(name.starts_with("Guest_"));
        let suffix = &name["Guest_".len()..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert!(guest.is_read_only());
        assert_eq!(guest.user_id(), 0);
    }

    #[test]
    fn close_is_idempotent_and_stops_delivery() {
        let (session, _rx) = SessionHandle::new(member(1, "alice"), 2);
        assert_eq!(session.try_deliver(Outbound::Ping), Delivery::Queued);
        assert!(session.close());
        assert!(!session.close());
        assert!(session.is_closed());
        assert_eq!(session.try_deliver(Outbound::Ping), Delivery::Closed);
    }

    #[test]
    fn full_queue_is_reported() {
        let (session, _rx) = SessionHandle::new(member(1, "alice"), 1);
        assert_eq!(session.try_deliver(Outbound::Ping), Delivery::Queued);
        assert_eq!(session.try_deliver(Outbound::Ping), Delivery::Full);
    }

    #[tokio::test]
    async fn member_messages_are_persisted_and_broadcast() {
        let store = store();
        let hub = Hub::spawn(HubConfig::default(), store.clone());

        let (listener, mut listener_rx) = SessionHandle::new(ChatIdentity::guest(), 8);
        hub.register(listener.clone()).await.unwrap();

        let (speaker, _speaker_rx) = SessionHandle::new(member(7, "alice"), 8);
        hub.register(speaker.clone()).await.unwrap();

        let frames = futures_util::stream::iter(vec![text("  hello there  ")]);
        read_loop(hub.clone(), store.clone(), speaker.clone(), frames).await;

        let msg = recv_chat(&mut listener_rx).await;
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.content, "hello there");
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.user_id, 7);

        let stored = store.recent(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].username, "alice");

        // The stream ended, so the speaker unregistered itself.
        assert!(!hub.contains(speaker.id()).await);
        assert!(speaker.is_closed());
    }

    #[tokio::test]
    async fn failed_save_still_broadcasts() {
        let store = Arc::new(ReadOnlyStore);
        let hub = Hub::spawn(HubConfig::default(), store.clone());

        let (listener, mut listener_rx) = SessionHandle::new(member(1, "bob"), 8);
        hub.register(listener.clone()).await.unwrap();

        let (speaker, _speaker_rx) = SessionHandle::new(member(7, "alice"), 8);
        hub.register(speaker.clone()).await.unwrap();

        let frames = futures_util::stream::iter(vec![text("still here")]);
        read_loop(hub.clone(), store, speaker, frames).await;

        let msg = recv_chat(&mut listener_rx).await;
        assert_eq!(msg.content, "still here");
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.user_id, 7);
    }

    #[tokio::test]
    async fn guest_frames_are_dropped() {
        let store = store();
        let hub = Hub::spawn(HubConfig::default(), store.clone());

        let (listener, mut listener_rx) = SessionHandle::new(member(1, "bob"), 8);
        hub.register(listener.clone()).await.unwrap();

        let (guest, _guest_rx) = SessionHandle::new(ChatIdentity::guest(), 8);
        hub.register(guest.clone()).await.unwrap();

        let frames = futures_util::stream::iter(vec![text("let me in")]);
        read_loop(hub.clone(), store.clone(), guest, frames).await;

        assert!(store.recent(10).await.unwrap().is_empty());
        let nothing = tokio::time::timeout(Duration::from_millis(100), listener_rx.recv()).await;
        assert!(nothing.is_err(), "guest frame reached a listener: {nothing:?}");
    }

    #[tokio::test]
    async fn content_over_500_chars_is_dropped() {
        let store = store();
        let hub = Hub::spawn(HubConfig::default(), store.clone());

        let (listener, mut listener_rx) = SessionHandle::new(member(2, "carol"), 8);
        hub.register(listener.clone()).await.unwrap();
        let (speaker, _rx) = SessionHandle::new(member(1, "alice"), 8);
        hub.register(speaker.clone()).await.unwrap();

        let frames = futures_util::stream::iter(vec![
            text(&"x".repeat(501)),
            Ok(Message::Text("garbage".into())),
            text(&"y".repeat(500)),
        ]);
        read_loop(hub.clone(), store.clone(), speaker, frames).await;

        let msg = recv_chat(&mut listener_rx).await;
        assert_eq!(msg.content, "y".repeat(500));
        let stored = store.recent(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content.len(), 500);
    }

    #[tokio::test]
    async fn writer_encodes_frames_and_stops_on_close() {
        let hub = Hub::spawn(HubConfig::default(), store());
        let (session, rx) = SessionHandle::new(member(1, "alice"), 8);
        hub.register(session.clone()).await.unwrap();

        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let writer = tokio::spawn(write_loop(hub.clone(), session.clone(), rx, sink));

        let at = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            session.try_deliver(Outbound::Chat(WsMessage::chat("hi", "bob", 2, at))),
            Delivery::Queued
        );
        assert_eq!(session.try_deliver(Outbound::Ping), Delivery::Queued);

        match written.next().await {
            Some(Message::Text(json)) => {
                let value: serde_json::Value = serde_json::from_str(json.as_str()).unwrap();
                assert_eq!(value["type"], 1);
                assert_eq!(value["sender"], "bob");
                assert_eq!(value["timestamp"], 1_700_000_000);
            }
            other => panic!("expected text frame, got {other:?}"),
        }
        assert!(matches!(written.next().await, Some(Message::Ping(_))));

        hub.unregister(session.id()).await;
        tokio::time::timeout(Duration::from_secs(1), writer).await.unwrap().unwrap();
        assert!(matches!(written.next().await, Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn writer_failure_unregisters() {
        let hub = Hub::spawn(HubConfig::default(), store());
        let (session, rx) = SessionHandle::new(member(1, "alice"), 8);
        hub.register(session.clone()).await.unwrap();

        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);
        session.try_deliver(Outbound::Ping);
        write_loop(hub.clone(), session.clone(), rx, sink).await;

        assert!(!hub.contains(session.id()).await);
        assert!(session.is_closed());
    }
}
