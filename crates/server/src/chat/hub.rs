//! The chat hub.
//!
//! A single coordinator task owns every registry mutation. `register`,
//! `unregister` and `broadcast` are requests sent to it over a bounded channel;
//! the health check runs as a helper task that reads the registry and asks the
//! coordinator for evictions through the same channel.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use forum_shared::WsMessage;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::session::{Delivery, Outbound, SessionHandle, SessionId};
use crate::store::MessageStore;

/// Consecutive unanswered probes after which a session is evicted.
pub const MAX_MISSED_PROBES: u32 = 2;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Messages replayed to a new session.
    pub history_limit: i64,
    /// Per-message timeout for history replay.
    pub history_send_timeout: Duration,
    /// Health check period.
    pub ping_interval: Duration,
    pub write_timeout: Duration,
    pub outbound_capacity: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_size: usize,
    pub request_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            history_send_timeout: Duration::from_millis(100),
            ping_interval: Duration::from_secs(25),
            write_timeout: Duration::from_secs(10),
            outbound_capacity: 256,
            max_frame_size: 1024,
            request_capacity: 1024,
        }
    }
}

impl HubConfig {
    /// How long a silent session survives before eviction.
    pub fn pong_wait(&self) -> Duration {
        self.ping_interval * MAX_MISSED_PROBES
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("chat hub is not running")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    Disconnected,
    SlowConsumer,
    Unresponsive,
    Shutdown,
}

impl fmt::Display for EvictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            EvictReason::Disconnected => "disconnected",
            EvictReason::SlowConsumer => "outbound queue full",
            EvictReason::Unresponsive => "missed liveness probes",
            EvictReason::Shutdown => "hub shutdown",
        };
        f.write_str(reason)
    }
}

enum Request {
    Register {
        session: Arc<SessionHandle>,
        done: oneshot::Sender<()>,
    },
    Unregister {
        id: SessionId,
        reason: EvictReason,
        done: oneshot::Sender<()>,
    },
    Broadcast(WsMessage),
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

type Registry = Arc<RwLock<HashMap<SessionId, Arc<SessionHandle>>>>;

/// Cloneable handle to the hub's coordinator task.
#[derive(Clone)]
pub struct Hub {
    requests: mpsc::Sender<Request>,
    registry: Registry,
    config: Arc<HubConfig>,
}

impl Hub {
    /// Start the coordinator. It stops on `shutdown` or once every handle is dropped.
    pub fn spawn(config: HubConfig, store: Arc<dyn MessageStore>) -> Self {
        let (tx, rx) = mpsc::channel(config.request_capacity.max(1));
        let registry = Registry::default();
        let config = Arc::new(config);

        let coordinator = Coordinator {
            registry: registry.clone(),
            config: config.clone(),
            store,
            requests: tx.downgrade(),
        };
        tokio::spawn(coordinator.run(rx));

        Self {
            requests: tx,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Add a session and schedule its history replay.
    pub async fn register(&self, session: Arc<SessionHandle>) -> Result<(), HubError> {
        let (done, ack) = oneshot::channel();
        self.requests
            .send(Request::Register { session, done })
            .await
            .map_err(|_| HubError::Closed)?;
        ack.await.map_err(|_| HubError::Closed)
    }

    /// Remove a session and close its queue. Repeated calls are no-ops.
    pub async fn unregister(&self, id: SessionId) {
        evict(&self.requests, id, EvictReason::Disconnected).await;
    }

    /// Queue a message for every registered session. Never waits on a session.
    pub async fn broadcast(&self, message: WsMessage) {
        if self.requests.send(Request::Broadcast(message)).await.is_err() {
            tracing::warn!("Broadcast dropped: chat hub is not running");
        }
    }

    /// Probe every session once, evicting those that missed too many probes.
    pub async fn health_check(&self) {
        health_check(self.registry.clone(), self.requests.clone()).await;
    }

    pub async fn len(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.registry.read().await.contains_key(&id)
    }

    /// Close every session and stop the coordinator.
    pub async fn shutdown(&self) {
        let (done, ack) = oneshot::channel();
        if self.requests.send(Request::Shutdown { done }).await.is_ok() {
            let _ = ack.await;
        }
    }
}

async fn evict(requests: &mpsc::Sender<Request>, id: SessionId, reason: EvictReason) {
    let (done, ack) = oneshot::channel();
    if requests.send(Request::Unregister { id, reason, done }).await.is_ok() {
        let _ = ack.await;
    }
}

async fn health_check(registry: Registry, requests: mpsc::Sender<Request>) {
    let sessions: Vec<Arc<SessionHandle>> = registry.read().await.values().cloned().collect();

    for session in sessions {
        let reason = if session.missed_probes() >= MAX_MISSED_PROBES {
            Some(EvictReason::Unresponsive)
        } else {
            session.record_probe();
            match session.try_deliver(Outbound::Ping) {
                Delivery::Queued => None,
                Delivery::Full => Some(EvictReason::SlowConsumer),
                Delivery::Closed => Some(EvictReason::Disconnected),
            }
        };

        if let Some(reason) = reason {
            evict(&requests, session.id(), reason).await;
        }
    }
}

/// Best-effort replay of recent history into a new session's queue.
async fn replay_history(store: Arc<dyn MessageStore>, session: Arc<SessionHandle>, limit: i64, per_message: Duration) {
    let messages = match store.recent(limit).await {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!(session_id = session.id(), error = %e, "Failed to load chat history");
            return;
        }
    };
    let Some(tx) = session.sender() else {
        return;
    };

    for message in &messages {
        let push = tokio::time::timeout(per_message, tx.send(Outbound::Chat(message.to_wire())));
        let sent = tokio::select! {
            _ = session.done().cancelled() => false,
            result = push => matches!(result, Ok(Ok(()))),
        };
        if !sent {
            tracing::debug!(session_id = session.id(), "History replay aborted");
            return;
        }
    }
    tracing::debug!(session_id = session.id(), count = messages.len(), "History replayed");
}

struct Coordinator {
    registry: Registry,
    config: Arc<HubConfig>,
    store: Arc<dyn MessageStore>,
    requests: mpsc::WeakSender<Request>,
}

impl Coordinator {
    async fn run(self, mut requests: mpsc::Receiver<Request>) {
        let period = self.config.ping_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Chat hub started");
        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else { break };
                    if !self.handle(request).await {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Some(sender) = self.requests.upgrade() {
                        tokio::spawn(health_check(self.registry.clone(), sender));
                    }
                }
            }
        }

        self.close_all().await;
        tracing::info!("Chat hub stopped");
    }

    /// Returns false once the hub should stop.
    async fn handle(&self, request: Request) -> bool {
        match request {
            Request::Register { session, done } => {
                self.register(session).await;
                let _ = done.send(());
            }
            Request::Unregister { id, reason, done } => {
                self.remove(id, reason).await;
                let _ = done.send(());
            }
            Request::Broadcast(message) => self.fan_out(message).await,
            Request::Shutdown { done } => {
                self.close_all().await;
                let _ = done.send(());
                return false;
            }
        }
        true
    }

    async fn register(&self, session: Arc<SessionHandle>) {
        if session.is_closed() {
            return;
        }
        let total = {
            let mut registry = self.registry.write().await;
            registry.insert(session.id(), session.clone());
            registry.len()
        };
        tracing::info!(
            session_id = session.id(),
            name = %session.identity().display_name(),
            read_only = session.identity().is_read_only(),
            total,
            "Session registered"
        );

        tokio::spawn(replay_history(
            self.store.clone(),
            session,
            self.config.history_limit,
            self.config.history_send_timeout,
        ));
    }

    async fn remove(&self, id: SessionId, reason: EvictReason) {
        let (removed, total) = {
            let mut registry = self.registry.write().await;
            let removed = registry.remove(&id);
            (removed, registry.len())
        };
        if let Some(session) = removed {
            session.close();
            tracing::info!(session_id = id, %reason, total, "Session unregistered");
        }
    }

    async fn fan_out(&self, message: WsMessage) {
        let mut evictions = Vec::new();
        {
            let registry = self.registry.read().await;
            for (id, session) in registry.iter() {
                match session.try_deliver(Outbound::Chat(message.clone())) {
                    Delivery::Queued => {}
                    Delivery::Full => {
                        tracing::warn!(session_id = id, "Outbound queue full");
                        evictions.push((*id, EvictReason::SlowConsumer));
                    }
                    Delivery::Closed => evictions.push((*id, EvictReason::Disconnected)),
                }
            }
        }
        for (id, reason) in evictions {
            self.remove(id, reason).await;
        }
    }

    async fn close_all(&self) {
        let sessions: Vec<_> = self.registry.write().await.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.close();
        }
        if !sessions.is_empty() {
            tracing::info!(count = sessions.len(), "Closed all chat sessions");
        }
    }
}
