//! Per-stream-kind fan-out (spec §4.4): accepts new downstream subscribers,
//! pushes server-sent events derived from store state, enforces max
//! connection time. Modeled as a broadcast hub with per-subscriber bounded
//! queues, matching spec §9's "channels for fan-out" note.

use dashmap::DashMap;
use relay_core::credential::Credential;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    ServerAll,
    ServerFlagsOnly,
    MobilePing,
    JsPing,
}

/// A single server-sent event: an `event:` type plus JSON `data:`.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl StreamEvent {
    pub fn put(data: serde_json::Value) -> Self {
        Self {
            event: "put".to_string(),
            data,
        }
    }

    pub fn patch(data: serde_json::Value) -> Self {
        Self {
            event: "patch".to_string(),
            data,
        }
    }

    pub fn delete(data: serde_json::Value) -> Self {
        Self {
            event: "delete".to_string(),
            data,
        }
    }

    pub fn ping() -> Self {
        Self {
            event: "ping".to_string(),
            data: serde_json::json!({}),
        }
    }
}

#[derive(Clone)]
struct Broadcast {
    env_id: String,
    event: StreamEvent,
}

struct SubscriberEntry {
    env_id: String,
    credential: Credential,
    kill: watch::Sender<bool>,
}

/// A live subscription handle. Dropping it unsubscribes (idempotent).
pub struct Subscription {
    id: u64,
    pub receiver: mpsc::Receiver<StreamEvent>,
    provider: Arc<Inner>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.provider.unsubscribe(self.id);
    }
}

struct Inner {
    kind: StreamKind,
    subscribers: DashMap<u64, SubscriberEntry>,
    broadcast_tx: broadcast::Sender<Broadcast>,
    next_id: AtomicU64,
    max_client_connection_time: Duration,
}

/// A single stream kind's fan-out hub. One instance per `StreamKind` lives
/// inside the relay (shared across all environments); subscribers are
/// disambiguated by `(env_id, credential)`.
#[derive(Clone)]
pub struct StreamProvider(Arc<Inner>);

impl StreamProvider {
    pub fn new(kind: StreamKind, max_client_connection_time: Duration) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self(Arc::new(Inner {
            kind,
            subscribers: DashMap::new(),
            broadcast_tx,
            next_id: AtomicU64::new(1),
            max_client_connection_time,
        }))
    }

    pub fn kind(&self) -> StreamKind {
        self.0.kind
    }

    /// Subscribe a new downstream connection. `initial_event` is the
    /// "put" snapshot derived from current store state by the caller (the
    /// endpoint handler, which has access to the environment's store).
    pub fn subscribe(
        &self,
        env_id: &str,
        credential: Credential,
        initial_event: StreamEvent,
    ) -> Subscription {
        let (tx, rx) = mpsc::channel(64);
        // Best-effort: a brand new channel never fails this send.
        let _ = tx.try_send(initial_event);

        let (kill_tx, mut kill_rx) = watch::channel(false);
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        self.0.subscribers.insert(
            id,
            SubscriberEntry {
                env_id: env_id.to_string(),
                credential: credential.clone(),
                kill: kill_tx,
            },
        );

        let mut broadcast_rx = self.0.broadcast_tx.subscribe();
        let env_id_owned = env_id.to_string();
        let inner = self.0.clone();
        let max_conn_time = self.0.max_client_connection_time;

        tokio::spawn(async move {
            let deadline_sleep = async {
                if max_conn_time.is_zero() {
                    std::future::pending::<()>().await
                } else {
                    tokio::time::sleep(max_conn_time).await
                }
            };
            tokio::pin!(deadline_sleep);

            loop {
                tokio::select! {
                    _ = &mut deadline_sleep => {
                        tracing::debug!(env = %env_id_owned, "stream subscriber hit max connection time");
                        break;
                    }
                    changed = kill_rx.changed() => {
                        if changed.is_ok() && *kill_rx.borrow() {
                            break;
                        }
                        if changed.is_err() {
                            break;
                        }
                    }
                    msg = broadcast_rx.recv() => {
                        match msg {
                            Ok(b) if b.env_id == env_id_owned => {
                                if tx.try_send(b.event).is_err() {
                                    tracing::debug!(env = %env_id_owned, "slow subscriber dropped (back-pressure)");
                                    break;
                                }
                            }
                            Ok(_) => continue,
                            Err(broadcast::error::RecvError::Lagged(_)) => {
                                tracing::debug!(env = %env_id_owned, "subscriber lagged, disconnecting");
                                break;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
            inner.subscribers.remove(&id);
        });

        Subscription {
            id,
            receiver: rx,
            provider: self.0.clone(),
        }
    }

    /// Idempotent unsubscribe.
    pub fn unsubscribe(&self, id: u64) {
        if let Some((_, entry)) = self.0.subscribers.remove(&id) {
            let _ = entry.kill.send(true);
        }
    }

    /// Push an incremental update to every subscriber of `env_id`.
    pub fn publish(&self, env_id: &str, event: StreamEvent) {
        let _ = self.0.broadcast_tx.send(Broadcast {
            env_id: env_id.to_string(),
            event,
        });
    }

    /// Closes every subscription whose environment equals `env_id`.
    pub fn drop_all_for_environment(&self, env_id: &str) {
        let ids: Vec<u64> = self
            .0
            .subscribers
            .iter()
            .filter(|e| e.env_id == env_id)
            .map(|e| *e.key())
            .collect();
        for id in ids {
            self.unsubscribe(id);
        }
    }

    /// Closes subscriptions for a single deprecated credential.
    pub fn drop_for_credential(&self, env_id: &str, credential: &Credential) {
        let ids: Vec<u64> = self
            .0
            .subscribers
            .iter()
            .filter(|e| e.env_id == env_id && &e.credential == credential)
            .map(|e| *e.key())
            .collect();
        for id in ids {
            self.unsubscribe(id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscribers.len()
    }
}

/// One `StreamProvider` per stream kind, addressable by kind.
#[derive(Clone)]
pub struct StreamProviders {
    pub server_all: StreamProvider,
    pub server_flags_only: StreamProvider,
    pub mobile_ping: StreamProvider,
    pub js_ping: StreamProvider,
}

impl StreamProviders {
    pub fn new(max_client_connection_time: Duration) -> Self {
        Self {
            server_all: StreamProvider::new(StreamKind::ServerAll, max_client_connection_time),
            server_flags_only: StreamProvider::new(
                StreamKind::ServerFlagsOnly,
                max_client_connection_time,
            ),
            mobile_ping: StreamProvider::new(StreamKind::MobilePing, max_client_connection_time),
            js_ping: StreamProvider::new(StreamKind::JsPing, max_client_connection_time),
        }
    }

    pub fn get(&self, kind: StreamKind) -> &StreamProvider {
        match kind {
            StreamKind::ServerAll => &self.server_all,
            StreamKind::ServerFlagsOnly => &self.server_flags_only,
            StreamKind::MobilePing => &self.mobile_ping,
            StreamKind::JsPing => &self.js_ping,
        }
    }

    pub fn drop_all_for_environment(&self, env_id: &str) {
        self.server_all.drop_all_for_environment(env_id);
        self.server_flags_only.drop_all_for_environment(env_id);
        self.mobile_ping.drop_all_for_environment(env_id);
        self.js_ping.drop_all_for_environment(env_id);
    }

    pub fn drop_for_credential(&self, env_id: &str, credential: &Credential) {
        self.server_all.drop_for_credential(env_id, credential);
        self.server_flags_only
            .drop_for_credential(env_id, credential);
        self.mobile_ping.drop_for_credential(env_id, credential);
        self.js_ping.drop_for_credential(env_id, credential);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_receives_initial_event() {
        let provider = StreamProvider::new(StreamKind::ServerAll, Duration::ZERO);
        let mut sub = provider.subscribe(
            "env-A",
            Credential::ServerKey("sdk-A".into()),
            StreamEvent::put(serde_json::json!({"flags": {}})),
        );
        let ev = sub.recv().await.unwrap();
        assert_eq!(ev.event, "put");
    }

    #[tokio::test]
    async fn publish_reaches_only_matching_environment() {
        let provider = StreamProvider::new(StreamKind::ServerAll, Duration::ZERO);
        let mut sub_a = provider.subscribe(
            "env-A",
            Credential::ServerKey("sdk-A".into()),
            StreamEvent::put(serde_json::json!({})),
        );
        let mut sub_b = provider.subscribe(
            "env-B",
            Credential::ServerKey("sdk-B".into()),
            StreamEvent::put(serde_json::json!({})),
        );
        sub_a.recv().await.unwrap();
        sub_b.recv().await.unwrap();

        provider.publish("env-A", StreamEvent::patch(serde_json::json!({"k": "v"})));

        let ev = sub_a.recv().await.unwrap();
        assert_eq!(ev.event, "patch");

        let timeout = tokio::time::timeout(Duration::from_millis(50), sub_b.recv()).await;
        assert!(timeout.is_err(), "env-B must not see env-A's update");
    }

    #[tokio::test]
    async fn drop_all_for_environment_ends_stream() {
        let provider = StreamProvider::new(StreamKind::ServerAll, Duration::ZERO);
        let mut sub = provider.subscribe(
            "env-A",
            Credential::ServerKey("sdk-A".into()),
            StreamEvent::put(serde_json::json!({})),
        );
        sub.recv().await.unwrap();
        provider.drop_all_for_environment("env-A");
        let ev = sub.recv().await;
        assert!(ev.is_none());
    }

    #[tokio::test]
    async fn drop_for_credential_only_affects_that_credential() {
        let provider = StreamProvider::new(StreamKind::ServerAll, Duration::ZERO);
        let old = Credential::ServerKey("sdk-old".into());
        let new = Credential::ServerKey("sdk-new".into());
        let mut sub_old = provider.subscribe(
            "env-A",
            old.clone(),
            StreamEvent::put(serde_json::json!({})),
        );
        let mut sub_new = provider.subscribe(
            "env-A",
            new.clone(),
            StreamEvent::put(serde_json::json!({})),
        );
        sub_old.recv().await.unwrap();
        sub_new.recv().await.unwrap();

        provider.drop_for_credential("env-A", &old);

        assert!(sub_old.recv().await.is_none());

        provider.publish("env-A", StreamEvent::patch(serde_json::json!({})));
        let ev = sub_new.recv().await.unwrap();
        assert_eq!(ev.event, "patch");
    }

    #[tokio::test]
    async fn idempotent_unsubscribe() {
        let provider = StreamProvider::new(StreamKind::ServerAll, Duration::ZERO);
        let sub = provider.subscribe(
            "env-A",
            Credential::ServerKey("sdk-A".into()),
            StreamEvent::put(serde_json::json!({})),
        );
        provider.unsubscribe(sub.id);
        provider.unsubscribe(sub.id);
        assert_eq!(provider.subscriber_count(), 0);
    }
}
