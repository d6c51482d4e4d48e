//! Shared routing table for in-memory brokers.

use crate::dispatch::DeadLetterSink;
use crate::error::BrokerError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Routing table shared by every [`super::MemoryBroker`] built on it.
///
/// Brokers on the same hub see each other's messages, the way clients of one
/// server do. Subject patterns follow NATS rules: tokens are separated by
/// `.`, `*` matches exactly one token and a trailing `>` matches one or more.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    state: Mutex<HubState>,
    next_id: AtomicU64,
    connections: AtomicU64,
}

#[derive(Default)]
struct HubState {
    routes: Vec<Route>,
    // Round-robin position per queue group
    cursors: HashMap<String, usize>,
}

struct Route {
    id: u64,
    pattern: String,
    queue: Option<String>,
    mailbox: mpsc::UnboundedSender<Vec<u8>>,
}

/// A subscription's place in the hub.
pub(crate) struct Registration {
    pub id: u64,
    pub mailbox: mpsc::UnboundedReceiver<Vec<u8>>,
    pub requeue: mpsc::UnboundedSender<Vec<u8>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections opened against this hub so far.
    pub fn connection_attempts(&self) -> u64 {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    pub async fn subscription_count(&self) -> usize {
        let state = self.inner.state.lock().await;
        state
            .routes
            .iter()
            .filter(|route| !route.mailbox.is_closed())
            .count()
    }

    pub(crate) fn open_connection(&self) {
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) async fn register(&self, pattern: &str, queue: Option<&str>) -> Registration {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.inner.state.lock().await;
        state.routes.push(Route {
            id,
            pattern: pattern.to_string(),
            queue: queue.map(str::to_string),
            mailbox: tx.clone(),
        });

        Registration {
            id,
            mailbox: rx,
            requeue: tx,
        }
    }

    pub(crate) async fn remove(&self, id: u64) {
        let mut state = self.inner.state.lock().await;
        state.routes.retain(|route| route.id != id);
    }

    /// Route `payload` to every matching subscription, one member per queue
    /// group. Returns the number of subscriptions it was handed to.
    pub(crate) async fn deliver(&self, subject: &str, payload: &[u8]) -> usize {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        state.routes.retain(|route| !route.mailbox.is_closed());

        let mut delivered = 0;
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();

        for (idx, route) in state.routes.iter().enumerate() {
            if !subject_matches(&route.pattern, subject) {
                continue;
            }
            match route.queue.as_deref() {
                Some(queue) => groups.entry(queue).or_default().push(idx),
                None => {
                    if route.mailbox.send(payload.to_vec()).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }

        for (queue, members) in groups {
            let cursor = state.cursors.entry(queue.to_string()).or_insert(0);
            let idx = members[*cursor % members.len()];
            *cursor = cursor.wrapping_add(1);

            if state.routes[idx].mailbox.send(payload.to_vec()).is_ok() {
                delivered += 1;
            }
        }

        delivered
    }
}

#[async_trait]
impl DeadLetterSink for MemoryHub {
    async fn forward(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.deliver(topic, payload).await;
        Ok(())
    }
}

/// NATS subject matching of `subject` against `pattern`.
pub(crate) fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern = pattern.split('.');
    let mut subject = subject.split('.');

    loop {
        match (pattern.next(), subject.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
