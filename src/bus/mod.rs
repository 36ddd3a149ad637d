//! `EventBus<K, P>` — typed, multi-subscriber, bounded, in-process fan-out.
//!
//! Each subscription owns its own bounded FIFO mailbox (spec §4.2, §9
//! design note: "do not share a single channel across subscribers"). The
//! teacher's `EventBus` (`examples/odgrim-abathur-swarm/src/services/event_bus.rs`)
//! wraps a single shared `tokio::sync::broadcast` channel, which has no
//! per-subscriber capacity or overflow policy, so the transport here is
//! built fresh on a hand-rolled mailbox while keeping the teacher's
//! envelope/tracing/test-module conventions.

mod mailbox;

pub mod agent_bus;
pub mod memory_bus;
pub mod task_bus;

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::error::{CoordinationError, CoordinationResult};

use mailbox::Mailbox;

pub use mailbox::FullMode;

/// Envelope delivered to subscribers, per spec's GLOSSARY definition.
#[derive(Debug, Clone)]
pub struct EventEnvelope<K, P> {
    pub kind: K,
    pub payload: P,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
}

/// `(kind set) AND (subject predicate)`, per spec §4.2.
pub struct EventFilter<K, P> {
    kinds: HashSet<K>,
    subject: Arc<dyn Fn(&P) -> bool + Send + Sync>,
}

impl<K, P> EventFilter<K, P>
where
    K: Eq + Hash,
{
    pub fn new(kinds: impl IntoIterator<Item = K>, subject: impl Fn(&P) -> bool + Send + Sync + 'static) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            subject: Arc::new(subject),
        }
    }

    fn matches(&self, kind: &K, payload: &P) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(kind)) && (self.subject)(payload)
    }
}

impl<K, P> Clone for EventFilter<K, P>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            kinds: self.kinds.iter().cloned().collect(),
            subject: Arc::clone(&self.subject),
        }
    }
}

struct Subscriber<K, P> {
    id: Uuid,
    filter: EventFilter<K, P>,
    mailbox: Arc<Mailbox<EventEnvelope<K, P>>>,
}

/// A live subscription. Dropping it (or letting its cancellation token
/// fire) removes the mailbox from the bus and completes `next()` calls
/// gracefully, per spec §4.2 and §5 (P4: cancellation cleanliness).
pub struct Subscription<K, P> {
    id: Uuid,
    bus: Arc<EventBusInner<K, P>>,
    mailbox: Arc<Mailbox<EventEnvelope<K, P>>>,
    cancellation: CancellationToken,
}

impl<K, P> Subscription<K, P>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    /// Pull the next matching envelope, or `None` once the subscription is
    /// cancelled or the bus is disposed.
    pub async fn next(&self) -> Option<EventEnvelope<K, P>> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => None,
            item = self.mailbox.recv() => item,
        }
    }
}

impl<K, P> Drop for Subscription<K, P> {
    fn drop(&mut self) {
        self.bus.remove(self.id);
    }
}

struct EventBusInner<K, P> {
    subscribers: Mutex<Vec<Subscriber<K, P>>>,
    disposed: std::sync::atomic::AtomicBool,
    default_capacity: usize,
    default_full_mode: FullMode,
}

impl<K, P> EventBusInner<K, P> {
    fn remove(&self, id: Uuid) {
        let mut subs = self.subscribers.lock().expect("event bus mutex poisoned");
        subs.retain(|s| s.id != id);
    }
}

/// Generic typed event bus. Concrete instantiations (`TaskBus`, `AgentBus`,
/// `MemoryBus`) fix `K`/`P` to a closed kind enum and payload enum, per
/// spec §9's design note.
#[derive(Clone)]
pub struct EventBus<K, P> {
    inner: Arc<EventBusInner<K, P>>,
}

impl<K, P> EventBus<K, P>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    pub fn new(default_capacity: usize, default_full_mode: FullMode) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                subscribers: Mutex::new(Vec::new()),
                disposed: std::sync::atomic::AtomicBool::new(false),
                default_capacity,
                default_full_mode,
            }),
        }
    }

    /// Lazily creates a per-subscriber mailbox. Cancelling `cancellation`
    /// later tears the subscription down gracefully.
    pub fn subscribe(
        &self,
        filter: EventFilter<K, P>,
        cancellation: CancellationToken,
    ) -> CoordinationResult<Subscription<K, P>> {
        if self.inner.disposed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CoordinationError::bus_disposed(
                "cannot subscribe: event bus has been disposed",
            ));
        }
        let id = Uuid::new_v4();
        let mailbox = Arc::new(Mailbox::new(
            self.inner.default_capacity,
            self.inner.default_full_mode,
        ));
        self.inner
            .subscribers
            .lock()
            .expect("event bus mutex poisoned")
            .push(Subscriber {
                id,
                filter: filter.clone(),
                mailbox: Arc::clone(&mailbox),
            });
        debug!(subscription_id = %id, "subscribed to event bus");
        Ok(Subscription {
            id,
            bus: Arc::clone(&self.inner),
            mailbox,
            cancellation,
        })
    }

    /// Delivers `payload` to every matching subscriber. Publish order to a
    /// single subscriber is strictly FIFO (spec §4.2); under `FullMode::Wait`
    /// this call suspends until every Wait-mode subscriber has room or
    /// `cancellation` fires.
    pub async fn publish(
        &self,
        kind: K,
        payload: P,
        correlation_id: Option<Uuid>,
        cancellation: &CancellationToken,
    ) -> CoordinationResult<()> {
        if self.inner.disposed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CoordinationError::bus_disposed(
                "cannot publish: event bus has been disposed",
            ));
        }
        let envelope = EventEnvelope {
            kind: kind.clone(),
            payload: payload.clone(),
            timestamp: Utc::now(),
            correlation_id,
        };
        let targets: Vec<Arc<Mailbox<EventEnvelope<K, P>>>> = {
            let subs = self.inner.subscribers.lock().expect("event bus mutex poisoned");
            subs.iter()
                .filter(|s| s.filter.matches(&kind, &payload))
                .map(|s| Arc::clone(&s.mailbox))
                .collect()
        };
        trace!(matched = targets.len(), "publishing event");
        for mailbox in targets {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    return Err(CoordinationError::cancelled("publish cancelled while waiting for subscriber capacity"));
                }
                result = mailbox.send(envelope.clone()) => {
                    result?;
                }
            }
        }
        Ok(())
    }

    /// Completes all active subscribers gracefully and causes subsequent
    /// publish/subscribe calls to fail with `BusDisposed` (spec §5).
    pub fn dispose(&self) {
        self.inner.disposed.store(true, std::sync::atomic::Ordering::SeqCst);
        let subs = {
            let mut guard = self.inner.subscribers.lock().expect("event bus mutex poisoned");
            std::mem::take(&mut *guard)
        };
        for sub in subs {
            sub.mailbox.close();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().expect("event bus mutex poisoned").len()
    }
}
