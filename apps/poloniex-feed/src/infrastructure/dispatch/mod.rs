//! Event Dispatcher
//!
//! Topic-based fan-out of decoded feed events.
//!
//! # Architecture
//!
//! Every `(topic, listener)` registration owns a bounded delivery queue and
//! a delivery task. Publishing only enqueues, so a slow listener never stalls
//! the read loop. When a queue is full the oldest queued event is dropped and
//! counted. Each queue is FIFO, so every listener sees a topic's events in
//! publish order.
//!
//! Listeners registered outside a Tokio runtime get their delivery task at
//! the first publish made inside one; events queued before that are kept.
//!
//! Closing the dispatcher discards whatever is still queued.

use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::domain::streaming::{FeedEvent, Topic};
use crate::infrastructure::metrics;

// =============================================================================
// Listeners
// =============================================================================

/// Callback invoked for each delivered event.
pub type Listener = Arc<dyn Fn(&FeedEvent) + Send + Sync>;

/// Handle for removing a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

// =============================================================================
// Delivery Queue
// =============================================================================

/// Bounded drop-oldest queue feeding one listener.
#[derive(Debug)]
pub struct DeliveryQueue {
    events: Mutex<VecDeque<Arc<FeedEvent>>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl DeliveryQueue {
    /// Create a queue holding at most `capacity` events (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue `event`, returning the event evicted to make room.
    pub fn push(&self, event: Arc<FeedEvent>) -> Option<Arc<FeedEvent>> {
        if self.is_closed() {
            return None;
        }

        let mut events = self.events.lock();
        let evicted = if events.len() >= self.capacity {
            events.pop_front()
        } else {
            None
        };
        events.push_back(event);
        drop(events);

        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    /// Dequeue the oldest event.
    pub fn pop(&self) -> Option<Arc<FeedEvent>> {
        self.events.lock().pop_front()
    }

    /// Events currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events evicted so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Discard queued events and stop accepting new ones.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.events.lock().clear();
        self.notify.notify_one();
    }

    /// Whether the queue was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn deliver(queue: Arc<DeliveryQueue>, listener: Listener, topic: Topic, cancel: CancellationToken) {
    loop {
        while let Some(event) = queue.pop() {
            if queue.is_closed() {
                return;
            }
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::warn!(topic = %topic, kind = event.kind().as_str(), "Listener panicked");
            }
        }
        if queue.is_closed() {
            return;
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = queue.notify.notified() => {}
        }
    }
}

/// Delivery task not yet spawned.
struct PendingDelivery {
    listener: Listener,
    topic: Topic,
    cancel: CancellationToken,
}

impl PendingDelivery {
    fn spawn(self, handle: &Handle, queue: &Arc<DeliveryQueue>) {
        handle.spawn(deliver(Arc::clone(queue), self.listener, self.topic, self.cancel));
    }
}

struct Registration {
    id: ListenerId,
    queue: Arc<DeliveryQueue>,
    pending: Mutex<Option<PendingDelivery>>,
}

impl Registration {
    /// Spawn the delivery task if it is still pending and a runtime is
    /// available.
    fn start_delivery(&self) {
        let mut pending = self.pending.lock();
        if pending.is_none() {
            return;
        }
        if let Ok(handle) = Handle::try_current()
            && let Some(delivery) = pending.take()
        {
            delivery.spawn(&handle, &self.queue);
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Dispatcher statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events published.
    pub published: u64,
    /// Queue entries created by publishing (one per matching registration).
    pub deliveries: u64,
    /// Events evicted from full queues.
    pub dropped: u64,
    /// Live registrations.
    pub listeners: usize,
}

/// Topic-based publish/subscribe fan-out.
///
/// # Example
///
/// ```rust,no_run
/// use poloniex_feed::domain::streaming::{FeedEvent, Topic};
/// use poloniex_feed::infrastructure::dispatch::EventDispatcher;
///
/// # async fn example() {
/// let dispatcher = EventDispatcher::new(1024);
///
/// let id = dispatcher.subscribe(Topic::from("BTC_ETH"), |event: &FeedEvent| {
///     println!("{event:?}");
/// });
///
/// dispatcher.unsubscribe(&Topic::from("BTC_ETH"), id);
/// # }
/// ```
pub struct EventDispatcher {
    topics: RwLock<HashMap<Topic, Vec<Registration>>>,
    queue_capacity: usize,
    next_id: AtomicU64,
    published: AtomicU64,
    deliveries: AtomicU64,
    dropped: AtomicU64,
    cancel: CancellationToken,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("queue_capacity", &self.queue_capacity)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Create a dispatcher whose listener queues hold `queue_capacity` events.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self::with_cancel(queue_capacity, CancellationToken::new())
    }

    /// Create a dispatcher whose delivery tasks stop when `cancel` fires.
    #[must_use]
    pub fn with_cancel(queue_capacity: usize, cancel: CancellationToken) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            cancel,
        }
    }

    /// Register `listener` on `topic`.
    ///
    /// Inside a Tokio runtime the delivery task starts immediately;
    /// otherwise at the first publish made from within one.
    pub fn subscribe<F>(&self, topic: Topic, listener: F) -> ListenerId
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let queue = Arc::new(DeliveryQueue::new(self.queue_capacity));
        if self.cancel.is_cancelled() {
            queue.close();
            return id;
        }

        let delivery = PendingDelivery {
            listener: Arc::new(listener),
            topic: topic.clone(),
            cancel: self.cancel.child_token(),
        };
        let pending = match Handle::try_current() {
            Ok(handle) => {
                delivery.spawn(&handle, &queue);
                None
            }
            Err(_) => {
                tracing::debug!(topic = %topic, "No runtime yet, delivery deferred");
                Some(delivery)
            }
        };

        let mut topics = self.topics.write();
        topics.entry(topic.clone()).or_default().push(Registration {
            id,
            queue,
            pending: Mutex::new(pending),
        });
        let count = topics.values().map(Vec::len).sum::<usize>();
        drop(topics);

        metrics::set_listeners(count as f64);
        tracing::debug!(topic = %topic, listener = id.get(), "Listener registered");
        id
    }

    /// Remove the registration `id` from `topic`.
    ///
    /// Returns `false` if no such registration exists.
    pub fn unsubscribe(&self, topic: &Topic, id: ListenerId) -> bool {
        let mut topics = self.topics.write();
        let Some(registrations) = topics.get_mut(topic) else {
            return false;
        };
        let Some(index) = registrations.iter().position(|r| r.id == id) else {
            return false;
        };

        let registration = registrations.remove(index);
        if registrations.is_empty() {
            topics.remove(topic);
        }
        let count = topics.values().map(Vec::len).sum::<usize>();
        drop(topics);

        registration.queue.close();
        metrics::set_listeners(count as f64);
        tracing::debug!(topic = %topic, listener = id.get(), "Listener removed");
        true
    }

    /// Publish `event` to every registration on any of its topics.
    ///
    /// Returns the number of queues the event was placed on.
    pub fn publish(&self, event: FeedEvent) -> usize {
        if self.cancel.is_cancelled() {
            return 0;
        }

        let kind = event.kind();
        let topics = event.topics();
        let event = Arc::new(event);
        let mut delivered = 0usize;
        let mut dropped = 0u64;

        {
            let registered = self.topics.read();
            for topic in &topics {
                let Some(registrations) = registered.get(topic) else {
                    continue;
                };
                for registration in registrations {
                    registration.start_delivery();
                    if registration.queue.push(Arc::clone(&event)).is_some() {
                        dropped += 1;
                    }
                    delivered += 1;
                }
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
        metrics::record_event_published(kind);
        if dropped > 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
            metrics::record_events_dropped(kind, dropped);
            tracing::debug!(kind = kind.as_str(), dropped, "Slow listener, oldest events dropped");
        }
        delivered
    }

    /// Number of live registrations.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.topics.read().values().map(Vec::len).sum()
    }

    /// Registrations on `topic`.
    #[must_use]
    pub fn topic_listener_count(&self, topic: &Topic) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }

    /// Events dropped from full queues.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            published: self.published.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dropped: self.dropped_events(),
            listeners: self.listener_count(),
        }
    }

    /// Stop delivery and discard queued events.
    pub fn close(&self) {
        self.cancel.cancel();
        let registrations: Vec<_> = self.topics.write().drain().collect();
        for (_, registrations) in registrations {
            for registration in registrations {
                registration.queue.close();
            }
        }
        metrics::set_listeners(0.0);
    }
}

// =============================================================================
// Tests
// =============================================================================
