//! Market Feed
//!
//! Public control API. One `MarketFeed` owns one [`FeedContext`]; nothing
//! is process-global, so independent feeds can run side by side.
//!
//! # Tasks
//!
//! `start` spawns three tasks that run until `close`:
//!
//! - the read loop, feeding every frame through the [`FramePipeline`]
//! - the keepalive
//! - a generation watcher that restores subscriptions after each redial

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pipeline::FramePipeline;
use super::subscription::{SubscribeOutcome, SubscriptionService, UnsubscribeOutcome};
use crate::application::ports::{CommandSink, OrderBookSnapshot, SnapshotSource};
use crate::domain::directory::{ChannelDirectory, MarketSnapshot};
use crate::domain::sequence::SequenceTracker;
use crate::domain::streaming::{FeedEvent, Topic};
use crate::domain::subscription::{Channel, SubscriptionRegistry};
use crate::error::FeedError;
use crate::infrastructure::config::FeedConfig;
use crate::infrastructure::dispatch::{EventDispatcher, ListenerId};
use crate::infrastructure::poloniex::{
    ConnectionConfig, ConnectionManager, ConnectionState, spawn_keepalive,
};

/// Time allowed for background tasks to finish after `close`.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Context
// =============================================================================

/// Mutable state shared by the components of one feed.
#[derive(Debug, Clone)]
pub struct FeedContext {
    /// Name ↔ id directory.
    pub directory: Arc<ChannelDirectory>,
    /// Active channels.
    pub registry: Arc<SubscriptionRegistry>,
    /// Per-market sequence state.
    pub sequences: Arc<SequenceTracker>,
    /// Topic fan-out.
    pub dispatcher: Arc<EventDispatcher>,
}

impl FeedContext {
    /// Fresh context whose listener queues hold `queue_capacity` events.
    #[must_use]
    pub fn new(queue_capacity: usize, cancel: CancellationToken) -> Self {
        Self {
            directory: Arc::new(ChannelDirectory::new()),
            registry: Arc::new(SubscriptionRegistry::new()),
            sequences: Arc::new(SequenceTracker::new()),
            dispatcher: Arc::new(EventDispatcher::with_cancel(queue_capacity, cancel)),
        }
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Point-in-time view of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStats {
    /// Connection state.
    pub state: ConnectionState,
    /// Connection generation.
    pub generation: u64,
    /// Frames read since creation.
    pub frames_received: u64,
    /// Successful redials after the first connect.
    pub reconnects: u64,
    /// Failed dial attempts.
    pub dial_failures: u64,
    /// Most recent connection error.
    pub last_error: Option<String>,
    /// Active channels.
    pub active_channels: usize,
    /// Active channels not yet restored on the current generation.
    pub stale_channels: usize,
    /// Listener registrations.
    pub listeners: usize,
    /// Events published.
    pub events_published: u64,
    /// Events dropped from full listener queues.
    pub dropped_events: u64,
    /// Sequence gaps detected.
    pub sequence_gaps: u64,
    /// Markets listed in the directory.
    pub markets: usize,
}

// =============================================================================
// Feed
// =============================================================================

/// One multiplexed feed connection with typed topic dispatch.
///
/// # Example
///
/// ```rust,no_run
/// use poloniex_feed::application::services::MarketFeed;
/// use poloniex_feed::domain::streaming::{FeedEvent, Topic};
/// use poloniex_feed::infrastructure::config::FeedConfig;
/// use poloniex_feed::infrastructure::poloniex::PublicApiClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = FeedConfig::default();
/// let feed = MarketFeed::new(&config);
///
/// let rest = PublicApiClient::new(&config.public_api_url, config.rest_timeout)?;
/// feed.refresh_directory(&rest).await?;
///
/// feed.on("BTC_ETH-trade", |event: &FeedEvent| println!("{event:?}"));
/// feed.start().await?;
/// feed.subscribe("BTC_ETH").await?;
///
/// feed.close().await;
/// # Ok(())
/// # }
/// ```
pub struct MarketFeed {
    context: FeedContext,
    connection: Arc<ConnectionManager>,
    subscriptions: Arc<SubscriptionService>,
    pipeline: Arc<FramePipeline>,
    cancel: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for MarketFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketFeed")
            .field("connection", &self.connection)
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MarketFeed {
    /// Create a feed from loaded configuration. Nothing is dialled yet.
    #[must_use]
    pub fn new(config: &FeedConfig) -> Self {
        Self::with_connection_config(
            ConnectionConfig::from_settings(&config.connection),
            config.listeners.queue_capacity,
        )
    }

    /// Create a feed with explicit connection settings.
    #[must_use]
    pub fn with_connection_config(connection: ConnectionConfig, queue_capacity: usize) -> Self {
        let cancel = CancellationToken::new();
        let context = FeedContext::new(queue_capacity, cancel.child_token());
        let connection = Arc::new(ConnectionManager::new(connection, cancel.child_token()));
        let subscriptions = Arc::new(SubscriptionService::new(
            Arc::clone(&connection) as Arc<dyn CommandSink>,
            Arc::clone(&context.directory),
            Arc::clone(&context.registry),
        ));
        let pipeline = Arc::new(FramePipeline::new(
            Arc::clone(&context.directory),
            Arc::clone(&context.sequences),
            Arc::clone(&context.dispatcher),
        ));

        Self {
            context,
            connection,
            subscriptions,
            pipeline,
            cancel,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Shared state of this feed.
    #[must_use]
    pub const fn context(&self) -> &FeedContext {
        &self.context
    }

    /// Connection manager of this feed.
    #[must_use]
    pub const fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Seed or refresh the directory from `source`.
    ///
    /// # Errors
    ///
    /// [`FeedError::DirectoryUnavailable`] if the fetch fails. The directory
    /// is left unchanged.
    pub async fn refresh_directory(
        &self,
        source: &dyn SnapshotSource,
    ) -> Result<MarketSnapshot, FeedError> {
        let snapshot = source.fetch_directory().await?;
        self.context.directory.refresh(&snapshot);
        tracing::info!(markets = snapshot.markets.len(), "Directory refreshed");
        Ok(snapshot)
    }

    /// Connect and spawn the background tasks.
    ///
    /// Calling `start` again after a successful start returns the current
    /// generation without spawning anything.
    ///
    /// # Errors
    ///
    /// [`FeedError::Closed`] after `close`, or [`FeedError::Connection`]
    /// if the first connect exhausts its dial attempts. Nothing is spawned
    /// in that case and `start` may be retried.
    pub async fn start(&self) -> Result<u64, FeedError> {
        if self.cancel.is_cancelled() {
            return Err(FeedError::Closed);
        }
        if self.started.load(Ordering::SeqCst) {
            return Ok(self.connection.generation());
        }

        let generation = self.connection.ensure_connected().await?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(generation);
        }

        let reader = {
            let connection = Arc::clone(&self.connection);
            let pipeline = Arc::clone(&self.pipeline);
            tokio::spawn(async move { connection.run_read_loop(pipeline.as_ref()).await })
        };
        let keepalive = spawn_keepalive(&self.connection, self.cancel.child_token());
        let watcher = tokio::spawn(watch_generations(
            self.connection.subscribe_generation(),
            Arc::clone(&self.subscriptions),
            self.cancel.child_token(),
        ));
        self.tasks.lock().extend([reader, keepalive, watcher]);

        tracing::info!(generation, "Feed started");
        Ok(generation)
    }

    /// Subscribe to a channel by name (`ticker`, `BTC_ETH`, `1002`, ...).
    ///
    /// # Errors
    ///
    /// See [`SubscriptionService::subscribe`].
    pub async fn subscribe(&self, name: &str) -> Result<SubscribeOutcome, FeedError> {
        if self.cancel.is_cancelled() {
            return Err(FeedError::Closed);
        }
        self.subscriptions.subscribe(name).await
    }

    /// Unsubscribe from a channel by name.
    ///
    /// # Errors
    ///
    /// See [`SubscriptionService::unsubscribe`].
    pub async fn unsubscribe(&self, name: &str) -> Result<UnsubscribeOutcome, FeedError> {
        if self.cancel.is_cancelled() {
            return Err(FeedError::Closed);
        }
        self.subscriptions.unsubscribe(name).await
    }

    /// Register `listener` on `topic`.
    pub fn on<T, F>(&self, topic: T, listener: F) -> ListenerId
    where
        T: Into<Topic>,
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        self.context.dispatcher.subscribe(topic.into(), listener)
    }

    /// Remove the registration `id` from `topic`.
    pub fn off<T: Into<Topic>>(&self, topic: T, id: ListenerId) -> bool {
        self.context.dispatcher.unsubscribe(&topic.into(), id)
    }

    /// Fetch an order-book snapshot for `pair` and rebase its sequence.
    ///
    /// Deltas after the call are checked against the snapshot's sequence.
    ///
    /// # Errors
    ///
    /// [`FeedError::DirectoryUnavailable`] if the fetch fails.
    pub async fn resync(
        &self,
        pair: &str,
        source: &dyn SnapshotSource,
        depth: u32,
    ) -> Result<OrderBookSnapshot, FeedError> {
        let book = source.fetch_order_book(pair, depth).await?;
        self.context.sequences.reset(pair, Some(book.sequence));
        tracing::info!(pair, sequence = book.sequence, "Order book resynced");
        Ok(book)
    }

    /// Shut down. Queued events are discarded. Terminal.
    pub async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }

        self.connection.close().await;
        self.cancel.cancel();
        self.context.dispatcher.close();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Feed task did not stop in time");
            }
        }
        tracing::info!("Feed closed");
    }

    /// Connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Connection generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.connection.generation()
    }

    /// Events dropped from full listener queues.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.context.dispatcher.dropped_events()
    }

    /// Active channels, by id.
    #[must_use]
    pub fn active_channels(&self) -> Vec<Channel> {
        self.context.registry.active_channels()
    }

    /// Listener registrations.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.context.dispatcher.listener_count()
    }

    /// Snapshot of every counter.
    #[must_use]
    pub fn stats(&self) -> FeedStats {
        let connection = self.connection.stats();
        let registry = self.context.registry.stats(connection.generation);
        let dispatch = self.context.dispatcher.stats();

        FeedStats {
            state: connection.state,
            generation: connection.generation,
            frames_received: connection.frames_received,
            reconnects: connection.reconnects,
            dial_failures: connection.dial_failures,
            last_error: connection.last_error,
            active_channels: registry.active,
            stale_channels: registry.stale,
            listeners: dispatch.listeners,
            events_published: dispatch.published,
            dropped_events: dispatch.dropped,
            sequence_gaps: self.context.sequences.gap_count(),
            markets: self.context.directory.market_count(),
        }
    }
}

async fn watch_generations(
    mut generations: watch::Receiver<u64>,
    subscriptions: Arc<SubscriptionService>,
    cancel: CancellationToken,
) {
    generations.borrow_and_update();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = generations.changed() => {
                if changed.is_err() {
                    break;
                }
                let generation = *generations.borrow_and_update();
                let restored = subscriptions.resubscribe_stale(generation).await;
                if restored > 0 {
                    tracing::info!(generation, restored, "Subscriptions restored");
                }
            }
        }
    }
    tracing::debug!("Generation watcher stopped");
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::application::ports::{BookLevel, SnapshotError};
    use crate::domain::directory::ChannelId;
    use crate::infrastructure::poloniex::ReconnectConfig;

    struct FixedSource;

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn fetch_directory(&self) -> Result<MarketSnapshot, SnapshotError> {
            Ok(MarketSnapshot::from_pairs([("BTC_ETH", 148), ("USDT_BTC", 121)]))
        }

        async fn fetch_order_book(
            &self,
            _pair: &str,
            _depth: u32,
        ) -> Result<OrderBookSnapshot, SnapshotError> {
            Ok(OrderBookSnapshot {
                asks: vec![BookLevel {
                    rate: rust_decimal::Decimal::ONE,
                    amount: rust_decimal::Decimal::ONE,
                }],
                bids: Vec::new(),
                is_frozen: false,
                sequence: 4242,
            })
        }
    }

    struct DownSource;

    #[async_trait]
    impl SnapshotSource for DownSource {
        async fn fetch_directory(&self) -> Result<MarketSnapshot, SnapshotError> {
            Err(SnapshotError::Status(502))
        }

        async fn fetch_order_book(
            &self,
            _pair: &str,
            _depth: u32,
        ) -> Result<OrderBookSnapshot, SnapshotError> {
            Err(SnapshotError::Unavailable("down".to_string()))
        }
    }

    fn offline_feed() -> MarketFeed {
        MarketFeed::with_connection_config(
            ConnectionConfig {
                url: "ws://127.0.0.1:9".to_string(),
                connect_timeout: Duration::from_millis(200),
                reconnect: ReconnectConfig {
                    initial_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(2),
                    multiplier: 1.0,
                    jitter_factor: 0.0,
                    max_attempts: 2,
                },
                ..ConnectionConfig::default()
            },
            16,
        )
    }

    #[tokio::test]
    async fn refresh_directory_seeds_resolution() {
        let feed = offline_feed();
        let snapshot = feed.refresh_directory(&FixedSource).await.unwrap();

        assert_eq!(snapshot.markets.len(), 2);
        assert_eq!(
            feed.context().directory.resolve("BTC_ETH").unwrap(),
            ChannelId(148)
        );
        assert_eq!(feed.stats().markets, 2);
    }

    #[tokio::test]
    async fn failed_refresh_is_directory_unavailable() {
        let feed = offline_feed();
        feed.refresh_directory(&FixedSource).await.unwrap();

        let err = feed.refresh_directory(&DownSource).await.unwrap_err();

        assert!(matches!(err, FeedError::DirectoryUnavailable(_)));
        assert_eq!(feed.context().directory.market_count(), 2);
    }

    #[tokio::test]
    async fn resync_rebases_sequence() {
        let feed = offline_feed();
        let book = feed.resync("BTC_ETH", &FixedSource, 10).await.unwrap();

        assert_eq!(book.sequence, 4242);
        assert_eq!(feed.context().sequences.last("BTC_ETH"), Some(4242));
    }

    #[tokio::test]
    async fn start_against_unreachable_endpoint_returns_error() {
        let feed = offline_feed();

        let err = feed.start().await.unwrap_err();

        assert!(matches!(err, FeedError::Connection(_)));
        assert_eq!(feed.stats().dial_failures, 2);
        assert_eq!(feed.generation(), 0);
    }

    #[tokio::test]
    async fn subscribe_failure_leaves_channel_inactive() {
        let feed = offline_feed();

        assert!(feed.subscribe("ticker").await.is_err());
        assert!(feed.active_channels().is_empty());
    }

    #[tokio::test]
    async fn listeners_register_and_unregister() {
        let feed = offline_feed();
        let id = feed.on("ticker", |_: &FeedEvent| {});

        assert_eq!(feed.listener_count(), 1);
        assert!(feed.off("ticker", id));
        assert_eq!(feed.listener_count(), 0);
    }

    #[tokio::test]
    async fn closed_feed_rejects_calls() {
        let feed = offline_feed();
        feed.close().await;

        assert!(matches!(feed.start().await, Err(FeedError::Closed)));
        assert!(matches!(feed.subscribe("ticker").await, Err(FeedError::Closed)));
        assert_eq!(feed.connection_state(), ConnectionState::Disconnected);
    }
}
