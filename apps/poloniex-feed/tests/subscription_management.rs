//! Subscription Management Integration Tests
//!
//! Tests subscription transitions and restore-after-reconnect through the
//! public service API, with an in-memory command sink standing in for the
//! connection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use poloniex_feed::application::ports::{Command, CommandSink};
use poloniex_feed::application::services::SubscriptionService;
use poloniex_feed::{
    ChannelDirectory, ChannelId, ConnectionError, FeedError, MarketSnapshot, SubscribeOutcome,
    SubscriptionRegistry, UnsubscribeOutcome,
};

/// Sink writing on a settable generation, with scripted failures.
#[derive(Default)]
struct ScriptedSink {
    generation: AtomicU64,
    failures: Mutex<VecDeque<bool>>,
    written: Mutex<Vec<(u64, Command)>>,
}

impl ScriptedSink {
    fn reconnect(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn fail_next(&self, count: usize) {
        self.failures.lock().extend(std::iter::repeat_n(true, count));
    }

    fn written(&self) -> Vec<(u64, Command)> {
        self.written.lock().clone()
    }
}

#[async_trait]
impl CommandSink for ScriptedSink {
    async fn send(&self, command: Command) -> Result<u64, ConnectionError> {
        if self.failures.lock().pop_front().unwrap_or(false) {
            return Err(ConnectionError::Lost);
        }
        let generation = self.generation.load(Ordering::SeqCst);
        self.written.lock().push((generation, command));
        Ok(generation)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

fn setup() -> (Arc<ScriptedSink>, Arc<SubscriptionRegistry>, SubscriptionService) {
    let sink = Arc::new(ScriptedSink::default());
    sink.reconnect();

    let directory = Arc::new(ChannelDirectory::with_snapshot(&MarketSnapshot::from_pairs([
        ("BTC_ETH", 148),
        ("BTC_XMR", 114),
        ("USDT_BTC", 121),
    ])));
    let registry = Arc::new(SubscriptionRegistry::new());
    let service = SubscriptionService::new(
        Arc::clone(&sink) as Arc<dyn CommandSink>,
        directory,
        Arc::clone(&registry),
    );
    (sink, registry, service)
}

#[tokio::test]
async fn one_record_per_channel_across_aliases() {
    let (sink, registry, service) = setup();

    service.subscribe("trollbox").await.unwrap();
    let outcome = service.subscribe("chat").await.unwrap();

    assert_eq!(outcome, SubscribeOutcome::AlreadyActive(ChannelId::CHAT));
    assert_eq!(registry.len(), 1);
    assert_eq!(sink.written(), vec![(1, Command::Subscribe(ChannelId::CHAT))]);
}

#[tokio::test]
async fn restore_covers_only_channels_still_active() {
    let (sink, registry, service) = setup();
    for pair in ["BTC_ETH", "BTC_XMR", "USDT_BTC"] {
        service.subscribe(pair).await.unwrap();
    }
    service.unsubscribe("BTC_XMR").await.unwrap();

    let generation = sink.reconnect();
    assert_eq!(registry.stats(generation).stale, 2);
    assert_eq!(service.resubscribe_stale(generation).await, 2);

    let restored: Vec<_> = sink
        .written()
        .into_iter()
        .filter(|(g, _)| *g == generation)
        .map(|(_, c)| c)
        .collect();
    assert_eq!(
        restored,
        vec![
            Command::Subscribe(ChannelId(121)),
            Command::Subscribe(ChannelId(148)),
        ]
    );
    assert_eq!(registry.stats(generation).stale, 0);
}

#[tokio::test]
async fn failed_restore_is_retried_on_next_generation() {
    let (sink, registry, service) = setup();
    service.subscribe("BTC_ETH").await.unwrap();
    service.subscribe("USDT_BTC").await.unwrap();

    let second = sink.reconnect();
    sink.fail_next(1);
    assert_eq!(service.resubscribe_stale(second).await, 0);
    assert_eq!(registry.stats(second).stale, 2);

    let third = sink.reconnect();
    assert_eq!(service.resubscribe_stale(third).await, 2);
    assert_eq!(registry.stats(third).stale, 0);
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn failed_unsubscribe_keeps_channel() {
    let (sink, registry, service) = setup();
    service.subscribe("BTC_ETH").await.unwrap();

    sink.fail_next(1);
    let err = service.unsubscribe("BTC_ETH").await.unwrap_err();

    assert!(matches!(err, FeedError::Connection(ConnectionError::Lost)));
    assert!(registry.is_active(ChannelId(148)));
    assert_eq!(
        service.unsubscribe("BTC_ETH").await.unwrap(),
        UnsubscribeOutcome::Unsubscribed(ChannelId(148))
    );
}

#[tokio::test]
async fn interleaved_subscribe_and_unsubscribe_settle_consistently() {
    let (sink, registry, service) = setup();
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for round in 0..20 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            if round % 2 == 0 {
                service.subscribe("BTC_ETH").await.map(|_| ())
            } else {
                service.unsubscribe("BTC_ETH").await.map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let subscribes = sink
        .written()
        .iter()
        .filter(|(_, c)| matches!(c, Command::Subscribe(_)))
        .count();
    let unsubscribes = sink.written().len() - subscribes;
    let active = usize::from(registry.is_active(ChannelId(148)));

    // Every transition alternates, so commands differ by the final state.
    assert_eq!(subscribes, unsubscribes + active);
    assert!(registry.len() <= 1);
}
