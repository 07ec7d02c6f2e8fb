//! Keepalive
//!
//! Periodic ping task for the feed connection. Each tick it pings the live
//! socket; if the previous ping has gone unanswered for longer than the pong
//! timeout, it marks that socket's generation dead instead. It never dials:
//! the next read or write path does that.
//!
//! Any inbound frame counts as an answer, so a busy stream never times out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::ConnectionError;

/// Keepalive timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// How long a ping may go unanswered.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

impl HeartbeatConfig {
    /// Build from connection settings.
    #[must_use]
    pub const fn from_connection_settings(
        settings: &crate::infrastructure::config::ConnectionSettings,
    ) -> Self {
        Self {
            ping_interval: settings.keepalive_interval,
            pong_timeout: settings.keepalive_timeout,
        }
    }
}

/// Liveness bookkeeping shared by the read loop and the keepalive task.
#[derive(Debug)]
pub struct HeartbeatState {
    last_activity: RwLock<Instant>,
    ping_sent_at: RwLock<Instant>,
    waiting_for_pong: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create fresh state.
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_activity: RwLock::new(now),
            ping_sent_at: RwLock::new(now),
            waiting_for_pong: AtomicBool::new(false),
        }
    }

    /// Any inbound frame or pong.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }

    /// Pong received.
    pub fn record_pong(&self) {
        self.record_activity();
    }

    /// Ping written. The timeout clock starts at the first unanswered ping.
    pub fn mark_ping_sent(&self) {
        if !self.waiting_for_pong.swap(true, Ordering::SeqCst) {
            *self.ping_sent_at.write() = Instant::now();
        }
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong.load(Ordering::SeqCst)
    }

    /// Whether the outstanding ping is older than `timeout`.
    #[must_use]
    pub fn is_overdue(&self, timeout: Duration) -> bool {
        self.is_waiting_for_pong() && self.ping_sent_at.read().elapsed() > timeout
    }

    /// Time since the last inbound traffic.
    #[must_use]
    pub fn time_since_activity(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Reset for a newly installed socket.
    pub fn reset(&self) {
        let now = Instant::now();
        *self.last_activity.write() = now;
        *self.ping_sent_at.write() = now;
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }
}

/// What the keepalive task needs from the connection.
#[async_trait]
pub trait KeepaliveTarget: Send + Sync {
    /// Generation of the live socket, `None` when nothing is live.
    fn live_generation(&self) -> Option<u64>;

    /// Shared liveness state.
    fn heartbeat(&self) -> &HeartbeatState;

    /// Write a ping on `generation`. A stale generation is a no-op.
    async fn ping(&self, generation: u64) -> Result<(), ConnectionError>;

    /// Mark `generation` dead. A stale generation is ignored.
    fn mark_dead(&self, generation: u64, reason: &str) -> bool;
}

/// Periodic keepalive task.
pub struct HeartbeatManager<T: ?Sized> {
    config: HeartbeatConfig,
    target: Arc<T>,
    cancel: CancellationToken,
}

impl<T> HeartbeatManager<T>
where
    T: KeepaliveTarget + ?Sized,
{
    /// Create a keepalive task for `target`.
    #[must_use]
    pub const fn new(config: HeartbeatConfig, target: Arc<T>, cancel: CancellationToken) -> Self {
        Self {
            config,
            target,
            cancel,
        }
    }

    /// Run until cancelled.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keepalive cancelled");
                    break;
                }
                _ = interval.tick() => self.tick().await,
            }
        }
    }

    /// One keepalive round.
    pub async fn tick(&self) {
        let Some(generation) = self.target.live_generation() else {
            return;
        };

        let state = self.target.heartbeat();
        if state.is_overdue(self.config.pong_timeout) {
            tracing::warn!(
                generation,
                timeout_secs = self.config.pong_timeout.as_secs(),
                "Keepalive timeout"
            );
            self.target.mark_dead(generation, "keepalive timeout");
            return;
        }

        state.mark_ping_sent();
        if let Err(e) = self.target.ping(generation).await {
            tracing::warn!(generation, error = %e, "Keepalive ping failed");
            self.target.mark_dead(generation, "keepalive ping failed");
        } else {
            tracing::trace!(generation, "Keepalive ping sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeTarget {
        generation: AtomicU64,
        live: AtomicBool,
        fail_ping: AtomicBool,
        pings: AtomicU64,
        dead: Mutex<Vec<u64>>,
        state: HeartbeatState,
    }

    impl FakeTarget {
        fn live(generation: u64) -> Arc<Self> {
            let target = Self::default();
            target.generation.store(generation, Ordering::SeqCst);
            target.live.store(true, Ordering::SeqCst);
            Arc::new(target)
        }
    }

    #[async_trait]
    impl KeepaliveTarget for FakeTarget {
        fn live_generation(&self) -> Option<u64> {
            self.live
                .load(Ordering::SeqCst)
                .then(|| self.generation.load(Ordering::SeqCst))
        }

        fn heartbeat(&self) -> &HeartbeatState {
            &self.state
        }

        async fn ping(&self, _generation: u64) -> Result<(), ConnectionError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.fail_ping.load(Ordering::SeqCst) {
                Err(ConnectionError::Lost)
            } else {
                Ok(())
            }
        }

        fn mark_dead(&self, generation: u64, _reason: &str) -> bool {
            self.dead.lock().push(generation);
            self.live.store(false, Ordering::SeqCst);
            true
        }
    }

    fn manager(target: &Arc<FakeTarget>, timeout: Duration) -> HeartbeatManager<FakeTarget> {
        HeartbeatManager::new(
            HeartbeatConfig {
                ping_interval: Duration::from_millis(10),
                pong_timeout: timeout,
            },
            Arc::clone(target),
            CancellationToken::new(),
        )
    }

    #[test]
    fn state_tracks_outstanding_ping() {
        let state = HeartbeatState::new();
        assert!(!state.is_waiting_for_pong());

        state.mark_ping_sent();
        assert!(state.is_waiting_for_pong());
        assert!(!state.is_overdue(Duration::from_secs(60)));

        state.record_activity();
        assert!(!state.is_waiting_for_pong());
        assert!(!state.is_overdue(Duration::ZERO));
    }

    #[tokio::test]
    async fn tick_pings_live_socket() {
        let target = FakeTarget::live(3);
        manager(&target, Duration::from_secs(60)).tick().await;

        assert_eq!(target.pings.load(Ordering::SeqCst), 1);
        assert!(target.state.is_waiting_for_pong());
        assert!(target.dead.lock().is_empty());
    }

    #[tokio::test]
    async fn unanswered_ping_marks_same_generation_dead() {
        let target = FakeTarget::live(5);
        let manager = manager(&target, Duration::from_millis(5));

        manager.tick().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.tick().await;

        assert_eq!(*target.dead.lock(), vec![5]);
        assert_eq!(target.pings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ping_failure_marks_dead() {
        let target = FakeTarget::live(2);
        target.fail_ping.store(true, Ordering::SeqCst);

        manager(&target, Duration::from_secs(60)).tick().await;

        assert_eq!(*target.dead.lock(), vec![2]);
    }

    #[tokio::test]
    async fn nothing_live_nothing_sent() {
        let target = Arc::new(FakeTarget::default());
        manager(&target, Duration::from_secs(60)).tick().await;

        assert_eq!(target.pings.load(Ordering::SeqCst), 0);
        assert!(target.dead.lock().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let target = FakeTarget::live(1);
        let cancel = CancellationToken::new();
        let manager = HeartbeatManager::new(
            HeartbeatConfig {
                ping_interval: Duration::from_millis(5),
                pong_timeout: Duration::from_secs(60),
            },
            Arc::clone(&target),
            cancel.clone(),
        );

        let handle = tokio::spawn(manager.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(target.pings.load(Ordering::SeqCst) >= 1);
    }
}
