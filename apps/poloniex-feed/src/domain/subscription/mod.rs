//! Subscription Registry State
//!
//! Tracks which channels are active on the upstream connection.
//!
//! # Design
//!
//! One [`Channel`] record exists per canonical channel id. A record is
//! created only after the subscribe command for it was written, and removed
//! when the unsubscribe command was written. Each record remembers the
//! connection generation its subscribe command went out on, so that after a
//! reconnect the records still pointing at an older generation are exactly
//! the ones that need to be re-issued.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::directory::ChannelId;

// =============================================================================
// Types
// =============================================================================

/// An active upstream subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Canonical channel id.
    pub canonical_id: ChannelId,
    /// Name the channel was subscribed by.
    pub name: String,
    /// Whether the channel is active.
    pub active: bool,
    /// Connection generation the subscribe command was last sent on.
    pub generation: u64,
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Active channels.
    pub active: usize,
    /// Channels whose subscribe predates the given generation.
    pub stale: usize,
}

// =============================================================================
// Registry
// =============================================================================

/// Set of active channels keyed by canonical id.
///
/// # Example
///
/// ```rust
/// use poloniex_feed::domain::directory::ChannelId;
/// use poloniex_feed::domain::subscription::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new();
///
/// assert!(registry.activate(ChannelId::TICKER, "ticker", 1));
/// // Second activation of the same id is refused.
/// assert!(!registry.activate(ChannelId::TICKER, "ticker", 1));
///
/// // After a reconnect the channel is stale until re-sent.
/// assert_eq!(registry.stale_channels(2).len(), 1);
/// registry.mark_sent(ChannelId::TICKER, 2);
/// assert!(registry.stale_channels(2).is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    channels: RwLock<HashMap<ChannelId, Channel>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is active.
    #[must_use]
    pub fn is_active(&self, id: ChannelId) -> bool {
        self.channels.read().get(&id).is_some_and(|c| c.active)
    }

    /// Record `id` as active after its subscribe went out on `generation`.
    ///
    /// Returns `false` without touching the existing record when the id is
    /// already active.
    pub fn activate(&self, id: ChannelId, name: &str, generation: u64) -> bool {
        let mut channels = self.channels.write();
        if channels.get(&id).is_some_and(|c| c.active) {
            return false;
        }
        channels.insert(
            id,
            Channel {
                canonical_id: id,
                name: name.to_string(),
                active: true,
                generation,
            },
        );
        true
    }

    /// Remove the record for `id`.
    pub fn remove(&self, id: ChannelId) -> Option<Channel> {
        self.channels.write().remove(&id)
    }

    /// Active channels whose subscribe predates `generation`, by id.
    #[must_use]
    pub fn stale_channels(&self, generation: u64) -> Vec<Channel> {
        let mut stale: Vec<_> = self
            .channels
            .read()
            .values()
            .filter(|c| c.active && c.generation < generation)
            .cloned()
            .collect();
        stale.sort_by_key(|c| c.canonical_id);
        stale
    }

    /// Record that the subscribe for `id` was re-sent on `generation`.
    ///
    /// Returns `false` if the channel was removed in the meantime.
    pub fn mark_sent(&self, id: ChannelId, generation: u64) -> bool {
        match self.channels.write().get_mut(&id) {
            Some(channel) => {
                channel.generation = channel.generation.max(generation);
                true
            }
            None => false,
        }
    }

    /// Snapshot of every active channel, by id.
    #[must_use]
    pub fn active_channels(&self) -> Vec<Channel> {
        let mut active: Vec<_> = self
            .channels
            .read()
            .values()
            .filter(|c| c.active)
            .cloned()
            .collect();
        active.sort_by_key(|c| c.canonical_id);
        active
    }

    /// Number of active channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().values().filter(|c| c.active).count()
    }

    /// Whether no channel is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statistics relative to `generation`.
    #[must_use]
    pub fn stats(&self, generation: u64) -> RegistryStats {
        let channels = self.channels.read();
        RegistryStats {
            active: channels.values().filter(|c| c.active).count(),
            stale: channels
                .values()
                .filter(|c| c.active && c.generation < generation)
                .count(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const BTC_ETH: ChannelId = ChannelId(148);

    #[test]
    fn activate_new_channel() {
        let registry = SubscriptionRegistry::new();

        assert!(registry.activate(BTC_ETH, "BTC_ETH", 1));
        assert!(registry.is_active(BTC_ETH));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn activate_twice_keeps_one_record() {
        let registry = SubscriptionRegistry::new();

        registry.activate(BTC_ETH, "BTC_ETH", 1);
        assert!(!registry.activate(BTC_ETH, "148", 3));

        let active = registry.active_channels();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "BTC_ETH");
        assert_eq!(active[0].generation, 1);
    }

    #[test]
    fn remove_returns_record() {
        let registry = SubscriptionRegistry::new();
        registry.activate(BTC_ETH, "BTC_ETH", 1);

        let removed = registry.remove(BTC_ETH);
        assert_eq!(removed.map(|c| c.canonical_id), Some(BTC_ETH));
        assert!(!registry.is_active(BTC_ETH));
        assert!(registry.remove(BTC_ETH).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_after_generation_change() {
        let registry = SubscriptionRegistry::new();
        registry.activate(ChannelId::TICKER, "ticker", 1);
        registry.activate(BTC_ETH, "BTC_ETH", 2);

        let stale = registry.stale_channels(2);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].canonical_id, ChannelId::TICKER);

        let stale = registry.stale_channels(3);
        assert_eq!(
            stale.iter().map(|c| c.canonical_id).collect::<Vec<_>>(),
            vec![BTC_ETH, ChannelId::TICKER]
        );
    }

    #[test]
    fn mark_sent_clears_staleness() {
        let registry = SubscriptionRegistry::new();
        registry.activate(BTC_ETH, "BTC_ETH", 1);

        assert!(registry.mark_sent(BTC_ETH, 2));
        assert!(registry.stale_channels(2).is_empty());
        assert_eq!(registry.stats(2), RegistryStats { active: 1, stale: 0 });
    }

    #[test]
    fn mark_sent_after_remove_is_refused() {
        let registry = SubscriptionRegistry::new();
        registry.activate(BTC_ETH, "BTC_ETH", 1);
        registry.remove(BTC_ETH);

        assert!(!registry.mark_sent(BTC_ETH, 2));
        assert!(registry.is_empty());
    }

    #[test]
    fn thread_safety_concurrent_activation() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(SubscriptionRegistry::new());
        let mut handles = vec![];

        for i in 0..10u32 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                r.activate(ChannelId(100 + i), &format!("M{i}"), 1);
                r.activate(ChannelId::TICKER, "ticker", 1)
            }));
        }

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 11);
    }
}
