//! Subscription Service
//!
//! Turns subscribe/unsubscribe requests into exactly one command per
//! transition. Transitions are serialized, so a second subscribe for a
//! channel whose first subscribe is still in flight sees it as active.

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::application::ports::{Command, CommandSink};
use crate::domain::directory::{ChannelDirectory, ChannelId};
use crate::domain::subscription::SubscriptionRegistry;
use crate::error::FeedError;
use crate::infrastructure::metrics;

/// Result of a subscribe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Command written; channel now active.
    Subscribed {
        /// Channel subscribed.
        channel: ChannelId,
        /// Connection generation the command went out on.
        generation: u64,
    },
    /// Channel was already active; nothing sent.
    AlreadyActive(ChannelId),
}

impl SubscribeOutcome {
    /// Channel the request resolved to.
    #[must_use]
    pub const fn channel(self) -> ChannelId {
        match self {
            Self::Subscribed { channel, .. } | Self::AlreadyActive(channel) => channel,
        }
    }
}

/// Result of an unsubscribe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// Command written; channel record removed.
    Unsubscribed(ChannelId),
    /// Channel was not active; nothing sent.
    NotActive(ChannelId),
}

/// Subscription transitions over a [`CommandSink`].
pub struct SubscriptionService {
    sink: Arc<dyn CommandSink>,
    directory: Arc<ChannelDirectory>,
    registry: Arc<SubscriptionRegistry>,
    transitions: AsyncMutex<()>,
}

impl std::fmt::Debug for SubscriptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionService")
            .field("active", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl SubscriptionService {
    /// Create a service writing through `sink`.
    #[must_use]
    pub fn new(
        sink: Arc<dyn CommandSink>,
        directory: Arc<ChannelDirectory>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            sink,
            directory,
            registry,
            transitions: AsyncMutex::new(()),
        }
    }

    /// Subscribe to the channel `name` resolves to.
    ///
    /// # Errors
    ///
    /// [`FeedError::Directory`] if `name` does not resolve, or
    /// [`FeedError::Connection`] if the command could not be written. The
    /// channel is only marked active after a successful write.
    pub async fn subscribe(&self, name: &str) -> Result<SubscribeOutcome, FeedError> {
        let id = self.directory.resolve(name)?;
        let _transition = self.transitions.lock().await;

        if self.registry.is_active(id) {
            tracing::debug!(channel = %id, name, "Already subscribed");
            return Ok(SubscribeOutcome::AlreadyActive(id));
        }

        let generation = self.sink.send(Command::Subscribe(id)).await?;
        let canonical = self
            .directory
            .channel_name(id)
            .unwrap_or_else(|| name.to_string());
        self.registry.activate(id, &canonical, generation);
        self.publish_gauge();

        tracing::info!(channel = %id, name = %canonical, generation, "Subscribed");
        Ok(SubscribeOutcome::Subscribed {
            channel: id,
            generation,
        })
    }

    /// Unsubscribe from the channel `name` resolves to.
    ///
    /// # Errors
    ///
    /// [`FeedError::Directory`] if `name` does not resolve, or
    /// [`FeedError::Connection`] if the command could not be written. On a
    /// failed write the channel stays active.
    pub async fn unsubscribe(&self, name: &str) -> Result<UnsubscribeOutcome, FeedError> {
        let id = self.directory.resolve(name)?;
        let _transition = self.transitions.lock().await;

        if !self.registry.is_active(id) {
            return Ok(UnsubscribeOutcome::NotActive(id));
        }

        self.sink.send(Command::Unsubscribe(id)).await?;
        self.registry.remove(id);
        self.publish_gauge();

        tracing::info!(channel = %id, name, "Unsubscribed");
        Ok(UnsubscribeOutcome::Unsubscribed(id))
    }

    /// Re-send subscribe for every active channel last sent before
    /// `generation`.
    ///
    /// Stops at the first failed write; the next generation change retries
    /// whatever is still stale. Returns the number of commands written.
    pub async fn resubscribe_stale(&self, generation: u64) -> usize {
        let _transition = self.transitions.lock().await;
        let stale = self.registry.stale_channels(generation);
        if stale.is_empty() {
            return 0;
        }

        tracing::info!(generation, channels = stale.len(), "Restoring subscriptions");
        let mut sent = 0;
        for channel in stale {
            match self.sink.send(Command::Subscribe(channel.canonical_id)).await {
                Ok(written_on) => {
                    self.registry.mark_sent(channel.canonical_id, written_on);
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        channel = %channel.canonical_id,
                        name = %channel.name,
                        error = %e,
                        "Resubscribe failed"
                    );
                    break;
                }
            }
        }
        sent
    }

    /// Registry this service mutates.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    fn publish_gauge(&self) {
        metrics::set_active_subscriptions(self.registry.len() as f64);
    }
}
