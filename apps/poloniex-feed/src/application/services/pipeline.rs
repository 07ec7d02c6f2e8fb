//! Frame Pipeline
//!
//! Decode, sequence-check and dispatch, one frame at a time in wire order.
//!
//! A market frame whose sequence does not follow the previous one has its
//! order-book deltas replaced by a single [`ResyncNeeded`] event. Trades in
//! the same frame are still published. A frame carrying an initial-snapshot
//! record rebases the tracker instead of being checked. A frame whose
//! sequence is present but unreadable cannot be checked either; it is
//! treated as a gap and the market is forgotten until its next sequence.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::application::ports::FrameHandler;
use crate::domain::directory::ChannelDirectory;
use crate::domain::sequence::{SequenceCheck, SequenceTracker};
use crate::domain::streaming::{FeedEvent, ResyncNeeded};
use crate::infrastructure::dispatch::EventDispatcher;
use crate::infrastructure::metrics::{self, FrameKind};
use crate::infrastructure::poloniex::{FeedCodec, Frame, MarketUpdate};

const LOGGED_FRAME_CHARS: usize = 256;

/// Frame handler wiring codec, tracker and dispatcher together.
#[derive(Debug)]
pub struct FramePipeline {
    codec: FeedCodec,
    directory: Arc<ChannelDirectory>,
    sequences: Arc<SequenceTracker>,
    dispatcher: Arc<EventDispatcher>,
}

impl FramePipeline {
    /// Create a pipeline over shared context state.
    #[must_use]
    pub const fn new(
        directory: Arc<ChannelDirectory>,
        sequences: Arc<SequenceTracker>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            codec: FeedCodec::new(),
            directory,
            sequences,
            dispatcher,
        }
    }

    /// Process one frame. Returns the number of events published.
    pub fn process(&self, text: &str, received_at: DateTime<Utc>) -> usize {
        let frame = match self.codec.decode(text, &self.directory, received_at) {
            Ok(frame) => frame,
            Err(e) => {
                metrics::record_frame_rejected();
                tracing::warn!(error = %e, frame = %truncated(text), "Malformed frame skipped");
                return 0;
            }
        };

        match frame {
            Frame::Market(update) => {
                metrics::record_frame_received(FrameKind::Market);
                self.process_market(update, received_at)
            }
            Frame::Ticker(ticker) => {
                metrics::record_frame_received(FrameKind::Ticker);
                self.publish(FeedEvent::Ticker(ticker))
            }
            Frame::Chat(message) => {
                metrics::record_frame_received(FrameKind::Chat);
                self.publish(FeedEvent::Chat(message))
            }
            Frame::Heartbeat => {
                metrics::record_frame_received(FrameKind::Heartbeat);
                tracing::trace!("Heartbeat");
                0
            }
            Frame::Acknowledgement {
                channel,
                subscribed,
            } => {
                metrics::record_frame_received(FrameKind::Acknowledgement);
                tracing::trace!(channel = %channel, subscribed, "Subscription acknowledged");
                0
            }
            Frame::Ignored { .. } => {
                metrics::record_frame_received(FrameKind::Ignored);
                0
            }
        }
    }

    fn process_market(&self, update: MarketUpdate, received_at: DateTime<Utc>) -> usize {
        if update.initial {
            self.sequences.reset(&update.pair, update.sequence);
            tracing::debug!(pair = %update.pair, sequence = ?update.sequence, "Initial book marker");
            return self.publish_all(update.events);
        }

        if update.sequence_unreadable {
            let last = self.sequences.invalidate(&update.pair);
            return self.publish_resync(update, last, None, received_at);
        }

        match self.sequences.observe(&update.pair, update.sequence) {
            SequenceCheck::Gap { last, received } => {
                self.publish_resync(update, Some(last), Some(received), received_at)
            }
            SequenceCheck::Unsequenced | SequenceCheck::First | SequenceCheck::InOrder => {
                self.publish_all(update.events)
            }
        }
    }

    /// Publish a resync in place of the frame's deltas, then its trades.
    fn publish_resync(
        &self,
        update: MarketUpdate,
        last: Option<u64>,
        received: Option<u64>,
        received_at: DateTime<Utc>,
    ) -> usize {
        metrics::record_sequence_gap(&update.pair);
        tracing::warn!(
            pair = %update.pair,
            last = ?last,
            received = ?received,
            "Sequence gap, order book needs resync"
        );

        let mut published = self.publish(FeedEvent::ResyncNeeded(ResyncNeeded {
            pair: update.pair,
            last_sequence: last,
            received_sequence: received,
            detected_at: received_at,
        }));
        for event in update.events {
            if matches!(event, FeedEvent::Trade(_)) {
                published += self.publish(event);
            }
        }
        published
    }

    fn publish_all(&self, events: Vec<FeedEvent>) -> usize {
        events.into_iter().map(|event| self.publish(event)).sum()
    }

    fn publish(&self, event: FeedEvent) -> usize {
        self.dispatcher.publish(event);
        1
    }
}

impl FrameHandler for FramePipeline {
    fn on_frame(&self, text: &str, received_at: DateTime<Utc>) {
        let started = Instant::now();
        self.process(text, received_at);
        metrics::record_processing_duration(started.elapsed());
    }
}

fn truncated(text: &str) -> &str {
    match text.char_indices().nth(LOGGED_FRAME_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
