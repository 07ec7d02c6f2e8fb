//! Prometheus Metrics Module
//!
//! Exposes feed metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: frames received by kind, poison frames rejected
//! - **Events**: events published by kind, events dropped by slow listeners
//! - **Integrity**: sequence gaps, field coercion failures
//! - **Connection**: state, reconnects, commands sent
//! - **Latency**: frame decode-to-dispatch time
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::EventKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "poloniex_feed_frames_received_total",
        "Total frames read from the feed connection by frame kind"
    );
    describe_counter!(
        "poloniex_feed_frames_rejected_total",
        "Total frames that failed to decode"
    );
    describe_counter!(
        "poloniex_feed_events_published_total",
        "Total events published to the dispatcher by event kind"
    );
    describe_counter!(
        "poloniex_feed_events_dropped_total",
        "Total events dropped from full listener queues"
    );
    describe_counter!(
        "poloniex_feed_sequence_gaps_total",
        "Total order-book sequence gaps detected"
    );
    describe_counter!(
        "poloniex_feed_coercion_failures_total",
        "Total numeric fields replaced by a sentinel"
    );
    describe_counter!(
        "poloniex_feed_reconnects_total",
        "Total successful redials after the first connection"
    );
    describe_counter!(
        "poloniex_feed_commands_sent_total",
        "Total control commands written by verb"
    );

    describe_gauge!(
        "poloniex_feed_connection_state",
        "Connection state (0 disconnected, 1 connecting, 2 connected, 3 closing)"
    );
    describe_gauge!(
        "poloniex_feed_active_subscriptions",
        "Number of active channel subscriptions"
    );
    describe_gauge!(
        "poloniex_feed_listeners",
        "Number of registered event listeners"
    );

    describe_histogram!(
        "poloniex_feed_frame_processing_seconds",
        "Time from frame read to dispatch"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Per-market order-book/trade frame.
    Market,
    /// Ticker frame.
    Ticker,
    /// Chat frame.
    Chat,
    /// Server heartbeat.
    Heartbeat,
    /// Subscription acknowledgement.
    Acknowledgement,
    /// Unknown channel, ignored.
    Ignored,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Ticker => "ticker",
            Self::Chat => "chat",
            Self::Heartbeat => "heartbeat",
            Self::Acknowledgement => "ack",
            Self::Ignored => "ignored",
        }
    }
}

/// Record a frame read from the feed.
pub fn record_frame_received(kind: FrameKind) {
    counter!(
        "poloniex_feed_frames_received_total",
        "frame_kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a frame that failed to decode.
pub fn record_frame_rejected() {
    counter!("poloniex_feed_frames_rejected_total").increment(1);
}

/// Record an event published to the dispatcher.
pub fn record_event_published(kind: EventKind) {
    counter!(
        "poloniex_feed_events_published_total",
        "event_kind" => kind.as_str()
    )
    .increment(1);
}

/// Record events dropped from a full listener queue.
pub fn record_events_dropped(kind: EventKind, count: u64) {
    counter!(
        "poloniex_feed_events_dropped_total",
        "event_kind" => kind.as_str()
    )
    .increment(count);
}

/// Record a sequence gap.
pub fn record_sequence_gap(pair: &str) {
    counter!(
        "poloniex_feed_sequence_gaps_total",
        "pair" => pair.to_string()
    )
    .increment(1);
}

/// Record a field that fell back to its sentinel.
pub fn record_coercion_failure(field: &'static str) {
    counter!(
        "poloniex_feed_coercion_failures_total",
        "field" => field
    )
    .increment(1);
}

/// Record a successful redial.
pub fn record_reconnect() {
    counter!("poloniex_feed_reconnects_total").increment(1);
}

/// Record a control command written to the socket.
pub fn record_command_sent(verb: &'static str) {
    counter!(
        "poloniex_feed_commands_sent_total",
        "command" => verb
    )
    .increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(code: u8) {
    gauge!("poloniex_feed_connection_state").set(f64::from(code));
}

/// Update the active subscription count.
pub fn set_active_subscriptions(count: f64) {
    gauge!("poloniex_feed_active_subscriptions").set(count);
}

/// Update the listener count.
pub fn set_listeners(count: f64) {
    gauge!("poloniex_feed_listeners").set(count);
}

/// Record frame processing duration.
pub fn record_processing_duration(duration: Duration) {
    histogram!("poloniex_feed_frame_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_kind_as_str() {
        assert_eq!(FrameKind::Market.as_str(), "market");
        assert_eq!(FrameKind::Ticker.as_str(), "ticker");
        assert_eq!(FrameKind::Acknowledgement.as_str(), "ack");
        assert_eq!(FrameKind::Ignored.as_str(), "ignored");
    }

    #[test]
    fn recording_without_recorder_is_a_noop() {
        record_frame_received(FrameKind::Heartbeat);
        record_event_published(EventKind::Trade);
        record_coercion_failure("last");
        set_connection_state(2);
    }
}
