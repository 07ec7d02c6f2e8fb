#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call,
        clippy::cast_precision_loss
    )
)]

//! Poloniex Feed - Realtime Market Data Adapter
//!
//! Maintains one multiplexed WebSocket connection to the exchange push API
//! and re-exposes its positional wire traffic as typed, topic-addressable
//! events.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core feed state and event types
//!   - `streaming`: Ticker, order-book, trade, resync and chat events; topics
//!   - `directory`: Channel name ↔ id directory
//!   - `sequence`: Per-market sequence tracking
//!   - `subscription`: Active channel registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Command sink, frame handler, snapshot source
//!   - `services`: Subscriptions, frame pipeline, `MarketFeed` control API
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `poloniex`: Connection manager, codec, REST snapshot client
//!   - `dispatch`: Bounded per-listener topic fan-out
//!   - `config`: Configuration from the environment
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                ┌────────────┐   ┌──────────┐   ┌──────────┐   ┌────────────┐
//! push API WS ──►│ read loop  │──►│  codec   │──►│ sequence │──►│ dispatcher │──► listeners
//!                └────────────┘   └──────────┘   └──────────┘   └────────────┘
//!                      ▲                                             │
//!                      │ subscribe / unsubscribe          topics: kind, pair,
//!                 MarketFeed                              pair-subkind
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core feed types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Error taxonomy.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::directory::{ChannelDirectory, ChannelId, DirectoryError, MarketSnapshot};
pub use domain::sequence::{SequenceCheck, SequenceTracker};
pub use domain::streaming::{
    BookSide, ChatMessage, DeltaKind, EventKind, FeedEvent, OrderBookDeltaEvent, ResyncNeeded,
    TickerEvent, Topic, TradeEvent, TradeSide,
};
pub use domain::subscription::{Channel, SubscriptionRegistry};

// Control API
pub use application::ports::{OrderBookSnapshot, SnapshotError, SnapshotSource};
pub use application::services::{
    FeedContext, FeedStats, MarketFeed, SubscribeOutcome, UnsubscribeOutcome,
};

// Errors
pub use error::{ConnectionError, FeedError, ProtocolError};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ConnectionSettings, FeedConfig};

// Dispatch
pub use infrastructure::dispatch::{EventDispatcher, ListenerId};

// Connection and REST adapters
pub use infrastructure::poloniex::{
    ConnectionConfig, ConnectionManager, ConnectionState, FeedCodec, PublicApiClient,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
