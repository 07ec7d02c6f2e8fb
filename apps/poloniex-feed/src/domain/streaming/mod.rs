//! Market Data Streaming Types
//!
//! Typed events decoded from the multiplexed feed: tickers, order-book
//! deltas, trades, chat messages and resynchronisation signals. Events are
//! immutable once constructed; the dispatcher shares them behind `Arc`.
//!
//! # Topics
//!
//! Every event belongs to a fixed set of topics:
//!
//! | Event       | Kind topic  | Pair topic | Compound topic              |
//! |-------------|-------------|------------|-----------------------------|
//! | Ticker      | `ticker`    | `BTC_ETH`  | -                           |
//! | Book delta  | `orderbook` | `BTC_ETH`  | `BTC_ETH-modify` / `-remove`|
//! | Trade       | `trade`     | `BTC_ETH`  | `BTC_ETH-trade`             |
//! | Resync      | `resync`    | `BTC_ETH`  | `BTC_ETH-resync`            |
//! | Chat        | `chat`      | -          | -                           |

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Wire Enumerations
// =============================================================================

/// Side of the order book a delta applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// Buy side (wire flag `1`).
    Bid,
    /// Sell side (wire flag `0`).
    Ask,
}

impl BookSide {
    /// Map the wire side flag to a book side.
    #[must_use]
    pub const fn from_flag(flag: u64) -> Option<Self> {
        match flag {
            1 => Some(Self::Bid),
            0 => Some(Self::Ask),
            _ => None,
        }
    }

    /// Wire side flag for this side.
    #[must_use]
    pub const fn flag(self) -> u64 {
        match self {
            Self::Bid => 1,
            Self::Ask => 0,
        }
    }
}

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buyer-initiated (wire flag `1`).
    Buy,
    /// Seller-initiated (wire flag `0`).
    Sell,
}

impl TradeSide {
    /// Map the wire side flag to a trade side.
    #[must_use]
    pub const fn from_flag(flag: u64) -> Option<Self> {
        match flag {
            1 => Some(Self::Buy),
            0 => Some(Self::Sell),
            _ => None,
        }
    }

    /// Wire side flag for this side.
    #[must_use]
    pub const fn flag(self) -> u64 {
        match self {
            Self::Buy => 1,
            Self::Sell => 0,
        }
    }
}

/// Whether a book delta inserts/updates a level or removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    /// Level inserted or amount changed.
    Modify,
    /// Level removed (amount is zero).
    Remove,
}

impl DeltaKind {
    /// Suffix used in compound topics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Modify => "modify",
            Self::Remove => "remove",
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Ticker update for one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerEvent {
    /// Market name, e.g. `BTC_ETH`.
    pub pair: String,
    /// Numeric market id, when known to the directory.
    pub pair_id: Option<u32>,
    /// Last trade price.
    pub last: Decimal,
    /// Lowest ask.
    pub ask: Decimal,
    /// Highest bid.
    pub bid: Decimal,
    /// 24h change as a percentage (wire ratio × 100).
    pub percent_change: Decimal,
    /// 24h volume in the base currency.
    pub base_volume: Decimal,
    /// 24h volume in the quote currency.
    pub quote_volume: Decimal,
    /// Whether trading is frozen on this market.
    pub is_frozen: bool,
    /// 24h high.
    pub daily_high: Decimal,
    /// 24h low.
    pub daily_low: Decimal,
}

/// One order-book level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookDeltaEvent {
    /// Market name.
    pub pair: String,
    /// Book side.
    pub side: BookSide,
    /// Price level.
    pub rate: Decimal,
    /// New amount at the level; zero means removal.
    pub amount: Decimal,
    /// Modify or remove.
    pub kind: DeltaKind,
    /// Market sequence number of the frame carrying this delta.
    pub sequence: Option<u64>,
    /// When the frame was read off the socket.
    pub observed_at: DateTime<Utc>,
}

/// Executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Market name.
    pub pair: String,
    /// Exchange trade id.
    pub trade_id: u64,
    /// Aggressor side.
    pub side: TradeSide,
    /// Execution price.
    pub rate: Decimal,
    /// Executed amount.
    pub amount: Decimal,
    /// `rate × amount`.
    pub total: Decimal,
    /// Exchange execution time.
    pub trade_time: DateTime<Utc>,
}

/// Signal that a market's delta stream has a gap.
///
/// Published in place of the deltas of the offending frame. Consumers should
/// fetch a fresh order-book snapshot before applying further deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncNeeded {
    /// Market name.
    pub pair: String,
    /// Last sequence accepted before the gap, `None` if the market was
    /// not yet tracked.
    pub last_sequence: Option<u64>,
    /// Sequence that revealed the gap, `None` if it could not be read.
    pub received_sequence: Option<u64>,
    /// When the gap was detected.
    pub detected_at: DateTime<Utc>,
}

/// Message from the public chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Chat message sequence number.
    pub sequence: Option<u64>,
    /// Author.
    pub username: String,
    /// Message body.
    pub message: String,
    /// Author reputation.
    pub reputation: u64,
}

/// Closed set of events published by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// Ticker update.
    Ticker(TickerEvent),
    /// Order-book delta.
    OrderBook(OrderBookDeltaEvent),
    /// Trade.
    Trade(TradeEvent),
    /// Sequence gap detected.
    ResyncNeeded(ResyncNeeded),
    /// Chat message.
    Chat(ChatMessage),
}

/// Kind of a [`FeedEvent`], used for kind topics and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`FeedEvent::Ticker`].
    Ticker,
    /// [`FeedEvent::OrderBook`].
    OrderBook,
    /// [`FeedEvent::Trade`].
    Trade,
    /// [`FeedEvent::ResyncNeeded`].
    Resync,
    /// [`FeedEvent::Chat`].
    Chat,
}

impl EventKind {
    /// All event kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Ticker,
            Self::OrderBook,
            Self::Trade,
            Self::Resync,
            Self::Chat,
        ]
    }

    /// Kind topic name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::OrderBook => "orderbook",
            Self::Trade => "trade",
            Self::Resync => "resync",
            Self::Chat => "chat",
        }
    }
}

impl FeedEvent {
    /// Kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Ticker(_) => EventKind::Ticker,
            Self::OrderBook(_) => EventKind::OrderBook,
            Self::Trade(_) => EventKind::Trade,
            Self::ResyncNeeded(_) => EventKind::Resync,
            Self::Chat(_) => EventKind::Chat,
        }
    }

    /// Market this event belongs to, if any.
    #[must_use]
    pub fn pair(&self) -> Option<&str> {
        match self {
            Self::Ticker(e) => Some(&e.pair),
            Self::OrderBook(e) => Some(&e.pair),
            Self::Trade(e) => Some(&e.pair),
            Self::ResyncNeeded(e) => Some(&e.pair),
            Self::Chat(_) => None,
        }
    }

    /// Sub-kind used to build the compound `pair-subkind` topic.
    #[must_use]
    pub const fn subkind(&self) -> Option<&'static str> {
        match self {
            Self::OrderBook(e) => Some(e.kind.as_str()),
            Self::Trade(_) => Some("trade"),
            Self::ResyncNeeded(_) => Some("resync"),
            Self::Ticker(_) | Self::Chat(_) => None,
        }
    }

    /// Every topic this event is published on, kind topic first.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics = Vec::with_capacity(3);
        topics.push(Topic::kind(self.kind()));

        if let Some(pair) = self.pair() {
            topics.push(Topic::pair(pair));
            if let Some(subkind) = self.subkind() {
                topics.push(Topic::compound(pair, subkind));
            }
        }

        topics
    }
}

// =============================================================================
// Topics
// =============================================================================

/// Routing key listeners register on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// Kind topic (`ticker`, `orderbook`, ...).
    #[must_use]
    pub fn kind(kind: EventKind) -> Self {
        Self(kind.as_str().to_string())
    }

    /// Pair topic (the market name).
    #[must_use]
    pub fn pair(pair: &str) -> Self {
        Self(pair.to_string())
    }

    /// Compound `pair-subkind` topic.
    #[must_use]
    pub fn compound(pair: &str, subkind: &str) -> Self {
        Self(format!("{pair}-{subkind}"))
    }

    /// Topic name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<EventKind> for Topic {
    fn from(kind: EventKind) -> Self {
        Self::kind(kind)
    }
}

// =============================================================================
// Tests
// =============================================================================
