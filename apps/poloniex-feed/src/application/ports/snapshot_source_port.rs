//! Snapshot Source Port (Driven Port)
//!
//! Request/response collaborator that lists markets and serves full
//! order-book snapshots for resynchronisation.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::directory::MarketSnapshot;

/// Errors from the snapshot collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Request could not be completed.
    #[error("snapshot request failed: {0}")]
    Unavailable(String),

    /// Server answered with a non-success status.
    #[error("snapshot request returned status {0}")]
    Status(u16),

    /// Body could not be decoded.
    #[error("malformed snapshot response: {0}")]
    Malformed(String),
}

/// One price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookLevel {
    /// Price.
    pub rate: Decimal,
    /// Amount at the price.
    pub amount: Decimal,
}

/// Full order book for one market.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBookSnapshot {
    /// Ask levels, best first.
    pub asks: Vec<BookLevel>,
    /// Bid levels, best first.
    pub bids: Vec<BookLevel>,
    /// Whether the market is frozen.
    pub is_frozen: bool,
    /// Sequence number the snapshot corresponds to.
    pub sequence: u64,
}

/// Port for snapshot fetches.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current market directory with ticker values.
    async fn fetch_directory(&self) -> Result<MarketSnapshot, SnapshotError>;

    /// Fetch an order-book snapshot for `pair`, limited to `depth` levels.
    async fn fetch_order_book(
        &self,
        pair: &str,
        depth: u32,
    ) -> Result<OrderBookSnapshot, SnapshotError>;
}
