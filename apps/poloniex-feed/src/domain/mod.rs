//! Domain Layer - Core feed state and event types.
//!
//! This layer contains the typed market data events, the channel directory,
//! per-market sequence tracking and subscription bookkeeping. Nothing here
//! performs I/O; all types are safe to share across tasks.

/// Channel directory (name ↔ numeric id).
pub mod directory;

/// Per-market sequence tracking for order-book deltas.
pub mod sequence;

/// Market data event types (tickers, book deltas, trades) and topics.
pub mod streaming;

/// Subscription tracking.
pub mod subscription;
