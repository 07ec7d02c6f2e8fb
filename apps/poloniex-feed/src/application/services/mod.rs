//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SubscriptionService`: Subscribe/unsubscribe transitions and restore
//!   after reconnect
//! - `FramePipeline`: Decode, sequence-check and dispatch each frame
//! - `MarketFeed`: Public control API over one owned `FeedContext`

mod feed;
mod pipeline;
mod subscription;

pub use feed::{FeedContext, FeedStats, MarketFeed};
pub use pipeline::FramePipeline;
pub use subscription::{SubscribeOutcome, SubscriptionService, UnsubscribeOutcome};
