//! Configuration Module
//!
//! Environment-driven settings for the feed adapter.

mod settings;

pub use settings::{ConfigError, ConnectionSettings, FeedConfig, ListenerSettings, ServerSettings};
