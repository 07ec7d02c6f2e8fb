//! Poloniex Push API Adapters
//!
//! - **Connection**: the multiplexed WebSocket, dial/keepalive/read loop
//! - **Codec**: positional frame decoding with permissive field coercion
//! - **REST**: public snapshot endpoints for the directory and order books

pub mod codec;
pub mod coerce;
pub mod connection;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod rest;

pub use codec::{FeedCodec, Frame, MarketUpdate};
pub use coerce::CoercionFailure;
pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStats, spawn_keepalive,
};
pub use heartbeat::{HeartbeatConfig, HeartbeatManager, HeartbeatState, KeepaliveTarget};
pub use messages::{CommandMessage, CommandVerb};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use rest::PublicApiClient;
