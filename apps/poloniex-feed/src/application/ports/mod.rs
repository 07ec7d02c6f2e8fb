//! Port Interfaces
//!
//! Contracts between the application services and the infrastructure
//! adapters.
//!
//! ## Driven Ports (Outbound)
//!
//! - `CommandSink`: writes subscribe/unsubscribe commands to the feed
//! - `SnapshotSource`: fetches market directories and order-book snapshots
//!
//! ## Driver Ports (Inbound)
//!
//! - `FrameHandler`: receives raw frames from the connection read loop

mod command_sink_port;
mod frame_handler_port;
mod snapshot_source_port;

pub use command_sink_port::{Command, CommandSink};
pub use frame_handler_port::FrameHandler;
pub use snapshot_source_port::{BookLevel, OrderBookSnapshot, SnapshotError, SnapshotSource};
