//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with the feed connection and the
//! snapshot collaborator.

/// Port interfaces for external systems (command sink, frames, snapshots).
pub mod ports;

/// Application services for subscriptions, frame processing and the feed API.
pub mod services;
