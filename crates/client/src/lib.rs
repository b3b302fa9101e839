//! Real-time room connection client.
//!
//! Provides the [`RoomConnectionManager`](manager::RoomConnectionManager),
//! which owns at most one live channel to a named chat room, plus the
//! pieces it is assembled from: configuration, endpoint construction,
//! credential providers, a WebSocket transport, wire message types and
//! a caller-side reconnection policy.

pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod events;
pub mod manager;
pub mod messages;
pub mod reconnect;
pub mod transport;
