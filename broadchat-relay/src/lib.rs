//! `BroadChat` relay server library.
//!
//! Exposes the relay server for use in tests and embedding. The relay
//! accepts WebSocket connections, assigns each one an identity, echoes and
//! fans every chat message out to the other connected clients, and
//! announces join/leave events.

pub mod config;
pub mod relay;
