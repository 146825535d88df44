//! Headless client library for `BroadChat`.
//!
//! Implements the collaborator side of the relay protocol: open-connection,
//! send-text, receive-envelope. The client adopts the server-assigned
//! identity from the welcome envelope, tracks the active client count, and
//! offers local echo detection plus a fixed-delay reconnect policy.
//! Rendering is left to the embedding application.

pub mod client;
pub mod reconnect;

pub use client::{ChatClient, ClientError};
pub use reconnect::{RetryPolicy, connect_with_retry};
