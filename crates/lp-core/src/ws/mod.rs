//! WebSocket connect helper and reconnect backoff.

pub mod client;

pub use client::{Backoff, WsStream, connect_ws};
