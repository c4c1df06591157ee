//! # lp-core
//!
//! Core crate for the LongPort real-time quote subscriber, providing:
//!
//! - **Types** (`types`): symbols, subscription kinds, quote structs
//! - **Configuration** (`config`): environment-driven settings + env file loading
//! - **Symbol lists** (`symbols`): `SYMBOLS` value and CSV file parsing
//! - **Error types** (`error`): domain-specific `LpError` via thiserror
//! - **WebSocket** (`ws`): connect helper and reconnect backoff
//! - **Time utilities** (`time_util`): epoch timestamps and RFC 3339 rendering
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod symbols;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use error::{LpError, LpResult};
pub use types::*;
