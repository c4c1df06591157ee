//! # lp-quote
//!
//! Real-time quote client for the LongPort OpenAPI.
//!
//! ## Architecture
//!
//! [`QuoteContext`] is a cheap handle over a background session task that
//! owns the quote WebSocket. Calls travel to the task over a command channel;
//! pushes and connection lifecycle changes come back as [`PushEvent`]s.
//!
//! ## Modules
//!
//! - [`auth`]: HMAC-SHA256 request signing
//! - [`http`]: signed HTTP calls (socket OTP)
//! - [`protocol`]: quote socket frame codec
//! - [`event`]: push events delivered to the consumer
//! - [`json_util`]: string-or-number JSON field helpers

pub mod auth;
mod context;
pub mod event;
pub mod http;
pub mod json_util;
pub mod protocol;
mod session;

pub use context::QuoteContext;
pub use event::{PushEvent, PushEventReceiver, PushEventSender};
