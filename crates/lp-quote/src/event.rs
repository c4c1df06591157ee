//! Events emitted by a [`QuoteContext`](crate::QuoteContext) to its consumer.
//!
//! The reporter drains a [`PushEventReceiver`] and reacts to quote pushes and
//! connection lifecycle changes.

use lp_core::{PushQuote, Symbol};

/// A typed event emitted by the quote session.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// A real-time quote update (including the first-push snapshot).
    Quote {
        symbol: Symbol,
        quote: PushQuote,
    },

    /// The socket is authenticated and subscriptions have been (re)sent.
    Connected,

    /// The socket dropped; the session will reconnect.
    Disconnected {
        /// Human-readable reason.
        reason: String,
    },

    /// A non-fatal error (bad frame, failed resubscribe, auth rejection).
    Error {
        message: String,
    },
}

/// Sender half of the push event channel.
pub type PushEventSender = tokio::sync::mpsc::UnboundedSender<PushEvent>;

/// Receiver half of the push event channel.
pub type PushEventReceiver = tokio::sync::mpsc::UnboundedReceiver<PushEvent>;
