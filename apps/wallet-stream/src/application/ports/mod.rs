//! Port Interfaces
//!
//! Defines the interfaces (ports) between the wallet stream and the
//! external streaming transport, following the Hexagonal Architecture
//! pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamTransport`: opens one server-pushed stream for an account and
//!   category, delivering [`StreamEvent`]s over a channel until its
//!   [`StreamHandle`] is cancelled.
//! - `StreamMetrics`: receives pipeline counts (events, upserts, drops,
//!   faults, notifications) for export.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::classifier::RawEvent;
use crate::domain::subscription::{AccountId, StreamCategory, StreamOptions};

// =============================================================================
// Requests and Events
// =============================================================================

/// Parameters for opening one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Stream category (selects the endpoint).
    pub category: StreamCategory,
    /// Account the stream is scoped to.
    pub account: AccountId,
    /// Backlog limit and starting cursor.
    pub options: StreamOptions,
}

/// Events delivered by a transport for one open stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A raw ledger record arrived.
    Message(RawEvent),
    /// The transport reported a fault.
    Error(StreamFault),
}

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by a stream transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connecting to the stream endpoint failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered with a non-success status.
    #[error("unexpected HTTP status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// A pushed event could not be decoded.
    #[error("undecodable event: {0}")]
    Decode(String),

    /// The server closed the stream.
    #[error("stream disconnected")]
    Disconnected,

    /// The transport gave up reconnecting.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    ReconnectExhausted(u32),

    /// The transport cannot open streams at all.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// A fault reported on an open stream.
///
/// Trusted faults are artifacts of normal transport operation (such as the
/// disconnect that precedes every automatic reconnect) and carry no
/// diagnostic value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFault {
    /// Whether the fault is a benign transport artifact.
    pub trusted: bool,
    /// The underlying error.
    pub error: TransportError,
}

impl StreamFault {
    /// A fault worth reporting.
    #[must_use]
    pub const fn new(error: TransportError) -> Self {
        Self {
            trusted: false,
            error,
        }
    }

    /// A benign fault the consumer should ignore.
    #[must_use]
    pub const fn trusted(error: TransportError) -> Self {
        Self {
            trusted: true,
            error,
        }
    }
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.trusted {
            write!(f, "{} (trusted)", self.error)
        } else {
            write!(f, "{}", self.error)
        }
    }
}

// =============================================================================
// Stream Handle
// =============================================================================

/// Cancellation handle for one open stream.
///
/// Cancelling or dropping the handle tears the stream down.
#[derive(Debug)]
pub struct StreamHandle {
    token: CancellationToken,
}

impl StreamHandle {
    /// Wrap the token the transport's stream task watches.
    #[must_use]
    pub const fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Tear the stream down.
    pub fn cancel(self) {
        self.token.cancel();
    }

    /// Check whether the stream has been torn down.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A token that resolves when the stream is torn down.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// =============================================================================
// Transport Port
// =============================================================================

/// Opens server-pushed ledger streams.
#[cfg_attr(test, mockall::automock)]
pub trait StreamTransport: Send + Sync {
    /// Open a stream and deliver its events on `events`.
    ///
    /// Delivery is sequential: the transport sends one event at a time on a
    /// single channel. The stream runs until the returned handle is
    /// cancelled or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened at all.
    fn open(
        &self,
        request: StreamRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<StreamHandle, TransportError>;
}

// =============================================================================
// Metrics Port
// =============================================================================

/// Reasons an event produced no item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Kind outside the known set.
    Unrecognized,
    /// Recognized kind with missing fields.
    Malformed,
}

impl DropReason {
    /// Label value for exported metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unrecognized => "unrecognized",
            Self::Malformed => "malformed",
        }
    }
}

/// Sink for pipeline counts.
///
/// Every method defaults to doing nothing, so implementations only override
/// what they export.
#[cfg_attr(test, mockall::automock)]
pub trait StreamMetrics: Send + Sync {
    /// A raw event arrived from the transport.
    fn event_received(&self, _category: StreamCategory) {}

    /// An item was stored. `inserted` is false when it replaced one with the
    /// same id.
    fn item_upserted(&self, _category: StreamCategory, _inserted: bool) {}

    /// A stream holding `count` items went away.
    fn items_released(&self, _category: StreamCategory, _count: usize) {}

    /// An event was dropped without producing an item.
    fn event_dropped(&self, _category: StreamCategory, _reason: DropReason) {}

    /// The transport reported a fault.
    fn transport_error(&self, _category: StreamCategory, _trusted: bool) {}

    /// An "updated" notification fired.
    fn notification(&self) {}
}

/// Metrics sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl StreamMetrics for NoopMetrics {}
