//! Horizon Stream Adapter
//!
//! Streams account activity from a Stellar Horizon server over Server-Sent
//! Events.
//!
//! # Components
//!
//! - `client`: [`HorizonTransport`], the [`StreamTransport`] implementation
//! - `sse`: Incremental `text/event-stream` decoder
//! - `reconnect`: Backoff policy between sessions
//!
//! [`StreamTransport`]: crate::application::ports::StreamTransport

mod client;
pub mod reconnect;
pub mod sse;

pub use client::{
    HorizonConfig, HorizonError, HorizonTransport, PUBLIC_HORIZON_URL, TESTNET_HORIZON_URL,
};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use sse::{MAX_LINE_LENGTH, SseDecoder, SseError, SseFrame};
