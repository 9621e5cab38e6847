//! Horizon Streaming Client
//!
//! [`StreamTransport`] adapter for Horizon's Server-Sent Events endpoints.
//! Each open stream runs in its own task that connects, decodes frames, and
//! reconnects from the last seen cursor until its handle is cancelled.
//!
//! # Session Lifecycle
//!
//! ```text
//! connect ──► "hello" (backoff reset) ──► records ... ──► server closes
//!    ▲                                                        │
//!    └──────────── backoff ◄── trusted Disconnected fault ◄───┘
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use super::sse::{SseDecoder, SseFrame};
use crate::application::ports::{
    StreamEvent, StreamFault, StreamHandle, StreamRequest, StreamTransport, TransportError,
};
use crate::domain::classifier::RawEvent;

/// Horizon server for the public network.
pub const PUBLIC_HORIZON_URL: &str = "https://horizon.stellar.org";

/// Horizon server for the test network.
pub const TESTNET_HORIZON_URL: &str = "https://horizon-testnet.stellar.org";

const EVENT_STREAM: &str = "text/event-stream";
const GREETING: &str = "\"hello\"";
const FAREWELL: &str = "\"byebye\"";

// =============================================================================
// Configuration
// =============================================================================

/// Horizon client configuration.
#[derive(Debug, Clone)]
pub struct HorizonConfig {
    /// Server base URL, without trailing slash.
    pub base_url: String,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Backoff between sessions.
    pub reconnect: ReconnectConfig,
}

impl HorizonConfig {
    /// Configuration for an arbitrary server.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Public network server.
    #[must_use]
    pub fn public() -> Self {
        Self::new(PUBLIC_HORIZON_URL)
    }

    /// Test network server.
    #[must_use]
    pub fn testnet() -> Self {
        Self::new(TESTNET_HORIZON_URL)
    }

    /// Override the backoff parameters.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Horizon client construction errors.
#[derive(Debug, thiserror::Error)]
pub enum HorizonError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// The base URL cannot be used.
    #[error("invalid Horizon URL {url:?}: {reason}")]
    InvalidUrl {
        /// Rejected URL.
        url: String,
        /// Parser message.
        reason: String,
    },
}

// =============================================================================
// Transport
// =============================================================================

/// Streams account activity from a Horizon server.
#[derive(Debug, Clone)]
pub struct HorizonTransport {
    client: Client,
    base_url: Url,
    reconnect: ReconnectConfig,
}

impl HorizonTransport {
    /// Create a transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: HorizonConfig) -> Result<Self, HorizonError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| HorizonError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            reconnect: config.reconnect,
        })
    }

    /// Endpoint URL for a request, resuming from `cursor` when given.
    #[must_use]
    pub fn stream_url(&self, request: &StreamRequest, cursor: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("accounts")
                .push(&request.account)
                .push(request.category.as_str());
        }

        {
            let mut query = url.query_pairs_mut();
            if let Some(limit) = request.options.limit {
                query.append_pair("limit", &limit.to_string());
            }
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }
}

impl StreamTransport for HorizonTransport {
    fn open(
        &self,
        request: StreamRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<StreamHandle, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let token = CancellationToken::new();
        let session = StreamSession {
            transport: self.clone(),
            cursor: request.options.cursor.clone(),
            request,
            events,
        };
        runtime.spawn(session.run(token.clone()));

        Ok(StreamHandle::new(token))
    }
}

// =============================================================================
// Stream Task
// =============================================================================

/// How one connection ended.
#[derive(Debug)]
enum SessionEnd {
    /// The server closed the stream; normal before a reconnect.
    Disconnected,
    /// The connection failed or was rejected.
    Failed(TransportError),
    /// Nobody is listening anymore.
    ReceiverGone,
}

struct StreamSession {
    transport: HorizonTransport,
    request: StreamRequest,
    cursor: Option<String>,
    events: mpsc::Sender<StreamEvent>,
}

impl StreamSession {
    async fn run(mut self, cancel: CancellationToken) {
        let category = self.request.category;
        let mut policy = ReconnectPolicy::new(self.transport.reconnect.clone());

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(()),
            outcome = self.run_sessions(&mut policy) => outcome,
        };

        match outcome {
            Ok(()) => tracing::debug!(%category, "Horizon stream closed"),
            Err(e) => {
                tracing::debug!(%category, error = %e, "Horizon stream giving up");
                let fault = StreamFault::new(TransportError::ReconnectExhausted(policy.max_attempts()));
                let _ = self.events.send(StreamEvent::Error(fault)).await;
            }
        }
    }

    async fn run_sessions(&mut self, policy: &mut ReconnectPolicy) -> Result<(), ReconnectError> {
        let category = self.request.category;

        loop {
            let mut retry_hint = None;
            let fault = match self.read_session(policy, &mut retry_hint).await {
                SessionEnd::ReceiverGone => return Ok(()),
                SessionEnd::Disconnected => StreamFault::trusted(TransportError::Disconnected),
                SessionEnd::Failed(error) => StreamFault::new(error),
            };

            // The consumer owns fault logging; only trace the session here.
            tracing::debug!(%category, error = %fault.error, trusted = fault.trusted, "Horizon session ended");
            if self.events.send(StreamEvent::Error(fault)).await.is_err() {
                return Ok(());
            }

            let Some(delay) = policy.next_delay() else {
                return Err(ReconnectError::MaxAttemptsExceeded(policy.max_attempts()));
            };
            let delay = retry_hint.map_or(delay, |hint: Duration| delay.max(hint));

            tracing::debug!(
                %category,
                attempt = policy.attempt_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                cursor = ?self.cursor,
                "Reconnecting to Horizon"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn read_session(
        &mut self,
        policy: &mut ReconnectPolicy,
        retry_hint: &mut Option<Duration>,
    ) -> SessionEnd {
        let url = self.transport.stream_url(&self.request, self.cursor.as_deref());

        let response = match self
            .transport
            .client
            .get(url)
            .header(ACCEPT, EVENT_STREAM)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return SessionEnd::Failed(TransportError::Connection(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return SessionEnd::Failed(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::debug!(error = %e, "Horizon stream body interrupted");
                    return SessionEnd::Disconnected;
                }
            };

            let frames = match decoder.push(&chunk) {
                Ok(frames) => frames,
                Err(e) => return SessionEnd::Failed(TransportError::Decode(e.to_string())),
            };

            for frame in frames {
                if let Some(retry) = frame.retry {
                    *retry_hint = Some(retry);
                }
                match self.handle_frame(frame, policy).await {
                    FrameOutcome::Continue => {}
                    FrameOutcome::Closed => return SessionEnd::Disconnected,
                    FrameOutcome::ReceiverGone => return SessionEnd::ReceiverGone,
                }
            }
        }

        SessionEnd::Disconnected
    }

    async fn handle_frame(&mut self, frame: SseFrame, policy: &mut ReconnectPolicy) -> FrameOutcome {
        let data = frame.data.trim();

        if frame.event.as_deref() == Some("open") || data == GREETING {
            tracing::debug!(category = %self.request.category, "Horizon stream connected");
            policy.reset();
            return FrameOutcome::Continue;
        }
        if frame.event.as_deref() == Some("close") || data == FAREWELL {
            return FrameOutcome::Closed;
        }
        if data.is_empty() {
            return FrameOutcome::Continue;
        }

        let event = match serde_json::from_str::<Value>(data) {
            Ok(record @ Value::Object(_)) => {
                policy.reset();
                StreamEvent::Message(RawEvent::from_record(record))
            }
            Ok(other) => {
                tracing::debug!(data = %other, "Ignoring non-record Horizon frame");
                return FrameOutcome::Continue;
            }
            Err(e) => StreamEvent::Error(StreamFault::new(TransportError::Decode(e.to_string()))),
        };

        if let Some(id) = frame.id {
            self.cursor = Some(id);
        }

        if self.events.send(event).await.is_err() {
            FrameOutcome::ReceiverGone
        } else {
            FrameOutcome::Continue
        }
    }
}

enum FrameOutcome {
    Continue,
    Closed,
    ReceiverGone,
}
