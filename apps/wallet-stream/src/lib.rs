#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Wallet Stream - Live Ledger Activity Feed
//!
//! Subscribes to a Stellar account's ledger activity (payments,
//! transactions, operations, or trades), normalizes every pushed record into
//! a UI-ready [`DisplayItem`], keeps a deduplicated set keyed by id, and
//! notifies observers with a debounced "updated" signal.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `classifier`: Raw ledger record → display item
//!   - `item`: Display items and the deduplicating store
//!   - `subscription`: Stream categories, options, per-category slots
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The stream transport and metrics interfaces
//!   - `services`: Wallet stream lifecycle, update debouncer
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `horizon`: Server-Sent Events transport for Horizon
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//!                    ┌─────────────┐     ┌────────────┐     ┌───────────┐
//! Horizon SSE ──────►│  Transport  │────►│ Classifier │────►│ ItemStore │
//!                    └─────────────┘     └────────────┘     └─────┬─────┘
//!                                                                 │
//!                          Observer ◄──── "updated" ◄──── Debouncer
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core wallet stream types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::classifier::{Classification, ClassifyError, RawEvent, classify, strip_zeros};
pub use domain::item::{DisplayItem, ItemStore};
pub use domain::subscription::{AccountId, InvalidCategory, StreamCategory, StreamOptions};

// Ports
pub use application::ports::{
    DropReason, NoopMetrics, StreamEvent, StreamFault, StreamHandle, StreamMetrics, StreamRequest,
    StreamTransport, TransportError,
};

// Services
pub use application::services::{
    Debouncer, StreamStats, Updated, WalletStream, WalletStreamConfig,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Network, WalletConfig};

// Horizon transport
pub use infrastructure::horizon::{HorizonConfig, HorizonError, HorizonTransport};

// Metrics
pub use infrastructure::metrics::{PrometheusMetrics, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
