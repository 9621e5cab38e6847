//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `WalletStream`: Owns the subscription and the classify/store pipeline
//! - `Debouncer`: Coalesces store mutations into update notifications

pub mod notifier;
pub mod wallet_stream;

pub use notifier::{DEFAULT_QUIESCENCE_WINDOW, Debouncer, Updated};
pub use wallet_stream::{DEFAULT_LIMIT, StreamStats, WalletStream, WalletStreamConfig};
