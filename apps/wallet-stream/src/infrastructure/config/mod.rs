//! Configuration Module
//!
//! Configuration loading for the wallet watcher.

mod settings;

pub use settings::{ConfigError, Network, ReconnectSettings, StreamSettings, WalletConfig};
