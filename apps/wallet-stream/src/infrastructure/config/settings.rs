//! Wallet Stream Configuration Settings
//!
//! Configuration types for the wallet watcher, loaded from environment
//! variables.

use std::time::Duration;

use crate::application::services::{DEFAULT_LIMIT, DEFAULT_QUIESCENCE_WINDOW, WalletStreamConfig};
use crate::domain::subscription::StreamCategory;
use crate::infrastructure::horizon::{
    HorizonConfig, PUBLIC_HORIZON_URL, ReconnectConfig, TESTNET_HORIZON_URL,
};

/// Stellar network the account lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// Public network.
    #[default]
    Public,
    /// Test network.
    Testnet,
}

impl Network {
    /// Parse network from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "testnet" | "test" => Self::Testnet,
            _ => Self::Public,
        }
    }

    /// Get the network name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Testnet => "testnet",
        }
    }

    /// Default Horizon server for this network.
    #[must_use]
    pub const fn horizon_url(&self) -> &'static str {
        match self {
            Self::Public => PUBLIC_HORIZON_URL,
            Self::Testnet => TESTNET_HORIZON_URL,
        }
    }
}

/// Stream subscription settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Stream category.
    pub category: StreamCategory,
    /// Backlog ceiling (0 = uncapped).
    pub limit: u32,
    /// Skip history and stream only new events.
    pub start_from_now: bool,
    /// Debounce window for update notifications.
    pub debounce: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            category: StreamCategory::Payments,
            limit: DEFAULT_LIMIT,
            start_from_now: false,
            debounce: DEFAULT_QUIESCENCE_WINDOW,
        }
    }
}

/// Transport reconnection settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub delay_initial: Duration,
    /// Maximum reconnection delay.
    pub delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub delay_multiplier: f64,
    /// Maximum consecutive failed attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl ReconnectSettings {
    /// Reject settings that would collapse the backoff.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a multiplier below 1.0 (or
    /// not a number), a zero initial delay, or a maximum delay that is zero
    /// or below the initial delay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.delay_multiplier.is_finite() || self.delay_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "WALLET_STREAM_RECONNECT_DELAY_MULTIPLIER",
                self.delay_multiplier,
            ));
        }
        if self.delay_initial.is_zero() {
            return Err(ConfigError::invalid(
                "WALLET_STREAM_RECONNECT_DELAY_INITIAL_MS",
                self.delay_initial.as_millis(),
            ));
        }
        if self.delay_max.is_zero() || self.delay_max < self.delay_initial {
            return Err(ConfigError::invalid(
                "WALLET_STREAM_RECONNECT_DELAY_MAX_SECS",
                self.delay_max.as_secs(),
            ));
        }
        Ok(())
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_millis(500),
            delay_max: Duration::from_secs(30),
            delay_multiplier: 2.0,
            max_attempts: 0, // Unlimited
        }
    }
}

/// Complete watcher configuration.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Account to watch.
    pub account: String,
    /// Stellar network.
    pub network: Network,
    /// Horizon server base URL.
    pub horizon_url: String,
    /// Stream subscription settings.
    pub stream: StreamSettings,
    /// Transport reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl WalletConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or a
    /// value cannot be interpreted.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`WalletConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);

        let account = env
            .get("WALLET_ACCOUNT")
            .ok_or_else(|| ConfigError::MissingEnvVar("WALLET_ACCOUNT".to_string()))?;
        let account = account.trim().to_string();
        if account.is_empty() {
            return Err(ConfigError::EmptyValue("WALLET_ACCOUNT".to_string()));
        }

        let network = env
            .get("STELLAR_NETWORK")
            .map(|s| Network::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let horizon_url = env
            .get("HORIZON_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| network.horizon_url().to_string());

        let category = match env.get("WALLET_STREAM_CATEGORY") {
            Some(value) => value
                .parse::<StreamCategory>()
                .map_err(|_| ConfigError::invalid("WALLET_STREAM_CATEGORY", value))?,
            None => StreamSettings::default().category,
        };

        let stream = StreamSettings {
            category,
            limit: env.parse_u32("WALLET_STREAM_LIMIT", StreamSettings::default().limit),
            start_from_now: env.parse_bool(
                "WALLET_STREAM_FROM_NOW",
                StreamSettings::default().start_from_now,
            ),
            debounce: env.parse_duration_millis(
                "WALLET_STREAM_DEBOUNCE_MS",
                StreamSettings::default().debounce,
            ),
        };

        let reconnect = ReconnectSettings {
            delay_initial: env.parse_duration_millis(
                "WALLET_STREAM_RECONNECT_DELAY_INITIAL_MS",
                ReconnectSettings::default().delay_initial,
            ),
            delay_max: env.parse_duration_secs(
                "WALLET_STREAM_RECONNECT_DELAY_MAX_SECS",
                ReconnectSettings::default().delay_max,
            ),
            delay_multiplier: env.parse_f64(
                "WALLET_STREAM_RECONNECT_DELAY_MULTIPLIER",
                ReconnectSettings::default().delay_multiplier,
            ),
            max_attempts: env.parse_u32(
                "WALLET_STREAM_MAX_RECONNECT_ATTEMPTS",
                ReconnectSettings::default().max_attempts,
            ),
        };
        reconnect.validate()?;

        Ok(Self {
            account,
            network,
            horizon_url,
            stream,
            reconnect,
            metrics_port: env.parse_u16("WALLET_STREAM_METRICS_PORT", 0),
        })
    }

    /// Settings for the wallet stream service.
    #[must_use]
    pub fn stream_config(&self) -> WalletStreamConfig {
        WalletStreamConfig::new(self.account.clone(), self.stream.category, self.stream.limit)
            .with_start_from_now(self.stream.start_from_now)
            .with_quiescence_window(self.stream.debounce)
    }

    /// Settings for the Horizon transport.
    #[must_use]
    pub fn horizon_config(&self) -> HorizonConfig {
        HorizonConfig::new(self.horizon_url.clone())
            .with_reconnect(ReconnectConfig::from_settings(&self.reconnect))
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable holds a value that cannot be used.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: impl ToString) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

struct EnvSource<F>(F);

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn parse_u16(&self, key: &str, default: u16) -> u16 {
        self.parse(key).unwrap_or(default)
    }

    fn parse_u32(&self, key: &str, default: u32) -> u32 {
        self.parse(key).unwrap_or(default)
    }

    fn parse_f64(&self, key: &str, default: f64) -> f64 {
        self.parse(key).unwrap_or(default)
    }

    fn parse_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(|v| match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            })
            .unwrap_or(default)
    }

    fn parse_duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_secs)
    }

    fn parse_duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_millis)
    }
}
