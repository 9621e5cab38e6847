//! Wallet Stream Watcher Binary
//!
//! Streams one account's ledger activity and prints the current item set as
//! JSON lines every time it changes.
//!
//! # Usage
//!
//! ```bash
//! WALLET_ACCOUNT=GABC... cargo run --bin wallet-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `WALLET_ACCOUNT`: Account public key to watch
//!
//! ## Optional
//! - `STELLAR_NETWORK`: public | testnet (default: public)
//! - `HORIZON_URL`: Horizon server (default: derived from network)
//! - `WALLET_STREAM_CATEGORY`: payments | transactions | operations | trades (default: payments)
//! - `WALLET_STREAM_LIMIT`: Backlog ceiling, 0 = uncapped (default: 200)
//! - `WALLET_STREAM_FROM_NOW`: Skip history (default: false)
//! - `WALLET_STREAM_DEBOUNCE_MS`: Update debounce window (default: 200)
//! - `WALLET_STREAM_RECONNECT_DELAY_INITIAL_MS`: Initial backoff (default: 500)
//! - `WALLET_STREAM_RECONNECT_DELAY_MAX_SECS`: Maximum backoff (default: 30)
//! - `WALLET_STREAM_RECONNECT_DELAY_MULTIPLIER`: Backoff growth (default: 2.0)
//! - `WALLET_STREAM_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 0)
//! - `WALLET_STREAM_METRICS_PORT`: Prometheus port, 0 = disabled (default: 0)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log filter (default: `wallet_stream=info`)

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use wallet_stream::infrastructure::telemetry;
use wallet_stream::{
    DisplayItem, HorizonTransport, PrometheusMetrics, WalletConfig, WalletStream, init_metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting wallet stream watcher");

    let config = WalletConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let _metrics_handle = init_metrics(config.metrics_port).context("failed to initialize metrics")?;

    let transport = Arc::new(
        HorizonTransport::new(config.horizon_config()).context("failed to create Horizon transport")?,
    );
    let stream =
        WalletStream::with_metrics(config.stream_config(), transport, Arc::new(PrometheusMetrics));
    let mut updates = stream.subscribe();

    let shutdown = await_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            update = updates.recv() => match update {
                Ok(_) | Err(RecvError::Lagged(_)) => print_items(stream.items())?,
                Err(RecvError::Closed) => break,
            },
        }
    }

    stream.stop();
    tracing::info!(stats = ?stream.stats(), "Wallet stream watcher stopped");
    Ok(())
}

/// Print items newest first, one JSON object per line.
fn print_items(mut items: Vec<DisplayItem>) -> anyhow::Result<()> {
    items.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));

    let mut stdout = std::io::stdout().lock();
    for item in &items {
        serde_json::to_writer(&mut stdout, item)?;
        writeln!(stdout)?;
    }
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &WalletConfig) {
    tracing::info!(
        account = %config.account,
        network = config.network.as_str(),
        category = %config.stream.category,
        limit = config.stream.limit,
        from_now = config.stream.start_from_now,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        horizon_url = %config.horizon_url,
        debounce_ms = u64::try_from(config.stream.debounce.as_millis()).unwrap_or(u64::MAX),
        max_reconnect_attempts = config.reconnect.max_attempts,
        "Transport settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
