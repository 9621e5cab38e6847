//! Update Notifier
//!
//! Coalesces bursts of store mutations into a single "updated"
//! notification. This is a trailing-edge debounce: the notification fires
//! once the signals have been quiet for a full window, so a continuous
//! stream of signals postpones it indefinitely.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{NoopMetrics, StreamMetrics};

/// Default quiescence window.
pub const DEFAULT_QUIESCENCE_WINDOW: Duration = Duration::from_millis(200);

/// Capacity of the observer channel. Observers only need the latest
/// notification, so lagging receivers lose nothing of value.
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Notification that the item set changed. Observers re-read the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Updated;

#[derive(Debug)]
enum Command {
    Signal,
    Discard,
}

#[derive(Debug, Default)]
struct DebounceState {
    paused: AtomicBool,
    fired: AtomicU64,
}

/// Trailing-edge debouncer owning its timer task.
///
/// The timer task runs on the Tokio runtime current at construction and
/// stops when the debouncer is shut down or dropped. Created outside a
/// runtime, the debouncer has no timer and never fires.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use wallet_stream::application::services::Debouncer;
///
/// async fn example() {
///     let debouncer = Debouncer::new(Duration::from_millis(200));
///     let mut updates = debouncer.subscribe();
///
///     debouncer.signal();
///     debouncer.signal();
///
///     // Fires once, 200ms after the second signal.
///     let _ = updates.recv().await;
/// }
/// ```
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    commands: mpsc::UnboundedSender<Command>,
    updates: broadcast::Sender<Updated>,
    state: Arc<DebounceState>,
    cancel: CancellationToken,
}

impl Debouncer {
    /// Create a debouncer and spawn its timer task.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self::with_metrics(window, Arc::new(NoopMetrics))
    }

    /// Create a debouncer that reports each fired notification to `metrics`.
    #[must_use]
    pub fn with_metrics(window: Duration, metrics: Arc<dyn StreamMetrics>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let state = Arc::new(DebounceState::default());
        let cancel = CancellationToken::new();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(run_timer(
                    window,
                    command_rx,
                    updates.clone(),
                    Arc::clone(&state),
                    metrics,
                    cancel.clone(),
                ));
            }
            Err(e) => {
                // Signals go nowhere once the receiver is dropped.
                tracing::debug!(error = %e, "No runtime, update notifier disabled");
            }
        }

        Self {
            window,
            commands,
            updates,
            state,
            cancel,
        }
    }

    /// Mark that a change occurred, restarting the quiescence window.
    ///
    /// Ignored while paused.
    pub fn signal(&self) {
        if self.state.paused.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.commands.send(Command::Signal);
    }

    /// Discard any pending notification and ignore signals until resumed.
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
        let _ = self.commands.send(Command::Discard);
    }

    /// Accept signals again.
    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    /// Check whether signals are currently ignored.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    /// Stop the timer task. No notification fires afterwards.
    pub fn shutdown(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    /// Register an observer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Updated> {
        self.updates.subscribe()
    }

    /// The quiescence window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Number of notifications fired so far.
    #[must_use]
    pub fn fired_count(&self) -> u64 {
        self.state.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_timer(
    window: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    updates: broadcast::Sender<Updated>,
    state: Arc<DebounceState>,
    metrics: Arc<dyn StreamMetrics>,
    cancel: CancellationToken,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Update notifier cancelled");
                break;
            }
            command = commands.recv() => match command {
                Some(Command::Signal) => deadline = Some(Instant::now() + window),
                Some(Command::Discard) => deadline = None,
                None => break,
            },
            () = wait_until(deadline) => {
                deadline = None;
                if !state.paused.load(Ordering::SeqCst) {
                    state.fired.fetch_add(1, Ordering::SeqCst);
                    metrics.notification();
                    // No receivers is fine; observers may not have subscribed yet.
                    let _ = updates.send(Updated);
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// Tests
// =============================================================================
