//! Wallet Stream Service
//!
//! Owns the subscription for one account and category, and wires every
//! pushed event through classification, the item store, and the update
//! notifier.
//!
//! # Data Flow
//!
//! ```text
//! transport ──► events channel ──► pump task ──► classify ──► ItemStore
//!                                                                │
//!                                          observers ◄── Debouncer
//! ```
//!
//! # Failure Handling
//!
//! Nothing here returns an error to the owner. Unrecognized events are
//! dropped with a debug log, malformed events and non-trusted transport
//! faults are logged once at warn level, and trusted transport faults are
//! ignored entirely.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::notifier::{DEFAULT_QUIESCENCE_WINDOW, Debouncer, Updated};
use crate::application::ports::{
    DropReason, NoopMetrics, StreamEvent, StreamFault, StreamHandle, StreamMetrics, StreamRequest,
    StreamTransport,
};
use crate::domain::classifier::{Classification, RawEvent, classify};
use crate::domain::item::{DisplayItem, ItemStore};
use crate::domain::subscription::{AccountId, StreamCategory, StreamOptions, SubscriptionSlots};

/// Default backlog ceiling.
pub const DEFAULT_LIMIT: u32 = 200;

/// Capacity of the transport-to-pump event channel.
const EVENT_BUFFER: usize = 1024;

// =============================================================================
// Configuration
// =============================================================================

/// Settings a wallet stream is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletStreamConfig {
    /// Account the stream is scoped to.
    pub account: AccountId,
    /// Stream category.
    pub category: StreamCategory,
    /// Backlog ceiling (0 = uncapped).
    pub limit: u32,
    /// Skip history and stream only new events.
    pub start_from_now: bool,
    /// Debounce window for update notifications.
    pub quiescence_window: Duration,
}

impl WalletStreamConfig {
    /// Create a configuration replaying history up to `limit` items.
    #[must_use]
    pub fn new(account: impl Into<AccountId>, category: StreamCategory, limit: u32) -> Self {
        Self {
            account: account.into(),
            category,
            limit,
            start_from_now: false,
            quiescence_window: DEFAULT_QUIESCENCE_WINDOW,
        }
    }

    /// Stream only events occurring after the subscription starts.
    #[must_use]
    pub const fn with_start_from_now(mut self, start_from_now: bool) -> Self {
        self.start_from_now = start_from_now;
        self
    }

    /// Override the notification debounce window.
    #[must_use]
    pub const fn with_quiescence_window(mut self, window: Duration) -> Self {
        self.quiescence_window = window;
        self
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct StreamCounters {
    messages: AtomicU64,
    items_upserted: AtomicU64,
    unrecognized: AtomicU64,
    malformed: AtomicU64,
    errors_logged: AtomicU64,
    errors_suppressed: AtomicU64,
}

impl StreamCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of a wallet stream's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Raw messages received from the transport.
    pub messages: u64,
    /// Items inserted or replaced in the store.
    pub items_upserted: u64,
    /// Messages dropped because their kind is unknown.
    pub unrecognized: u64,
    /// Messages dropped because required fields were missing.
    pub malformed: u64,
    /// Transport faults written to the diagnostic log.
    pub errors_logged: u64,
    /// Trusted transport faults ignored.
    pub errors_suppressed: u64,
    /// Update notifications fired.
    pub notifications: u64,
}

// =============================================================================
// Pipeline
// =============================================================================

/// State shared between the owner and the pump tasks.
struct Pipeline {
    store: RwLock<ItemStore>,
    counters: StreamCounters,
    notifier: Debouncer,
    metrics: Arc<dyn StreamMetrics>,
}

impl Pipeline {
    fn new(window: Duration, metrics: Arc<dyn StreamMetrics>) -> Self {
        Self {
            store: RwLock::new(ItemStore::new()),
            counters: StreamCounters::default(),
            notifier: Debouncer::with_metrics(window, Arc::clone(&metrics)),
            metrics,
        }
    }

    fn on_message(&self, category: StreamCategory, event: &RawEvent) {
        StreamCounters::bump(&self.counters.messages);
        self.metrics.event_received(category);

        match classify(event) {
            Ok(Classification::Item(item)) => {
                let inserted = self.store.write().upsert(item);
                StreamCounters::bump(&self.counters.items_upserted);
                self.metrics.item_upserted(category, inserted);
                self.notifier.signal();
            }
            Ok(Classification::Unrecognized { kind }) => {
                StreamCounters::bump(&self.counters.unrecognized);
                self.metrics.event_dropped(category, DropReason::Unrecognized);
                tracing::debug!(
                    %category,
                    kind = kind.as_deref().unwrap_or("<none>"),
                    "Ignoring unrecognized ledger event"
                );
            }
            Err(e) => {
                StreamCounters::bump(&self.counters.malformed);
                self.metrics.event_dropped(category, DropReason::Malformed);
                tracing::warn!(%category, error = %e, "Dropping malformed ledger event");
            }
        }
    }

    fn on_error(&self, category: StreamCategory, fault: &StreamFault) {
        self.metrics.transport_error(category, fault.trusted);

        if fault.trusted {
            // Emitted on every normal reconnect; logging it is pure noise.
            StreamCounters::bump(&self.counters.errors_suppressed);
            return;
        }

        StreamCounters::bump(&self.counters.errors_logged);
        tracing::warn!(%category, error = %fault.error, "Stream transport error");
    }

    fn stats(&self) -> StreamStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StreamStats {
            messages: load(&self.counters.messages),
            items_upserted: load(&self.counters.items_upserted),
            unrecognized: load(&self.counters.unrecognized),
            malformed: load(&self.counters.malformed),
            errors_logged: load(&self.counters.errors_logged),
            errors_suppressed: load(&self.counters.errors_suppressed),
            notifications: self.notifier.fired_count(),
        }
    }
}

/// Drain one subscription's events until it is cancelled or the transport
/// closes the channel. Events are handled strictly one at a time.
async fn pump_events(
    category: StreamCategory,
    pipeline: Arc<Pipeline>,
    mut events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(StreamEvent::Message(raw)) => pipeline.on_message(category, &raw),
                Some(StreamEvent::Error(fault)) => pipeline.on_error(category, &fault),
                None => {
                    tracing::debug!(%category, "Transport closed the event channel");
                    break;
                }
            },
        }
    }
}

// =============================================================================
// Wallet Stream
// =============================================================================

/// Live, deduplicated view of one account's ledger activity.
///
/// The subscription opens at construction and its tasks run on the current
/// Tokio runtime. Created outside a runtime, the stream is logged and left
/// inert. Dropping the stream stops it.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use wallet_stream::{HorizonConfig, HorizonTransport, StreamCategory, WalletStream, WalletStreamConfig};
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = Arc::new(HorizonTransport::new(HorizonConfig::public())?);
///     let config = WalletStreamConfig::new("GABC...", StreamCategory::Payments, 200);
///     let stream = WalletStream::new(config, transport);
///
///     let mut updates = stream.subscribe();
///     while updates.recv().await.is_ok() {
///         println!("{} items", stream.item_count());
///     }
///
///     stream.stop();
///     Ok(())
/// }
/// ```
pub struct WalletStream {
    account: AccountId,
    category: Option<StreamCategory>,
    options: StreamOptions,
    transport: Arc<dyn StreamTransport>,
    slots: Mutex<SubscriptionSlots<StreamHandle>>,
    pipeline: Arc<Pipeline>,
}

impl std::fmt::Debug for WalletStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletStream")
            .field("account", &self.account)
            .field("category", &self.category)
            .field("options", &self.options)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl WalletStream {
    /// Create a stream and open its subscription.
    #[must_use]
    pub fn new(config: WalletStreamConfig, transport: Arc<dyn StreamTransport>) -> Self {
        Self::with_metrics(config, transport, Arc::new(NoopMetrics))
    }

    /// Create a stream that reports pipeline counts to `metrics`.
    #[must_use]
    pub fn with_metrics(
        config: WalletStreamConfig,
        transport: Arc<dyn StreamTransport>,
        metrics: Arc<dyn StreamMetrics>,
    ) -> Self {
        let stream = Self::build(
            config.account,
            Some(config.category),
            StreamOptions::new(config.limit, config.start_from_now),
            config.quiescence_window,
            transport,
            metrics,
        );
        stream.start();
        stream
    }

    /// Create a stream from a category name.
    ///
    /// An unknown category is logged and yields an inert stream: it never
    /// opens a subscription, its items stay empty, and `start`/`stop` do
    /// nothing.
    #[must_use]
    pub fn open(
        account: impl Into<AccountId>,
        category: &str,
        limit: u32,
        transport: Arc<dyn StreamTransport>,
    ) -> Self {
        let account = account.into();

        match category.parse::<StreamCategory>() {
            Ok(category) => Self::new(WalletStreamConfig::new(account, category, limit), transport),
            Err(e) => {
                tracing::error!(%account, error = %e, "Wallet stream category invalid");
                Self::build(
                    account,
                    None,
                    StreamOptions::new(limit, false),
                    DEFAULT_QUIESCENCE_WINDOW,
                    transport,
                    Arc::new(NoopMetrics),
                )
            }
        }
    }

    fn build(
        account: AccountId,
        category: Option<StreamCategory>,
        options: StreamOptions,
        window: Duration,
        transport: Arc<dyn StreamTransport>,
        metrics: Arc<dyn StreamMetrics>,
    ) -> Self {
        let category = match tokio::runtime::Handle::try_current() {
            Ok(_) => category,
            Err(e) => {
                if category.is_some() {
                    tracing::error!(%account, error = %e, "Wallet stream needs a Tokio runtime");
                }
                None
            }
        };

        Self {
            account,
            category,
            options,
            transport,
            slots: Mutex::new(SubscriptionSlots::new()),
            pipeline: Arc::new(Pipeline::new(window, metrics)),
        }
    }

    /// Open the subscription for the bound category.
    ///
    /// Any live subscription for the category is cancelled first, so
    /// calling this repeatedly never leaks a connection.
    pub fn start(&self) {
        let Some(category) = self.category else {
            tracing::debug!(account = %self.account, "No valid category, start ignored");
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(%category, account = %self.account, error = %e, "Wallet stream needs a Tokio runtime");
                return;
            }
        };

        let mut slots = self.slots.lock();

        if let Some(previous) = slots.take(category) {
            tracing::debug!(%category, "Cancelling previous subscription before restart");
            previous.cancel();
        }

        self.pipeline.notifier.resume();

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let request = StreamRequest {
            category,
            account: self.account.clone(),
            options: self.options.clone(),
        };

        match self.transport.open(request, events_tx) {
            Ok(handle) => {
                runtime.spawn(pump_events(
                    category,
                    Arc::clone(&self.pipeline),
                    events_rx,
                    handle.token(),
                ));

                tracing::info!(
                    %category,
                    account = %self.account,
                    limit = ?self.options.limit,
                    cursor = ?self.options.cursor,
                    "Wallet stream started"
                );

                if let Some(stale) = slots.replace(category, handle) {
                    stale.cancel();
                }
            }
            Err(e) => {
                StreamCounters::bump(&self.pipeline.counters.errors_logged);
                tracing::error!(%category, account = %self.account, error = %e, "Failed to open wallet stream");
            }
        }
    }

    /// Cancel every live subscription and discard any pending notification.
    ///
    /// Idempotent; safe to call when nothing is active.
    pub fn stop(&self) {
        self.pipeline.notifier.pause();

        let drained = self.slots.lock().drain();
        for (category, handle) in drained {
            handle.cancel();
            tracing::info!(%category, account = %self.account, "Wallet stream stopped");
        }
    }

    /// Snapshot of the current items, in no particular order.
    #[must_use]
    pub fn items(&self) -> Vec<DisplayItem> {
        self.pipeline.store.read().values()
    }

    /// Number of distinct items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.pipeline.store.read().len()
    }

    /// Register an observer for "updated" notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Updated> {
        self.pipeline.notifier.subscribe()
    }

    /// Check whether any subscription is live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slots.lock().active_count() > 0
    }

    /// The bound account.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The bound category, `None` if the requested one was invalid.
    #[must_use]
    pub const fn category(&self) -> Option<StreamCategory> {
        self.category
    }

    /// Options requested from the transport.
    #[must_use]
    pub const fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.pipeline.stats()
    }
}

impl Drop for WalletStream {
    fn drop(&mut self) {
        self.stop();
        self.pipeline.notifier.shutdown();
        if let Some(category) = self.category {
            self.pipeline
                .metrics
                .items_released(category, self.pipeline.store.read().len());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::time::sleep;

    use super::*;
    use crate::application::ports::{MockStreamTransport, TransportError};

    /// Metrics sink that keeps a readable log of every call.
    #[derive(Default)]
    struct RecordingMetrics {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingMetrics {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl StreamMetrics for RecordingMetrics {
        fn event_received(&self, category: StreamCategory) {
            self.calls.lock().push(format!("received {category}"));
        }

        fn item_upserted(&self, category: StreamCategory, inserted: bool) {
            self.calls.lock().push(format!("upserted {category} {inserted}"));
        }

        fn items_released(&self, category: StreamCategory, count: usize) {
            self.calls.lock().push(format!("released {category} {count}"));
        }

        fn event_dropped(&self, category: StreamCategory, reason: DropReason) {
            self.calls
                .lock()
                .push(format!("dropped {category} {}", reason.as_str()));
        }

        fn transport_error(&self, category: StreamCategory, trusted: bool) {
            self.calls.lock().push(format!("fault {category} {trusted}"));
        }

        fn notification(&self) {
            self.calls.lock().push("notified".to_string());
        }
    }

    type Captured = Arc<Mutex<Vec<(CancellationToken, mpsc::Sender<StreamEvent>)>>>;

    /// Mock that accepts every open and records its token and sender.
    fn recording_transport(times: usize) -> (MockStreamTransport, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);

        let mut transport = MockStreamTransport::new();
        transport
            .expect_open()
            .times(times)
            .returning(move |_, events| {
                let token = CancellationToken::new();
                sink.lock().push((token.clone(), events));
                Ok(StreamHandle::new(token))
            });

        (transport, captured)
    }

    fn payment(id: &str, amount: &str) -> StreamEvent {
        StreamEvent::Message(RawEvent::from_record(json!({
            "id": id,
            "type": "payment",
            "asset_type": "native",
            "from": "GSENDER",
            "amount": amount,
            "created_at": "2024-03-15T12:00:00Z",
            "_links": {"self": {"href": format!("https://horizon.stellar.org/operations/{id}")}}
        })))
    }

    #[tokio::test]
    async fn construction_opens_one_subscription() {
        let (transport, captured) = recording_transport(1);

        let stream = WalletStream::new(
            WalletStreamConfig::new("GACCOUNT", StreamCategory::Payments, 200),
            Arc::new(transport),
        );

        assert!(stream.is_active());
        assert_eq!(captured.lock().len(), 1);
        assert_eq!(stream.category(), Some(StreamCategory::Payments));
    }

    #[tokio::test]
    async fn request_carries_account_limit_and_cursor() {
        let mut transport = MockStreamTransport::new();
        transport
            .expect_open()
            .withf(|request, _| {
                request.category == StreamCategory::Operations
                    && request.account == "GACCOUNT"
                    && request.options.limit == Some(50)
                    && request.options.cursor.as_deref() == Some("now")
            })
            .times(1)
            .returning(|_, _| Ok(StreamHandle::new(CancellationToken::new())));

        let config = WalletStreamConfig::new("GACCOUNT", StreamCategory::Operations, 50)
            .with_start_from_now(true);
        let stream = WalletStream::new(config, Arc::new(transport));

        assert!(stream.options().is_live_only());
        assert_eq!(stream.account(), "GACCOUNT");
    }

    #[tokio::test]
    async fn restart_cancels_previous_handle() {
        let (transport, captured) = recording_transport(2);
        let stream = WalletStream::new(
            WalletStreamConfig::new("GACCOUNT", StreamCategory::Trades, 10),
            Arc::new(transport),
        );

        stream.start();

        let captured = captured.lock();
        assert!(captured[0].0.is_cancelled());
        assert!(!captured[1].0.is_cancelled());
        drop(captured);
        assert!(stream.is_active());
    }

    #[tokio::test]
    async fn stop_cancels_and_is_idempotent() {
        let (transport, captured) = recording_transport(1);
        let stream = WalletStream::new(
            WalletStreamConfig::new("GACCOUNT", StreamCategory::Payments, 10),
            Arc::new(transport),
        );

        stream.stop();
        stream.stop();

        assert!(!stream.is_active());
        assert!(captured.lock()[0].0.is_cancelled());
    }

    #[tokio::test]
    async fn open_failure_leaves_stream_inactive() {
        let mut transport = MockStreamTransport::new();
        transport
            .expect_open()
            .times(1)
            .returning(|_, _| Err(TransportError::Unavailable("offline".to_string())));

        let stream = WalletStream::new(
            WalletStreamConfig::new("GACCOUNT", StreamCategory::Payments, 10),
            Arc::new(transport),
        );

        assert!(!stream.is_active());
        assert_eq!(stream.stats().errors_logged, 1);
        stream.stop();
    }

    #[tokio::test]
    async fn invalid_category_never_opens() {
        let mut transport = MockStreamTransport::new();
        transport.expect_open().never();

        let stream = WalletStream::open("GACCOUNT", "ledgers", 200, Arc::new(transport));
        stream.start();
        stream.stop();

        assert!(stream.category().is_none());
        assert!(stream.items().is_empty());
        assert!(!stream.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn messages_flow_into_store_and_notify() {
        let (transport, captured) = recording_transport(1);
        let stream = WalletStream::new(
            WalletStreamConfig::new("GACCOUNT", StreamCategory::Payments, 10),
            Arc::new(transport),
        );
        let mut updates = stream.subscribe();
        let sender = captured.lock()[0].1.clone();

        sender.send(payment("1", "100.0000000")).await.unwrap();
        sender.send(payment("2", "5.5000000")).await.unwrap();
        sender.send(payment("1", "7.0000000")).await.unwrap();

        updates.recv().await.unwrap();

        assert_eq!(stream.item_count(), 2);
        let mut values: Vec<_> = stream.items().into_iter().map(|i| i.value).collect();
        values.sort();
        assert_eq!(values, vec!["5.5", "7"]);

        let stats = stream.stats();
        assert_eq!(stats.messages, 3);
        assert_eq!(stats.items_upserted, 3);
        assert_eq!(stats.notifications, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn faults_are_logged_unless_trusted() {
        let (transport, captured) = recording_transport(1);
        let stream = WalletStream::new(
            WalletStreamConfig::new("GACCOUNT", StreamCategory::Payments, 10),
            Arc::new(transport),
        );
        let sender = captured.lock()[0].1.clone();

        sender
            .send(StreamEvent::Error(StreamFault::trusted(
                TransportError::Disconnected,
            )))
            .await
            .unwrap();
        sender
            .send(StreamEvent::Error(StreamFault::new(TransportError::Decode(
                "bad json".to_string(),
            ))))
            .await
            .unwrap();
        sleep(Duration::from_millis(10)).await;

        let stats = stream.stats();
        assert_eq!(stats.errors_suppressed, 1);
        assert_eq!(stats.errors_logged, 1);
        assert_eq!(stream.item_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_port_sees_each_outcome() {
        let (transport, captured) = recording_transport(1);
        let metrics = Arc::new(RecordingMetrics::default());
        let stream = WalletStream::with_metrics(
            WalletStreamConfig::new("GACCOUNT", StreamCategory::Payments, 10),
            Arc::new(transport),
            Arc::clone(&metrics) as Arc<dyn StreamMetrics>,
        );
        let mut updates = stream.subscribe();
        let sender = captured.lock()[0].1.clone();

        sender.send(payment("1", "1.0000000")).await.unwrap();
        sender.send(payment("1", "2.0000000")).await.unwrap();
        sender
            .send(StreamEvent::Message(RawEvent::from_record(json!({"id": "9", "type": "bump_sequence"}))))
            .await
            .unwrap();
        sender
            .send(StreamEvent::Error(StreamFault::trusted(TransportError::Disconnected)))
            .await
            .unwrap();
        updates.recv().await.unwrap();
        drop(stream);

        assert_eq!(
            metrics.calls(),
            vec![
                "received payments",
                "upserted payments true",
                "received payments",
                "upserted payments false",
                "received payments",
                "dropped payments unrecognized",
                "fault payments true",
                "notified",
                "released payments 1",
            ]
        );
    }

    #[test]
    fn invalid_category_outside_runtime_is_inert() {
        let mut transport = MockStreamTransport::new();
        transport.expect_open().never();

        let stream = WalletStream::open("GACCOUNT", "ledgers", 200, Arc::new(transport));
        stream.start();
        stream.stop();

        assert!(stream.category().is_none());
        assert!(!stream.is_active());
    }

    #[test]
    fn valid_category_outside_runtime_is_inert() {
        let mut transport = MockStreamTransport::new();
        transport.expect_open().never();

        let stream = WalletStream::open("GACCOUNT", "payments", 200, Arc::new(transport));
        stream.start();

        assert!(stream.category().is_none());
        assert!(stream.items().is_empty());
        assert!(!stream.is_active());
        assert_eq!(stream.stats(), StreamStats::default());
    }
}
