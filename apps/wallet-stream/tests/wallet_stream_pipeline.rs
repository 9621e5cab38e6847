//! Wallet Stream Pipeline Integration Tests
//!
//! Drives a wallet stream through a recording in-memory transport and
//! checks deduplication, notification throttling, and fault handling.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use common::LogCapture;
use wallet_stream::{
    RawEvent, StreamCategory, StreamEvent, StreamFault, StreamHandle, StreamRequest,
    StreamTransport, TransportError, WalletStream, WalletStreamConfig,
};

/// One stream opened on the fake transport.
struct Opened {
    request: StreamRequest,
    events: mpsc::Sender<StreamEvent>,
    token: CancellationToken,
}

/// Transport that records every open and lets the test push events.
#[derive(Default)]
struct FakeTransport {
    opened: Mutex<Vec<Opened>>,
}

impl FakeTransport {
    fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    fn request(&self, index: usize) -> StreamRequest {
        self.opened.lock()[index].request.clone()
    }

    fn is_cancelled(&self, index: usize) -> bool {
        self.opened.lock()[index].token.is_cancelled()
    }

    /// Push an event on the most recent stream. Returns `false` once the
    /// consumer has gone away.
    async fn push(&self, event: StreamEvent) -> bool {
        let sender = self.opened.lock().last().unwrap().events.clone();
        sender.send(event).await.is_ok()
    }

    async fn push_record(&self, record: Value) -> bool {
        self.push(StreamEvent::Message(RawEvent::from_record(record)))
            .await
    }
}

impl StreamTransport for FakeTransport {
    fn open(
        &self,
        request: StreamRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<StreamHandle, TransportError> {
        let token = CancellationToken::new();
        self.opened.lock().push(Opened {
            request,
            events,
            token: token.clone(),
        });
        Ok(StreamHandle::new(token))
    }
}

fn envelope(id: &str) -> Value {
    json!({
        "id": id,
        "created_at": "2024-03-15T12:00:00Z",
        "_links": {"self": {"href": format!("https://horizon.stellar.org/operations/{id}")}}
    })
}

fn with_envelope(id: &str, fields: Value) -> Value {
    let mut record = envelope(id);
    record
        .as_object_mut()
        .unwrap()
        .extend(fields.as_object().unwrap().clone());
    record
}

fn native_payment(id: &str, amount: &str) -> Value {
    with_envelope(
        id,
        json!({"type": "payment", "asset_type": "native", "from": "GSENDER", "amount": amount}),
    )
}

fn setup(category: StreamCategory) -> (Arc<FakeTransport>, WalletStream) {
    let transport = Arc::new(FakeTransport::default());
    let config = WalletStreamConfig::new("GACCOUNT", category, 200);
    let stream = WalletStream::new(config, Arc::clone(&transport) as Arc<dyn StreamTransport>);
    (transport, stream)
}

#[tokio::test(start_paused = true)]
async fn repeated_ids_converge_to_last_value() {
    let (transport, stream) = setup(StreamCategory::Payments);

    transport.push_record(native_payment("1", "10.0000000")).await;
    transport.push_record(native_payment("2", "20.0000000")).await;
    transport.push_record(native_payment("1", "15.5000000")).await;
    sleep(Duration::from_millis(10)).await;

    let mut items = stream.items();
    items.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "1");
    assert_eq!(items[0].value, "15.5");
    assert_eq!(items[0].name, "Payment XLM");
    assert_eq!(items[1].value, "20");
}

#[tokio::test(start_paused = true)]
async fn mixed_operations_are_classified() {
    let (transport, stream) = setup(StreamCategory::Operations);

    transport
        .push_record(with_envelope(
            "10",
            json!({
                "type": "manage_offer",
                "selling_asset_type": "credit_alphanum4",
                "selling_asset_code": "USD",
                "buying_asset_type": "native"
            }),
        ))
        .await;
    transport
        .push_record(with_envelope("11", json!({"type": "account_merge"})))
        .await;
    transport
        .push_record(with_envelope("12", json!({"type": "bump_sequence"})))
        .await;
    transport
        .push_record(with_envelope("13", json!({"type": "payment", "asset_type": "native"})))
        .await;
    sleep(Duration::from_millis(10)).await;

    assert_eq!(stream.item_count(), 2);
    let offer = stream.items().into_iter().find(|i| i.id == "10").unwrap();
    assert_eq!(offer.value, "Selling: USD Buying: XLM");

    let stats = stream.stats();
    assert_eq!(stats.messages, 4);
    assert_eq!(stats.unrecognized, 1);
    assert_eq!(stats.malformed, 1);
}

#[tokio::test(start_paused = true)]
async fn burst_produces_one_notification() {
    let (transport, stream) = setup(StreamCategory::Payments);
    let mut updates = stream.subscribe();

    for i in 0..25 {
        transport
            .push_record(native_payment(&i.to_string(), "1.0000000"))
            .await;
        sleep(Duration::from_millis(20)).await;
    }
    sleep(Duration::from_secs(1)).await;

    assert!(updates.try_recv().is_ok());
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(stream.item_count(), 25);
    assert_eq!(stream.stats().notifications, 1);
}

#[tokio::test(start_paused = true)]
async fn stop_silences_notifications_and_delivery() {
    let (transport, stream) = setup(StreamCategory::Payments);
    let mut updates = stream.subscribe();

    transport.push_record(native_payment("1", "1")).await;
    sleep(Duration::from_millis(50)).await;
    stream.stop();

    // The consumer is gone, so later deliveries fail or are ignored.
    let _ = transport.push_record(native_payment("2", "2")).await;
    sleep(Duration::from_secs(1)).await;

    assert!(transport.is_cancelled(0));
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(stream.item_count(), 1);
    assert!(!stream.is_active());
}

#[tokio::test(start_paused = true)]
async fn trusted_faults_are_silent() {
    let logs = LogCapture::default();
    let _guard = logs.install(Level::WARN);
    let (transport, stream) = setup(StreamCategory::Transactions);

    transport
        .push(StreamEvent::Error(StreamFault::trusted(
            TransportError::Disconnected,
        )))
        .await;
    sleep(Duration::from_millis(10)).await;

    assert!(logs.lines().is_empty(), "unexpected output: {:?}", logs.lines());

    transport
        .push(StreamEvent::Error(StreamFault::new(TransportError::Status {
            status: 503,
            body: String::new(),
        })))
        .await;
    sleep(Duration::from_millis(10)).await;

    let lines = logs.lines();
    assert_eq!(lines.len(), 1, "expected one entry: {lines:?}");
    assert!(lines[0].contains("WARN"));
    assert!(lines[0].contains("Stream transport error"));
    assert!(lines[0].contains("503"));

    let stats = stream.stats();
    assert_eq!(stats.errors_suppressed, 1);
    assert_eq!(stats.errors_logged, 1);
    assert!(stream.items().is_empty());
    assert!(stream.is_active());
}

#[tokio::test]
async fn invalid_category_is_inert() {
    let transport = Arc::new(FakeTransport::default());

    let stream = WalletStream::open(
        "GACCOUNT",
        "effects",
        200,
        Arc::clone(&transport) as Arc<dyn StreamTransport>,
    );
    stream.start();
    stream.stop();

    assert_eq!(transport.open_count(), 0);
    assert!(stream.items().is_empty());
    assert!(stream.category().is_none());
}

#[tokio::test]
async fn category_name_is_case_insensitive() {
    let transport = Arc::new(FakeTransport::default());

    let stream = WalletStream::open(
        "GACCOUNT",
        "Trades",
        0,
        Arc::clone(&transport) as Arc<dyn StreamTransport>,
    );

    assert_eq!(stream.category(), Some(StreamCategory::Trades));
    let request = transport.request(0);
    assert_eq!(request.category, StreamCategory::Trades);
    assert_eq!(request.options.limit, None);
    assert_eq!(request.options.cursor, None);
}

#[tokio::test]
async fn restart_replaces_live_subscription() {
    let (transport, stream) = setup(StreamCategory::Payments);

    stream.start();
    stream.start();

    assert_eq!(transport.open_count(), 3);
    assert!(transport.is_cancelled(0));
    assert!(transport.is_cancelled(1));
    assert!(!transport.is_cancelled(2));
}

#[tokio::test]
async fn start_after_stop_resumes() {
    let (transport, stream) = setup(StreamCategory::Payments);

    stream.stop();
    stream.start();

    assert!(stream.is_active());
    assert_eq!(transport.open_count(), 2);
    assert!(!transport.is_cancelled(1));
}

#[tokio::test]
async fn dropping_stream_cancels_transport() {
    let (transport, stream) = setup(StreamCategory::Payments);

    drop(stream);

    assert!(transport.is_cancelled(0));
}

#[tokio::test]
async fn request_scoped_to_account_and_options() {
    let transport = Arc::new(FakeTransport::default());
    let config = WalletStreamConfig::new("GWATCHED", StreamCategory::Payments, 50)
        .with_start_from_now(true);

    let _stream = WalletStream::new(config, Arc::clone(&transport) as Arc<dyn StreamTransport>);

    let request = transport.request(0);
    assert_eq!(request.account, "GWATCHED");
    assert_eq!(request.options.limit, Some(50));
    assert!(request.options.is_live_only());
}
