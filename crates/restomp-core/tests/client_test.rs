#![allow(clippy::unwrap_used)]
// Integration tests for `Client` using a recording mock transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;

use restomp_core::{
    event_channel, Client, ClientConfig, ConnectionState, CoreError, Credentials, Headers,
    Message, Method, RouteTable, SubscriptionId, Transport, TransportEvent, METHOD_HEADER,
};

// ── Mock transport ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Connect,
    Subscribe {
        id: SubscriptionId,
        destination: String,
    },
    Unsubscribe(SubscriptionId),
    Send {
        destination: String,
        method: Option<String>,
        body: Option<String>,
    },
}

#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn record(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    fn snapshot(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    fn connects(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|c| matches!(c, Call::Connect))
            .count()
    }

    fn sent_destinations(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .filter_map(|c| match c {
                Call::Send { destination, .. } => Some(destination.clone()),
                _ => None,
            })
            .collect()
    }

    fn subscribes(&self) -> Vec<(SubscriptionId, String)> {
        self.snapshot()
            .iter()
            .filter_map(|c| match c {
                Call::Subscribe { id, destination } => Some((*id, destination.clone())),
                _ => None,
            })
            .collect()
    }

    fn unsubscribes(&self) -> Vec<SubscriptionId> {
        self.snapshot()
            .iter()
            .filter_map(|c| match c {
                Call::Unsubscribe(id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

struct MockTransport {
    log: CallLog,
}

impl Transport for MockTransport {
    fn connect(
        &mut self,
        _target: &url::Url,
        _credentials: &Credentials,
    ) -> Result<(), restomp_core::TransportError> {
        self.log.record(Call::Connect);
        Ok(())
    }

    fn subscribe(
        &mut self,
        id: &SubscriptionId,
        destination: &str,
        _headers: &Headers,
    ) -> Result<(), restomp_core::TransportError> {
        self.log.record(Call::Subscribe {
            id: *id,
            destination: destination.to_owned(),
        });
        Ok(())
    }

    fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), restomp_core::TransportError> {
        self.log.record(Call::Unsubscribe(*id));
        Ok(())
    }

    fn send(
        &mut self,
        destination: &str,
        headers: &Headers,
        body: Option<&str>,
    ) -> Result<(), restomp_core::TransportError> {
        self.log.record(Call::Send {
            destination: destination.to_owned(),
            method: headers.get(METHOD_HEADER).cloned(),
            body: body.map(ToOwned::to_owned),
        });
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn start(config: ClientConfig) -> (Client, CallLog, UnboundedSender<TransportEvent>) {
    let log = CallLog::default();
    let transport = MockTransport { log: log.clone() };
    let (event_tx, events) = event_channel();
    let client = Client::start(config, transport, events);
    (client, log, event_tx)
}

/// Let the event loop drain its channels without advancing the clock.
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

fn inbound(destination: &str) -> Message {
    Message::new(destination)
}

// ── Request queue ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn queued_requests_flush_in_order_on_ready() {
    let pending = Arc::new(AtomicUsize::new(0));
    let mut config = ClientConfig::default();
    let hook_pending = Arc::clone(&pending);
    config.on_pending = Some(Box::new(move |_| {
        hook_pending.fetch_add(1, Ordering::SeqCst);
    }));

    let (client, log, event_tx) = start(config);
    settle().await;
    assert_eq!(client.state(), ConnectionState::Connecting);

    for i in 0..3 {
        client.get(&format!("items/{i}")).unwrap();
    }
    settle().await;

    assert_eq!(client.pending_requests(), 3);
    assert_eq!(pending.load(Ordering::SeqCst), 3);
    assert!(log.sent_destinations().is_empty());

    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;

    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(
        log.sent_destinations(),
        vec!["items/0", "items/1", "items/2"]
    );
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn requests_bypass_the_queue_once_ready() {
    let (client, log, event_tx) = start(ClientConfig::default());
    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;

    client.post("items", &json!({"id": 1})).unwrap();
    settle().await;

    assert_eq!(client.pending_requests(), 0);
    let sends = log.snapshot();
    assert!(sends.iter().any(|c| matches!(
        c,
        Call::Send { destination, method: Some(m), body: Some(_) }
            if destination == "items" && m == "create"
    )));
}

#[tokio::test(start_paused = true)]
async fn request_validation_is_synchronous() {
    let (client, _log, _event_tx) = start(ClientConfig::default());

    assert!(matches!(
        client.request("", Method::Read, None, Headers::new()),
        Err(CoreError::MissingDestination)
    ));
    assert!(matches!(
        client.request("items", Method::Create, None, Headers::new()),
        Err(CoreError::MissingBody { .. })
    ));
}

// ── Subscriptions across reconnects ─────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reconnect_resubscribes_with_the_original_id() {
    let (client, log, event_tx) = start(ClientConfig::default());
    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;

    let handle = client
        .subscribe("items", Headers::new(), |_msg| {})
        .unwrap();
    settle().await;

    let first = log.subscribes();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].0, handle.id());
    assert_eq!(first[0].1, "items");

    // Drop the connection; auto-reconnect is throttled into the trailing
    // window, then the transport reports ready again.
    event_tx.send(TransportEvent::ConnectionLost("gone".into())).unwrap();
    settle().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(log.connects(), 2);

    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;

    let subscribes = log.subscribes();
    assert_eq!(subscribes.len(), 2, "expected a resubscribe: {subscribes:?}");
    assert_eq!(subscribes[1].0, handle.id(), "id must survive the reconnect");
    assert_eq!(subscribes[1].1, "items");

    // The original handle still works.
    handle.unsubscribe();
    settle().await;
    assert_eq!(log.unsubscribes(), vec![first[0].0]);
}

#[tokio::test(start_paused = true)]
async fn subscription_handlers_receive_matching_messages_only() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (client, _log, event_tx) = start(ClientConfig::default());
    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;

    let handler_seen = Arc::clone(&seen);
    let handle = client
        .subscribe("items", Headers::new(), move |msg| {
            handler_seen.lock().unwrap().push(msg.destination.clone());
        })
        .unwrap();
    settle().await;

    event_tx.send(TransportEvent::Message(inbound("items"))).unwrap();
    event_tx.send(TransportEvent::Message(inbound("users"))).unwrap();
    settle().await;
    assert_eq!(&*seen.lock().unwrap(), &["items"]);

    handle.unsubscribe();
    settle().await;
    event_tx.send(TransportEvent::Message(inbound("items"))).unwrap();
    settle().await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn handlers_may_reenter_the_client() {
    let (client, log, event_tx) = start(ClientConfig::default());
    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;

    let reentrant = client.clone();
    client
        .subscribe("ping", Headers::new(), move |_msg| {
            reentrant.get("pong").unwrap();
        })
        .unwrap();
    settle().await;

    event_tx.send(TransportEvent::Message(inbound("ping"))).unwrap();
    settle().await;

    assert_eq!(log.sent_destinations(), vec!["pong"]);
}

// ── Reconnect throttle ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reopen_storm_collapses_into_one_attempt_plus_trailing() {
    let (client, log, _event_tx) = start(ClientConfig::default());
    settle().await;
    assert_eq!(log.connects(), 1);

    for _ in 0..5 {
        client.reopen().unwrap();
    }
    settle().await;
    assert_eq!(log.connects(), 1, "storm must collapse into the in-flight attempt");

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(log.connects(), 2, "one trailing attempt at the window end");

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(log.connects(), 2, "no further attempts without new triggers");
}

#[tokio::test(start_paused = true)]
async fn connection_loss_does_not_reconnect_when_disabled() {
    let config = ClientConfig {
        auto_reconnect: false,
        ..ClientConfig::default()
    };
    let (_client, log, event_tx) = start(config);
    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;
    assert_eq!(log.connects(), 1);

    event_tx.send(TransportEvent::ConnectionLost("gone".into())).unwrap();
    settle().await;
    tokio::time::sleep(Duration::from_millis(4200)).await;

    assert_eq!(log.connects(), 1);
}

// ── Lifecycle hooks ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn lifecycle_hooks_fire_on_transitions() {
    let connects = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(Mutex::new(Vec::new()));

    let mut config = ClientConfig::default();
    let hook = Arc::clone(&connects);
    config.on_connect = Some(Box::new(move || {
        hook.fetch_add(1, Ordering::SeqCst);
    }));
    let hook = Arc::clone(&closes);
    config.on_close = Some(Box::new(move |_| {
        hook.fetch_add(1, Ordering::SeqCst);
    }));
    let hook = Arc::clone(&errors);
    config.on_connection_error = Some(Box::new(move |reason| {
        hook.lock().unwrap().push(reason.to_owned());
    }));

    let (_client, _log, event_tx) = start(config);
    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    event_tx.send(TransportEvent::ConnectionError("flaky".into())).unwrap();
    settle().await;
    assert_eq!(&*errors.lock().unwrap(), &["flaky"]);

    event_tx.send(TransportEvent::ConnectionLost("gone".into())).unwrap();
    settle().await;
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

// ── Model synchronization end to end ────────────────────────────────

#[tokio::test(start_paused = true)]
async fn inbound_messages_reconcile_the_model() {
    let config = ClientConfig {
        model: json!({"items": [{"id": 1, "name": "a"}]}),
        ..ClientConfig::default()
    };
    let (client, _log, event_tx) = start(config);
    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;

    let mut model_rx = client.model();

    event_tx
        .send(TransportEvent::Message(
            inbound("items/0").with_body(&json!({"name": "b"})),
        ))
        .unwrap();
    settle().await;

    assert_eq!(
        client.model_snapshot(),
        json!({"items": [{"id": 1, "name": "b"}]})
    );
    assert!(model_rx.has_changed().unwrap());

    event_tx
        .send(TransportEvent::Message(
            inbound("items/0").with_method(Method::Delete),
        ))
        .unwrap();
    settle().await;

    assert_eq!(client.model_snapshot(), json!({"items": []}));
}

#[tokio::test(start_paused = true)]
async fn unresolvable_messages_are_dropped_silently() {
    let config = ClientConfig {
        model: json!({}),
        ..ClientConfig::default()
    };
    let (client, _log, event_tx) = start(config);
    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;

    event_tx
        .send(TransportEvent::Message(
            inbound("no/such/place").with_body(&json!({"x": 1})),
        ))
        .unwrap();
    let mut msg = inbound("also/broken");
    msg.body = Some("not json {{".into());
    event_tx.send(TransportEvent::Message(msg)).unwrap();
    settle().await;

    assert_eq!(client.model_snapshot(), json!({}));
    assert_eq!(client.state(), ConnectionState::Ready);
}

// ── Route table end to end ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn route_handlers_fire_with_extracted_params() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let routed = Arc::clone(&seen);
    let routes = RouteTable::new()
        .route("/users/:id", Method::Update, move |params, _msg| {
            routed
                .lock()
                .unwrap()
                .push(params.get("id").unwrap_or("").to_owned());
        })
        .unwrap();

    let config = ClientConfig {
        routes,
        ..ClientConfig::default()
    };
    let (_client, _log, event_tx) = start(config);
    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;

    event_tx
        .send(TransportEvent::Message(
            inbound("users/42")
                .with_method(Method::Update)
                .with_body(&json!({"name": "b"})),
        ))
        .unwrap();
    // Different method: the route stays quiet.
    event_tx
        .send(TransportEvent::Message(
            inbound("users/42").with_method(Method::Delete),
        ))
        .unwrap();
    settle().await;

    assert_eq!(&*seen.lock().unwrap(), &["42"]);
}

// ── Request/response emulation ──────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn one_shot_read_resolves_on_replace_and_unsubscribes() {
    let (client, log, event_tx) = start(ClientConfig::default());
    event_tx.send(TransportEvent::Connected).unwrap();
    settle().await;

    let mut read_task = tokio_test::task::spawn(client.read("users/1"));
    assert!(read_task.poll().is_pending());
    settle().await;

    // The read request went out and a one-shot subscription is up.
    assert_eq!(log.sent_destinations(), vec!["users/1"]);
    assert_eq!(log.subscribes().len(), 1);

    // A non-replace message is ignored: still subscribed, still pending.
    event_tx
        .send(TransportEvent::Message(
            inbound("users/1")
                .with_method(Method::Update)
                .with_body(&json!({"noise": true})),
        ))
        .unwrap();
    settle().await;
    assert!(read_task.poll().is_pending());
    assert!(log.unsubscribes().is_empty());

    // The replace reply resolves the future exactly once and tears down.
    event_tx
        .send(TransportEvent::Message(
            inbound("users/1")
                .with_method(Method::Replace)
                .with_body(&json!({"id": 1, "name": "a"})),
        ))
        .unwrap();
    event_tx
        .send(TransportEvent::Message(
            inbound("users/1")
                .with_method(Method::Replace)
                .with_body(&json!({"id": 1, "name": "duplicate"})),
        ))
        .unwrap();
    settle().await;

    let reply = read_task.await.unwrap();
    assert_eq!(reply, Some(json!({"id": 1, "name": "a"})));
    assert_eq!(log.unsubscribes().len(), 1);
}

// ── Teardown ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn close_makes_handles_report_closed() {
    let (client, _log, _event_tx) = start(ClientConfig::default());
    settle().await;

    client.close().await;

    assert!(matches!(client.get("items"), Err(CoreError::Closed)));
    assert!(matches!(
        client.subscribe("items", Headers::new(), |_| {}),
        Err(CoreError::Closed)
    ));
}
