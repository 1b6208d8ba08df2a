// ── Client context ──
//
// Full lifecycle management for one messaging session. Owns the
// transport handle, request queue, subscription registry, route table,
// and model tree, all driven by a single event-loop task. `Client` is a
// cheap cloneable handle; every operation flows through the command
// channel so the shared state is only ever touched from the loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use restomp_api::{
    Credentials, Headers, Message, Method, SubscriptionId, Transport, TransportEvent,
    TransportEvents,
};

use crate::config::{ClientConfig, ConnectHook, DiagnosticHook, PendingHook};
use crate::error::CoreError;
use crate::queue::{PendingRequest, RequestQueue};
use crate::registry::{MessageHandler, SubscriptionRecord, SubscriptionRegistry};
use crate::routes::RouteTable;
use crate::sync;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
///
/// Transitions drive queue flush and resubscription as side effects —
/// consumers observe, they never poll-and-react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
}

// ── Commands ─────────────────────────────────────────────────────────

enum Command {
    Request(PendingRequest),
    Subscribe(SubscriptionRecord),
    Unsubscribe(SubscriptionId),
    Reopen,
}

// ── Client handle ────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable. Created by [`start`](Self::start), torn down by
/// [`close`](Self::close) (or when the last handle drops).
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    command_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    model_rx: watch::Receiver<Value>,
    queue_depth_rx: watch::Receiver<usize>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        // Last handle gone: stop the event loop.
        self.cancel.cancel();
    }
}

impl Client {
    /// Start a client over the given transport.
    ///
    /// Spawns the event-loop task and immediately begins opening the
    /// connection; returns without waiting for it to become ready.
    /// `events` is the receiving half of the transport's event channel
    /// (see [`restomp_api::event_channel`]).
    pub fn start<T>(config: ClientConfig, transport: T, events: TransportEvents) -> Self
    where
        T: Transport + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (model_tx, model_rx) = watch::channel(config.model.clone());
        let (queue_depth_tx, queue_depth_rx) = watch::channel(0);
        let cancel = CancellationToken::new();

        let worker = ClientWorker {
            path: config.path,
            credentials: config.credentials,
            auto_reconnect: config.auto_reconnect,
            cooldown: config.reconnect_cooldown,
            routes: config.routes,
            on_connect: config.on_connect,
            on_connection_error: config.on_connection_error,
            on_close: config.on_close,
            on_pending: config.on_pending,
            transport: Box::new(transport),
            queue: RequestQueue::new(),
            registry: SubscriptionRegistry::new(),
            model: config.model,
            state: ConnectionState::Disconnected,
            state_tx,
            model_tx,
            queue_depth_tx,
            last_attempt: None,
            pending_reopen: None,
        };

        let task_cancel = cancel.clone();
        let handle = tokio::spawn(worker.run(command_rx, events, task_cancel));

        Self {
            inner: Arc::new(ClientInner {
                command_tx,
                state_rx,
                model_rx,
                queue_depth_rx,
                cancel,
                worker: Mutex::new(Some(handle)),
            }),
        }
    }

    // ── State observation ────────────────────────────────────────────

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Snapshot of the model tree as of the last reconciliation.
    pub fn model_snapshot(&self) -> Value {
        self.inner.model_rx.borrow().clone()
    }

    /// Subscribe to model snapshots, published after every mutation.
    pub fn model(&self) -> watch::Receiver<Value> {
        self.inner.model_rx.clone()
    }

    /// Number of requests currently buffered awaiting a ready connection.
    pub fn pending_requests(&self) -> usize {
        *self.inner.queue_depth_rx.borrow()
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Send a request, or queue it while the connection is not ready.
    ///
    /// Validation (destination present, body present for mutating
    /// methods) happens synchronously here; the body is serialized
    /// before queuing so later caller-side mutation cannot affect it.
    pub fn request(
        &self,
        destination: &str,
        method: Method,
        body: Option<&Value>,
        headers: Headers,
    ) -> Result<(), CoreError> {
        let request = PendingRequest::new(destination, method, body, headers)?;
        self.send_command(Command::Request(request))
    }

    /// `read` request for a destination.
    pub fn get(&self, destination: &str) -> Result<(), CoreError> {
        self.request(destination, Method::Read, None, Headers::new())
    }

    /// `create` request carrying a body.
    pub fn post(&self, destination: &str, body: &Value) -> Result<(), CoreError> {
        self.request(destination, Method::Create, Some(body), Headers::new())
    }

    /// `replace` request carrying a body.
    pub fn put(&self, destination: &str, body: &Value) -> Result<(), CoreError> {
        self.request(destination, Method::Replace, Some(body), Headers::new())
    }

    /// `update` request carrying a body.
    pub fn patch(&self, destination: &str, body: &Value) -> Result<(), CoreError> {
        self.request(destination, Method::Update, Some(body), Headers::new())
    }

    /// `delete` request for a destination.
    pub fn remove(&self, destination: &str) -> Result<(), CoreError> {
        self.request(destination, Method::Delete, None, Headers::new())
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribe to a destination.
    ///
    /// The handler runs on the event loop for every inbound message on
    /// that destination. The returned handle is the only way to cancel;
    /// consuming `unsubscribe` makes double-teardown unrepresentable.
    pub fn subscribe<F>(
        &self,
        destination: &str,
        headers: Headers,
        handler: F,
    ) -> Result<SubscriptionHandle, CoreError>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        if destination.trim_matches('/').is_empty() {
            return Err(CoreError::MissingDestination);
        }
        let id = SubscriptionId::new();
        self.send_command(Command::Subscribe(SubscriptionRecord {
            id,
            destination: destination.to_owned(),
            headers,
            handler: Arc::new(handler),
        }))?;
        Ok(SubscriptionHandle {
            id,
            command_tx: self.inner.command_tx.clone(),
        })
    }

    /// REST-like read: send a `read` request, then await the reply.
    ///
    /// Installs a one-shot subscription on the same destination. The
    /// first message whose method is `replace` resolves the future with
    /// its parsed body and tears the subscription down; messages with any
    /// other method are ignored and the subscription stays up. There is
    /// no timeout — a server that never replies leaves the future pending.
    pub async fn read(&self, destination: &str) -> Result<Option<Value>, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let slot = std::sync::Mutex::new(Some(reply_tx));
        let id = SubscriptionId::new();
        let command_tx = self.inner.command_tx.clone();

        let handler: MessageHandler = Arc::new(move |message: &Message| {
            if message.method() != Some(Method::Replace) {
                return;
            }
            if let Some(tx) = slot.lock().ok().and_then(|mut guard| guard.take()) {
                let _ = tx.send(message.parsed_body());
                let _ = command_tx.send(Command::Unsubscribe(id));
            }
        });

        self.request(destination, Method::Read, None, Headers::new())?;
        self.send_command(Command::Subscribe(SubscriptionRecord {
            id,
            destination: destination.to_owned(),
            headers: Headers::new(),
            handler,
        }))?;

        reply_rx.await.map_err(|_| CoreError::Closed)
    }

    // ── Connection control ───────────────────────────────────────────

    /// Ask the lifecycle manager to (re)open the connection.
    ///
    /// Subject to the reconnect throttle: calls within the cooldown
    /// window collapse into the in-flight attempt.
    pub fn reopen(&self) -> Result<(), CoreError> {
        self.send_command(Command::Reopen)
    }

    /// Tear down the client: stop the event loop and join it.
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.worker.lock().await.take() {
            let _ = handle.await;
        }
        debug!("client closed");
    }

    fn send_command(&self, command: Command) -> Result<(), CoreError> {
        self.inner
            .command_tx
            .send(command)
            .map_err(|_| CoreError::Closed)
    }
}

// ── SubscriptionHandle ───────────────────────────────────────────────

/// Handle to an active subscription.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the subscription and tear down its transport-level
    /// counterpart. Consumes the handle.
    pub fn unsubscribe(self) {
        let _ = self.command_tx.send(Command::Unsubscribe(self.id));
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ── Event loop ───────────────────────────────────────────────────────

struct ClientWorker {
    path: url::Url,
    credentials: Credentials,
    auto_reconnect: bool,
    cooldown: Duration,
    routes: RouteTable,
    on_connect: Option<ConnectHook>,
    on_connection_error: Option<DiagnosticHook>,
    on_close: Option<DiagnosticHook>,
    on_pending: Option<PendingHook>,
    transport: Box<dyn Transport>,
    queue: RequestQueue,
    registry: SubscriptionRegistry,
    model: Value,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    model_tx: watch::Sender<Value>,
    queue_depth_tx: watch::Sender<usize>,
    /// Start of the current throttle window.
    last_attempt: Option<Instant>,
    /// Deadline for the single trailing attempt armed by throttled calls.
    pending_reopen: Option<Instant>,
}

impl ClientWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: TransportEvents,
        cancel: CancellationToken,
    ) {
        self.open_connection();

        loop {
            let reopen_at = self.pending_reopen;
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = sleep_until_opt(reopen_at), if reopen_at.is_some() => {
                    self.pending_reopen = None;
                    self.open_connection();
                }
                command = commands.recv() => {
                    // None: every Client handle is gone and its Drop has
                    // already cancelled us.
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("transport event channel closed");
                        break;
                    };
                    self.handle_event(event);
                }
            }
        }

        debug!("client event loop exiting");
    }

    // ── Command handling ─────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Request(request) => self.enqueue_or_send(request),
            Command::Subscribe(record) => {
                if self.state == ConnectionState::Ready {
                    if let Err(error) = self.transport.subscribe(
                        &record.id,
                        &record.destination,
                        &record.headers,
                    ) {
                        warn!(error = %error, destination = %record.destination,
                              "transport rejected subscribe");
                    }
                }
                debug!(id = %record.id, destination = %record.destination, "subscription added");
                self.registry.insert(record);
            }
            Command::Unsubscribe(id) => {
                let Some(record) = self.registry.remove(&id) else {
                    trace!(%id, "unsubscribe for unknown subscription ignored");
                    return;
                };
                debug!(%id, destination = %record.destination, "subscription removed");
                if self.state == ConnectionState::Ready {
                    if let Err(error) = self.transport.unsubscribe(&id) {
                        warn!(error = %error, %id, "transport rejected unsubscribe");
                    }
                }
            }
            Command::Reopen => self.open_connection(),
        }
    }

    fn enqueue_or_send(&mut self, request: PendingRequest) {
        if self.state == ConnectionState::Ready {
            self.send_request(&request);
        } else {
            debug!(destination = %request.destination, "connection not ready, queueing request");
            if let Some(hook) = &self.on_pending {
                hook(&request);
            }
            self.queue.push(request);
            let _ = self.queue_depth_tx.send(self.queue.len());
        }
    }

    fn send_request(&mut self, request: &PendingRequest) {
        trace!(destination = %request.destination, method = %request.method, "sending request");
        if let Err(error) = self.transport.send(
            &request.destination,
            &request.wire_headers(),
            request.body.as_deref(),
        ) {
            warn!(error = %error, destination = %request.destination, "transport rejected send");
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Sole entry point for opening the connection, throttled: calls
    /// within the cooldown window collapse into the in-flight attempt
    /// and arm at most one trailing attempt at the window end. This
    /// prevents reconnect storms when manual reopen, auto-reconnect,
    /// and the initial open race.
    fn open_connection(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_attempt {
            if now.duration_since(last) < self.cooldown {
                debug!("connect attempt throttled");
                if self.pending_reopen.is_none() {
                    self.pending_reopen = Some(last + self.cooldown);
                }
                return;
            }
        }

        self.last_attempt = Some(now);
        self.set_state(ConnectionState::Connecting);
        info!(path = %self.path, "opening connection");

        if let Err(error) = self.transport.connect(&self.path, &self.credentials) {
            warn!(error = %error, "connect failed");
            self.set_state(ConnectionState::Disconnected);
            if let Some(hook) = &self.on_connection_error {
                hook(&error.to_string());
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("connection ready");
                self.set_state(ConnectionState::Ready);
                if let Some(hook) = &self.on_connect {
                    hook();
                }
                // Side effects in this order: flush first, then resubscribe.
                self.flush_queue();
                self.resubscribe_all();
            }
            TransportEvent::Message(message) => self.dispatch(&message),
            TransportEvent::ConnectionError(reason) => {
                warn!(reason = %reason, "transport error");
                if let Some(hook) = &self.on_connection_error {
                    hook(&reason);
                }
            }
            TransportEvent::ConnectionLost(reason) => {
                warn!(reason = %reason, "connection lost");
                self.set_state(ConnectionState::Disconnected);
                if let Some(hook) = &self.on_close {
                    hook(&reason);
                }
                if self.auto_reconnect {
                    self.open_connection();
                }
            }
        }
    }

    fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let drained = self.queue.drain();
        info!(count = drained.len(), "flushing request queue");
        for request in &drained {
            self.send_request(request);
        }
        let _ = self.queue_depth_tx.send(0);
    }

    fn resubscribe_all(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        debug!(count = self.registry.len(), "re-establishing subscriptions");
        for record in self.registry.iter() {
            if let Err(error) =
                self.transport
                    .subscribe(&record.id, &record.destination, &record.headers)
            {
                warn!(error = %error, destination = %record.destination,
                      "transport rejected resubscribe");
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "connection state change");
            self.state = state;
            let _ = self.state_tx.send(state);
        }
    }

    // ── Inbound dispatch ─────────────────────────────────────────────

    /// Route one inbound message: subscription handlers first, then the
    /// route table, then model reconciliation. Nothing here ever raises —
    /// unresolvable messages degrade to a logged drop.
    fn dispatch(&mut self, message: &Message) {
        trace!(destination = %message.destination, method = ?message.method(), "inbound message");

        // Snapshot so handlers can reentrantly (un)subscribe.
        for handler in self.registry.handlers_for(&message.destination) {
            handler(message);
        }

        self.routes.dispatch(message);

        let body = message.parsed_body();
        if sync::apply(&mut self.model, &message.destination, message.method(), body)
            == sync::SyncOutcome::Mutated
        {
            let _ = self.model_tx.send(self.model.clone());
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
