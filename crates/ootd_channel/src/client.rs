//! Channel client state machine.

use crate::config::ChannelConfig;
use crate::error::{ChannelError, ChannelResult};
use crate::transport::{
    ChannelMessage, ChannelTransport, EventReceiver, OpenRequest, SessionEvent, TransportEvent,
};
use ootd_protocol::AuthProvider;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Connection lifecycle of a [`ChannelClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being opened.
    Disconnected,
    /// Waiting for the transport to report the handshake.
    Connecting,
    /// Open; subscriptions are live.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        };
        f.write_str(name)
    }
}

/// A reconnect the driver should perform after `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconnect {
    /// How long to wait.
    pub delay: Duration,
    /// Attempt number within the current outage, from 1.
    pub attempt: u32,
    epoch: u64,
}

type Handler = Arc<dyn Fn(&ChannelMessage) + Send + Sync>;

struct Inner {
    state: ConnectionState,
    token: Option<String>,
    handlers: BTreeMap<String, Vec<(u64, Handler)>>,
    next_handler: u64,
    attempts: u32,
    // Bumped by connect/disconnect so scheduled reconnects from an older
    // session are skipped.
    epoch: u64,
    // Bumped by every open; events tagged with another value are stale.
    session: u64,
    last_event_id: Option<String>,
    last_error: Option<ChannelError>,
}

/// One authenticated push connection with topic subscriptions.
///
/// The client never touches the network itself. It tells its
/// [`ChannelTransport`] what to do and learns what happened through
/// [`SessionEvent`]s, fed either by [`run`](Self::run) or directly via
/// [`handle_event`](Self::handle_event). Each open starts a new session and
/// events from any earlier session are ignored.
///
/// # Invariants
///
/// - `connect` is only valid from `Disconnected`
/// - Every registered topic is subscribed on the transport after each
///   successful open
/// - Handlers run without the client lock held
/// - After `disconnect`, no reconnect happens until the next `connect`
/// - Only events from the latest session change state or reach handlers
pub struct ChannelClient {
    name: String,
    config: ChannelConfig,
    transport: Arc<dyn ChannelTransport>,
    auth: Arc<dyn AuthProvider>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ChannelClient {
    /// Creates a disconnected client.
    pub fn new(
        name: impl Into<String>,
        config: ChannelConfig,
        transport: Arc<dyn ChannelTransport>,
        auth: Arc<dyn AuthProvider>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            name: name.into(),
            config,
            transport,
            auth,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                token: None,
                handlers: BTreeMap::new(),
                next_handler: 0,
                attempts: 0,
                epoch: 0,
                session: 0,
                last_event_id: None,
                last_error: None,
            }),
            state_tx,
        })
    }

    /// Client name, for logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Returns true when `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribes to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Last connection error, cleared on a successful open.
    pub fn last_error(&self) -> Option<ChannelError> {
        self.inner.lock().last_error.clone()
    }

    /// Id of the last event received.
    pub fn last_event_id(&self) -> Option<String> {
        self.inner.lock().last_event_id.clone()
    }

    /// Topics with at least one handler.
    pub fn topics(&self) -> Vec<String> {
        self.inner.lock().handlers.keys().cloned().collect()
    }

    /// Number of handlers on `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.inner.lock().handlers.get(topic).map_or(0, Vec::len)
    }

    /// Opens a connection authenticated with `token`.
    ///
    /// The client is `Connecting` until the transport reports
    /// [`TransportEvent::Opened`]. If the transport refuses to start, the
    /// client falls back to `Disconnected` and the error is returned.
    pub fn connect(&self, token: &str) -> ChannelResult<()> {
        let request = {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Disconnected {
                return Err(ChannelError::InvalidStateTransition {
                    from: inner.state.to_string(),
                    to: ConnectionState::Connecting.to_string(),
                });
            }
            inner.token = Some(token.to_string());
            inner.epoch += 1;
            inner.attempts = 0;
            inner.state = ConnectionState::Connecting;
            self.open_request(&mut inner, token)
        };
        self.publish(ConnectionState::Connecting);
        info!(channel = %self.name, url = %request.url, session = request.session, "connecting");

        if let Err(err) = self.transport.open(&request) {
            warn!(channel = %self.name, error = %err, "open failed");
            {
                let mut inner = self.inner.lock();
                if inner.session == request.session && inner.state == ConnectionState::Connecting {
                    inner.state = ConnectionState::Disconnected;
                }
                inner.last_error = Some(err.clone());
            }
            self.publish(ConnectionState::Disconnected);
            return Err(err);
        }
        Ok(())
    }

    /// Closes the connection and cancels any scheduled reconnect.
    ///
    /// Valid in every state; calling it twice is harmless.
    pub fn disconnect(&self) {
        let was = {
            let mut inner = self.inner.lock();
            let was = inner.state;
            inner.state = ConnectionState::Disconnected;
            inner.token = None;
            inner.epoch += 1;
            inner.attempts = 0;
            was
        };
        if was != ConnectionState::Disconnected {
            self.transport.close();
            info!(channel = %self.name, "disconnected");
        }
        self.publish(ConnectionState::Disconnected);
    }

    /// Registers `handler` for messages on `topic`.
    ///
    /// Works in any state: while disconnected the topic is remembered and
    /// subscribed once the connection opens. The handler stays registered
    /// until the returned [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(self: &Arc<Self>, topic: &str, handler: F) -> Subscription
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        let (id, apply_now) = {
            let mut inner = self.inner.lock();
            let id = inner.next_handler;
            inner.next_handler += 1;
            let connected = inner.state == ConnectionState::Connected;
            let entry = inner.handlers.entry(topic.to_string()).or_default();
            let first = entry.is_empty();
            entry.push((id, Arc::new(handler)));
            (id, first && connected)
        };

        if apply_now {
            if let Err(err) = self.transport.subscribe(topic) {
                warn!(channel = %self.name, topic, error = %err, "subscribe failed");
            }
        } else {
            debug!(channel = %self.name, topic, "subscription registered");
        }

        Subscription {
            client: Arc::downgrade(self),
            topic: topic.to_string(),
            id,
            active: true,
        }
    }

    /// Registers a handler receiving JSON bodies decoded as `T`.
    ///
    /// Bodies that fail to decode are logged and dropped.
    pub fn subscribe_typed<T, F>(self: &Arc<Self>, topic: &str, handler: F) -> Subscription
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe(topic, move |message| match serde_json::from_str::<T>(&message.body) {
            Ok(value) => handler(value),
            Err(err) => {
                warn!(topic = %message.topic, error = %err, "dropping malformed push");
            }
        })
    }

    /// Publishes `body` as JSON to `destination`.
    pub fn send<B: Serialize + ?Sized>(&self, destination: &str, body: &B) -> ChannelResult<()> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        let json = serde_json::to_string(body)?;
        self.transport.send(destination, &json)
    }

    /// Applies one transport event.
    ///
    /// Events from a session other than the latest are dropped. Returns the
    /// reconnect to schedule when the connection dropped unexpectedly.
    pub fn handle_event(&self, event: SessionEvent) -> Option<Reconnect> {
        let SessionEvent { session, event } = event;
        match event {
            TransportEvent::Opened => {
                self.on_opened(session);
                None
            }
            TransportEvent::Message(message) => {
                self.dispatch(session, &message);
                None
            }
            TransportEvent::Closed { reason } => self.on_closed(session, &reason),
        }
    }

    /// Performs a scheduled reconnect.
    ///
    /// Skipped when the client was connected or disconnected explicitly
    /// since the reconnect was planned. Returns the next reconnect if the
    /// transport refused to start.
    pub fn reconnect(&self, plan: Reconnect) -> Option<Reconnect> {
        let request = {
            let mut inner = self.inner.lock();
            if inner.epoch != plan.epoch || inner.state != ConnectionState::Disconnected {
                debug!(channel = %self.name, "stale reconnect skipped");
                return None;
            }
            let Some(token) = self.auth.access_token() else {
                inner.token = None;
                inner.last_error = Some(ChannelError::NotAuthenticated);
                debug!(channel = %self.name, "signed out, reconnect abandoned");
                return None;
            };
            inner.token = Some(token.clone());
            inner.state = ConnectionState::Connecting;
            self.open_request(&mut inner, &token)
        };
        self.publish(ConnectionState::Connecting);
        info!(channel = %self.name, attempt = plan.attempt, session = request.session, "reconnecting");

        match self.transport.open(&request) {
            Ok(()) => None,
            Err(err) => self.on_closed(request.session, &err.to_string()),
        }
    }

    /// Drives the client from a stream of transport events.
    ///
    /// Sleeps and reconnects per the retry config. Returns when the event
    /// sender is dropped.
    pub async fn run(&self, mut events: EventReceiver) {
        let mut pending: Option<(Reconnect, Instant)> = None;
        loop {
            let deadline = pending.map(|(_, at)| at);
            let wake = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(plan) = self.handle_event(event) {
                            pending = Some((plan, Instant::now() + plan.delay));
                        }
                    }
                    None => break,
                },
                () = wake => {
                    if let Some((plan, _)) = pending.take() {
                        pending = self
                            .reconnect(plan)
                            .map(|next| (next, Instant::now() + next.delay));
                    }
                }
            }
        }
        debug!(channel = %self.name, "event stream ended");
    }

    fn on_opened(&self, session: u64) {
        let topics: Vec<String> = {
            let mut inner = self.inner.lock();
            if inner.session != session {
                debug!(channel = %self.name, session, current = inner.session, "stale open dropped");
                return;
            }
            if inner.state != ConnectionState::Connecting {
                debug!(channel = %self.name, state = %inner.state, "ignoring open");
                return;
            }
            inner.state = ConnectionState::Connected;
            inner.attempts = 0;
            inner.last_error = None;
            inner.handlers.keys().cloned().collect()
        };
        self.publish(ConnectionState::Connected);
        info!(channel = %self.name, topics = topics.len(), "connected");

        for topic in topics {
            if let Err(err) = self.transport.subscribe(&topic) {
                warn!(channel = %self.name, topic = %topic, error = %err, "resubscribe failed");
            }
        }
    }

    fn dispatch(&self, session: u64, message: &ChannelMessage) {
        let handlers: Vec<Handler> = {
            let mut inner = self.inner.lock();
            if inner.session != session {
                debug!(channel = %self.name, session, topic = %message.topic, "stale message dropped");
                return;
            }
            if inner.state != ConnectionState::Connected {
                debug!(channel = %self.name, topic = %message.topic, "message while not connected dropped");
                return;
            }
            if let Some(id) = &message.id {
                inner.last_event_id = Some(id.clone());
            }
            inner
                .handlers
                .get(&message.topic)
                .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            debug!(channel = %self.name, topic = %message.topic, "no handler for topic");
            return;
        }
        for handler in handlers {
            handler(message);
        }
    }

    fn on_closed(&self, session: u64, reason: &str) -> Option<Reconnect> {
        let plan = {
            let mut inner = self.inner.lock();
            if inner.session != session {
                debug!(channel = %self.name, session, current = inner.session, reason, "stale close dropped");
                return None;
            }
            if inner.state == ConnectionState::Disconnected {
                return None;
            }
            inner.state = ConnectionState::Disconnected;

            if inner.token.is_none() || !self.auth.is_authenticated() {
                inner.last_error = Some(ChannelError::NotAuthenticated);
                None
            } else {
                inner.attempts += 1;
                let attempt = inner.attempts;
                if self.config.retry.allows(attempt) {
                    inner.last_error = Some(ChannelError::transport_retryable(reason));
                    Some(Reconnect {
                        delay: self.config.retry.delay_for_attempt(attempt),
                        attempt,
                        epoch: inner.epoch,
                    })
                } else {
                    inner.last_error = Some(ChannelError::ReconnectExhausted { attempts: attempt - 1 });
                    None
                }
            }
        };
        self.publish(ConnectionState::Disconnected);

        match &plan {
            Some(plan) => warn!(
                channel = %self.name,
                reason,
                attempt = plan.attempt,
                delay_ms = plan.delay.as_millis() as u64,
                "connection lost, reconnect scheduled"
            ),
            None => warn!(channel = %self.name, reason, "connection lost"),
        }
        plan
    }

    fn remove_handler(&self, topic: &str, id: u64) {
        let release_topic = {
            let mut inner = self.inner.lock();
            let connected = inner.state == ConnectionState::Connected;
            let Some(entries) = inner.handlers.get_mut(topic) else {
                return;
            };
            entries.retain(|(handler_id, _)| *handler_id != id);
            if entries.is_empty() {
                inner.handlers.remove(topic);
                connected
            } else {
                false
            }
        };

        if release_topic {
            if let Err(err) = self.transport.unsubscribe(topic) {
                warn!(channel = %self.name, topic, error = %err, "unsubscribe failed");
            }
        }
    }

    fn open_request(&self, inner: &mut Inner, token: &str) -> OpenRequest {
        inner.session += 1;
        OpenRequest {
            url: self.config.url.clone(),
            token: token.to_string(),
            last_event_id: inner.last_event_id.clone(),
            heartbeat: self.config.heartbeat,
            session: inner.session,
        }
    }

    fn publish(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

impl fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ChannelClient")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("topics", &inner.handlers.len())
            .finish_non_exhaustive()
    }
}

/// Handle to a registered handler. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    client: Weak<ChannelClient>,
    topic: String,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Topic this handler listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Removes the handler now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keeps the handler registered for the client's lifetime.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(client) = self.client.upgrade() {
            client.remove_handler(&self.topic, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.active)
            .finish()
    }
}
