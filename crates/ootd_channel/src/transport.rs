//! Transport layer abstraction for push channels.

use crate::error::{ChannelError, ChannelResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Parameters for opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Endpoint URL.
    pub url: String,
    /// Bearer token presented on the handshake.
    pub token: String,
    /// Id of the last event received, for servers that replay missed events.
    pub last_event_id: Option<String>,
    /// Heartbeat interval to negotiate.
    pub heartbeat: Option<Duration>,
    /// Tag for every event this connection reports.
    pub session: u64,
}

/// A message delivered on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Topic (STOMP destination or SSE event name).
    pub topic: String,
    /// Raw body, JSON for every OOTD topic.
    pub body: String,
    /// Server-assigned event id, if any.
    pub id: Option<String>,
}

impl ChannelMessage {
    /// Creates a message without an id.
    pub fn new(topic: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
            id: None,
        }
    }

    /// Sets the event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Something that happened on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed.
    Opened,
    /// A message arrived.
    Message(ChannelMessage),
    /// The connection ended, cleanly or not.
    Closed {
        /// Why, for logging.
        reason: String,
    },
}

impl TransportEvent {
    /// Tags the event with the session of the connection that produced it.
    pub fn in_session(self, session: u64) -> SessionEvent {
        SessionEvent {
            session,
            event: self,
        }
    }
}

/// A [`TransportEvent`] tagged with [`OpenRequest::session`].
///
/// The client drops events whose session is not the one it opened last, so
/// a late close from a replaced connection cannot touch the new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Session of the connection that produced the event.
    pub session: u64,
    /// What happened.
    pub event: TransportEvent,
}

/// Sending half of a client's event channel.
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Receiving half of a client's event channel, consumed by
/// [`ChannelClient::run`](crate::ChannelClient::run).
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Creates an event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// A push transport handles one long-lived connection.
///
/// Calls are non-blocking requests; completion and inbound traffic are
/// reported back as [`SessionEvent`]s through the client's event channel.
/// Transports without server-side subscriptions (SSE) treat
/// `subscribe`/`unsubscribe` as no-ops.
///
/// # Ordering
///
/// For each session a transport must report [`TransportEvent::Opened`]
/// before any [`TransportEvent::Message`]. The client only dispatches while
/// connected, so a message reported ahead of `Opened` is lost.
pub trait ChannelTransport: Send + Sync {
    /// Starts opening a connection.
    ///
    /// Events for this connection carry `request.session`.
    fn open(&self, request: &OpenRequest) -> ChannelResult<()>;

    /// Closes the connection. Idempotent.
    fn close(&self);

    /// Subscribes to `topic` on the open connection.
    fn subscribe(&self, topic: &str) -> ChannelResult<()>;

    /// Unsubscribes from `topic`.
    fn unsubscribe(&self, topic: &str) -> ChannelResult<()>;

    /// Publishes `body` to `destination`.
    fn send(&self, destination: &str, body: &str) -> ChannelResult<()>;
}

/// A call recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `open`.
    Open(OpenRequest),
    /// `close`.
    Close,
    /// `subscribe`.
    Subscribe(String),
    /// `unsubscribe`.
    Unsubscribe(String),
    /// `send`.
    Send {
        /// Destination.
        destination: String,
        /// Body.
        body: String,
    },
}

/// A mock transport for testing.
#[derive(Debug, Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    fail_open: AtomicBool,
    fail_send: AtomicBool,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `open` fail with a retryable error.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Makes `send` fail with a retryable error.
    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Topics passed to `subscribe`, in order.
    pub fn subscribed(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Subscribe(topic) => Some(topic.clone()),
                _ => None,
            })
            .collect()
    }

    /// Requests passed to `open`, in order.
    pub fn opens(&self) -> Vec<OpenRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Open(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Session of the latest `open`, 0 before any.
    pub fn session(&self) -> u64 {
        self.opens().last().map_or(0, |request| request.session)
    }

    /// `Opened` for the latest session.
    pub fn opened(&self) -> SessionEvent {
        TransportEvent::Opened.in_session(self.session())
    }

    /// `Message` for the latest session.
    pub fn message(&self, message: ChannelMessage) -> SessionEvent {
        TransportEvent::Message(message).in_session(self.session())
    }

    /// `Closed` for the latest session.
    pub fn closed(&self, reason: &str) -> SessionEvent {
        TransportEvent::Closed {
            reason: reason.to_string(),
        }
        .in_session(self.session())
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }
}

impl ChannelTransport for MockTransport {
    fn open(&self, request: &OpenRequest) -> ChannelResult<()> {
        self.record(TransportCall::Open(request.clone()));
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ChannelError::transport_retryable("mock open failure"));
        }
        Ok(())
    }

    fn close(&self) {
        self.record(TransportCall::Close);
    }

    fn subscribe(&self, topic: &str) -> ChannelResult<()> {
        self.record(TransportCall::Subscribe(topic.to_string()));
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> ChannelResult<()> {
        self.record(TransportCall::Unsubscribe(topic.to_string()));
        Ok(())
    }

    fn send(&self, destination: &str, body: &str) -> ChannelResult<()> {
        self.record(TransportCall::Send {
            destination: destination.to_string(),
            body: body.to_string(),
        });
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChannelError::transport_retryable("mock send failure"));
        }
        Ok(())
    }
}
