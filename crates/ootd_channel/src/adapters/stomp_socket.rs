//! STOMP over a WebSocket-like byte pipe.

use super::host_of;
use crate::error::{ChannelError, ChannelResult};
use crate::stomp::{StompCommand, StompDecoder, StompFrame};
use crate::transport::{ChannelTransport, EventSender, OpenRequest, TransportEvent};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// The socket under a [`StompTransport`].
pub trait FrameSink: Send + Sync {
    /// Starts connecting to `url`.
    ///
    /// The socket reports back through [`StompTransport::on_socket_open`],
    /// [`StompTransport::on_bytes`] and [`StompTransport::on_socket_closed`]
    /// with `session`.
    fn open(&self, url: &str, session: u64) -> ChannelResult<()>;

    /// Writes one encoded frame.
    fn write(&self, frame: &[u8]) -> ChannelResult<()>;

    /// Closes the socket. Idempotent.
    fn close(&self);
}

#[derive(Debug, Default)]
struct SocketState {
    session: u64,
    decoder: StompDecoder,
    connect: Option<StompFrame>,
    subscriptions: BTreeMap<String, String>,
    next_id: u64,
    closed: bool,
}

/// Direct message transport speaking STOMP 1.2.
///
/// `CONNECT` is written once the socket opens; the channel counts as open
/// when the server answers `CONNECTED`. Subscription ids are per socket.
pub struct StompTransport<S> {
    sink: S,
    events: EventSender,
    state: Mutex<SocketState>,
}

impl<S: FrameSink> StompTransport<S> {
    /// Creates a transport reporting to `events`.
    pub fn new(sink: S, events: EventSender) -> Self {
        Self {
            sink,
            events,
            state: Mutex::new(SocketState::default()),
        }
    }

    /// The I/O seam.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Subscription id for `topic` on the current socket.
    pub fn subscription_id(&self, topic: &str) -> Option<String> {
        self.state.lock().subscriptions.get(topic).cloned()
    }

    /// The socket finished its handshake.
    pub fn on_socket_open(&self, session: u64) {
        let connect = {
            let mut state = self.state.lock();
            if !is_live(&state, session) {
                return;
            }
            state.connect.take()
        };
        let Some(connect) = connect else {
            debug!(session, "socket opened twice");
            return;
        };
        if let Err(err) = self.sink.write(&connect.encode()) {
            self.fail(session, &err.to_string());
        }
    }

    /// Bytes arrived on the socket.
    pub fn on_bytes(&self, session: u64, bytes: &[u8]) {
        let decoded = {
            let mut state = self.state.lock();
            if !is_live(&state, session) {
                return;
            }
            state.decoder.feed(bytes)
        };
        let frames = match decoded {
            Ok(frames) => frames,
            Err(err) => {
                warn!(session, error = %err, "undecodable frame, closing");
                self.fail(session, &err.to_string());
                return;
            }
        };

        for frame in frames {
            match frame.command {
                StompCommand::Connected => self.emit(session, TransportEvent::Opened),
                StompCommand::Message => match frame.into_message() {
                    Ok(message) => self.emit(session, TransportEvent::Message(message)),
                    Err(err) => warn!(session, error = %err, "message dropped"),
                },
                StompCommand::Error => {
                    let reason = frame
                        .header("message")
                        .map_or_else(|| frame.body.clone(), str::to_string);
                    warn!(session, reason = %reason, "server error frame");
                    self.fail(session, &reason);
                    return;
                }
                other => debug!(session, command = %other, "frame ignored"),
            }
        }
    }

    /// The socket closed.
    pub fn on_socket_closed(&self, session: u64, reason: &str) {
        {
            let mut state = self.state.lock();
            if !is_live(&state, session) {
                return;
            }
            state.closed = true;
        }
        self.emit(
            session,
            TransportEvent::Closed {
                reason: reason.to_string(),
            },
        );
    }

    fn fail(&self, session: u64, reason: &str) {
        self.sink.close();
        self.on_socket_closed(session, reason);
    }

    fn write(&self, frame: &StompFrame) -> ChannelResult<()> {
        if self.state.lock().closed {
            return Err(ChannelError::NotConnected);
        }
        self.sink.write(&frame.encode())
    }

    fn emit(&self, session: u64, event: TransportEvent) {
        if self.events.send(event.in_session(session)).is_err() {
            debug!(session, "event receiver gone");
        }
    }
}

fn is_live(state: &SocketState, session: u64) -> bool {
    if state.session != session || state.closed {
        debug!(session, current = state.session, "socket callback dropped");
        return false;
    }
    true
}

impl<S: FrameSink> ChannelTransport for StompTransport<S> {
    fn open(&self, request: &OpenRequest) -> ChannelResult<()> {
        {
            let mut state = self.state.lock();
            *state = SocketState {
                session: request.session,
                connect: Some(StompFrame::connect(
                    host_of(&request.url),
                    &request.token,
                    request.heartbeat,
                )),
                ..SocketState::default()
            };
        }
        self.sink.open(&request.url, request.session)
    }

    fn close(&self) {
        let was_open = {
            let mut state = self.state.lock();
            let was_open = !state.closed && state.connect.is_none();
            state.closed = true;
            was_open
        };
        if was_open {
            if let Err(err) = self.sink.write(&StompFrame::disconnect().encode()) {
                debug!(error = %err, "DISCONNECT not written");
            }
        }
        self.sink.close();
    }

    fn subscribe(&self, topic: &str) -> ChannelResult<()> {
        let frame = {
            let mut state = self.state.lock();
            if state.subscriptions.contains_key(topic) {
                return Ok(());
            }
            let id = format!("sub-{}", state.next_id);
            state.next_id += 1;
            state.subscriptions.insert(topic.to_string(), id.clone());
            StompFrame::subscribe(&id, topic)
        };
        self.write(&frame)
    }

    fn unsubscribe(&self, topic: &str) -> ChannelResult<()> {
        let Some(id) = self.state.lock().subscriptions.remove(topic) else {
            return Ok(());
        };
        self.write(&StompFrame::unsubscribe(&id))
    }

    fn send(&self, destination: &str, body: &str) -> ChannelResult<()> {
        self.write(&StompFrame::send(destination, body))
    }
}

impl<S> std::fmt::Debug for StompTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StompTransport")
            .field("session", &state.session)
            .field("subscriptions", &state.subscriptions.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChannelClient, ConnectionState};
    use crate::config::{ChannelConfig, RetryConfig};
    use crate::topics::{direct_message_topic, DirectMessageSend, DM_SEND_DESTINATION};
    use crate::transport::{event_channel, EventReceiver};
    use crate::ChannelHub;
    use ootd_protocol::StaticAuth;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingSink {
        opens: Mutex<Vec<(String, u64)>>,
        written: Mutex<Vec<u8>>,
        closes: Mutex<usize>,
    }

    impl FrameSink for RecordingSink {
        fn open(&self, url: &str, session: u64) -> ChannelResult<()> {
            self.opens.lock().push((url.to_string(), session));
            Ok(())
        }

        fn write(&self, frame: &[u8]) -> ChannelResult<()> {
            self.written.lock().extend_from_slice(frame);
            Ok(())
        }

        fn close(&self) {
            *self.closes.lock() += 1;
        }
    }

    impl RecordingSink {
        fn session(&self) -> u64 {
            self.opens.lock().last().map_or(0, |open| open.1)
        }

        /// Frames written since the last call.
        fn frames(&self) -> Vec<StompFrame> {
            let bytes = std::mem::take(&mut *self.written.lock());
            StompDecoder::new().feed(&bytes).unwrap()
        }
    }

    struct Fixture {
        client: Arc<ChannelClient>,
        transport: Arc<StompTransport<RecordingSink>>,
        events: EventReceiver,
    }

    impl Fixture {
        fn new() -> Self {
            let (tx, events) = event_channel();
            let transport = Arc::new(StompTransport::new(RecordingSink::default(), tx));
            let config = ChannelConfig::new("wss://api.ootd.test/ws")
                .with_heartbeat(Duration::from_secs(10))
                .with_retry(RetryConfig::limited(3).without_jitter());
            let client = ChannelClient::new(
                "messages",
                config,
                transport.clone(),
                Arc::new(StaticAuth::signed_in("tok-1")),
            );
            Self {
                client,
                transport,
                events,
            }
        }

        fn pump(&mut self) -> Vec<crate::client::Reconnect> {
            let mut plans = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                plans.extend(self.client.handle_event(event));
            }
            plans
        }

        fn session(&self) -> u64 {
            self.transport.sink().session()
        }

        fn handshake(&mut self) {
            let session = self.session();
            self.transport.on_socket_open(session);
            self.transport
                .on_bytes(session, b"CONNECTED\nversion:1.2\nheart-beat:10000,10000\n\n\0");
            self.pump();
        }
    }

    fn message(destination: &str, id: &str, body: &str) -> Vec<u8> {
        StompFrame::new(StompCommand::Message)
            .with_header("destination", destination)
            .with_header("message-id", id)
            .with_header("subscription", "sub-0")
            .with_body(body)
            .encode()
    }

    #[test]
    fn handshake_then_replayed_subscription() {
        let mut f = Fixture::new();
        let topic = direct_message_topic("u1", "u2");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = f.client.subscribe(&topic, move |m| sink.lock().push(m.body.clone()));

        f.client.connect("tok-1").unwrap();
        assert_eq!(f.transport.sink().opens.lock()[0].0, "wss://api.ootd.test/ws");
        assert!(f.transport.sink().frames().is_empty());

        f.transport.on_socket_open(f.session());
        let connect = f.transport.sink().frames();
        assert_eq!(connect.len(), 1);
        assert_eq!(connect[0].command, StompCommand::Connect);
        assert_eq!(connect[0].header("host"), Some("api.ootd.test"));
        assert_eq!(connect[0].header("Authorization"), Some("Bearer tok-1"));
        assert_eq!(connect[0].header("heart-beat"), Some("10000,10000"));
        assert_eq!(f.client.state(), ConnectionState::Connecting);

        f.transport
            .on_bytes(f.session(), b"CONNECTED\nversion:1.2\n\n\0");
        f.pump();
        assert!(f.client.is_connected());
        let subscribe = f.transport.sink().frames();
        assert_eq!(subscribe.len(), 1);
        assert_eq!(subscribe[0].command, StompCommand::Subscribe);
        assert_eq!(subscribe[0].destination(), Some(topic.as_str()));
        assert_eq!(subscribe[0].header("id"), Some("sub-0"));

        // Split across reads, with a heart-beat newline in front.
        let mut bytes = b"\n".to_vec();
        bytes.extend(message(&topic, "m-1", r#"{"id":"m1"}"#));
        let (head, tail) = bytes.split_at(9);
        f.transport.on_bytes(f.session(), head);
        f.transport.on_bytes(f.session(), tail);
        f.pump();
        assert_eq!(*seen.lock(), vec![r#"{"id":"m1"}"#.to_string()]);
        assert_eq!(f.client.last_event_id().as_deref(), Some("m-1"));
    }

    #[test]
    fn unsubscribe_and_send_write_frames() {
        let mut f = Fixture::new();
        f.client.connect("tok-1").unwrap();
        f.handshake();
        f.transport.sink().frames();

        let sub = f.client.subscribe("/sub/direct-messages_a_b", |_| {});
        let id = f.transport.subscription_id("/sub/direct-messages_a_b").unwrap();
        drop(sub);
        let frames = f.transport.sink().frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].command, StompCommand::Unsubscribe);
        assert_eq!(frames[1].header("id"), Some(id.as_str()));

        let hub = ChannelHub::new(f.client.clone(), f.client.clone());
        hub.send_direct_message(&DirectMessageSend {
            sender_id: "a".into(),
            receiver_id: "b".into(),
            content: "hi: there".into(),
        })
        .unwrap();
        let frames = f.transport.sink().frames();
        assert_eq!(frames[0].command, StompCommand::Send);
        assert_eq!(frames[0].destination(), Some(DM_SEND_DESTINATION));
        assert!(frames[0].body.contains("hi: there"));
    }

    #[test]
    fn error_frame_closes_and_schedules_reconnect() {
        let mut f = Fixture::new();
        f.client.connect("tok-1").unwrap();
        f.handshake();

        f.transport.on_bytes(
            f.session(),
            &StompFrame::new(StompCommand::Error)
                .with_header("message", "token expired")
                .encode(),
        );
        let plans = f.pump();
        assert_eq!(plans.len(), 1);
        assert_eq!(*f.transport.sink().closes.lock(), 1);
        assert_eq!(f.client.state(), ConnectionState::Disconnected);
        assert_eq!(
            f.client.last_error(),
            Some(ChannelError::transport_retryable("token expired"))
        );

        assert!(f.client.reconnect(plans[0]).is_none());
        assert_eq!(f.transport.sink().opens.lock().len(), 2);
        assert!(f.transport.subscription_id("anything").is_none());
    }

    #[test]
    fn old_socket_cannot_reach_new_one() {
        let mut f = Fixture::new();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let _sub = f.client.subscribe("/sub/direct-messages_a_b", move |_| *sink.lock() += 1);
        f.client.connect("tok-1").unwrap();
        f.handshake();
        let old = f.session();

        f.client.disconnect();
        let frames = f.transport.sink().frames();
        assert_eq!(frames.last().map(|frame| frame.command), Some(StompCommand::Disconnect));

        f.client.connect("tok-1").unwrap();
        f.transport
            .on_bytes(old, &message("/sub/direct-messages_a_b", "m-9", "{}"));
        f.transport.on_socket_closed(old, "closed by client");
        assert!(f.pump().is_empty());
        assert_eq!(f.client.state(), ConnectionState::Connecting);

        f.handshake();
        assert!(f.client.is_connected());
        assert_eq!(*seen.lock(), 0);
    }

    #[test]
    fn write_after_close_is_refused() {
        let f = Fixture::new();
        f.client.connect("tok-1").unwrap();
        f.transport.on_socket_closed(f.session(), "reset");
        assert_eq!(f.transport.send("/pub/x", "{}"), Err(ChannelError::NotConnected));
    }
}
