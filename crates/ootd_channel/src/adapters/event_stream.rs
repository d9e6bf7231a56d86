//! Server-sent events over a streaming HTTP response.

use crate::error::{ChannelError, ChannelResult};
use crate::sse::SseDecoder;
use crate::transport::{ChannelTransport, EventSender, OpenRequest, TransportEvent};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Opens and cancels the streaming request behind an [`SseTransport`].
pub trait EventStreamSource: Send + Sync {
    /// Starts a `GET` on `url` with `headers`.
    ///
    /// The reader reports back through [`SseTransport::on_open`],
    /// [`SseTransport::on_chunk`] and [`SseTransport::on_close`] with
    /// `session`.
    fn open(&self, url: &str, headers: &[(String, String)], session: u64) -> ChannelResult<()>;

    /// Cancels the request. Idempotent.
    fn close(&self);
}

#[derive(Debug, Default)]
struct StreamState {
    session: u64,
    decoder: SseDecoder,
    opened: bool,
    closed: bool,
}

/// Notification transport over `text/event-stream`.
///
/// The stream has no server-side subscriptions: every event type the
/// server sends is delivered and the client filters by topic. The stream
/// is receive-only.
pub struct SseTransport<S> {
    source: S,
    events: EventSender,
    state: Mutex<StreamState>,
}

impl<S: EventStreamSource> SseTransport<S> {
    /// Creates a transport reporting to `events`.
    pub fn new(source: S, events: EventSender) -> Self {
        Self {
            source,
            events,
            state: Mutex::new(StreamState::default()),
        }
    }

    /// The I/O seam.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The response headers arrived with a success status.
    pub fn on_open(&self, session: u64) {
        let emit = {
            let mut state = self.state.lock();
            if !self.is_live(&state, session) {
                return;
            }
            !std::mem::replace(&mut state.opened, true)
        };
        if emit {
            self.emit(session, TransportEvent::Opened);
        }
    }

    /// A body chunk arrived.
    ///
    /// A stream whose first bytes arrive without a separate open
    /// notification is treated as opened.
    pub fn on_chunk(&self, session: u64, chunk: &str) {
        let (first, decoded) = {
            let mut state = self.state.lock();
            if !self.is_live(&state, session) {
                return;
            }
            let first = !std::mem::replace(&mut state.opened, true);
            (first, state.decoder.feed(chunk))
        };
        if first {
            self.emit(session, TransportEvent::Opened);
        }
        match decoded {
            Ok(events) => {
                for event in events {
                    self.emit(session, TransportEvent::Message(event.into_message()));
                }
            }
            Err(err) => {
                warn!(session, error = %err, "event stream corrupt, closing");
                self.source.close();
                self.on_close(session, &err.to_string());
            }
        }
    }

    /// The response ended or the request failed.
    pub fn on_close(&self, session: u64, reason: &str) {
        {
            let mut state = self.state.lock();
            if !self.is_live(&state, session) {
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

    fn is_live(&self, state: &StreamState, session: u64) -> bool {
        if state.session != session || state.closed {
            debug!(session, current = state.session, "event stream callback dropped");
            return false;
        }
        true
    }

    fn emit(&self, session: u64, event: TransportEvent) {
        if self.events.send(event.in_session(session)).is_err() {
            debug!(session, "event receiver gone");
        }
    }
}

impl<S: EventStreamSource> ChannelTransport for SseTransport<S> {
    fn open(&self, request: &OpenRequest) -> ChannelResult<()> {
        let last_event_id = {
            let mut state = self.state.lock();
            let carried = state
                .decoder
                .last_event_id()
                .map(str::to_string)
                .or_else(|| request.last_event_id.clone());
            *state = StreamState {
                session: request.session,
                ..StreamState::default()
            };
            carried
        };

        let mut headers = vec![
            ("Accept".to_string(), "text/event-stream".to_string()),
            ("Authorization".to_string(), format!("Bearer {}", request.token)),
        ];
        if let Some(id) = last_event_id {
            headers.push(("Last-Event-ID".to_string(), id));
        }
        self.source.open(&request.url, &headers, request.session)
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.source.close();
    }

    fn subscribe(&self, _topic: &str) -> ChannelResult<()> {
        Ok(())
    }

    fn unsubscribe(&self, _topic: &str) -> ChannelResult<()> {
        Ok(())
    }

    fn send(&self, destination: &str, _body: &str) -> ChannelResult<()> {
        Err(ChannelError::transport_fatal(format!(
            "event stream is receive-only, cannot send to {destination}"
        )))
    }
}

impl<S> std::fmt::Debug for SseTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SseTransport")
            .field("session", &state.session)
            .field("opened", &state.opened)
            .field("closed", &state.closed)
            .finish()
    }
}
