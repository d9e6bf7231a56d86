//! Transports built on the wire codecs.
//!
//! Each adapter owns the protocol half of a connection: it turns client
//! calls into bytes for an I/O seam and decodes what the seam reads into
//! [`SessionEvent`](crate::transport::SessionEvent)s. The seam itself
//! (an HTTP body reader, a WebSocket) stays outside this crate.
//!
//! The I/O side is told the session on `open` and passes it back with
//! every callback, so bytes from a socket that was already replaced never
//! reach the decoder of its successor.

mod event_stream;
mod stomp_socket;

pub use event_stream::{EventStreamSource, SseTransport};
pub use stomp_socket::{FrameSink, StompTransport};

/// Host part of `url`, for the STOMP `host` header.
pub(crate) fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?', '#']).next().unwrap_or(rest)
}
