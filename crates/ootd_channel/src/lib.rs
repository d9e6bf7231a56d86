//! # OOTD Channel
//!
//! Authenticated push channels for the OOTD client.
//!
//! This crate provides:
//! - `ChannelClient`, a connection state machine with topic fan-out,
//!   subscription replay and exponential-backoff reconnects
//! - The `ChannelTransport` seam plus a recording `MockTransport`
//! - Wire decoders for server-sent events and STOMP frames, and the
//!   `SseTransport`/`StompTransport` adapters that drive them
//! - `ChannelHub`, which ties both channels to the auth session
//!
//! ## Connection States
//!
//! ```text
//! Disconnected --connect--> Connecting --opened--> Connected
//!      ^                        |                      |
//!      +------- closed ---------+------- closed -------+
//! ```
//!
//! A close that the client did not request schedules a reconnect while a
//! session exists. `disconnect` cancels any pending reconnect.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapters;
mod client;
mod config;
mod error;
mod hub;
pub mod sse;
pub mod stomp;
pub mod topics;
mod transport;

pub use adapters::{EventStreamSource, FrameSink, SseTransport, StompTransport};
pub use client::{ChannelClient, ConnectionState, Reconnect, Subscription};
pub use config::{ChannelConfig, RetryConfig};
pub use error::{ChannelError, ChannelResult};
pub use hub::ChannelHub;
pub use sse::{SseDecoder, SseEvent};
pub use stomp::{StompCommand, StompDecoder, StompFrame};
pub use topics::{direct_message_topic, parse_direct_message_topic, DirectMessageSend};
pub use transport::{
    event_channel, ChannelMessage, ChannelTransport, EventReceiver, EventSender, MockTransport,
    OpenRequest, SessionEvent, TransportCall, TransportEvent,
};
