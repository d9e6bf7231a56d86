//! Incremental `text/event-stream` decoder.

use crate::error::{ChannelError, ChannelResult};
use crate::transport::ChannelMessage;
use std::time::Duration;

/// Event type used when a block carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// Longest line accepted before the stream is considered corrupt.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream, if any.
    pub id: Option<String>,
    /// Reconnection time requested by the server.
    pub retry: Option<Duration>,
}

impl SseEvent {
    /// Converts the event into a message on the topic named by its type.
    pub fn into_message(self) -> ChannelMessage {
        ChannelMessage {
            topic: self.event,
            body: self.data,
            id: self.id,
        }
    }
}

/// Decodes a server-sent event stream fed in arbitrary chunks.
///
/// Lines may end in `\n`, `\r\n` or `\r`, and a line ending may be split
/// across chunks. Blocks without data are discarded. The last event id
/// persists across events until the server replaces it.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: String,
    after_cr: bool,
    event: Option<String>,
    data: Option<String>,
    last_id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    /// Creates a decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last event id received.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    /// Feeds a chunk, returning every event it completes.
    pub fn feed(&mut self, chunk: &str) -> ChannelResult<Vec<SseEvent>> {
        let mut events = Vec::new();
        for ch in chunk.chars() {
            match ch {
                '\n' if self.after_cr => self.after_cr = false,
                '\n' => self.end_line(&mut events),
                '\r' => {
                    self.after_cr = true;
                    self.end_line(&mut events);
                }
                _ => {
                    self.after_cr = false;
                    if self.line.len() >= MAX_LINE_BYTES {
                        return Err(ChannelError::Codec("event-stream line too long".into()));
                    }
                    self.line.push(ch);
                }
            }
        }
        Ok(events)
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        let line = std::mem::take(&mut self.line);
        if line.is_empty() {
            if let Some(event) = self.dispatch() {
                events.push(event);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.retry = Some(Duration::from_millis(ms));
                    }
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let retry = self.retry.take();
        let data = self.data.take()?;
        Some(SseEvent {
            event: event.filter(|e| !e.is_empty()).unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.last_id.clone(),
            retry,
        })
    }
}
