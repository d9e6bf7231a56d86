//! STOMP 1.2 frame codec.
//!
//! Only the frames a subscribing and publishing client needs are modelled.
//! Header values are escaped on every frame except `CONNECT` and
//! `CONNECTED`, which the protocol leaves raw.

use crate::error::{ChannelError, ChannelResult};
use crate::transport::ChannelMessage;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Largest frame accepted from the server.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// STOMP command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    /// Client handshake.
    Connect,
    /// Server handshake reply.
    Connected,
    /// Start receiving a destination.
    Subscribe,
    /// Stop receiving a destination.
    Unsubscribe,
    /// Publish to a destination.
    Send,
    /// Server delivery.
    Message,
    /// Server-side failure; the server closes afterwards.
    Error,
    /// Client goodbye.
    Disconnect,
    /// Server acknowledgement of a receipt request.
    Receipt,
}

impl StompCommand {
    fn as_str(self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Send => "SEND",
            StompCommand::Message => "MESSAGE",
            StompCommand::Error => "ERROR",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Receipt => "RECEIPT",
        }
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StompCommand {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" | "STOMP" => StompCommand::Connect,
            "CONNECTED" => StompCommand::Connected,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "SEND" => StompCommand::Send,
            "MESSAGE" => StompCommand::Message,
            "ERROR" => StompCommand::Error,
            "DISCONNECT" => StompCommand::Disconnect,
            "RECEIPT" => StompCommand::Receipt,
            other => return Err(ChannelError::Codec(format!("unknown STOMP command `{other}`"))),
        })
    }
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    /// Command.
    pub command: StompCommand,
    /// Headers in wire order. Repeated names keep the first occurrence.
    pub headers: Vec<(String, String)>,
    /// Body.
    pub body: String,
}

impl StompFrame {
    /// Creates a frame with no headers and an empty body.
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// `CONNECT` carrying the bearer token, as the server's auth
    /// interceptor expects.
    pub fn connect(host: &str, token: &str, heartbeat: Option<Duration>) -> Self {
        let beat = heartbeat.map_or(0, |d| d.as_millis());
        Self::new(StompCommand::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", format!("{beat},{beat}"))
            .with_header("Authorization", format!("Bearer {token}"))
    }

    /// `SUBSCRIBE` to `destination` under subscription `id`.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
    }

    /// `UNSUBSCRIBE` subscription `id`.
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).with_header("id", id)
    }

    /// `SEND` a JSON body to `destination`.
    pub fn send(destination: &str, json: &str) -> Self {
        Self::new(StompCommand::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(json)
    }

    /// `DISCONNECT`.
    pub fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }

    /// First value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// `destination` header.
    pub fn destination(&self) -> Option<&str> {
        self.header("destination")
    }

    /// Encodes the frame, NUL terminator included.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                escape_into(&mut out, name);
                out.push(':');
                escape_into(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);

        let mut bytes = out.into_bytes();
        bytes.push(0);
        bytes
    }

    /// Converts a `MESSAGE` frame into a topic message.
    pub fn into_message(self) -> ChannelResult<ChannelMessage> {
        if self.command != StompCommand::Message {
            return Err(ChannelError::Codec(format!("expected MESSAGE, got {}", self.command)));
        }
        let topic = self
            .destination()
            .ok_or_else(|| ChannelError::Codec("MESSAGE without destination".into()))?
            .to_string();
        let id = self.header("message-id").map(str::to_string);
        Ok(ChannelMessage {
            topic,
            body: self.body,
            id,
        })
    }
}

fn escape_into(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> ChannelResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChannelError::Codec(format!(
                    "invalid header escape `\\{}`",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Splits a byte stream into STOMP frames.
///
/// Heart-beat newlines between frames are skipped. A frame with a
/// `content-length` header may carry NUL bytes in its body.
#[derive(Debug, Default)]
pub struct StompDecoder {
    buf: Vec<u8>,
}

impl StompDecoder {
    /// Creates a decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes, returning every frame they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> ChannelResult<Vec<StompFrame>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        if self.buf.len() > MAX_FRAME_BYTES {
            return Err(ChannelError::Codec("STOMP frame too large".into()));
        }
        Ok(frames)
    }

    fn next_frame(&mut self) -> ChannelResult<Option<StompFrame>> {
        let skip = self
            .buf
            .iter()
            .take_while(|b| **b == b'\n' || **b == b'\r')
            .count();
        self.buf.drain(..skip);
        if self.buf.is_empty() {
            return Ok(None);
        }

        let lf = find(&self.buf, b"\n\n").map(|i| (i, i + 2));
        let crlf = find(&self.buf, b"\r\n\r\n").map(|i| (i, i + 4));
        let head_end = match (lf, crlf) {
            (Some(lf), Some(crlf)) => Some(if crlf.0 < lf.0 { crlf } else { lf }),
            (lf, crlf) => lf.or(crlf),
        };
        let Some((head_len, body_start)) = head_end else {
            return Ok(None);
        };

        let head = std::str::from_utf8(&self.buf[..head_len])
            .map_err(|_| ChannelError::Codec("STOMP headers are not UTF-8".into()))?;
        let mut lines = head.lines();
        let command: StompCommand = lines.next().unwrap_or_default().trim_end_matches('\r').parse()?;

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ChannelError::Codec(format!("malformed header `{line}`")))?;
            let (name, value) = if command.escapes_headers() {
                (unescape(name)?, unescape(value)?)
            } else {
                (name.to_string(), value.to_string())
            };
            headers.push((name, value));
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.parse::<usize>()
                    .map_err(|_| ChannelError::Codec(format!("bad content-length `{v}`")))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                if self.buf.len() < body_start + len + 1 {
                    return Ok(None);
                }
                if self.buf[body_start + len] != 0 {
                    return Err(ChannelError::Codec("frame body not NUL-terminated".into()));
                }
                body_start + len
            }
            None => match self.buf[body_start..].iter().position(|b| *b == 0) {
                Some(i) => body_start + i,
                None => return Ok(None),
            },
        };

        let body = String::from_utf8(self.buf[body_start..body_end].to_vec())
            .map_err(|_| ChannelError::Codec("STOMP body is not UTF-8".into()))?;
        self.buf.drain(..=body_end);

        Ok(Some(StompFrame { command, headers, body }))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
