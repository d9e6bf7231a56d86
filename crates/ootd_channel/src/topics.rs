//! Endpoint paths and topic names used by the OOTD push channels.

use serde::{Deserialize, Serialize};

/// Server-sent events endpoint.
pub const SSE_PATH: &str = "/api/sse";

/// STOMP-over-WebSocket endpoint.
pub const WS_PATH: &str = "/ws";

/// SSE event type carrying `NotificationDto` payloads.
pub const NOTIFICATION_EVENT: &str = "notifications";

/// Destination for outgoing direct messages.
pub const DM_SEND_DESTINATION: &str = "/pub/direct-messages_send";

/// Prefix of per-conversation subscription topics.
pub const DM_TOPIC_PREFIX: &str = "/sub/direct-messages_";

/// Conversation topic for two users.
///
/// The ids are ordered so both participants compute the same topic.
pub fn direct_message_topic(a: &str, b: &str) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{DM_TOPIC_PREFIX}{low}_{high}")
}

/// Extracts the two participant ids from a conversation topic.
pub fn parse_direct_message_topic(topic: &str) -> Option<(&str, &str)> {
    let key = topic.strip_prefix(DM_TOPIC_PREFIX)?;
    let (low, high) = key.split_once('_')?;
    if low.is_empty() || high.is_empty() || high.contains('_') {
        return None;
    }
    Some((low, high))
}

/// Body published to [`DM_SEND_DESTINATION`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageSend {
    /// Must be the authenticated user.
    pub sender_id: String,
    /// Other participant.
    pub receiver_id: String,
    /// Message text.
    pub content: String,
}
