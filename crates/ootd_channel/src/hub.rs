//! The pair of push channels owned by a signed-in session.

use crate::client::{ChannelClient, ConnectionState};
use crate::error::{ChannelError, ChannelResult};
use crate::topics::{DirectMessageSend, DM_SEND_DESTINATION};
use ootd_protocol::AuthProvider;
use std::sync::Arc;
use tracing::{debug, warn};

/// Holds one client per channel type and keeps both in step with auth.
///
/// Connections exist only while a session does: `sync_auth` is called on
/// every sign-in, token refresh and sign-out.
#[derive(Debug, Clone)]
pub struct ChannelHub {
    notifications: Arc<ChannelClient>,
    messages: Arc<ChannelClient>,
}

impl ChannelHub {
    /// Creates a hub over the SSE notification client and the STOMP
    /// message client.
    pub fn new(notifications: Arc<ChannelClient>, messages: Arc<ChannelClient>) -> Self {
        Self {
            notifications,
            messages,
        }
    }

    /// Notification channel.
    pub fn notifications(&self) -> &Arc<ChannelClient> {
        &self.notifications
    }

    /// Direct message channel.
    pub fn messages(&self) -> &Arc<ChannelClient> {
        &self.messages
    }

    /// Connects idle channels when signed in; disconnects both when not.
    ///
    /// Both channels are attempted even if one fails; the first error is
    /// returned.
    pub fn sync_auth(&self, auth: &dyn AuthProvider) -> ChannelResult<()> {
        let Some(token) = auth.access_token() else {
            debug!("signed out, closing channels");
            self.notifications.disconnect();
            self.messages.disconnect();
            return Ok(());
        };

        let mut first_error = None;
        for client in [&self.notifications, &self.messages] {
            if client.state() != ConnectionState::Disconnected {
                continue;
            }
            if let Err(err) = client.connect(&token) {
                warn!(channel = client.name(), error = %err, "connect failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Sends a direct message over the message channel.
    pub fn send_direct_message(&self, message: &DirectMessageSend) -> ChannelResult<()> {
        if !self.messages.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        self.messages.send(DM_SEND_DESTINATION, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::transport::{MockTransport, TransportCall};
    use ootd_protocol::StaticAuth;

    struct Fixture {
        hub: ChannelHub,
        sse: Arc<MockTransport>,
        ws: Arc<MockTransport>,
        auth: Arc<StaticAuth>,
    }

    fn fixture() -> Fixture {
        let auth = Arc::new(StaticAuth::signed_out());
        let sse = Arc::new(MockTransport::new());
        let ws = Arc::new(MockTransport::new());
        let hub = ChannelHub::new(
            ChannelClient::new("notifications", ChannelConfig::new("/api/sse"), sse.clone(), auth.clone()),
            ChannelClient::new("messages", ChannelConfig::new("/ws"), ws.clone(), auth.clone()),
        );
        Fixture { hub, sse, ws, auth }
    }

    #[test]
    fn connects_only_when_signed_in() {
        let f = fixture();
        f.hub.sync_auth(f.auth.as_ref()).unwrap();
        assert!(f.sse.opens().is_empty());

        f.auth.set_token("tok");
        f.hub.sync_auth(f.auth.as_ref()).unwrap();
        assert_eq!(f.sse.opens()[0].token, "tok");
        assert_eq!(f.ws.opens()[0].url, "/ws");

        // Idempotent while connecting.
        f.hub.sync_auth(f.auth.as_ref()).unwrap();
        assert_eq!(f.ws.opens().len(), 1);
    }

    #[test]
    fn sign_out_disconnects_both() {
        let f = fixture();
        f.auth.set_token("tok");
        f.hub.sync_auth(f.auth.as_ref()).unwrap();
        f.hub.notifications().handle_event(f.sse.opened());

        f.auth.sign_out();
        f.hub.sync_auth(f.auth.as_ref()).unwrap();
        assert_eq!(f.hub.notifications().state(), ConnectionState::Disconnected);
        assert_eq!(f.hub.messages().state(), ConnectionState::Disconnected);
        assert!(f.sse.calls().contains(&TransportCall::Close));
    }

    #[test]
    fn close_from_previous_sign_in_is_ignored() {
        let f = fixture();
        f.auth.set_token("tok-a");
        f.hub.sync_auth(f.auth.as_ref()).unwrap();
        let notifications = f.hub.notifications();
        notifications.handle_event(f.sse.opened());
        let late_close = f.sse.closed("closed by client");

        f.auth.sign_out();
        f.hub.sync_auth(f.auth.as_ref()).unwrap();
        f.auth.set_token("tok-b");
        f.hub.sync_auth(f.auth.as_ref()).unwrap();
        assert_eq!(f.sse.opens()[1].token, "tok-b");

        assert!(notifications.handle_event(late_close).is_none());
        assert_eq!(notifications.state(), ConnectionState::Connecting);
        notifications.handle_event(f.sse.opened());
        assert!(notifications.is_connected());
    }

    #[test]
    fn one_failure_does_not_block_the_other() {
        let f = fixture();
        f.auth.set_token("tok");
        f.sse.set_fail_open(true);
        assert!(f.hub.sync_auth(f.auth.as_ref()).is_err());
        assert_eq!(f.hub.messages().state(), ConnectionState::Connecting);
    }

    #[test]
    fn direct_message_send() {
        let f = fixture();
        let message = DirectMessageSend {
            sender_id: "u1".into(),
            receiver_id: "u2".into(),
            content: "hello".into(),
        };
        assert_eq!(f.hub.send_direct_message(&message), Err(ChannelError::NotConnected));

        f.auth.set_token("tok");
        f.hub.sync_auth(f.auth.as_ref()).unwrap();
        f.hub.messages().handle_event(f.ws.opened());
        f.hub.send_direct_message(&message).unwrap();
        assert!(f.ws.calls().iter().any(|call| matches!(
            call,
            TransportCall::Send { destination, .. } if destination == DM_SEND_DESTINATION
        )));
    }
}
