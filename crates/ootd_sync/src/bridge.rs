//! Routes pushed entities into paginated stores.
//!
//! A push enters a store through the same `add` a local mutation uses, so
//! an entity that also arrives on a page is merged by id rather than shown
//! twice.

use ootd_channel::topics::NOTIFICATION_EVENT;
use ootd_channel::{direct_message_topic, ChannelClient, Subscription};
use ootd_protocol::dto::{DirectMessageDto, NotificationDto};
use ootd_protocol::Entity;
use ootd_store::PaginatedStore;
use std::sync::Arc;
use tracing::debug;

/// Adds every entity pushed on `topic` to `store`.
///
/// Bodies that do not decode as `T` are logged and dropped. Routing stops
/// when the returned subscription is dropped.
pub fn route_to_store<T: Entity>(
    client: &Arc<ChannelClient>,
    topic: &str,
    store: Arc<PaginatedStore<T>>,
) -> Subscription {
    debug!(channel = client.name(), topic, store = store.name(), "routing pushes");
    client.subscribe_typed(topic, move |entity: T| {
        debug!(store = store.name(), id = entity.id(), "push received");
        store.add(entity);
    })
}

/// Routes server-sent notifications into `store`.
pub fn route_notifications(
    client: &Arc<ChannelClient>,
    store: Arc<PaginatedStore<NotificationDto>>,
) -> Subscription {
    route_to_store(client, NOTIFICATION_EVENT, store)
}

/// Routes the conversation between `me` and `other` into `store`.
pub fn route_direct_messages(
    client: &Arc<ChannelClient>,
    me: &str,
    other: &str,
    store: Arc<PaginatedStore<DirectMessageDto>>,
) -> Subscription {
    route_to_store(client, &direct_message_topic(me, other), store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ootd_channel::{ChannelConfig, ChannelMessage, MockTransport};
    use ootd_protocol::dto::{NotificationLevel, UserSummary};
    use ootd_protocol::StaticAuth;
    use ootd_store::{MockPageFetcher, StoreConfig};
    use serde_json::json;

    fn connected(url: &str) -> (Arc<ChannelClient>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let client = ChannelClient::new(
            url,
            ChannelConfig::new(url),
            transport.clone(),
            Arc::new(StaticAuth::signed_in("tok")),
        );
        client.connect("tok").unwrap();
        client.handle_event(transport.opened());
        (client, transport)
    }

    fn notification(id: &str) -> NotificationDto {
        NotificationDto {
            id: id.into(),
            created_at: "2026-10-18T09:00:00Z".into(),
            receiver_id: "me".into(),
            title: "New follower".into(),
            content: "someone followed you".into(),
            level: NotificationLevel::Info,
        }
    }

    fn push<T: serde::Serialize>(
        client: &ChannelClient,
        transport: &MockTransport,
        topic: &str,
        body: &T,
    ) {
        let body = serde_json::to_string(body).unwrap();
        client.handle_event(transport.message(ChannelMessage::new(topic, body)));
    }

    #[test]
    fn notifications_land_at_front() {
        let (client, transport) = connected("/api/sse");
        let store = Arc::new(PaginatedStore::new(
            "notifications",
            Arc::new(MockPageFetcher::<NotificationDto>::new()),
            StoreConfig::default(),
        ));
        let _route = route_notifications(&client, store.clone());
        assert_eq!(transport.subscribed(), [NOTIFICATION_EVENT]);

        push(&client, &transport, NOTIFICATION_EVENT, &notification("n1"));
        push(&client, &transport, NOTIFICATION_EVENT, &notification("n2"));
        push(&client, &transport, NOTIFICATION_EVENT, &notification("n1"));
        assert_eq!(store.ids(), ["n2", "n1"]);
        assert_eq!(store.total_count(), 2);
    }

    #[test]
    fn malformed_push_is_dropped() {
        let (client, transport) = connected("/api/sse");
        let store = Arc::new(PaginatedStore::new(
            "notifications",
            Arc::new(MockPageFetcher::<NotificationDto>::new()),
            StoreConfig::default(),
        ));
        let _route = route_notifications(&client, store.clone());
        push(&client, &transport, NOTIFICATION_EVENT, &json!({"id": "n1"}));
        assert!(store.is_empty());
    }

    #[test]
    fn direct_messages_use_conversation_topic() {
        let (client, transport) = connected("/ws");
        let store = Arc::new(PaginatedStore::new(
            "dm",
            Arc::new(MockPageFetcher::<DirectMessageDto>::new()),
            StoreConfig::default(),
        ));
        let route = route_direct_messages(&client, "u2", "u1", store.clone());
        assert_eq!(route.topic(), "/sub/direct-messages_u1_u2");
        assert_eq!(transport.subscribed(), ["/sub/direct-messages_u1_u2"]);

        let user = |id: &str| UserSummary {
            user_id: id.into(),
            name: id.to_uppercase(),
            profile_image_url: None,
        };
        let message = DirectMessageDto {
            id: "m1".into(),
            created_at: "2026-10-18T09:00:00Z".into(),
            sender: user("u1"),
            receiver: user("u2"),
            content: "hi".into(),
        };
        push(&client, &transport, route.topic(), &message);
        assert_eq!(store.get("m1"), Some(message.clone()));

        drop(route);
        push(&client, &transport, "/sub/direct-messages_u1_u2", &DirectMessageDto { id: "m2".into(), ..message });
        assert_eq!(store.len(), 1);
    }
}
