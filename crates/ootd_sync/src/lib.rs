//! # OOTD Sync
//!
//! Client-side synchronization layer for the OOTD service.
//!
//! Remote collections are mirrored into local stores (`ootd_store`), kept
//! fresh by cursor pagination over HTTP and by push events from two
//! authenticated channels (`ootd_channel`). The [`bridge`] module connects
//! the two: a pushed entity enters its store through the same dedup-by-id
//! merge that page responses use.
//!
//! ## Example
//!
//! ```rust,ignore
//! let registry = StoreRegistry::default();
//! let notifications = registry.paginated("notifications", fetcher)?;
//! let _route = bridge::route_notifications(hub.notifications(), notifications.clone());
//! hub.sync_auth(auth.as_ref())?;
//! notifications.fetch().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;

pub use bridge::{route_direct_messages, route_notifications, route_to_store};
pub use ootd_channel as channel;
pub use ootd_protocol as protocol;
pub use ootd_store as store;

pub use ootd_channel::{ChannelClient, ChannelHub, ConnectionState, Subscription};
pub use ootd_protocol::{AuthProvider, CursorResponse, Entity, Params};
pub use ootd_store::{
    BaseStore, ListStore, PaginatedStore, ScrollConfig, ScrollTrigger, StoreConfig, StoreRegistry,
};
