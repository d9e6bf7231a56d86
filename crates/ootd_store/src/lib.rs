//! # OOTD Store
//!
//! Client-side stores that keep local copies of remote collections.
//!
//! This crate provides:
//! - `EntityCollection`, the dedup-by-id kernel every store mutates
//! - `RequestCoordinator`, single-flight and generation tagging per store
//! - `BaseStore` (one resource), `ListStore` (eager reload) and
//!   `PaginatedStore` (cursor pagination)
//! - `StoreRegistry` for injecting shared store instances
//! - Fetcher traits, a REST `ApiClient` over an abstract `HttpClient`
//! - `ScrollTrigger`, the edge-triggered infinite-scroll sentinel
//!
//! ## Key Invariants
//!
//! - A collection never holds two entities with the same id
//! - Re-inserting a known id updates it in place, never moves it
//! - At most one request is in flight per store
//! - A params change yields exactly one page-1 fetch; responses issued
//!   under older params are dropped
//! - A failed fetch never modifies data

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod base;
mod collection;
mod config;
mod coordinator;
mod error;
mod fetch;
mod http;
mod list;
mod paginated;
mod registry;
pub mod scroll;

pub use base::BaseStore;
pub use collection::EntityCollection;
pub use config::StoreConfig;
pub use coordinator::{Completion, RequestCoordinator, Ticket};
pub use error::{NetworkError, StoreError, StoreResult};
pub use fetch::{
    BoxFuture, ListFetcher, MockFetcher, MockListFetcher, MockOneFetcher, MockPageFetcher,
    OneFetcher, PageFetcher,
};
pub use http::{
    ApiClient, HttpClient, HttpRequest, HttpResponse, RestListFetcher, RestOneFetcher,
    RestPageFetcher,
};
pub use list::ListStore;
pub use paginated::PaginatedStore;
pub use registry::{RegisteredStore, StoreRegistry};
pub use scroll::{ScrollConfig, ScrollTrigger, SentinelId, SentinelRect, Viewport};
