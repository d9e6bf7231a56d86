//! Cursor-paginated, append-growing store.

use crate::collection::EntityCollection;
use crate::config::StoreConfig;
use crate::coordinator::{AbandonGuard, RequestCoordinator, Ticket};
use crate::error::{StoreError, StoreResult};
use crate::fetch::{with_timeout, PageFetcher};
use ootd_protocol::{CursorState, Entity, PageQuery, Params, Patch};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

struct PageState<T: Entity> {
    data: EntityCollection<T>,
    cursor: CursorState,
    coordinator: RequestCoordinator,
}

/// A cursor-paginated collection (feeds, clothes, users, comments,
/// notifications, direct messages, follow edges).
///
/// `fetch` loads page 1 and replaces the data; `fetch_more` appends the next
/// page. Local `add`/`update`/`delete` apply results of mutations issued
/// elsewhere, and channel pushes enter through `add`.
///
/// Server page order is authoritative, except that `add` always places a
/// new entity at index 0 until the next full `fetch`.
pub struct PaginatedStore<T: Entity> {
    name: String,
    config: StoreConfig,
    fetcher: Arc<dyn PageFetcher<T>>,
    state: Mutex<PageState<T>>,
    changes: watch::Sender<u64>,
}

impl<T: Entity> PaginatedStore<T> {
    /// Creates an empty store with default params.
    ///
    /// `config.page_limit`, if set, becomes the initial `limit`.
    pub fn new(name: impl Into<String>, fetcher: Arc<dyn PageFetcher<T>>, config: StoreConfig) -> Self {
        let mut params = Params::new();
        if let Some(limit) = config.page_limit {
            params = params.with("limit", limit);
        }
        let (changes, _) = watch::channel(0);
        Self {
            name: name.into(),
            config,
            fetcher,
            state: Mutex::new(PageState {
                data: EntityCollection::new(),
                cursor: CursorState::default(),
                coordinator: RequestCoordinator::new(params),
            }),
            changes,
        }
    }

    /// Merges initial params, validating them.
    pub fn with_params(self, params: Params) -> StoreResult<Self> {
        {
            let mut state = self.state.lock();
            let merged = state.coordinator.params().merged(&params);
            merged.validate()?;
            state.coordinator = RequestCoordinator::new(merged);
        }
        Ok(self)
    }

    /// Store name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the entities in order.
    pub fn data(&self) -> Vec<T> {
        self.state.lock().data.as_slice().to_vec()
    }

    /// Ids in order.
    pub fn ids(&self) -> Vec<String> {
        self.state.lock().data.ids()
    }

    /// Returns the entity with `id`.
    pub fn get(&self, id: &str) -> Option<T> {
        self.state.lock().data.get(id).cloned()
    }

    /// Number of loaded entities.
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Returns true if nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.state.lock().data.is_empty()
    }

    /// Current params.
    pub fn params(&self) -> Params {
        self.state.lock().coordinator.params().clone()
    }

    /// True while a request is in flight.
    pub fn is_loading(&self) -> bool {
        self.state.lock().coordinator.is_loading()
    }

    /// Error from the last applied response.
    pub fn error(&self) -> Option<StoreError> {
        self.state.lock().coordinator.error().cloned()
    }

    /// Cursor state from the last applied page.
    pub fn cursor_state(&self) -> CursorState {
        self.state.lock().cursor.clone()
    }

    /// Whether another page can be fetched.
    pub fn has_next(&self) -> bool {
        self.state.lock().cursor.has_next
    }

    /// Server total, adjusted by local adds and deletes.
    pub fn total_count(&self) -> u64 {
        self.state.lock().cursor.total_count
    }

    /// Subscribes to change notifications; the value is a change counter.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Fetches page 1 and replaces the data.
    ///
    /// Ignored while another request is in flight.
    pub async fn fetch(&self) -> StoreResult<()> {
        let ticket = {
            let mut state = self.state.lock();
            match state.coordinator.begin() {
                Some(ticket) => ticket,
                None => {
                    debug!(store = %self.name, "fetch ignored: request in flight");
                    return Ok(());
                }
            }
        };
        self.notify();
        let query = PageQuery::first(ticket.params().clone());
        self.drive(ticket, query).await
    }

    /// Fetches the next page and appends it.
    ///
    /// No-op when there is no next page or a request is in flight.
    pub async fn fetch_more(&self) -> StoreResult<()> {
        let (ticket, query) = {
            let mut state = self.state.lock();
            if !state.cursor.has_next {
                return Ok(());
            }
            let Some(ticket) = state.coordinator.begin() else {
                debug!(store = %self.name, "fetch_more ignored: request in flight");
                return Ok(());
            };
            let query = PageQuery::after(ticket.params().clone(), &state.cursor);
            (ticket, query)
        };
        self.notify();
        self.drive(ticket, query).await
    }

    /// Merges `patch` into the params, resets the cursor and fetches page 1.
    ///
    /// If a request is in flight its response is dropped and page 1 is
    /// fetched for the newest params as soon as it returns.
    pub async fn update_params(&self, patch: Params) -> StoreResult<()> {
        let ticket = {
            let mut state = self.state.lock();
            let ticket = state.coordinator.update_params(&patch)?;
            state.cursor = CursorState::default();
            ticket
        };
        self.notify();
        match ticket {
            Some(ticket) => {
                let query = PageQuery::first(ticket.params().clone());
                self.drive(ticket, query).await
            }
            None => Ok(()),
        }
    }

    /// Inserts `entity` at the front, or updates it in place if known.
    pub fn add(&self, entity: T) {
        {
            let mut state = self.state.lock();
            if state.data.insert_front(entity) {
                state.cursor.total_count += 1;
            }
        }
        self.notify();
    }

    /// Shallow-merges `patch` into the entity with `id`.
    ///
    /// Returns false if the id is not loaded.
    pub fn update(&self, id: &str, patch: &Patch) -> StoreResult<bool> {
        let updated = self.state.lock().data.patch(id, patch)?;
        if updated {
            self.notify();
        }
        Ok(updated)
    }

    /// Removes the entity with `id`. Idempotent.
    pub fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.data.remove(id).is_some();
            if removed {
                state.cursor.total_count = state.cursor.total_count.saturating_sub(1);
            }
            removed
        };
        if removed {
            self.notify();
        }
        removed
    }

    /// Drops all data and cursor state, and any response still in flight.
    pub fn clear_data(&self) {
        {
            let mut state = self.state.lock();
            state.data.clear();
            state.cursor = CursorState::default();
            state.coordinator.invalidate();
        }
        self.notify();
    }

    async fn drive(&self, mut ticket: Ticket, mut query: PageQuery) -> StoreResult<()> {
        let guard = AbandonGuard::new(|| self.abandon());
        loop {
            debug!(
                store = %self.name,
                generation = ticket.generation(),
                first_page = query.is_first_page(),
                "fetching page"
            );
            let result = with_timeout(self.config.timeout, self.fetcher.fetch_page(&query)).await;

            let (outcome, follow_up) = {
                let mut state = self.state.lock();
                let completion = state.coordinator.finish(&ticket);
                let outcome = if completion.apply {
                    let outcome = match result {
                        Ok(page) => {
                            state.cursor = page.cursor_state();
                            if query.is_first_page() {
                                state.data.replace_all(page.data);
                            } else {
                                state.data.append_back(page.data);
                            }
                            Ok(())
                        }
                        Err(err) => {
                            warn!(store = %self.name, error = %err, "page fetch failed");
                            Err(err)
                        }
                    };
                    state.coordinator.record(&outcome);
                    outcome
                } else {
                    debug!(store = %self.name, generation = ticket.generation(), "dropping stale page");
                    Ok(())
                };
                (outcome, completion.follow_up)
            };
            self.notify();

            match follow_up {
                Some(next) => {
                    query = PageQuery::first(next.params().clone());
                    ticket = next;
                }
                None => {
                    guard.disarm();
                    return outcome;
                }
            }
        }
    }

    fn abandon(&self) {
        self.state.lock().coordinator.abandon();
        debug!(store = %self.name, "request cancelled");
        self.notify();
    }

    fn notify(&self) {
        self.changes.send_modify(|v| *v = v.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::fetch::MockPageFetcher;
    use ootd_protocol::CursorResponse;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        #[serde(default)]
        text: String,
    }

    impl Entity for Row {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn row(id: &str) -> Row {
        Row {
            id: id.into(),
            text: String::new(),
        }
    }

    fn rows(ids: &[&str]) -> Vec<Row> {
        ids.iter().map(|id| row(id)).collect()
    }

    fn store(fetcher: &Arc<MockPageFetcher<Row>>) -> PaginatedStore<Row> {
        PaginatedStore::new("rows", fetcher.clone(), StoreConfig::default())
    }

    #[tokio::test]
    async fn two_pages_then_exhausted() {
        let fetcher = Arc::new(MockPageFetcher::new());
        fetcher.push_ok(CursorResponse::with_next(rows(&["1", "2"]), "c2", "2", 3));
        fetcher.push_ok(CursorResponse::last(rows(&["3"])).with_total(3));

        let store = store(&fetcher)
            .with_params(Params::new().with("limit", 2))
            .unwrap();

        store.fetch().await.unwrap();
        assert_eq!(store.ids(), ["1", "2"]);
        assert!(store.has_next());

        store.fetch_more().await.unwrap();
        assert_eq!(store.ids(), ["1", "2", "3"]);
        assert!(!store.has_next());

        let cursor = store.cursor_state();
        store.fetch_more().await.unwrap();
        assert_eq!(store.ids(), ["1", "2", "3"]);
        assert_eq!(store.cursor_state(), cursor);
        assert_eq!(fetcher.calls(), 2);

        let second = &fetcher.requests()[1];
        assert_eq!(second.cursor.as_deref(), Some("c2"));
        assert_eq!(second.id_after.as_deref(), Some("2"));
        assert_eq!(second.params.limit(), Some(2));
    }

    #[tokio::test]
    async fn concurrent_fetch_more_is_single_flight() {
        let fetcher = Arc::new(MockPageFetcher::new());
        fetcher.push_ok(CursorResponse::with_next(rows(&["1"]), "c", "1", 5));
        fetcher.push_ok(CursorResponse::with_next(rows(&["2"]), "c2", "2", 5));
        fetcher.push_ok(CursorResponse::with_next(rows(&["3"]), "c3", "3", 5));

        let store = store(&fetcher);
        store.fetch().await.unwrap();

        let (a, b) = tokio::join!(store.fetch_more(), store.fetch_more());
        a.unwrap();
        b.unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(store.ids(), ["1", "2"]);
    }

    #[tokio::test]
    async fn params_change_replaces_with_new_page_one() {
        let fetcher = Arc::new(MockPageFetcher::with_responder(|q: &PageQuery| {
            let tag = q.params.get_str("sortBy").unwrap_or("none").to_string();
            let ids = match (tag.as_str(), q.cursor.as_deref()) {
                ("none", None) => vec!["a1", "a2"],
                ("none", Some(_)) => vec!["a3"],
                (_, _) => vec!["b1", "b2"],
            };
            Ok(CursorResponse::with_next(rows(&ids), "next", ids[ids.len() - 1], 9))
        }));
        let store = store(&fetcher);
        store.fetch().await.unwrap();
        store.fetch_more().await.unwrap();
        assert_eq!(store.ids(), ["a1", "a2", "a3"]);

        store
            .update_params(Params::new().with("sortBy", "likeCount"))
            .await
            .unwrap();
        assert_eq!(store.ids(), ["b1", "b2"]);
        assert!(fetcher.requests().last().unwrap().is_first_page());
    }

    #[tokio::test]
    async fn params_change_during_fetch_more_drops_stale_page() {
        let fetcher = Arc::new(MockPageFetcher::with_responder(|q: &PageQuery| {
            if q.params.get_str("q") == Some("new") {
                Ok(CursorResponse::last(rows(&["n1"])))
            } else if q.cursor.is_some() {
                Ok(CursorResponse::last(rows(&["old2"])))
            } else {
                Ok(CursorResponse::with_next(rows(&["old1"]), "c", "old1", 2))
            }
        }));
        let store = store(&fetcher);
        store.fetch().await.unwrap();

        let (more, update) = tokio::join!(
            store.fetch_more(),
            store.update_params(Params::new().with("q", "new"))
        );
        more.unwrap();
        update.unwrap();

        assert_eq!(store.ids(), ["n1"]);
        assert!(!store.is_loading());
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn add_and_local_mutations() {
        let fetcher = Arc::new(MockPageFetcher::new());
        fetcher.push_ok(CursorResponse::last(rows(&["1", "2", "3"])));
        let store = store(&fetcher);
        store.fetch().await.unwrap();
        assert_eq!(store.total_count(), 3);

        store.add(row("5"));
        assert_eq!(store.ids(), ["5", "1", "2", "3"]);
        assert_eq!(store.total_count(), 4);

        store.add(Row {
            id: "2".into(),
            text: "edited".into(),
        });
        assert_eq!(store.ids(), ["5", "1", "2", "3"]);
        assert_eq!(store.get("2").unwrap().text, "edited");
        assert_eq!(store.total_count(), 4);

        let patch = json!({"text": "patched"}).as_object().cloned().unwrap();
        assert!(store.update("3", &patch).unwrap());
        assert_eq!(store.get("3").unwrap().text, "patched");

        assert!(store.delete("1"));
        assert!(!store.delete("1"));
        assert_eq!(store.ids(), ["5", "2", "3"]);
        assert_eq!(store.total_count(), 3);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_data_and_sets_error() {
        let fetcher = Arc::new(MockPageFetcher::new());
        fetcher.push_ok(CursorResponse::with_next(rows(&["1"]), "c", "1", 2));
        fetcher.push_err(NetworkError::Connectivity("offline".into()));
        fetcher.push_ok(CursorResponse::last(rows(&["2"])));

        let store = store(&fetcher);
        store.fetch().await.unwrap();

        let err = store.fetch_more().await.unwrap_err();
        assert!(matches!(err, StoreError::Network(_)));
        assert_eq!(store.ids(), ["1"]);
        assert!(store.error().is_some());
        assert!(store.has_next());

        store.fetch_more().await.unwrap();
        assert_eq!(store.ids(), ["1", "2"]);
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let fetcher = Arc::new(
            MockPageFetcher::with_responder(|_| Ok(CursorResponse::last(rows(&["1"]))))
                .with_delay(Duration::from_millis(200)),
        );
        let store = PaginatedStore::new(
            "slow",
            fetcher,
            StoreConfig::new().with_timeout(Duration::from_millis(20)),
        );
        let err = store.fetch().await.unwrap_err();
        assert_eq!(err, StoreError::Network(NetworkError::Timeout));
        assert!(store.is_empty());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn clear_data_drops_in_flight_response() {
        let fetcher = Arc::new(MockPageFetcher::new());
        fetcher.push_ok(CursorResponse::last(rows(&["1"])));
        let store = store(&fetcher);

        // join polls `fetch` first, so the clear lands while it is suspended
        let clear = async {
            store.clear_data();
        };
        let (fetched, _) = tokio::join!(store.fetch(), clear);
        fetched.unwrap();
        assert!(store.is_empty());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn invalid_params_rejected_without_fetch() {
        let fetcher = Arc::new(MockPageFetcher::new());
        let store = store(&fetcher);
        let err = store
            .update_params(Params::new().with("idAfter", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn watch_sees_changes() {
        let fetcher = Arc::new(MockPageFetcher::new());
        let store = store(&fetcher);
        let rx = store.watch();
        let before = *rx.borrow();
        store.add(row("1"));
        assert_ne!(*rx.borrow(), before);
    }

    #[test]
    fn config_limit_becomes_default_param() {
        let fetcher = Arc::new(MockPageFetcher::<Row>::new());
        let store = PaginatedStore::new("rows", fetcher, StoreConfig::new().with_page_limit(20));
        assert_eq!(store.params().limit(), Some(20));
    }

    #[tokio::test]
    async fn cancelled_fetch_releases_loading() {
        let fetcher = Arc::new(
            MockPageFetcher::with_responder(|_| Ok(CursorResponse::last(rows(&["1"]))))
                .with_delay(Duration::from_millis(100)),
        );
        let store = store(&fetcher);

        let cancelled = tokio::time::timeout(Duration::from_millis(10), store.fetch()).await;
        assert!(cancelled.is_err());
        assert!(!store.is_loading());
        assert!(store.is_empty());

        store.fetch().await.unwrap();
        assert_eq!(store.ids(), ["1"]);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn cancelled_params_change_refetches_with_newest_params() {
        let fetcher = Arc::new(
            MockPageFetcher::with_responder(|q: &PageQuery| {
                let tag = q.params.get_str("q").unwrap_or("none").to_string();
                Ok(CursorResponse::last(rows(&[tag.as_str()])))
            })
            .with_delay(Duration::from_millis(50)),
        );
        let store = store(&fetcher);

        let update = store.update_params(Params::new().with("q", "new"));
        assert!(tokio::time::timeout(Duration::from_millis(5), update).await.is_err());
        assert!(!store.is_loading());
        assert_eq!(store.params().get_str("q"), Some("new"));
        assert!(!store.has_next());

        store.fetch().await.unwrap();
        assert_eq!(store.ids(), ["new"]);
        assert!(fetcher.requests().iter().all(|q| q.params.get_str("q") == Some("new")));
    }

}
