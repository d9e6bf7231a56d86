//! Eagerly reloaded, bounded collection store.

use crate::collection::EntityCollection;
use crate::config::StoreConfig;
use crate::coordinator::{AbandonGuard, RequestCoordinator, Ticket};
use crate::error::{StoreError, StoreResult};
use crate::fetch::{with_timeout, ListFetcher};
use ootd_protocol::{Entity, Params, Patch};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

struct ListState<T: Entity> {
    data: EntityCollection<T>,
    coordinator: RequestCoordinator,
}

/// A small server-capped collection (forecasts, attribute definitions).
///
/// Every response replaces the whole collection. There is no cursor.
pub struct ListStore<T: Entity> {
    name: String,
    config: StoreConfig,
    fetcher: Arc<dyn ListFetcher<T>>,
    state: Mutex<ListState<T>>,
    changes: watch::Sender<u64>,
}

impl<T: Entity> ListStore<T> {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>, fetcher: Arc<dyn ListFetcher<T>>, config: StoreConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            name: name.into(),
            config,
            fetcher,
            state: Mutex::new(ListState {
                data: EntityCollection::new(),
                coordinator: RequestCoordinator::default(),
            }),
            changes,
        }
    }

    /// Sets initial params, validating them.
    pub fn with_params(self, params: Params) -> StoreResult<Self> {
        params.validate()?;
        self.state.lock().coordinator = RequestCoordinator::new(params);
        Ok(self)
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

    /// Subscribes to change notifications.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Reloads the collection. Ignored while a request is in flight.
    pub async fn fetch(&self) -> StoreResult<()> {
        let Some(ticket) = self.state.lock().coordinator.begin() else {
            debug!(store = %self.name, "fetch ignored: request in flight");
            return Ok(());
        };
        self.notify();
        self.drive(ticket).await
    }

    /// Merges `patch` into the params and reloads.
    pub async fn update_params(&self, patch: Params) -> StoreResult<()> {
        let ticket = self.state.lock().coordinator.update_params(&patch)?;
        self.notify();
        match ticket {
            Some(ticket) => self.drive(ticket).await,
            None => Ok(()),
        }
    }

    /// Inserts at the front, or updates in place if known.
    pub fn add(&self, entity: T) {
        self.state.lock().data.insert_front(entity);
        self.notify();
    }

    /// Shallow-merges `patch` into the entity with `id`.
    pub fn update(&self, id: &str, patch: &Patch) -> StoreResult<bool> {
        let updated = self.state.lock().data.patch(id, patch)?;
        if updated {
            self.notify();
        }
        Ok(updated)
    }

    /// Removes the entity with `id`. Idempotent.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.state.lock().data.remove(id).is_some();
        if removed {
            self.notify();
        }
        removed
    }

    /// Drops all data and any response still in flight.
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.data.clear();
            state.coordinator.invalidate();
        }
        self.notify();
    }

    async fn drive(&self, mut ticket: Ticket) -> StoreResult<()> {
        let guard = AbandonGuard::new(|| self.abandon());
        loop {
            debug!(store = %self.name, generation = ticket.generation(), "fetching list");
            let result = with_timeout(self.config.timeout, self.fetcher.fetch_list(ticket.params())).await;

            let (outcome, follow_up) = {
                let mut state = self.state.lock();
                let completion = state.coordinator.finish(&ticket);
                let outcome = if completion.apply {
                    let outcome = result.map(|items| state.data.replace_all(items));
                    if let Err(err) = &outcome {
                        warn!(store = %self.name, error = %err, "list fetch failed");
                    }
                    state.coordinator.record(&outcome);
                    outcome
                } else {
                    debug!(store = %self.name, "dropping stale list");
                    Ok(())
                };
                (outcome, completion.follow_up)
            };
            self.notify();

            match follow_up {
                Some(next) => ticket = next,
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
