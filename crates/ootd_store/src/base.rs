//! Single-resource store.

use crate::config::StoreConfig;
use crate::coordinator::{AbandonGuard, RequestCoordinator, Ticket};
use crate::error::{StoreError, StoreResult};
use crate::fetch::{with_timeout, OneFetcher};
use ootd_protocol::{Entity, Params, Patch};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

struct OneState<T> {
    data: Option<T>,
    coordinator: RequestCoordinator,
}

/// A resource addressed by a unique parameter set: the profile of user X,
/// the follow summary of user X, the recommendation for forecast Y.
pub struct BaseStore<T: Entity> {
    name: String,
    config: StoreConfig,
    fetcher: Arc<dyn OneFetcher<T>>,
    state: Mutex<OneState<T>>,
    changes: watch::Sender<u64>,
}

impl<T: Entity> BaseStore<T> {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>, fetcher: Arc<dyn OneFetcher<T>>, config: StoreConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            name: name.into(),
            config,
            fetcher,
            state: Mutex::new(OneState {
                data: None,
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

    /// The loaded resource.
    pub fn data(&self) -> Option<T> {
        self.state.lock().data.clone()
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

    /// Loads the resource for the current params.
    pub async fn fetch(&self) -> StoreResult<()> {
        let Some(ticket) = self.state.lock().coordinator.begin() else {
            debug!(store = %self.name, "fetch ignored: request in flight");
            return Ok(());
        };
        self.notify();
        self.drive(ticket).await
    }

    /// Merges `patch` into the params and loads once.
    pub async fn update_params(&self, patch: Params) -> StoreResult<()> {
        let ticket = self.state.lock().coordinator.update_params(&patch)?;
        self.notify();
        match ticket {
            Some(ticket) => self.drive(ticket).await,
            None => Ok(()),
        }
    }

    /// Shallow-merges `patch` into the loaded resource without a request.
    ///
    /// Used after a sibling mutation succeeded elsewhere. Returns false when
    /// nothing is loaded.
    pub fn update(&self, patch: &Patch) -> StoreResult<bool> {
        let updated = {
            let mut state = self.state.lock();
            match state.data.as_ref() {
                Some(current) => {
                    let merged = current.patched(patch)?;
                    state.data = Some(merged);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.notify();
        }
        Ok(updated)
    }

    /// Replaces the resource with a value returned by a mutation call.
    pub fn set(&self, entity: T) {
        self.state.lock().data = Some(entity);
        self.notify();
    }

    /// Drops the resource and any response still in flight.
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.data = None;
            state.coordinator.invalidate();
        }
        self.notify();
    }

    async fn drive(&self, mut ticket: Ticket) -> StoreResult<()> {
        let guard = AbandonGuard::new(|| self.abandon());
        loop {
            debug!(store = %self.name, generation = ticket.generation(), "fetching resource");
            let result = with_timeout(self.config.timeout, self.fetcher.fetch_one(ticket.params())).await;

            let (outcome, follow_up) = {
                let mut state = self.state.lock();
                let completion = state.coordinator.finish(&ticket);
                let outcome = if completion.apply {
                    let outcome = result.map(|entity| state.data = Some(entity));
                    if let Err(err) = &outcome {
                        warn!(store = %self.name, error = %err, "resource fetch failed");
                    }
                    state.coordinator.record(&outcome);
                    outcome
                } else {
                    debug!(store = %self.name, "dropping stale resource");
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
