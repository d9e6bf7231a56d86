//! Per-store request coordination.
//!
//! The coordinator owns the params, the loading flag and a generation
//! counter. Stores ask it for a [`Ticket`] before issuing a request and hand
//! the ticket back when the response arrives; the returned [`Completion`]
//! says whether to apply the response and whether a follow-up page-1 fetch
//! must be issued.

use crate::error::{StoreError, StoreResult};
use ootd_protocol::Params;

/// Permission to issue one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    generation: u64,
    params: Params,
}

impl Ticket {
    /// Generation the request was issued under.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Params snapshot the request must use.
    pub fn params(&self) -> &Params {
        &self.params
    }
}

/// What to do with a finished request.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// True if the response belongs to the current generation.
    pub apply: bool,
    /// A page-1 request to issue next, for params changed mid-flight.
    pub follow_up: Option<Ticket>,
}

/// Governs params → refetch transitions for one store instance.
///
/// # Invariants
///
/// - At most one ticket is outstanding
/// - A ticket whose generation is stale is never applied
/// - A params change while loading yields exactly one follow-up ticket
#[derive(Debug, Clone)]
pub struct RequestCoordinator {
    params: Params,
    generation: u64,
    loading: bool,
    pending_reset: bool,
    error: Option<StoreError>,
}

impl RequestCoordinator {
    /// Creates a coordinator with initial params.
    pub fn new(params: Params) -> Self {
        Self {
            params,
            generation: 0,
            loading: false,
            pending_reset: false,
            error: None,
        }
    }

    /// Current params.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while a request is outstanding.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Last error from an applied response.
    pub fn error(&self) -> Option<&StoreError> {
        self.error.as_ref()
    }

    /// Starts a request unless one is already in flight.
    pub fn begin(&mut self) -> Option<Ticket> {
        if self.loading {
            return None;
        }
        self.loading = true;
        Some(self.ticket())
    }

    /// Merges `patch` into the params and starts a new generation.
    ///
    /// Returns a ticket when idle. While loading, the reset is deferred and
    /// handed out as the follow-up of the in-flight request.
    pub fn update_params(&mut self, patch: &Params) -> StoreResult<Option<Ticket>> {
        let merged = self.params.merged(patch);
        merged.validate()?;
        self.params = merged;
        self.generation += 1;
        if self.loading {
            self.pending_reset = true;
            return Ok(None);
        }
        self.loading = true;
        Ok(Some(self.ticket()))
    }

    /// Drops whatever is in flight without scheduling a new request.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.pending_reset = false;
        self.error = None;
    }

    /// Releases the in-flight request without a response.
    ///
    /// A deferred reset is dropped with it; the next request is issued for
    /// the newest params.
    pub fn abandon(&mut self) {
        self.loading = false;
        self.pending_reset = false;
    }

    /// Records the end of the request identified by `ticket`.
    pub fn finish(&mut self, ticket: &Ticket) -> Completion {
        let apply = ticket.generation == self.generation;
        if self.pending_reset {
            self.pending_reset = false;
            return Completion {
                apply,
                follow_up: Some(self.ticket()),
            };
        }
        self.loading = false;
        Completion {
            apply,
            follow_up: None,
        }
    }

    /// Stores the outcome of an applied response.
    pub fn record<T>(&mut self, outcome: &StoreResult<T>) {
        self.error = outcome.as_ref().err().cloned();
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            params: self.params.clone(),
        }
    }
}

/// Runs `on_drop` unless disarmed.
///
/// A store holds one while its request future is pending, so a caller
/// that drops the future does not leave the store loading.
pub(crate) struct AbandonGuard<F: FnOnce()> {
    on_drop: Option<F>,
}

impl<F: FnOnce()> AbandonGuard<F> {
    pub(crate) fn new(on_drop: F) -> Self {
        Self { on_drop: Some(on_drop) }
    }

    /// The request completed normally.
    pub(crate) fn disarm(mut self) {
        self.on_drop = None;
    }
}

impl<F: FnOnce()> Drop for AbandonGuard<F> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

impl Default for RequestCoordinator {
    fn default() -> Self {
        Self::new(Params::new())
    }
}
