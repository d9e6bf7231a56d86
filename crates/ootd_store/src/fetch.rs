//! Fetcher abstractions consumed by stores.
//!
//! Stores never know about URLs. They call one of these traits with their
//! params and apply whatever comes back. Mock implementations are provided
//! for tests.

use crate::error::{NetworkError, StoreResult};
use ootd_protocol::{CursorResponse, PageQuery, Params};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fetches one page of a cursor-paginated collection.
pub trait PageFetcher<T>: Send + Sync {
    /// Fetches the page described by `query`.
    fn fetch_page<'a>(&'a self, query: &'a PageQuery) -> BoxFuture<'a, StoreResult<CursorResponse<T>>>;
}

/// Fetches a whole bounded collection.
pub trait ListFetcher<T>: Send + Sync {
    /// Fetches the collection for `params`.
    fn fetch_list<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, StoreResult<Vec<T>>>;
}

/// Fetches a single resource.
pub trait OneFetcher<T>: Send + Sync {
    /// Fetches the resource addressed by `params`.
    fn fetch_one<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, StoreResult<T>>;
}

/// Runs `fut`, mapping an elapsed `timeout` to [`NetworkError::Timeout`].
pub(crate) async fn with_timeout<F, R>(timeout: Duration, fut: F) -> StoreResult<R>
where
    F: Future<Output = StoreResult<R>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(NetworkError::Timeout.into()),
    }
}

type Responder<Q, R> = Box<dyn Fn(&Q) -> StoreResult<R> + Send + Sync>;

/// A scripted fetcher for testing.
///
/// Responses are taken from a queue, or computed by a responder closure
/// once the queue is empty. Every request is recorded. Each call yields to
/// the scheduler before answering so concurrent callers interleave.
pub struct MockFetcher<Q, R> {
    queue: Mutex<VecDeque<StoreResult<R>>>,
    responder: Option<Responder<Q, R>>,
    requests: Mutex<Vec<Q>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

/// Mock for [`PageFetcher`].
pub type MockPageFetcher<T> = MockFetcher<PageQuery, CursorResponse<T>>;
/// Mock for [`ListFetcher`].
pub type MockListFetcher<T> = MockFetcher<Params, Vec<T>>;
/// Mock for [`OneFetcher`].
pub type MockOneFetcher<T> = MockFetcher<Params, T>;

impl<Q: Clone, R: Clone> MockFetcher<Q, R> {
    /// Creates a fetcher with an empty queue.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Creates a fetcher that answers every request with `f`.
    pub fn with_responder<F>(f: F) -> Self
    where
        F: Fn(&Q) -> StoreResult<R> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(f)),
            ..Self::new()
        }
    }

    /// Sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a successful response.
    pub fn push_ok(&self, response: R) {
        self.queue.lock().push_back(Ok(response));
    }

    /// Queues a failure.
    pub fn push_err(&self, error: impl Into<crate::error::StoreError>) {
        self.queue.lock().push_back(Err(error.into()));
    }

    /// Number of requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<Q> {
        self.requests.lock().clone()
    }

    async fn respond(&self, request: &Q) -> StoreResult<R> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        // Pop before suspending so overlapping calls see distinct responses.
        let queued = self.queue.lock().pop_front();
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        match (queued, &self.responder) {
            (Some(response), _) => response,
            (None, Some(responder)) => responder(request),
            (None, None) => Err(NetworkError::Connectivity("no mock response queued".into()).into()),
        }
    }
}

impl<Q: Clone, R: Clone> Default for MockFetcher<Q, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PageFetcher<T> for MockPageFetcher<T>
where
    T: Clone + Send + Sync,
{
    fn fetch_page<'a>(&'a self, query: &'a PageQuery) -> BoxFuture<'a, StoreResult<CursorResponse<T>>> {
        Box::pin(self.respond(query))
    }
}

impl<T> ListFetcher<T> for MockListFetcher<T>
where
    T: Clone + Send + Sync,
{
    fn fetch_list<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, StoreResult<Vec<T>>> {
        Box::pin(self.respond(params))
    }
}

impl<T> OneFetcher<T> for MockOneFetcher<T>
where
    T: Clone + Send + Sync,
{
    fn fetch_one<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, StoreResult<T>> {
        Box::pin(self.respond(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_then_responder() {
        let fetcher: MockListFetcher<u32> = MockFetcher::with_responder(|_| Ok(vec![9]));
        fetcher.push_ok(vec![1, 2]);

        let params = Params::new();
        assert_eq!(fetcher.fetch_list(&params).await.unwrap(), vec![1, 2]);
        assert_eq!(fetcher.fetch_list(&params).await.unwrap(), vec![9]);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn empty_mock_fails() {
        let fetcher: MockOneFetcher<u32> = MockFetcher::new();
        let err = fetcher.fetch_one(&Params::new()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::StoreError::Network(NetworkError::Connectivity(_))
        ));
    }

    #[tokio::test]
    async fn records_requests() {
        let fetcher: MockPageFetcher<u32> = MockFetcher::new();
        fetcher.push_ok(CursorResponse::last(vec![]));
        let query = PageQuery::first(Params::new().with("limit", 2));
        fetcher.fetch_page(&query).await.unwrap();
        assert_eq!(fetcher.requests(), vec![query]);
    }
}
