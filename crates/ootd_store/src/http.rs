//! REST fetchers over an abstract HTTP client.
//!
//! The HTTP stack itself is pluggable: implement [`HttpClient`] with
//! whatever library the embedding uses (reqwest, a browser `fetch` shim, a
//! test double). [`ApiClient`] adds the base URL, bearer auth, path
//! templating and error-body mapping on top.

use crate::error::{NetworkError, StoreError, StoreResult};
use crate::fetch::{BoxFuture, ListFetcher, OneFetcher, PageFetcher};
use ootd_protocol::{AuthProvider, CursorResponse, ErrorResponse, PageQuery, Params};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// An outgoing GET request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpRequest {
    /// Absolute URL without the query string.
    pub url: String,
    /// Query pairs, unencoded. Encoding is the client's job.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Returns the first header named `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response from a JSON value.
    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            body: value.to_string().into_bytes(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations report unreachable servers as
/// [`NetworkError::Connectivity`]; any received status, including errors,
/// is returned as a response.
pub trait HttpClient: Send + Sync {
    /// Performs a GET.
    fn get<'a>(&'a self, request: &'a HttpRequest) -> BoxFuture<'a, Result<HttpResponse, NetworkError>>;
}

/// Authenticated JSON API access.
pub struct ApiClient {
    base_url: String,
    client: Arc<dyn HttpClient>,
    auth: Arc<dyn AuthProvider>,
}

impl ApiClient {
    /// Creates a client rooted at `base_url` (e.g. `https://api.example.com`).
    pub fn new(base_url: impl Into<String>, client: Arc<dyn HttpClient>, auth: Arc<dyn AuthProvider>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client, auth }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Substitutes `{name}` segments of `template` from `params`.
    ///
    /// Returns the path and the params that were not consumed.
    pub fn resolve_path(template: &str, params: &Params) -> StoreResult<(String, Params)> {
        let mut path = String::with_capacity(template.len());
        let mut consumed = Params::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else {
                return Err(StoreError::Validation(format!("unterminated placeholder in `{template}`")));
            };
            let key = &rest[open + 1..open + close];
            let value = match params.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(StoreError::Validation(format!(
                        "missing path param `{key}` for `{template}`"
                    )))
                }
            };
            path.push_str(&rest[..open]);
            path.push_str(&value);
            consumed = consumed.with(key, Value::Null);
            rest = &rest[open + close + 1..];
        }
        path.push_str(rest);

        Ok((path, params.merged(&consumed)))
    }

    /// Builds the request for `path` with `query`.
    pub fn request(&self, path: &str, query: Vec<(String, String)>) -> HttpRequest {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(token) = self.auth.access_token() {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        HttpRequest {
            url: format!("{}{}", self.base_url, path),
            query,
            headers,
        }
    }

    /// GETs `path` and decodes the JSON body.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str, query: Vec<(String, String)>) -> StoreResult<R> {
        let request = self.request(path, query);
        debug!(url = %request.url, "GET");
        let response = self.client.get(&request).await?;

        if !response.is_success() {
            let err = status_error(&response);
            warn!(url = %request.url, status = response.status, "request failed");
            return Err(err.into());
        }

        serde_json::from_slice(&response.body).map_err(|e| NetworkError::Decode(e.to_string()).into())
    }
}

fn status_error(response: &HttpResponse) -> NetworkError {
    match serde_json::from_slice::<ErrorResponse>(&response.body) {
        Ok(body) => NetworkError::Status {
            status: response.status,
            message: body.message,
            exception: Some(body.exception_name).filter(|name| !name.is_empty()),
        },
        Err(_) => NetworkError::Status {
            status: response.status,
            message: String::from_utf8_lossy(&response.body).into_owned(),
            exception: None,
        },
    }
}

/// Cursor-paginated endpoint, e.g. `/api/feeds` or `/api/feeds/{feedId}/comments`.
pub struct RestPageFetcher<T> {
    api: Arc<ApiClient>,
    path: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T> RestPageFetcher<T> {
    /// Creates a fetcher for `path`.
    pub fn new(api: Arc<ApiClient>, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
            _entity: PhantomData,
        }
    }
}

impl<T> PageFetcher<T> for RestPageFetcher<T>
where
    T: DeserializeOwned + Send + Sync,
{
    fn fetch_page<'a>(&'a self, query: &'a PageQuery) -> BoxFuture<'a, StoreResult<CursorResponse<T>>> {
        Box::pin(async move {
            let (path, params) = ApiClient::resolve_path(&self.path, &query.params)?;
            let query = PageQuery {
                params,
                ..query.clone()
            };
            self.api.get_json(&path, query.to_query_pairs()).await
        })
    }
}

/// Endpoint returning a whole collection.
pub struct RestListFetcher<T> {
    api: Arc<ApiClient>,
    path: String,
    enveloped: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T> RestListFetcher<T> {
    /// Creates a fetcher for `path`, which answers with a JSON array.
    pub fn new(api: Arc<ApiClient>, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
            enveloped: false,
            _entity: PhantomData,
        }
    }

    /// Reads the collection from the `data` field of a page envelope.
    pub fn enveloped(mut self) -> Self {
        self.enveloped = true;
        self
    }
}

impl<T> ListFetcher<T> for RestListFetcher<T>
where
    T: DeserializeOwned + Send + Sync,
{
    fn fetch_list<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, StoreResult<Vec<T>>> {
        Box::pin(async move {
            let (path, params) = ApiClient::resolve_path(&self.path, params)?;
            let query = params.to_query_pairs();
            if self.enveloped {
                let page: CursorResponse<T> = self.api.get_json(&path, query).await?;
                Ok(page.data)
            } else {
                self.api.get_json(&path, query).await
            }
        })
    }
}

/// Endpoint returning one resource, e.g. `/api/profiles/{userId}`.
pub struct RestOneFetcher<T> {
    api: Arc<ApiClient>,
    path: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T> RestOneFetcher<T> {
    /// Creates a fetcher for `path`.
    pub fn new(api: Arc<ApiClient>, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
            _entity: PhantomData,
        }
    }
}

impl<T> OneFetcher<T> for RestOneFetcher<T>
where
    T: DeserializeOwned + Send + Sync,
{
    fn fetch_one<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, StoreResult<T>> {
        Box::pin(async move {
            let (path, params) = ApiClient::resolve_path(&self.path, params)?;
            self.api.get_json(&path, params.to_query_pairs()).await
        })
    }
}
