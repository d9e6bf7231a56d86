//! Configuration for stores.

use std::time::Duration;

/// Configuration shared by every store created from one registry.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Client-side timeout for each fetch.
    pub timeout: Duration,
    /// Default page size injected as `limit` when the caller sets none.
    pub page_limit: Option<u64>,
}

impl StoreConfig {
    /// Creates the default configuration (10s timeout, no default limit).
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            page_limit: None,
        }
    }

    /// Sets the fetch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default page size.
    pub fn with_page_limit(mut self, limit: u64) -> Self {
        self.page_limit = Some(limit);
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_ten_seconds() {
        let config = StoreConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.page_limit.is_none());
    }

    #[test]
    fn config_builder() {
        let config = StoreConfig::new()
            .with_timeout(Duration::from_millis(250))
            .with_page_limit(20);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.page_limit, Some(20));
    }
}
