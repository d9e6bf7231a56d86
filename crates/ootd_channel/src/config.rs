//! Configuration for push channels.

use rand::Rng;
use std::time::Duration;

/// Configuration for one channel client.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Endpoint URL (`.../api/sse` or `.../ws`).
    pub url: String,
    /// Reconnect backoff.
    pub retry: RetryConfig,
    /// Heartbeat interval requested from the server, if any.
    pub heartbeat: Option<Duration>,
}

impl ChannelConfig {
    /// Creates a configuration for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry: RetryConfig::default(),
            heartbeat: None,
        }
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = Some(interval);
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Reconnect backoff for one outage.
///
/// Attempt `n` waits `base_delay * factor^(n-1)`, capped at `max_delay`,
/// plus a random share of that delay of at most `jitter`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum reconnect attempts per outage; `None` retries while signed in.
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnect.
    pub base_delay: Duration,
    /// Cap on the delay before jitter is added.
    pub max_delay: Duration,
    /// Growth per attempt.
    pub factor: f64,
    /// Largest random share added to a delay, in `0.0..=1.0`.
    pub jitter: f64,
}

impl RetryConfig {
    /// Gives up after `max_attempts` reconnects.
    pub fn limited(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    /// Never reconnects.
    pub fn never() -> Self {
        Self::limited(0)
    }

    /// Sets the delay before the first reconnect.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor. Values below 1 are treated as 1.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        self
    }

    /// Sets the jitter share, clamped to `0.0..=1.0`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    /// Disables jitter.
    pub fn without_jitter(self) -> Self {
        self.with_jitter(0.0)
    }

    /// Returns true if reconnect `attempt` (1-indexed) is allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Capped exponential delay for `attempt`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Delay for `attempt` with jitter drawn from `rng`.
    pub fn delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let share = self.jitter * rng.gen::<f64>();
        let extra = Duration::try_from_secs_f64(delay.as_secs_f64() * share).unwrap_or_default();
        delay.saturating_add(extra)
    }

    /// Delay for `attempt` with jitter from the thread-local generator.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            jitter: 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn channel_config_builder() {
        let config = ChannelConfig::new("https://api.example.com/ws")
            .with_heartbeat(Duration::from_secs(10))
            .with_retry(RetryConfig::limited(5));

        assert_eq!(config.url, "https://api.example.com/ws");
        assert_eq!(config.heartbeat, Some(Duration::from_secs(10)));
        assert_eq!(config.retry.max_attempts, Some(5));
    }

    #[test]
    fn default_backoff() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff(0), Duration::ZERO);
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(2), Duration::from_secs(2));
        assert_eq!(config.backoff(3), Duration::from_secs(4));
        assert_eq!(config.backoff(10), Duration::from_secs(30));
        assert_eq!(config.backoff(u32::MAX), Duration::from_secs(30));
        assert!(config.allows(1_000));
    }

    #[test]
    fn jitter_stays_within_share() {
        let config = RetryConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..8 {
            let base = config.backoff(attempt);
            let delay = config.delay_with(attempt, &mut rng);
            assert!(delay >= base);
            assert!(delay <= base.mul_f64(1.25));
        }
    }

    #[test]
    fn jitter_spreads_simultaneous_reconnects() {
        let config = RetryConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        let delays: std::collections::BTreeSet<Duration> =
            (0..16).map(|_| config.delay_with(1, &mut rng)).collect();
        assert!(delays.len() > 8, "delays clustered: {delays:?}");
    }

    #[test]
    fn without_jitter_is_deterministic() {
        let config = RetryConfig::default().without_jitter();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(config.delay_with(2, &mut rng), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn builder_clamps_inputs() {
        let config = RetryConfig::default().with_jitter(3.0).with_factor(0.5);
        assert_eq!(config.jitter, 1.0);
        assert_eq!(config.factor, 1.0);
        assert_eq!(RetryConfig::default().with_jitter(f64::NAN).jitter, 0.0);
        assert_eq!(config.backoff(5), Duration::from_secs(1));
    }

    #[test]
    fn attempt_limit() {
        let config = RetryConfig::limited(2);
        assert!(config.allows(1));
        assert!(config.allows(2));
        assert!(!config.allows(3));
        assert!(!RetryConfig::never().allows(1));
    }
}
