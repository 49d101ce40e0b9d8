//! The collector contract and the HTTP settings every collector shares.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use trendkit_core::{
    AppConfig, CollectOptions, Collected, CollectionResult, CollectorVariant, HealthVerdict,
    Period,
};

use crate::error::SourceError;
use crate::recovery::RetryPolicy;

/// One upstream source able to produce items of type `T` for a period.
///
/// Implementors only provide [`Collector::fetch`]; [`Collector::collect`]
/// wraps it with timing and error classification.
#[async_trait]
pub trait Collector<T: Send + 'static>: Send + Sync {
    /// Configured source name, unique across categories.
    fn name(&self) -> &str;

    fn variant(&self) -> CollectorVariant;

    /// Fetch items observed during `period`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the upstream cannot be reached or its
    /// payload cannot be interpreted at all.
    async fn fetch(
        &self,
        period: &Period,
        options: &CollectOptions,
    ) -> Result<Collected<T>, SourceError>;

    /// Cheap liveness probe. `None` means the source has no probe and is
    /// assumed available.
    async fn health_check(&self) -> Option<HealthVerdict> {
        None
    }

    /// [`Collector::fetch`] wrapped into a [`CollectionResult`].
    async fn collect(&self, period: &Period, options: &CollectOptions) -> CollectionResult<T> {
        let started = Instant::now();
        match self.fetch(period, options).await {
            Ok(collected) => {
                CollectionResult::success(self.name(), collected, elapsed_ms(started))
            }
            Err(e) => CollectionResult::failure(self.name(), e.class(), e.to_string()),
        }
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// HTTP behaviour shared by all network collectors.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Timeout for health probes; shorter than `request_timeout`.
    pub health_timeout: Duration,
    pub retry: RetryPolicy,
    /// Pause between consecutive requests to the same upstream.
    pub inter_request_delay: Duration,
}

impl HttpSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            health_timeout: Duration::from_secs(config.health_timeout_secs),
            retry: RetryPolicy::new(config.max_attempts, config.retry_backoff_base_ms),
            inter_request_delay: Duration::from_millis(config.inter_request_delay_ms),
        }
    }

    /// Settings for tests: short timeouts, no back-off, no pacing.
    #[must_use]
    pub fn for_tests(max_attempts: u32) -> Self {
        Self {
            user_agent: "trendkit-test/0.1".to_string(),
            request_timeout: Duration::from_secs(5),
            health_timeout: Duration::from_secs(2),
            retry: RetryPolicy::immediate(max_attempts),
            inter_request_delay: Duration::ZERO,
        }
    }

    /// Build a client with the given total timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the client cannot be constructed.
    pub fn build_client(&self, timeout: Duration) -> Result<Client, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(self.user_agent.as_str())
            .build()?;
        Ok(client)
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: "trendkit/0.1 (trend-collector)".to_string(),
            request_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            inter_request_delay: Duration::from_secs(1),
        }
    }
}

/// Join `base` and `path` with exactly one `/`.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
