//! TTL cache of health verdicts, constructed once per pipeline.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use trendkit_core::HealthVerdict;
use trendkit_sources::{with_error_recovery_else, Collector};

#[derive(Debug, Clone)]
struct CachedVerdict {
    verdict: Option<HealthVerdict>,
    stored_at: Instant,
}

/// Health verdicts keyed by source name, valid for `ttl`.
///
/// A cached `None` means the source has no probe; it is cached like any
/// other verdict so the probe is not re-attempted within the TTL.
#[derive(Debug)]
pub struct HealthCache {
    ttl: Duration,
    probe_timeout: Duration,
    entries: Mutex<HashMap<String, CachedVerdict>>,
}

impl HealthCache {
    #[must_use]
    pub fn new(ttl: Duration, probe_timeout: Duration) -> Self {
        Self {
            ttl,
            probe_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached verdict for `source`. The outer `None` means absent or expired.
    #[must_use]
    pub fn get(&self, source: &str) -> Option<Option<HealthVerdict>> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(source)
            .filter(|c| c.stored_at.elapsed() < self.ttl)
            .map(|c| c.verdict.clone())
    }

    /// Last verdict for `source` regardless of age.
    #[must_use]
    pub fn last_known(&self, source: &str) -> Option<HealthVerdict> {
        let entries = self.entries.lock().ok()?;
        entries.get(source).and_then(|c| c.verdict.clone())
    }

    pub fn insert(&self, source: &str, verdict: Option<HealthVerdict>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                source.to_string(),
                CachedVerdict {
                    verdict,
                    stored_at: Instant::now(),
                },
            );
        }
    }

    pub fn invalidate(&self, source: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(source);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Run `collector`'s probe under the probe timeout and cache the verdict.
    ///
    /// A probe that does not answer in time, or that panics, is an unhealthy
    /// verdict.
    pub async fn probe<T: Send + 'static>(
        &self,
        collector: &dyn Collector<T>,
    ) -> Option<HealthVerdict> {
        let started = Instant::now();
        let elapsed = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let guarded = with_error_recovery_else(
            collector.name(),
            collector.health_check().map(Ok::<_, Infallible>),
            |reason| {
                Some(HealthVerdict::unhealthy(
                    elapsed(),
                    format!("health check {reason}"),
                ))
            },
        );
        let verdict = match tokio::time::timeout(self.probe_timeout, guarded).await {
            Ok(verdict) => verdict,
            Err(_) => Some(HealthVerdict::unhealthy(
                elapsed(),
                format!(
                    "health check timed out after {}ms",
                    self.probe_timeout.as_millis()
                ),
            )),
        };
        self.insert(collector.name(), verdict.clone());
        verdict
    }

    /// Cached verdict if fresh, otherwise a new probe.
    pub async fn verdict_for<T: Send + 'static>(
        &self,
        collector: &dyn Collector<T>,
    ) -> Option<HealthVerdict> {
        if let Some(cached) = self.get(collector.name()) {
            return cached;
        }
        self.probe(collector).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use trendkit_core::{CollectOptions, Collected, CollectorVariant, Period};
    use trendkit_sources::SourceError;

    use super::*;

    struct Probed {
        probes: AtomicU32,
        delay: Duration,
        healthy: bool,
    }

    impl Probed {
        fn new(healthy: bool, delay: Duration) -> Self {
            Self {
                probes: AtomicU32::new(0),
                delay,
                healthy,
            }
        }
    }

    #[async_trait]
    impl Collector<u32> for Probed {
        fn name(&self) -> &str {
            "probed"
        }

        fn variant(&self) -> CollectorVariant {
            CollectorVariant::Graphql
        }

        async fn fetch(
            &self,
            _period: &Period,
            _options: &CollectOptions,
        ) -> Result<Collected<u32>, SourceError> {
            Ok(Collected::new(Vec::new(), 0))
        }

        async fn health_check(&self) -> Option<HealthVerdict> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Some(if self.healthy {
                HealthVerdict::healthy(1)
            } else {
                HealthVerdict::unhealthy(1, "down")
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn verdict_is_cached_within_ttl_and_refreshed_after() {
        let cache = HealthCache::new(Duration::from_secs(300), Duration::from_secs(5));
        let collector = Probed::new(true, Duration::ZERO);

        assert!(cache.verdict_for(&collector).await.unwrap().healthy);
        assert!(cache.verdict_for(&collector).await.unwrap().healthy);
        assert_eq!(collector.probes.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(cache.get("probed").is_none(), "expired entry is not fresh");
        assert!(cache.last_known("probed").is_some());

        cache.verdict_for(&collector).await;
        assert_eq!(collector.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_is_unhealthy() {
        let cache = HealthCache::new(Duration::from_secs(300), Duration::from_secs(5));
        let collector = Probed::new(true, Duration::from_secs(30));

        let verdict = cache.verdict_for(&collector).await.unwrap();
        assert!(!verdict.healthy);
        assert!(verdict.detail.unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_probe_bypasses_cache() {
        let cache = HealthCache::new(Duration::from_secs(300), Duration::from_secs(5));
        let collector = Probed::new(false, Duration::ZERO);

        cache.verdict_for(&collector).await;
        cache.probe(&collector).await;
        assert_eq!(collector.probes.load(Ordering::SeqCst), 2);

        cache.invalidate("probed");
        assert!(cache.get("probed").is_none());
    }
}
