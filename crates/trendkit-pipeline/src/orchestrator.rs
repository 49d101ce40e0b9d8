//! Priority-ordered fallback across the sources of one category.

use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use trendkit_core::{
    Category, CollectOptions, Collected, CollectionFailure, CollectionResult, ErrorClass,
    HealthVerdict, Period, SourceAttempt, SourceHealth,
};
use trendkit_sources::{with_error_recovery_else, Collector, Recovered};

use crate::health::HealthCache;
use crate::status::SourceStatusTracker;

/// A category's collectors in configured priority order.
pub type SourceList<T> = Vec<Arc<dyn Collector<T>>>;

/// Tries each source in order until one succeeds.
///
/// Borrows the pipeline's health cache and status tracker for the duration
/// of a run; neither outlives the pipeline that owns them.
pub struct FallbackOrchestrator<'a> {
    health: &'a HealthCache,
    status: &'a SourceStatusTracker,
}

impl<'a> FallbackOrchestrator<'a> {
    #[must_use]
    pub fn new(health: &'a HealthCache, status: &'a SourceStatusTracker) -> Self {
        Self { health, status }
    }

    /// Produce one result for `category`.
    ///
    /// Unhealthy sources are skipped without a fetch. The first successful
    /// fetch wins and lower-priority sources are never touched. When every
    /// source fails the result is an `exhausted` failure listing each attempt.
    /// Never panics, even if a collector does.
    pub async fn collect_with_fallback<T: Send + 'static>(
        &self,
        category: Category,
        sources: &[Arc<dyn Collector<T>>],
        period: &Period,
        options: &CollectOptions,
    ) -> CollectionResult<T> {
        let mut attempts = Vec::with_capacity(sources.len());

        for source in sources {
            let name = source.name().to_string();

            if let Some(verdict) = self.health.verdict_for(source.as_ref()).await {
                if !verdict.healthy {
                    let reason = verdict
                        .detail
                        .unwrap_or_else(|| "health check failed".to_string());
                    tracing::info!(
                        source = %name,
                        category = %category,
                        reason = %reason,
                        "skipping unhealthy source"
                    );
                    self.status.record_skip(&name, category, &reason);
                    attempts.push(SourceAttempt {
                        source: name,
                        class: ErrorClass::Unhealthy,
                        message: reason,
                        skipped: true,
                    });
                    continue;
                }
            }

            let started = Instant::now();
            let outcome: Result<Collected<T>, (ErrorClass, String)> = with_error_recovery_else(
                &name,
                source.fetch(period, options).map(|r| r.map(Ok)),
                |reason| match reason {
                    Recovered::Error(e) => Err((e.class(), e.to_string())),
                    Recovered::Panic(msg) => {
                        Err((ErrorClass::Permanent, format!("collector panicked: {msg}")))
                    }
                },
            )
            .await;
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match outcome {
                Ok(collected) => {
                    tracing::info!(
                        source = %name,
                        category = %category,
                        items = collected.items.len(),
                        skipped = collected.skipped,
                        latency_ms,
                        "collection succeeded"
                    );
                    self.status.record_success(&name, category);
                    return CollectionResult::success(name, collected, latency_ms);
                }
                Err((class, message)) => {
                    tracing::warn!(
                        source = %name,
                        category = %category,
                        class = %class,
                        error = %message,
                        "source failed, falling back"
                    );
                    self.status.record_failure(&name, category, &message);
                    attempts.push(SourceAttempt {
                        source: name,
                        class,
                        message,
                        skipped: false,
                    });
                }
            }
        }

        let joined = attempts
            .iter()
            .map(|a| a.source.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let message = if sources.is_empty() {
            format!("no sources configured for {category}")
        } else {
            format!("all {} sources failed for {category}", sources.len())
        };
        tracing::error!(category = %category, sources = %joined, "{message}");
        CollectionResult::Failure(CollectionFailure {
            source: joined,
            class: ErrorClass::Exhausted,
            message,
            attempts,
        })
    }

    /// Probe every source now, bypassing cached verdicts.
    pub async fn check_sources<T: Send + 'static>(
        &self,
        category: Category,
        sources: &[Arc<dyn Collector<T>>],
    ) -> Vec<SourceHealth> {
        let mut out = Vec::with_capacity(sources.len());
        for source in sources {
            let verdict = self.health.probe(source.as_ref()).await;
            log_verdict(source.name(), category, verdict.as_ref());
            out.push(SourceHealth {
                source: source.name().to_string(),
                category,
                verdict,
            });
        }
        out
    }

    /// Cached verdicts only; never probes.
    #[must_use]
    pub fn cached_health<T: Send + 'static>(
        &self,
        category: Category,
        sources: &[Arc<dyn Collector<T>>],
    ) -> Vec<SourceHealth> {
        sources
            .iter()
            .map(|s| SourceHealth {
                source: s.name().to_string(),
                category,
                verdict: self.health.last_known(s.name()),
            })
            .collect()
    }
}

fn log_verdict(source: &str, category: Category, verdict: Option<&HealthVerdict>) {
    match verdict {
        Some(v) if v.healthy => tracing::info!(
            source,
            category = %category,
            latency_ms = v.latency_ms,
            "source healthy"
        ),
        Some(v) => tracing::warn!(
            source,
            category = %category,
            detail = v.detail.as_deref().unwrap_or(""),
            "source unhealthy"
        ),
        None => tracing::debug!(source, category = %category, "source has no health probe"),
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
