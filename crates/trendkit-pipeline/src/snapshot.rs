//! Cached-fallback collector backed by stored category snapshots.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use trendkit_core::{Category, CollectOptions, Collected, CollectorVariant, HealthVerdict, Period};
use trendkit_db::{StorageError, TrendStorage};
use trendkit_sources::{Collector, SourceError};

pub const DEFAULT_LOOKBACK_WEEKS: u32 = 4;

/// Serves the most recent snapshot for its category stored within the
/// look-back window. Usually configured as the last source of a category.
pub struct SnapshotCollector<T> {
    name: String,
    category: Category,
    storage: TrendStorage,
    lookback_weeks: u32,
    _item: PhantomData<fn() -> T>,
}

impl<T> SnapshotCollector<T> {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        category: Category,
        storage: TrendStorage,
        lookback_weeks: u32,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            storage,
            lookback_weeks,
            _item: PhantomData,
        }
    }
}

fn storage_to_source(e: &StorageError) -> SourceError {
    SourceError::Unavailable(format!("snapshot storage: {e}"))
}

#[async_trait]
impl<T> Collector<T> for SnapshotCollector<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn variant(&self) -> CollectorVariant {
        CollectorVariant::Snapshot
    }

    async fn fetch(
        &self,
        period: &Period,
        options: &CollectOptions,
    ) -> Result<Collected<T>, SourceError> {
        let lookback = usize::try_from(self.lookback_weeks).unwrap_or(usize::MAX);
        let snapshot = self
            .storage
            .latest_snapshot::<T>(self.category, period.end, lookback)
            .await
            .map_err(|e| storage_to_source(&e))?;

        let Some(snapshot) = snapshot else {
            return Err(SourceError::Unavailable(format!(
                "no {} snapshot within {} weeks of {}",
                self.category, self.lookback_weeks, period.week
            )));
        };
        tracing::info!(
            source = %self.name,
            category = %self.category,
            snapshot_week = %snapshot.week,
            original_source = %snapshot.source,
            "serving cached snapshot"
        );
        let mut items = snapshot.items;
        items.truncate(options.limit);
        Ok(Collected::new(items, 0))
    }

    async fn health_check(&self) -> Option<HealthVerdict> {
        let started = std::time::Instant::now();
        let result = self.storage.ping().await;
        let latency = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Some(match result {
            Ok(()) => HealthVerdict::healthy(latency),
            Err(e) => HealthVerdict::unhealthy(latency, e.to_string()),
        })
    }
}
