//! Typed persistence for reports, category snapshots and pipeline status.
//!
//! Keys:
//!
//! | Record            | Key                             |
//! |-------------------|---------------------------------|
//! | weekly report     | `reports:weekly:{week}`         |
//! | category snapshot | `snapshots:{category}:{week}`   |
//! | last run status   | `status:pipeline`               |

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use trendkit_core::{
    get_last_n_weeks, get_week_string, parse_week_string, week_range, weeks_before, Category,
    PipelineStatus, StorageEntry, WeeklyTrendReport,
};

use crate::kv::{KvStore, StorageError};

pub const REPORT_PREFIX: &str = "reports:weekly:";
pub const SNAPSHOT_PREFIX: &str = "snapshots:";
pub const STATUS_KEY: &str = "status:pipeline";

#[must_use]
pub fn report_key(week: &str) -> String {
    format!("{REPORT_PREFIX}{week}")
}

#[must_use]
pub fn snapshot_key(category: Category, week: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{category}:{week}")
}

/// Items a source returned for a category in a given week, kept for the
/// cached-fallback collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySnapshot<T> {
    pub category: Category,
    pub week: String,
    pub source: String,
    pub collected_at: DateTime<Utc>,
    pub items: Vec<T>,
}

/// Stored report metadata without the report body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIndexEntry {
    pub week: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub cutoff: Option<NaiveDate>,
    pub reports_deleted: Vec<String>,
    pub snapshots_deleted: usize,
}

/// Sort key for `YYYY-Www`; `None` for anything that is not a week id.
fn week_order(week: &str) -> Option<(i32, u32)> {
    parse_week_string(week).ok()
}

/// Typed facade over a [`KvStore`]. Storage failures are always surfaced.
#[derive(Clone)]
pub struct TrendStorage {
    store: Arc<dyn KvStore>,
}

impl TrendStorage {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Serialize `value` to JSON and store it under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialize`] if `value` cannot be serialized, or
    /// the backend error if the write fails.
    pub async fn save_to_storage<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_value(value).map_err(|e| StorageError::Serialize {
            key: key.to_string(),
            source: e,
        })?;
        self.store.set(key, json).await
    }

    /// Load and deserialize the value at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupt`] if the stored JSON does not match `T`,
    /// or the backend error if the read fails.
    pub async fn load_from_storage<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let Some(value) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                source: e,
            })
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails.
    pub async fn save_trend_report(&self, report: &WeeklyTrendReport) -> Result<(), StorageError> {
        self.save_to_storage(&report_key(&report.week), report).await
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if the read fails or the stored report is unreadable.
    pub async fn get_trend_report(
        &self,
        week: &str,
    ) -> Result<Option<WeeklyTrendReport>, StorageError> {
        self.load_from_storage(&report_key(week)).await
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    pub async fn report_exists(&self, week: &str) -> Result<bool, StorageError> {
        self.store.exists(&report_key(week)).await
    }

    /// Stored reports, most recent week first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    pub async fn list_trend_reports(&self) -> Result<Vec<ReportIndexEntry>, StorageError> {
        let entries = self.store.list_prefix(REPORT_PREFIX).await?;
        let mut index: Vec<(i32, u32, ReportIndexEntry)> = entries
            .into_iter()
            .filter_map(|e: StorageEntry| {
                let week = e.key.strip_prefix(REPORT_PREFIX)?.to_string();
                let (year, num) = week_order(&week)?;
                Some((
                    year,
                    num,
                    ReportIndexEntry {
                        week,
                        created_at: e.created_at,
                        updated_at: e.updated_at,
                        size_bytes: e.size_bytes,
                    },
                ))
            })
            .collect();
        index.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        Ok(index.into_iter().map(|(_, _, e)| e).collect())
    }

    /// Up to `n` full reports, most recent week first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if any read fails.
    pub async fn get_recent_reports(
        &self,
        n: usize,
    ) -> Result<Vec<WeeklyTrendReport>, StorageError> {
        let mut reports = Vec::with_capacity(n);
        for entry in self.list_trend_reports().await?.into_iter().take(n) {
            if let Some(report) = self.get_trend_report(&entry.week).await? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// The report for the latest week, regardless of insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if any read fails.
    pub async fn get_latest_trend_report(
        &self,
    ) -> Result<Option<WeeklyTrendReport>, StorageError> {
        Ok(self.get_recent_reports(1).await?.into_iter().next())
    }

    /// Delete reports and snapshots whose week starts before
    /// `today - retention_weeks`. Running it twice deletes nothing the second time.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read or written.
    pub async fn cleanup_old_reports(
        &self,
        retention_weeks: u32,
        today: NaiveDate,
    ) -> Result<CleanupSummary, StorageError> {
        let cutoff = weeks_before(today, retention_weeks);
        let is_expired = |week: &str| week_range(week).is_ok_and(|(start, _)| start < cutoff);

        let mut summary = CleanupSummary {
            cutoff: Some(cutoff),
            ..CleanupSummary::default()
        };

        for entry in self.list_trend_reports().await? {
            if is_expired(&entry.week) && self.store.delete(&report_key(&entry.week)).await? {
                summary.reports_deleted.push(entry.week);
            }
        }

        for entry in self.store.list_prefix(SNAPSHOT_PREFIX).await? {
            let week = entry.key.rsplit(':').next().unwrap_or_default();
            if is_expired(week) && self.store.delete(&entry.key).await? {
                summary.snapshots_deleted += 1;
            }
        }

        Ok(summary)
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails.
    pub async fn save_snapshot<T: Serialize + Sync>(
        &self,
        snapshot: &CategorySnapshot<T>,
    ) -> Result<(), StorageError> {
        self.save_to_storage(&snapshot_key(snapshot.category, &snapshot.week), snapshot)
            .await
    }

    /// Most recent snapshot for `category` from the week containing
    /// `on_or_before` or any of the `lookback_weeks` weeks before it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if any read fails or a snapshot is unreadable.
    pub async fn latest_snapshot<T: DeserializeOwned>(
        &self,
        category: Category,
        on_or_before: NaiveDate,
        lookback_weeks: usize,
    ) -> Result<Option<CategorySnapshot<T>>, StorageError> {
        let mut weeks = vec![get_week_string(on_or_before)];
        weeks.extend(get_last_n_weeks(on_or_before, lookback_weeks));
        for week in weeks {
            if let Some(snapshot) = self.load_from_storage(&snapshot_key(category, &week)).await? {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails.
    pub async fn save_pipeline_status(&self, status: &PipelineStatus) -> Result<(), StorageError> {
        self.save_to_storage(STATUS_KEY, status).await
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if the read fails or the stored status is unreadable.
    pub async fn load_pipeline_status(&self) -> Result<Option<PipelineStatus>, StorageError> {
        self.load_from_storage(STATUS_KEY).await
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend is unreachable.
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.store.ping().await
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
