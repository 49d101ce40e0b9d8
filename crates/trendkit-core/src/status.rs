//! Source health and pipeline status records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::Category;
use crate::report::CategoryProvenance;

/// Result of a cheap liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub healthy: bool,
    pub latency_ms: u64,
    pub detail: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthVerdict {
    #[must_use]
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency_ms,
            detail: None,
            checked_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn unhealthy(latency_ms: u64, detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms,
            detail: Some(detail.into()),
            checked_at: Utc::now(),
        }
    }
}

/// Health record for one upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub source: String,
    pub category: Category,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_skipped: Option<DateTime<Utc>>,
}

impl SourceStatus {
    #[must_use]
    pub fn new(source: impl Into<String>, category: Category) -> Self {
        Self {
            source: source.into(),
            category,
            last_success: None,
            last_failure: None,
            last_error: None,
            consecutive_failures: 0,
            last_skipped: None,
        }
    }
}

/// Cached health verdict for one source, as exposed by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub category: Category,
    /// `None` when the source has no cheap probe or no fresh verdict is cached.
    pub verdict: Option<HealthVerdict>,
}

/// Snapshot of the most recent pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub run_id: Uuid,
    pub week: String,
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub categories: Vec<CategoryProvenance>,
    pub sources: Vec<SourceStatus>,
    pub health: Vec<SourceHealth>,
}
