//! Weekly report and storage metadata types.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::collection::{Category, ErrorClass, SourceAttempt};
use crate::items::{RedditPost, TrendingRepo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergingTopic {
    pub topic: String,
    pub count: u32,
    /// Mean count over the prior weeks considered; 0.0 when the topic is new.
    pub previous_average: f64,
    /// `count / previous_average`, or `count` when there is no history.
    pub growth: f64,
}

/// Which source supplied a category, or why it is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryProvenance {
    pub category: Category,
    /// Source that supplied the data. `None` marks a gap.
    pub source: Option<String>,
    pub item_count: usize,
    pub skipped_items: usize,
    pub gap_class: Option<ErrorClass>,
    pub gap_reason: Option<String>,
    #[serde(default)]
    pub attempts: Vec<SourceAttempt>,
}

impl CategoryProvenance {
    #[must_use]
    pub fn is_gap(&self) -> bool {
        self.source.is_none()
    }
}

/// Aggregate trend report for one ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTrendReport {
    pub week: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub repos: Vec<TrendingRepo>,
    pub posts: Vec<RedditPost>,
    pub emerging_topics: Vec<EmergingTopic>,
    /// Normalized topic frequencies for this week, consulted by later weeks.
    #[serde(default)]
    pub topic_counts: BTreeMap<String, u32>,
    pub provenance: Vec<CategoryProvenance>,
    pub summary: String,
}

impl WeeklyTrendReport {
    #[must_use]
    pub fn provenance_for(&self, category: Category) -> Option<&CategoryProvenance> {
        self.provenance.iter().find(|p| p.category == category)
    }

    /// Distinct sources that contributed data, in category order.
    #[must_use]
    pub fn contributing_sources(&self) -> Vec<&str> {
        self.provenance
            .iter()
            .filter_map(|p| p.source.as_deref())
            .collect()
    }
}

/// Metadata for one stored key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub size_bytes: u64,
}
