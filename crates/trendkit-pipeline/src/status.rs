//! Per-source success/failure bookkeeping.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use trendkit_core::{Category, SourceStatus};

/// Mutated only by the orchestrator after each attempt; read by status queries.
#[derive(Debug, Default)]
pub struct SourceStatusTracker {
    statuses: Mutex<BTreeMap<String, SourceStatus>>,
}

impl SourceStatusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a status so sources that never ran still appear in listings.
    pub fn register(&self, source: &str, category: Category) {
        if let Ok(mut map) = self.statuses.lock() {
            map.entry(source.to_string())
                .or_insert_with(|| SourceStatus::new(source, category));
        }
    }

    /// Restore statuses persisted by an earlier run.
    pub fn restore(&self, statuses: Vec<SourceStatus>) {
        if let Ok(mut map) = self.statuses.lock() {
            for status in statuses {
                map.insert(status.source.clone(), status);
            }
        }
    }

    fn update(&self, source: &str, category: Category, f: impl FnOnce(&mut SourceStatus)) {
        if let Ok(mut map) = self.statuses.lock() {
            let status = map
                .entry(source.to_string())
                .or_insert_with(|| SourceStatus::new(source, category));
            f(status);
        }
    }

    pub fn record_success(&self, source: &str, category: Category) {
        self.update(source, category, |s| {
            s.last_success = Some(Utc::now());
            s.consecutive_failures = 0;
        });
    }

    pub fn record_failure(&self, source: &str, category: Category, reason: &str) {
        self.update(source, category, |s| {
            s.last_failure = Some(Utc::now());
            s.last_error = Some(reason.to_string());
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
        });
    }

    /// A health-check skip. Does not count as a failed attempt.
    pub fn record_skip(&self, source: &str, category: Category, reason: &str) {
        self.update(source, category, |s| {
            s.last_skipped = Some(Utc::now());
            s.last_error = Some(reason.to_string());
        });
    }

    #[must_use]
    pub fn get(&self, source: &str) -> Option<SourceStatus> {
        self.statuses.lock().ok()?.get(source).cloned()
    }

    /// All statuses ordered by source name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SourceStatus> {
        self.statuses
            .lock()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }
}
