//! Weekly report generation: collect both categories, rank, detect
//! emerging topics, persist.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use trendkit_core::{
    get_last_n_weeks, period_for, Category, CategoryProvenance, CollectOptions, CollectionResult,
    CollectorVariant, Period, RedditPost, TrendItem, TrendingRepo, WeeklyTrendReport,
};
use trendkit_db::{CategorySnapshot, TrendStorage};
use trendkit_sources::Collector;

use crate::error::PipelineError;
use crate::orchestrator::FallbackOrchestrator;
use crate::registry::SourceRegistry;
use crate::report::{count_topics, detect_emerging, select_top, summarize_report, EmergingConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportSettings {
    /// Items kept per category after ranking.
    pub top_n: usize,
    /// Limit passed to collectors. At least `top_n` so dedup has headroom.
    pub collect_limit: usize,
    pub emerging: EmergingConfig,
}

impl ReportSettings {
    #[must_use]
    pub fn with_top_n(top_n: usize) -> Self {
        Self {
            top_n,
            collect_limit: top_n.saturating_mul(2).max(50),
            emerging: EmergingConfig::default(),
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self::with_top_n(25)
    }
}

/// Outcome of [`ReportGenerator::generate`].
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub report: WeeklyTrendReport,
    /// `true` when an existing report was returned without collecting.
    pub reused: bool,
}

pub struct ReportGenerator<'a> {
    storage: &'a TrendStorage,
    registry: &'a SourceRegistry,
    orchestrator: FallbackOrchestrator<'a>,
    settings: ReportSettings,
}

impl<'a> ReportGenerator<'a> {
    #[must_use]
    pub fn new(
        storage: &'a TrendStorage,
        registry: &'a SourceRegistry,
        orchestrator: FallbackOrchestrator<'a>,
        settings: ReportSettings,
    ) -> Self {
        Self {
            storage,
            registry,
            orchestrator,
            settings,
        }
    }

    /// Build and store the report for the week containing `date`.
    ///
    /// Unless `force` is set an already stored report is returned as-is.
    /// Exhausted categories become provenance gaps.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if any storage read or write fails.
    pub async fn generate(
        &self,
        date: NaiveDate,
        force: bool,
    ) -> Result<GeneratedReport, PipelineError> {
        let period = period_for(date);

        if !force && self.storage.report_exists(&period.week).await? {
            if let Some(report) = self.storage.get_trend_report(&period.week).await? {
                tracing::info!(week = %period.week, "report already exists, reusing");
                return Ok(GeneratedReport {
                    report,
                    reused: true,
                });
            }
        }

        tracing::info!(week = %period.week, force, "generating weekly report");
        let options = CollectOptions {
            limit: self.settings.collect_limit,
            ..CollectOptions::default()
        };

        let (repos, repo_provenance) = self
            .collect_category(Category::Repos, &self.registry.repos, &period, &options)
            .await?;
        let (posts, post_provenance) = self
            .collect_category(Category::Posts, &self.registry.posts, &period, &options)
            .await?;

        let repos: Vec<TrendingRepo> = select_top(repos, self.settings.top_n);
        let posts: Vec<RedditPost> = select_top(posts, self.settings.top_n);

        let topic_counts = count_topics(&repos, &posts);
        let history = self.topic_history(date).await?;
        let emerging_topics = detect_emerging(&topic_counts, &history, &self.settings.emerging);

        let mut report = WeeklyTrendReport {
            week: period.week.clone(),
            period_start: period.start,
            period_end: period.end,
            generated_at: Utc::now(),
            repos,
            posts,
            emerging_topics,
            topic_counts,
            provenance: vec![repo_provenance, post_provenance],
            summary: String::new(),
        };
        report.summary = summarize_report(&report);

        self.storage.save_trend_report(&report).await?;
        tracing::info!(
            week = %report.week,
            repos = report.repos.len(),
            posts = report.posts.len(),
            emerging = report.emerging_topics.len(),
            gaps = report.provenance.iter().filter(|p| p.is_gap()).count(),
            "weekly report stored"
        );

        Ok(GeneratedReport {
            report,
            reused: false,
        })
    }

    async fn collect_category<T>(
        &self,
        category: Category,
        sources: &[Arc<dyn Collector<T>>],
        period: &Period,
        options: &CollectOptions,
    ) -> Result<(Vec<T>, CategoryProvenance), PipelineError>
    where
        T: TrendItem + Serialize + Send + Sync + 'static,
    {
        let result = self
            .orchestrator
            .collect_with_fallback(category, sources, period, options)
            .await;

        match result {
            CollectionResult::Success(success) => {
                let provenance = CategoryProvenance {
                    category,
                    source: Some(success.source.clone()),
                    item_count: success.items.len(),
                    skipped_items: success.skipped_items,
                    gap_class: None,
                    gap_reason: None,
                    attempts: Vec::new(),
                };

                if !success.items.is_empty() && !is_snapshot_source(sources, &success.source) {
                    let snapshot = CategorySnapshot {
                        category,
                        week: period.week.clone(),
                        source: success.source,
                        collected_at: Utc::now(),
                        items: success.items,
                    };
                    self.storage.save_snapshot(&snapshot).await?;
                    return Ok((snapshot.items, provenance));
                }
                Ok((success.items, provenance))
            }
            CollectionResult::Failure(failure) => {
                tracing::warn!(
                    category = %category,
                    week = %period.week,
                    reason = %failure.message,
                    "category has no data this week"
                );
                Ok((
                    Vec::new(),
                    CategoryProvenance {
                        category,
                        source: None,
                        item_count: 0,
                        skipped_items: 0,
                        gap_class: Some(failure.class),
                        gap_reason: Some(failure.message),
                        attempts: failure.attempts,
                    },
                ))
            }
        }
    }

    /// `topic_counts` of the stored reports for the weeks before `date`.
    /// Missing weeks are left out.
    async fn topic_history(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<BTreeMap<String, u32>>, PipelineError> {
        let mut history = Vec::new();
        for week in get_last_n_weeks(date, self.settings.emerging.history_weeks) {
            if let Some(report) = self.storage.get_trend_report(&week).await? {
                history.push(report.topic_counts);
            }
        }
        Ok(history)
    }
}

fn is_snapshot_source<T: Send + 'static>(sources: &[Arc<dyn Collector<T>>], name: &str) -> bool {
    sources
        .iter()
        .any(|s| s.name() == name && s.variant() == CollectorVariant::Snapshot)
}
