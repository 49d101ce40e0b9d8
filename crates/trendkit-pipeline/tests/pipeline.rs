//! End-to-end runs of `TrendPipeline` against scripted collectors and the
//! in-memory store. No network traffic.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use trendkit_core::{
    Category, CollectOptions, Collected, CollectorVariant, ErrorClass, Period, RedditPost,
    TrendingRepo,
};
use trendkit_db::{MemoryKvStore, StorageError, TrendStorage};
use trendkit_pipeline::{
    PipelineError, PipelineSettings, SnapshotCollector, SourceRegistry, TrendPipeline,
};
use trendkit_sources::{Collector, SourceError};

type Script<T> = Box<dyn Fn(&Period) -> Result<Vec<T>, SourceError> + Send + Sync>;

struct Scripted<T> {
    name: &'static str,
    calls: AtomicU32,
    script: Script<T>,
}

impl<T> Scripted<T> {
    fn new(
        name: &'static str,
        script: impl Fn(&Period) -> Result<Vec<T>, SourceError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicU32::new(0),
            script: Box::new(script),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Send + 'static> Collector<T> for Scripted<T> {
    fn name(&self) -> &str {
        self.name
    }

    fn variant(&self) -> CollectorVariant {
        CollectorVariant::RestScrape
    }

    async fn fetch(
        &self,
        period: &Period,
        _options: &CollectOptions,
    ) -> Result<Collected<T>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(period).map(|items| Collected::new(items, 0))
    }
}

fn repo(full_name: &str, gained: u64, topics: &[&str]) -> TrendingRepo {
    let (owner, name) = TrendingRepo::split_full_name(full_name).expect("owner/name");
    TrendingRepo {
        full_name: full_name.to_string(),
        owner,
        name,
        description: None,
        language: None,
        stars: gained * 10,
        stars_gained: gained,
        forks: 0,
        topics: topics.iter().map(|t| (*t).to_string()).collect(),
        url: format!("https://github.com/{full_name}"),
        collected_at: Utc::now(),
        source: "scripted".to_string(),
    }
}

fn post(id: &str, title: &str, score: i64) -> RedditPost {
    RedditPost {
        id: id.to_string(),
        title: title.to_string(),
        subreddit: "programming".to_string(),
        author: Some("someone".to_string()),
        score,
        num_comments: 1,
        url: format!("https://www.reddit.com/comments/{id}"),
        created_at: None,
        collected_at: Utc::now(),
        source: "scripted".to_string(),
    }
}

fn unavailable() -> SourceError {
    SourceError::UnexpectedStatus {
        status: 503,
        url: "https://upstream.test".to_string(),
    }
}

fn source<T: Send + 'static>(s: &Arc<Scripted<T>>) -> Arc<dyn Collector<T>> {
    s.clone()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn pipeline_with(
    store: Arc<MemoryKvStore>,
    repos: Vec<Arc<dyn Collector<TrendingRepo>>>,
    posts: Vec<Arc<dyn Collector<RedditPost>>>,
) -> TrendPipeline {
    let storage = TrendStorage::new(store);
    TrendPipeline::new(
        storage,
        SourceRegistry { repos, posts },
        PipelineSettings::default(),
    )
}

// ---------------------------------------------------------------------------
// Gaps and provenance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exhausted_category_becomes_a_gap_not_an_error() {
    let store = Arc::new(MemoryKvStore::new());
    let primary = Scripted::<TrendingRepo>::new("primary_repos", |_: &Period| {
        Ok(vec![repo("a/one", 10, &["rust"]), repo("a/two", 30, &["rust"])])
    });
    let json = Scripted::<RedditPost>::new("posts_json", |_: &Period| Err(unavailable()));
    let rss = Scripted::<RedditPost>::new("posts_rss", |_: &Period| Err(unavailable()));
    let pipeline = pipeline_with(
        store,
        vec![source(&primary)],
        vec![source(&json), source(&rss)],
    );

    let generated = pipeline.run_weekly(date(2026, 10, 14), false).await.unwrap();
    let report = generated.report;
    assert!(!generated.reused);
    assert_eq!(report.week, "2026-W42");
    assert_eq!(report.repos[0].full_name, "a/two", "ranked by stars gained");
    assert!(report.posts.is_empty());

    let repos = report.provenance_for(Category::Repos).unwrap();
    assert_eq!(repos.source.as_deref(), Some("primary_repos"));
    assert_eq!(repos.item_count, 2);

    let posts = report.provenance_for(Category::Posts).unwrap();
    assert!(posts.is_gap());
    assert_eq!(posts.gap_class, Some(ErrorClass::Exhausted));
    let tried: Vec<&str> = posts.attempts.iter().map(|a| a.source.as_str()).collect();
    assert_eq!(tried, vec!["posts_json", "posts_rss"]);
    assert!(report.summary.contains("posts: no data"));

    let status = pipeline.get_pipeline_status().await.unwrap().unwrap();
    assert_eq!(status.week, "2026-W42");
    assert_eq!(status.categories.len(), 2);
    let json_status = status
        .sources
        .iter()
        .find(|s| s.source == "posts_json")
        .unwrap();
    assert_eq!(json_status.consecutive_failures, 1);
}

// ---------------------------------------------------------------------------
// Reuse vs force
// ---------------------------------------------------------------------------

#[tokio::test]
async fn existing_report_is_reused_unless_forced() {
    let store = Arc::new(MemoryKvStore::new());
    let repos =
        Scripted::<TrendingRepo>::new("repos", |_: &Period| Ok(vec![repo("a/one", 1, &[])]));
    let posts = Scripted::<RedditPost>::new("posts", |_: &Period| Ok(vec![post("p1", "Hello", 5)]));
    let pipeline = pipeline_with(store, vec![source(&repos)], vec![source(&posts)]);
    let day = date(2026, 10, 14);

    pipeline.run_weekly(day, false).await.unwrap();
    let second = pipeline.run_weekly(day, false).await.unwrap();
    assert!(second.reused);
    assert_eq!(repos.calls(), 1, "reuse must not collect again");

    let forced = pipeline.run_weekly(day, true).await.unwrap();
    assert!(!forced.reused);
    assert_eq!(repos.calls(), 2);
    assert_eq!(posts.calls(), 2);
}

// ---------------------------------------------------------------------------
// Snapshot fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_serves_when_live_sources_fail_the_next_week() {
    let store = Arc::new(MemoryKvStore::new());
    let storage = TrendStorage::new(store.clone());
    let live = Scripted::<TrendingRepo>::new("live_repos", |period: &Period| {
        if period.week == "2026-W41" {
            Ok(vec![repo("cached/repo", 42, &["zig"])])
        } else {
            Err(unavailable())
        }
    });
    let snapshot: Arc<dyn Collector<TrendingRepo>> = Arc::new(
        SnapshotCollector::<TrendingRepo>::new("repos_snapshot", Category::Repos, storage, 4),
    );
    let posts = Scripted::<RedditPost>::new("posts", |_: &Period| Ok(vec![]));
    let pipeline = pipeline_with(store, vec![source(&live), snapshot], vec![source(&posts)]);

    pipeline.run_weekly(date(2026, 10, 7), false).await.unwrap();
    let report = pipeline
        .run_weekly(date(2026, 10, 14), false)
        .await
        .unwrap()
        .report;

    let repos = report.provenance_for(Category::Repos).unwrap();
    assert_eq!(repos.source.as_deref(), Some("repos_snapshot"));
    assert_eq!(report.repos[0].full_name, "cached/repo");
}

// ---------------------------------------------------------------------------
// Emerging topics across weeks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn topics_growing_against_history_are_emerging() {
    let store = Arc::new(MemoryKvStore::new());
    let repos = Scripted::<TrendingRepo>::new("repos", |period: &Period| {
        let mut items = vec![
            repo("w/one", 5, &["web"]),
            repo("w/two", 4, &["web"]),
            repo("w/three", 3, &["web"]),
        ];
        if period.week == "2026-W42" {
            items.extend([
                repo("x/one", 9, &["wasm"]),
                repo("x/two", 8, &["WASM"]),
                repo("x/three", 7, &["#wasm"]),
            ]);
        }
        Ok(items)
    });
    let posts = Scripted::<RedditPost>::new("posts", |_: &Period| Ok(vec![]));
    let pipeline = pipeline_with(store, vec![source(&repos)], vec![source(&posts)]);

    pipeline.run_weekly(date(2026, 10, 7), false).await.unwrap();
    let report = pipeline
        .run_weekly(date(2026, 10, 14), false)
        .await
        .unwrap()
        .report;

    let topics: Vec<&str> = report
        .emerging_topics
        .iter()
        .map(|t| t.topic.as_str())
        .collect();
    assert_eq!(topics, vec!["wasm"], "web is flat week over week");
    assert_eq!(report.topic_counts["web"], 3);
}

// ---------------------------------------------------------------------------
// Storage failures propagate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn storage_outage_aborts_the_run() {
    let store = Arc::new(MemoryKvStore::new());
    let repos =
        Scripted::<TrendingRepo>::new("repos", |_: &Period| Ok(vec![repo("a/one", 1, &[])]));
    let posts = Scripted::<RedditPost>::new("posts", |_: &Period| Ok(vec![]));
    let pipeline = pipeline_with(store.clone(), vec![source(&repos)], vec![source(&posts)]);

    store.set_unavailable(true);
    let err = pipeline.run_weekly(date(2026, 10, 14), false).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Storage(StorageError::Unavailable(_))
    ));
    assert!(pipeline.get_latest_trend_report().await.is_err());
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_applies_configured_retention() {
    let store = Arc::new(MemoryKvStore::new());
    let repos =
        Scripted::<TrendingRepo>::new("repos", |_: &Period| Ok(vec![repo("a/one", 1, &[])]));
    let posts = Scripted::<RedditPost>::new("posts", |_: &Period| Ok(vec![]));
    let pipeline = pipeline_with(store, vec![source(&repos)], vec![source(&posts)]);

    for day in [date(2026, 6, 3), date(2026, 9, 30), date(2026, 10, 14)] {
        pipeline.run_weekly(day, false).await.unwrap();
    }

    let summary = pipeline.cleanup_old_reports(date(2026, 10, 16)).await.unwrap();
    assert_eq!(summary.reports_deleted, vec!["2026-W23".to_string()]);
    assert_eq!(summary.snapshots_deleted, 1);

    let again = pipeline.cleanup_old_reports(date(2026, 10, 16)).await.unwrap();
    assert!(again.reports_deleted.is_empty());

    let weeks: Vec<String> = pipeline
        .list_trend_reports()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.week)
        .collect();
    assert_eq!(weeks, vec!["2026-W42", "2026-W40"]);
}
