use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use trendkit_core::{
    period_for, CategoryProvenance, ErrorClass, PipelineStatus, TrendingRepo, WeeklyTrendReport,
};

use super::*;
use crate::MemoryKvStore;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn storage() -> (Arc<MemoryKvStore>, TrendStorage) {
    let store = Arc::new(MemoryKvStore::new());
    let storage = TrendStorage::new(store.clone());
    (store, storage)
}

fn report_for(date: NaiveDate) -> WeeklyTrendReport {
    let period = period_for(date);
    WeeklyTrendReport {
        week: period.week,
        period_start: period.start,
        period_end: period.end,
        generated_at: Utc::now(),
        repos: Vec::new(),
        posts: Vec::new(),
        emerging_topics: Vec::new(),
        topic_counts: BTreeMap::from([("rust".to_string(), 3)]),
        provenance: vec![CategoryProvenance {
            category: Category::Posts,
            source: None,
            item_count: 0,
            skipped_items: 0,
            gap_class: Some(ErrorClass::Exhausted),
            gap_reason: Some("all sources failed".to_string()),
            attempts: Vec::new(),
        }],
        summary: String::new(),
    }
}

fn repo(full_name: &str) -> TrendingRepo {
    let (owner, name) = TrendingRepo::split_full_name(full_name).unwrap();
    TrendingRepo {
        full_name: full_name.to_string(),
        owner,
        name,
        description: None,
        language: Some("Rust".to_string()),
        stars: 10,
        stars_gained: 5,
        forks: 0,
        topics: vec![],
        url: format!("https://github.com/{full_name}"),
        collected_at: Utc::now(),
        source: "github_graphql".to_string(),
    }
}

#[tokio::test]
async fn report_round_trip_and_existence() {
    let (_, storage) = storage();
    let report = report_for(d(2026, 10, 14));
    assert!(!storage.report_exists("2026-W42").await.unwrap());

    storage.save_trend_report(&report).await.unwrap();

    assert!(storage.report_exists("2026-W42").await.unwrap());
    let loaded = storage.get_trend_report("2026-W42").await.unwrap().unwrap();
    assert_eq!(loaded, report);
    assert!(storage.get_trend_report("2026-W41").await.unwrap().is_none());
}

#[tokio::test]
async fn latest_report_follows_week_order_not_insertion_order() {
    let (_, storage) = storage();
    storage.save_trend_report(&report_for(d(2026, 10, 14))).await.unwrap();
    storage.save_trend_report(&report_for(d(2025, 12, 30))).await.unwrap();
    storage.save_trend_report(&report_for(d(2026, 1, 7))).await.unwrap();

    let latest = storage.get_latest_trend_report().await.unwrap().unwrap();
    assert_eq!(latest.week, "2026-W42");

    let weeks: Vec<String> = storage
        .list_trend_reports()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.week)
        .collect();
    assert_eq!(weeks, vec!["2026-W42", "2026-W02", "2026-W01"]);

    let recent = storage.get_recent_reports(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[1].week, "2026-W02");
}

#[tokio::test]
async fn list_ignores_keys_that_are_not_week_ids() {
    let (store, storage) = storage();
    store.set("reports:weekly:latest", json!({})).await.unwrap();
    storage.save_trend_report(&report_for(d(2026, 10, 14))).await.unwrap();
    assert_eq!(storage.list_trend_reports().await.unwrap().len(), 1);
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let (_, storage) = storage();
    for date in [d(2026, 6, 1), d(2026, 7, 1), d(2026, 10, 14)] {
        storage.save_trend_report(&report_for(date)).await.unwrap();
    }
    storage
        .save_snapshot(&CategorySnapshot {
            category: Category::Repos,
            week: "2026-W23".to_string(),
            source: "github_graphql".to_string(),
            collected_at: Utc::now(),
            items: vec![repo("a/b")],
        })
        .await
        .unwrap();

    let first = storage.cleanup_old_reports(12, d(2026, 10, 16)).await.unwrap();
    assert_eq!(first.reports_deleted, vec!["2026-W27", "2026-W23"]);
    assert_eq!(first.snapshots_deleted, 1);

    let second = storage.cleanup_old_reports(12, d(2026, 10, 16)).await.unwrap();
    assert!(second.reports_deleted.is_empty());
    assert_eq!(second.snapshots_deleted, 0);

    assert!(storage.report_exists("2026-W42").await.unwrap());
}

#[tokio::test]
async fn huge_retention_keeps_everything_without_panicking() {
    let (_, storage) = storage();
    storage
        .save_trend_report(&report_for(d(2026, 6, 1)))
        .await
        .unwrap();

    let summary = storage
        .cleanup_old_reports(20_000_000, d(2026, 10, 16))
        .await
        .unwrap();
    assert_eq!(summary.cutoff, Some(NaiveDate::MIN));
    assert!(summary.reports_deleted.is_empty());
    assert_eq!(storage.list_trend_reports().await.unwrap().len(), 1);
}

#[tokio::test]
async fn latest_snapshot_searches_lookback_window() {
    let (_, storage) = storage();
    storage
        .save_snapshot(&CategorySnapshot {
            category: Category::Repos,
            week: "2026-W40".to_string(),
            source: "github_trending".to_string(),
            collected_at: Utc::now(),
            items: vec![repo("tokio-rs/tokio")],
        })
        .await
        .unwrap();

    let found: Option<CategorySnapshot<TrendingRepo>> = storage
        .latest_snapshot(Category::Repos, d(2026, 10, 14), 4)
        .await
        .unwrap();
    let found = found.expect("snapshot within window");
    assert_eq!(found.week, "2026-W40");
    assert_eq!(found.items[0].full_name, "tokio-rs/tokio");

    let outside: Option<CategorySnapshot<TrendingRepo>> = storage
        .latest_snapshot(Category::Repos, d(2026, 10, 14), 1)
        .await
        .unwrap();
    assert!(outside.is_none());

    let other_category: Option<CategorySnapshot<TrendingRepo>> = storage
        .latest_snapshot(Category::Posts, d(2026, 10, 14), 4)
        .await
        .unwrap();
    assert!(other_category.is_none());
}

#[tokio::test]
async fn pipeline_status_round_trip() {
    let (_, storage) = storage();
    assert!(storage.load_pipeline_status().await.unwrap().is_none());
    let status = PipelineStatus {
        run_id: uuid::Uuid::new_v4(),
        week: "2026-W42".to_string(),
        date: d(2026, 10, 16),
        started_at: Utc::now(),
        finished_at: None,
        categories: Vec::new(),
        sources: Vec::new(),
        health: Vec::new(),
    };
    storage.save_pipeline_status(&status).await.unwrap();
    assert_eq!(storage.load_pipeline_status().await.unwrap(), Some(status));
}

#[tokio::test]
async fn outage_surfaces_as_storage_error() {
    let (store, storage) = storage();
    store.set_unavailable(true);
    let err = storage
        .save_trend_report(&report_for(d(2026, 10, 14)))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
    assert!(storage.get_latest_trend_report().await.is_err());
}

#[tokio::test]
async fn corrupt_value_is_reported_not_masked() {
    let (store, storage) = storage();
    store
        .set(&report_key("2026-W42"), json!({"week": 42}))
        .await
        .unwrap();
    let err = storage.get_trend_report("2026-W42").await.unwrap_err();
    assert!(matches!(err, StorageError::Corrupt { .. }));
}
