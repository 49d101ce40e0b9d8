use std::collections::BTreeMap;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tower::ServiceExt;
use trendkit_core::{Category, RedditPost, TrendingRepo, WeeklyTrendReport};
use trendkit_db::{MemoryKvStore, TrendStorage};
use trendkit_pipeline::{PipelineSettings, SnapshotCollector, SourceRegistry};

use super::*;

fn fixture() -> (Arc<MemoryKvStore>, AppState) {
    let store = Arc::new(MemoryKvStore::new());
    let storage = TrendStorage::new(store.clone());
    let registry = SourceRegistry {
        repos: vec![Arc::new(SnapshotCollector::<TrendingRepo>::new(
            "repos_snapshot",
            Category::Repos,
            storage.clone(),
            4,
        ))],
        posts: vec![Arc::new(SnapshotCollector::<RedditPost>::new(
            "posts_snapshot",
            Category::Posts,
            storage.clone(),
            4,
        ))],
    };
    let pipeline = TrendPipeline::new(storage, registry, PipelineSettings::default());
    (
        store,
        AppState {
            pipeline: Arc::new(pipeline),
        },
    )
}

fn app(state: AppState) -> Router {
    let auth = AuthState::from_keys("", true).expect("dev auth");
    build_app(state, auth, default_rate_limit_state())
}

fn report(week: &str, start: NaiveDate) -> WeeklyTrendReport {
    WeeklyTrendReport {
        week: week.to_string(),
        period_start: start,
        period_end: start + chrono::Duration::days(6),
        generated_at: Utc::now(),
        repos: Vec::new(),
        posts: Vec::new(),
        emerging_topics: Vec::new(),
        topic_counts: BTreeMap::new(),
        provenance: Vec::new(),
        summary: format!("Weekly trends {week}"),
    }
}

async fn seed_reports(state: &AppState) {
    let storage = state.pipeline.storage();
    storage
        .save_trend_report(&report("2026-W41", NaiveDate::from_ymd_opt(2026, 10, 5).unwrap()))
        .await
        .unwrap();
    storage
        .save_trend_report(&report("2026-W42", NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()))
        .await
        .unwrap();
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[test]
fn normalize_limit_applies_defaults_and_bounds() {
    assert_eq!(normalize_limit(None), 12);
    assert_eq!(normalize_limit(Some(0)), 1);
    assert_eq!(normalize_limit(Some(1_000)), 104);
    assert_eq!(normalize_limit(Some(25)), 25);
}

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("not_found", StatusCode::NOT_FOUND),
        ("storage_unavailable", StatusCode::SERVICE_UNAVAILABLE),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        let response = ApiError::new("req-1", code, "x").into_response();
        assert_eq!(response.status(), status, "{code}");
    }
}

#[tokio::test]
async fn health_reports_storage_state() {
    let (store, state) = fixture();
    let (status, body) = send(app(state.clone()), "GET", "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["storage"], "ok");

    store.set_unavailable(true);
    let (status, body) = send(app(state), "GET", "/api/v1/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["data"]["status"], "degraded");
}

#[tokio::test]
async fn latest_report_is_404_before_first_run() {
    let (_, state) = fixture();
    let (status, body) = send(app(state), "GET", "/api/v1/reports/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn reports_list_latest_and_by_week() {
    let (_, state) = fixture();
    seed_reports(&state).await;

    let (status, body) = send(app(state.clone()), "GET", "/api/v1/reports?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["week"], "2026-W42");

    let (status, body) = send(app(state.clone()), "GET", "/api/v1/reports/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["week"], "2026-W42");

    let (status, body) = send(app(state.clone()), "GET", "/api/v1/reports/2026-W41").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["summary"], "Weekly trends 2026-W41");

    let (status, _) = send(app(state), "GET", "/api/v1/reports/2026-W01").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_week_is_bad_request() {
    let (_, state) = fixture();
    let (status, body) = send(app(state), "GET", "/api/v1/reports/last-week").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn storage_outage_is_service_unavailable() {
    let (store, state) = fixture();
    store.set_unavailable(true);
    let (status, body) = send(app(state), "GET", "/api/v1/reports").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "storage_unavailable");
}

#[tokio::test]
async fn sources_listing_and_on_demand_check() {
    let (_, state) = fixture();

    let (status, body) = send(app(state.clone()), "GET", "/api/v1/sources").await;
    assert_eq!(status, StatusCode::OK);
    let sources = body["data"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["name"], "repos_snapshot");
    assert_eq!(sources[0]["priority"], 0);
    assert_eq!(sources[1]["category"], "posts");
    assert!(sources[0]["health"].is_null(), "listing never probes");

    let (status, body) = send(app(state.clone()), "POST", "/api/v1/sources/check").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["verdict"]["healthy"], true);

    let (_, body) = send(app(state), "GET", "/api/v1/sources").await;
    assert_eq!(body["data"][0]["health"]["healthy"], true);
}

#[tokio::test]
async fn pipeline_status_is_null_before_first_run() {
    let (_, state) = fixture();
    let (status, body) = send(app(state), "GET", "/api/v1/pipeline/status").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_null());
    assert!(body["meta"]["request_id"].is_string());
}

#[tokio::test]
async fn bearer_auth_guards_protected_routes_only() {
    let (_, state) = fixture();
    let auth = AuthState::from_keys("secret", false).unwrap();
    let router = build_app(state, auth, default_rate_limit_state());

    let (status, _) = send(router.clone(), "GET", "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(router.clone(), "GET", "/api/v1/reports").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/reports")
                .header("authorization", "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let (_, state) = fixture();
    let auth = AuthState::from_keys("", true).unwrap();
    let router = build_app(state, auth, RateLimitState::new(1, Duration::from_secs(60)));

    let (first, _) = send(router.clone(), "GET", "/api/v1/reports").await;
    assert_eq!(first, StatusCode::OK);
    let (second, body) = send(router, "GET", "/api/v1/reports").await;
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "rate_limited");
}

#[tokio::test]
async fn request_id_is_echoed() {
    let (_, state) = fixture();
    let response = app(state)
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}
