//! Reddit public JSON listing collector (no authentication).
//!
//! Fetches `/r/{a+b+c}/top.json?t=week` across the configured communities, or
//! `/search.json` when a query is given. Listing children are read through
//! optional fields; children without an id or title are counted as skipped.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use trendkit_core::{
    CollectOptions, Collected, CollectorVariant, HealthVerdict, Period, RedditPost,
};

use crate::collector::{elapsed_ms, join_url, Collector, HttpSettings};
use crate::error::SourceError;
use crate::recovery::{check_status, fetch_with_retry};

pub const DEFAULT_ENDPOINT: &str = "https://www.reddit.com";

/// Reddit caps listing pages at 100.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct Listing {
    data: Option<ListingData>,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Option<PostData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostData {
    id: Option<String>,
    title: Option<String>,
    subreddit: Option<String>,
    author: Option<String>,
    score: Option<i64>,
    num_comments: Option<u64>,
    url: Option<String>,
    permalink: Option<String>,
    created_utc: Option<f64>,
    stickied: Option<bool>,
}

pub struct RedditJsonCollector {
    name: String,
    client: Client,
    health_client: Client,
    settings: HttpSettings,
    endpoint: String,
    communities: Vec<String>,
}

impl RedditJsonCollector {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP clients cannot be built.
    pub fn new(
        name: impl Into<String>,
        settings: HttpSettings,
        communities: Vec<String>,
    ) -> Result<Self, SourceError> {
        Self::with_endpoint(name, settings, communities, DEFAULT_ENDPOINT)
    }

    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP clients cannot be built.
    pub fn with_endpoint(
        name: impl Into<String>,
        settings: HttpSettings,
        communities: Vec<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            name: name.into(),
            client: settings.build_client(settings.request_timeout)?,
            health_client: settings.build_client(settings.health_timeout)?,
            settings,
            endpoint: endpoint.into(),
            communities,
        })
    }

    /// Communities for this call: the option subset when given, else the configured list.
    fn target_communities<'a>(&'a self, options: &'a CollectOptions) -> &'a [String] {
        match &options.communities {
            Some(subset) if !subset.is_empty() => subset,
            _ => &self.communities,
        }
    }

    fn listing_url(
        &self,
        options: &CollectOptions,
    ) -> Result<(String, Vec<(&'static str, String)>), SourceError> {
        let limit = options.limit.clamp(1, MAX_PAGE_SIZE).to_string();
        if let Some(query) = options.query.as_deref().filter(|q| !q.trim().is_empty()) {
            return Ok((
                join_url(&self.endpoint, "search.json"),
                vec![
                    ("q", query.to_string()),
                    ("sort", "top".to_string()),
                    ("t", "week".to_string()),
                    ("limit", limit),
                ],
            ));
        }
        let communities = self.target_communities(options);
        if communities.is_empty() {
            return Err(SourceError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: "no communities configured and no query given".to_string(),
            });
        }
        Ok((
            join_url(&self.endpoint, &format!("r/{}/top.json", communities.join("+"))),
            vec![("t", "week".to_string()), ("limit", limit)],
        ))
    }
}

fn to_post(
    data: PostData,
    base: &str,
    source: &str,
    collected_at: DateTime<Utc>,
) -> Option<RedditPost> {
    if data.stickied == Some(true) {
        return None;
    }
    let id = data.id.filter(|s| !s.is_empty())?;
    let title = data
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())?;
    let url = data
        .permalink
        .map(|p| join_url(base, &p))
        .or(data.url)
        .unwrap_or_else(|| join_url(base, &format!("comments/{id}")));
    Some(RedditPost {
        id,
        title,
        subreddit: data.subreddit.unwrap_or_default(),
        author: data.author.filter(|a| a != "[deleted]"),
        score: data.score.unwrap_or(0),
        num_comments: data.num_comments.unwrap_or(0),
        url,
        created_at: data.created_utc.and_then(epoch_to_utc),
        collected_at,
        source: source.to_string(),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    Utc.timestamp_opt(secs.trunc() as i64, 0).single()
}

/// Parse a listing body into posts. Each child is decoded on its own, so a
/// child with a malformed field is counted as skipped.
///
/// # Errors
///
/// Returns [`SourceError::Deserialize`] when the body is not a listing.
pub(crate) fn parse_listing(
    body: &str,
    base: &str,
    source: &str,
    collected_at: DateTime<Utc>,
) -> Result<Collected<RedditPost>, SourceError> {
    let listing: Listing = serde_json::from_str(body).map_err(|e| SourceError::Deserialize {
        context: format!("{source}: listing"),
        source: e,
    })?;
    let children = listing.data.map(|d| d.children).unwrap_or_default();

    let mut posts = Vec::with_capacity(children.len());
    let mut skipped = 0usize;
    for child in children {
        let data = serde_json::from_value::<Child>(child)
            .ok()
            .and_then(|c| c.data);
        match data.and_then(|d| to_post(d, base, source, collected_at)) {
            Some(post) => posts.push(post),
            None => skipped += 1,
        }
    }
    Ok(Collected::new(posts, skipped))
}

#[async_trait]
impl Collector<RedditPost> for RedditJsonCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn variant(&self) -> CollectorVariant {
        CollectorVariant::RestScrape
    }

    async fn fetch(
        &self,
        _period: &Period,
        options: &CollectOptions,
    ) -> Result<Collected<RedditPost>, SourceError> {
        let (url, params) = self.listing_url(options)?;
        let response = fetch_with_retry(self.settings.retry, || {
            self.client.get(&url).query(&params)
        })
        .await?;
        let body = response.text().await?;

        let mut collected = parse_listing(&body, &self.endpoint, &self.name, Utc::now())?;
        if collected.skipped > 0 {
            tracing::debug!(
                source = %self.name,
                skipped = collected.skipped,
                "skipped listing children"
            );
        }
        collected.items.truncate(options.limit);
        Ok(collected)
    }

    async fn health_check(&self) -> Option<HealthVerdict> {
        let started = Instant::now();
        let url = join_url(&self.endpoint, "r/popular/top.json");
        let result = self
            .health_client
            .get(&url)
            .query(&[("limit", "1")])
            .send()
            .await
            .map_err(SourceError::from)
            .and_then(check_status);
        let latency = elapsed_ms(started);
        Some(match result {
            Ok(_) => HealthVerdict::healthy(latency),
            Err(e) => HealthVerdict::unhealthy(latency, e.to_string()),
        })
    }
}
