//! Reddit RSS/Atom feed collector.
//!
//! Fetches one feed per community (or a single search feed when a query is
//! given), pausing `inter_request_delay` between feeds. A failing feed is
//! logged and skipped; the collection only fails when every feed fails.
//! Feeds carry no score, so posts keep their feed order and a zero score;
//! feeds are interleaved round-robin before the limit applies.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use trendkit_core::{CollectOptions, Collected, CollectorVariant, Period, RedditPost};

use crate::collector::{join_url, Collector, HttpSettings};
use crate::error::SourceError;
use crate::feed_parse::{parse_feed, FeedEntry};
use crate::recovery::{fetch_with_retry, sleep};

pub const DEFAULT_ENDPOINT: &str = "https://www.reddit.com";

pub struct RedditRssCollector {
    name: String,
    client: Client,
    settings: HttpSettings,
    endpoint: String,
    communities: Vec<String>,
}

/// Pull the post id out of a `/comments/{id}/` permalink.
fn id_from_link(link: &str) -> Option<String> {
    let mut parts = link.split('/');
    parts.find(|p| *p == "comments")?;
    parts.next().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Pull the community out of an `/r/{name}/` link.
fn community_from_link(link: &str) -> Option<String> {
    let mut parts = link.split('/');
    parts.find(|p| *p == "r")?;
    parts.next().filter(|s| !s.is_empty()).map(str::to_string)
}

fn to_post(
    entry: FeedEntry,
    feed_community: Option<&str>,
    source: &str,
    collected_at: DateTime<Utc>,
) -> Option<RedditPost> {
    let link = entry.link?;
    let title = entry.title.filter(|t| !t.is_empty())?;
    let id = entry
        .id
        .map(|raw| raw.trim_start_matches("t3_").to_string())
        .filter(|id| !id.is_empty() && !id.contains('/'))
        .or_else(|| id_from_link(&link))?;
    let subreddit = entry
        .category
        .or_else(|| community_from_link(&link))
        .or_else(|| feed_community.map(str::to_string))
        .unwrap_or_default();
    Some(RedditPost {
        id,
        title,
        subreddit,
        author: entry
            .author
            .map(|a| a.trim_start_matches("/u/").to_string()),
        score: 0,
        num_comments: 0,
        url: link,
        created_at: entry.published,
        collected_at,
        source: source.to_string(),
    })
}

impl RedditRssCollector {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(
        name: impl Into<String>,
        settings: HttpSettings,
        communities: Vec<String>,
    ) -> Result<Self, SourceError> {
        Self::with_endpoint(name, settings, communities, DEFAULT_ENDPOINT)
    }

    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn with_endpoint(
        name: impl Into<String>,
        settings: HttpSettings,
        communities: Vec<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            name: name.into(),
            client: settings.build_client(settings.request_timeout)?,
            settings,
            endpoint: endpoint.into(),
            communities,
        })
    }

    /// `(feed url, community)` pairs for this call.
    fn feed_urls(&self, options: &CollectOptions) -> Vec<(String, Option<String>)> {
        if let Some(query) = options.query.as_deref().filter(|q| !q.trim().is_empty()) {
            let encoded = utf8_percent_encode(query.trim(), NON_ALPHANUMERIC).to_string();
            return vec![(
                join_url(
                    &self.endpoint,
                    &format!("search.rss?q={encoded}&sort=top&t=week"),
                ),
                None,
            )];
        }
        let communities = match &options.communities {
            Some(subset) if !subset.is_empty() => subset,
            _ => &self.communities,
        };
        let limit = options.limit.clamp(1, 100);
        communities
            .iter()
            .map(|c| {
                (
                    join_url(
                        &self.endpoint,
                        &format!("r/{c}/top/.rss?t=week&limit={limit}"),
                    ),
                    Some(c.clone()),
                )
            })
            .collect()
    }

    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedEntry>, SourceError> {
        let response = fetch_with_retry(self.settings.retry, || self.client.get(url)).await?;
        let body = response.text().await?;
        parse_feed(&body, url)
    }
}

#[async_trait]
impl Collector<RedditPost> for RedditRssCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn variant(&self) -> CollectorVariant {
        CollectorVariant::Rss
    }

    async fn fetch(
        &self,
        _period: &Period,
        options: &CollectOptions,
    ) -> Result<Collected<RedditPost>, SourceError> {
        let feeds = self.feed_urls(options);
        if feeds.is_empty() {
            return Err(SourceError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: "no communities configured and no query given".to_string(),
            });
        }

        let collected_at = Utc::now();
        let mut per_feed = Vec::with_capacity(feeds.len());
        let mut seen = HashSet::new();
        let mut skipped = 0usize;
        let mut last_error = None;
        let mut succeeded = 0usize;

        for (i, (url, community)) in feeds.iter().enumerate() {
            if i > 0 {
                sleep(self.settings.inter_request_delay).await;
            }
            match self.fetch_feed(url).await {
                Ok(entries) => {
                    succeeded += 1;
                    let mut posts = Vec::with_capacity(entries.len());
                    for entry in entries {
                        match to_post(entry, community.as_deref(), &self.name, collected_at) {
                            Some(post) if seen.insert(post.id.clone()) => posts.push(post),
                            Some(_) => {}
                            None => skipped += 1,
                        }
                    }
                    per_feed.push(posts);
                }
                Err(e) => {
                    tracing::warn!(
                        source = %self.name,
                        community = community.as_deref().unwrap_or("search"),
                        error = %e,
                        "feed failed, skipping"
                    );
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(Collected::new(interleave(per_feed, options.limit), skipped))
    }
}

/// Round-robin merge of per-feed lists, stopping at `limit`.
fn interleave<T>(feeds: Vec<Vec<T>>, limit: usize) -> Vec<T> {
    let mut iters: Vec<_> = feeds.into_iter().map(Vec::into_iter).collect();
    let mut out = Vec::new();
    while out.len() < limit {
        let mut progressed = false;
        for iter in &mut iters {
            if out.len() == limit {
                break;
            }
            if let Some(item) = iter.next() {
                out.push(item);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    out
}
