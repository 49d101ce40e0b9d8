//! Official GitHub GraphQL API collector (authenticated).
//!
//! Searches for repositories created within the collection period, sorted by
//! stars. Stars accrued since creation stand in for stars gained in the
//! period because every returned repository is new in that window.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use trendkit_core::{
    CollectOptions, Collected, CollectorVariant, HealthVerdict, Period, TrendingRepo,
};

use crate::collector::{elapsed_ms, Collector, HttpSettings};
use crate::error::SourceError;
use crate::recovery::fetch_with_retry;

pub const DEFAULT_ENDPOINT: &str = "https://api.github.com/graphql";

/// GitHub caps `search(first:)` at 100.
const MAX_PAGE_SIZE: usize = 100;
const MIN_STARS: u32 = 5;

const SEARCH_QUERY: &str = r"
query TrendingRepos($q: String!, $first: Int!) {
  search(query: $q, type: REPOSITORY, first: $first) {
    nodes {
      ... on Repository {
        nameWithOwner
        description
        url
        stargazerCount
        forkCount
        primaryLanguage { name }
        repositoryTopics(first: 10) { nodes { topic { name } } }
      }
    }
  }
}";

const RATE_LIMIT_QUERY: &str = "{ rateLimit { remaining } }";

#[derive(Debug, Deserialize)]
struct GraphqlResponse<D> {
    data: Option<D>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: Option<SearchConnection>,
}

#[derive(Debug, Deserialize)]
struct SearchConnection {
    #[serde(default)]
    nodes: Vec<Option<RepoNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    name_with_owner: Option<String>,
    description: Option<String>,
    url: Option<String>,
    stargazer_count: Option<u64>,
    fork_count: Option<u64>,
    primary_language: Option<NamedNode>,
    repository_topics: Option<TopicConnection>,
}

#[derive(Debug, Deserialize)]
struct NamedNode {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopicConnection {
    #[serde(default)]
    nodes: Vec<Option<TopicNode>>,
}

#[derive(Debug, Deserialize)]
struct TopicNode {
    topic: Option<NamedNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitData {
    rate_limit: Option<RateLimit>,
}

#[derive(Debug, Deserialize)]
struct RateLimit {
    remaining: Option<u64>,
}

pub struct GithubGraphqlCollector {
    name: String,
    client: Client,
    health_client: Client,
    settings: HttpSettings,
    endpoint: String,
    token: Option<String>,
}

impl GithubGraphqlCollector {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP clients cannot be built.
    pub fn new(
        name: impl Into<String>,
        settings: HttpSettings,
        token: Option<String>,
    ) -> Result<Self, SourceError> {
        Self::with_endpoint(name, settings, token, DEFAULT_ENDPOINT)
    }

    /// Point the collector at a different GraphQL endpoint (GHES, tests).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP clients cannot be built.
    pub fn with_endpoint(
        name: impl Into<String>,
        settings: HttpSettings,
        token: Option<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let client = settings.build_client(settings.request_timeout)?;
        let health_client = settings.build_client(settings.health_timeout)?;
        Ok(Self {
            name: name.into(),
            client,
            health_client,
            settings,
            endpoint: endpoint.into(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn token(&self) -> Result<&str, SourceError> {
        self.token
            .as_deref()
            .ok_or_else(|| SourceError::MissingCredentials("GITHUB_TOKEN".to_string()))
    }

    async fn post_query<D: serde::de::DeserializeOwned>(
        &self,
        client: &Client,
        body: &serde_json::Value,
        retry: crate::recovery::RetryPolicy,
    ) -> Result<D, SourceError> {
        let token = self.token()?;
        let response = fetch_with_retry(retry, || {
            client
                .post(&self.endpoint)
                .bearer_auth(token)
                .json(body)
        })
        .await?;

        let text = response.text().await?;
        let parsed: GraphqlResponse<D> =
            serde_json::from_str(&text).map_err(|e| SourceError::Deserialize {
                context: self.endpoint.clone(),
                source: e,
            })?;

        resolve_response(parsed, &self.endpoint)
    }
}

/// Partial errors next to `data` are logged and the data is kept; errors
/// without data fail the attempt. `RATE_LIMITED` always fails.
fn resolve_response<D>(parsed: GraphqlResponse<D>, endpoint: &str) -> Result<D, SourceError> {
    if parsed
        .errors
        .iter()
        .any(|e| e.kind.as_deref() == Some("RATE_LIMITED"))
    {
        return Err(SourceError::RateLimited {
            url: endpoint.to_string(),
            retry_after_secs: None,
        });
    }

    match parsed.data {
        Some(data) => {
            if !parsed.errors.is_empty() {
                tracing::warn!(
                    endpoint,
                    errors = parsed.errors.len(),
                    first = parsed.errors[0].message.as_deref().unwrap_or("unspecified"),
                    "GraphQL returned partial errors, keeping data"
                );
            }
            Ok(data)
        }
        None => match parsed.errors.into_iter().next() {
            Some(err) => Err(SourceError::Api(
                err.message
                    .unwrap_or_else(|| "unspecified GraphQL error".to_string()),
            )),
            None => Err(SourceError::Unparseable {
                context: format!("{endpoint}: response without data"),
            }),
        },
    }
}

/// Build the repository search string for a period.
pub(crate) fn search_string(period: &Period, options: &CollectOptions) -> String {
    let mut q = format!(
        "created:{}..{} sort:stars-desc stars:>={MIN_STARS}",
        period.start.format("%Y-%m-%d"),
        period.end.format("%Y-%m-%d")
    );
    if let Some(language) = options.language.as_deref().filter(|l| !l.is_empty()) {
        q.push_str(" language:");
        q.push_str(language);
    }
    if let Some(query) = options.query.as_deref().filter(|s| !s.is_empty()) {
        q.push(' ');
        q.push_str(query);
    }
    q
}

fn to_repo(node: RepoNode, source: &str) -> Option<TrendingRepo> {
    let full_name = node.name_with_owner?;
    let (owner, name) = TrendingRepo::split_full_name(&full_name)?;
    let stars = node.stargazer_count.unwrap_or(0);
    let topics = node
        .repository_topics
        .map(|t| {
            t.nodes
                .into_iter()
                .flatten()
                .filter_map(|n| n.topic.and_then(|topic| topic.name))
                .collect()
        })
        .unwrap_or_default();
    Some(TrendingRepo {
        url: node
            .url
            .unwrap_or_else(|| format!("https://github.com/{owner}/{name}")),
        full_name: format!("{owner}/{name}"),
        owner,
        name,
        description: node.description.filter(|d| !d.trim().is_empty()),
        language: node.primary_language.and_then(|l| l.name),
        stars,
        stars_gained: stars,
        forks: node.fork_count.unwrap_or(0),
        topics,
        collected_at: Utc::now(),
        source: source.to_string(),
    })
}

#[async_trait]
impl Collector<TrendingRepo> for GithubGraphqlCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn variant(&self) -> CollectorVariant {
        CollectorVariant::Graphql
    }

    async fn fetch(
        &self,
        period: &Period,
        options: &CollectOptions,
    ) -> Result<Collected<TrendingRepo>, SourceError> {
        let first = options.limit.clamp(1, MAX_PAGE_SIZE);
        let body = json!({
            "query": SEARCH_QUERY,
            "variables": { "q": search_string(period, options), "first": first },
        });
        let data: SearchData = self
            .post_query(&self.client, &body, self.settings.retry)
            .await?;

        let nodes = data.search.map(|s| s.nodes).unwrap_or_default();
        let mut skipped = 0usize;
        let mut repos = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node.and_then(|n| to_repo(n, &self.name)) {
                Some(repo) => repos.push(repo),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!(
                source = %self.name,
                skipped,
                "skipped incomplete repository nodes"
            );
        }
        repos.truncate(options.limit);
        Ok(Collected::new(repos, skipped))
    }

    async fn health_check(&self) -> Option<HealthVerdict> {
        let started = Instant::now();
        if self.token.is_none() {
            return Some(HealthVerdict::unhealthy(0, "GITHUB_TOKEN not configured"));
        }
        let body = json!({ "query": RATE_LIMIT_QUERY });
        let result: Result<RateLimitData, SourceError> = self
            .post_query(
                &self.health_client,
                &body,
                crate::recovery::RetryPolicy::immediate(1),
            )
            .await;
        let latency = elapsed_ms(started);
        Some(match result {
            Ok(data) => match data.rate_limit.and_then(|r| r.remaining) {
                Some(remaining) if remaining > 0 => HealthVerdict::healthy(latency),
                Some(_) => HealthVerdict::unhealthy(latency, "rate limit exhausted"),
                None => HealthVerdict::unhealthy(latency, "rate limit not reported"),
            },
            Err(e) => HealthVerdict::unhealthy(latency, e.to_string()),
        })
    }
}
