//! Unofficial GitHub trending collector.
//!
//! Reads a community trending API that returns a JSON array of repositories.
//! The shape varies between mirrors, so every element goes through a raw
//! struct whose fields are all optional and aliased. When the endpoint serves
//! the github.com/trending HTML page instead, the page is scraped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use trendkit_core::{CollectOptions, Collected, CollectorVariant, Period, TrendingRepo};

use crate::collector::{Collector, HttpSettings};
use crate::error::SourceError;
use crate::json::lenient_json_parse;
use crate::recovery::fetch_with_retry;
use crate::trending_html::parse_trending_html;

pub const DEFAULT_ENDPOINT: &str = "https://api.gitterapp.com/repositories";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTrendingRepo {
    #[serde(alias = "fullName", alias = "repo")]
    full_name: Option<String>,
    #[serde(alias = "author", alias = "username")]
    owner: Option<Value>,
    #[serde(alias = "repositoryName", alias = "repo_name")]
    name: Option<String>,
    description: Option<String>,
    language: Option<String>,
    #[serde(alias = "totalStars", alias = "stargazers_count")]
    stars: Option<Value>,
    #[serde(
        alias = "currentPeriodStars",
        alias = "starsSince",
        alias = "stars_since",
        alias = "added_stars"
    )]
    stars_gained: Option<Value>,
    #[serde(alias = "forks_count")]
    forks: Option<Value>,
    url: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
}

/// Read a count that may be a number, `"1,234"`, or `"1.2k"`.
pub(crate) fn loose_count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(f64_to_u64))
            .unwrap_or(0),
        Some(Value::String(s)) => parse_count_text(s),
        _ => 0,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn f64_to_u64(f: f64) -> u64 {
    f.round() as u64
}

fn parse_count_text(s: &str) -> u64 {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' '))
        .collect::<String>()
        .to_lowercase();
    let (digits, multiplier) = match cleaned.strip_suffix('k') {
        Some(rest) => (rest, 1_000.0),
        None => match cleaned.strip_suffix('m') {
            Some(rest) => (rest, 1_000_000.0),
            None => (cleaned.as_str(), 1.0),
        },
    };
    let numeric: String = digits
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    numeric
        .parse::<f64>()
        .ok()
        .filter(|f| *f >= 0.0)
        .map_or(0, |f| f64_to_u64(f * multiplier))
}

fn owner_login(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("login")
            .or_else(|| map.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn to_repo(
    raw: RawTrendingRepo,
    source: &str,
    collected_at: DateTime<Utc>,
) -> Option<TrendingRepo> {
    let full_name = match (&raw.full_name, owner_login(raw.owner.as_ref()), &raw.name) {
        (Some(full), _, _) if full.contains('/') => full.clone(),
        (_, Some(owner), Some(name)) => format!("{owner}/{name}"),
        _ => return None,
    };
    let (owner, name) = TrendingRepo::split_full_name(&full_name)?;
    Some(TrendingRepo {
        full_name: format!("{owner}/{name}"),
        url: raw
            .url
            .filter(|u| u.starts_with("http"))
            .unwrap_or_else(|| format!("https://github.com/{owner}/{name}")),
        owner,
        name,
        description: raw.description.filter(|d| !d.trim().is_empty()),
        language: raw.language.filter(|l| !l.trim().is_empty()),
        stars: loose_count(raw.stars.as_ref()),
        stars_gained: loose_count(raw.stars_gained.as_ref()),
        forks: loose_count(raw.forks.as_ref()),
        topics: raw.topics,
        collected_at,
        source: source.to_string(),
    })
}

/// Interpret a trending payload (JSON array, wrapped JSON, or HTML page).
///
/// # Errors
///
/// Returns [`SourceError::Unparseable`] when the body is neither.
pub(crate) fn parse_trending_body(
    body: &str,
    source: &str,
    collected_at: DateTime<Utc>,
) -> Result<Collected<TrendingRepo>, SourceError> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        return Ok(parse_trending_html(body, source, collected_at));
    }

    let value = lenient_json_parse(body).ok_or_else(|| SourceError::Unparseable {
        context: format!("{source}: trending payload"),
    })?;
    let elements = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match ["items", "data", "repositories"]
            .iter()
            .find_map(|k| map.remove(*k))
        {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SourceError::Unparseable {
                    context: format!("{source}: object without a repository array"),
                })
            }
        },
        _ => {
            return Err(SourceError::Unparseable {
                context: format!("{source}: unexpected JSON shape"),
            })
        }
    };

    let mut repos = Vec::with_capacity(elements.len());
    let mut skipped = 0usize;
    for element in elements {
        let repo = serde_json::from_value::<RawTrendingRepo>(element)
            .ok()
            .and_then(|raw| to_repo(raw, source, collected_at));
        match repo {
            Some(r) => repos.push(r),
            None => skipped += 1,
        }
    }
    Ok(Collected::new(repos, skipped))
}

pub struct GithubTrendingCollector {
    name: String,
    client: Client,
    settings: HttpSettings,
    endpoint: String,
}

impl GithubTrendingCollector {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(name: impl Into<String>, settings: HttpSettings) -> Result<Self, SourceError> {
        Self::with_endpoint(name, settings, DEFAULT_ENDPOINT)
    }

    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built, or
    /// [`SourceError::InvalidEndpoint`] if `endpoint` is not a URL.
    pub fn with_endpoint(
        name: impl Into<String>,
        settings: HttpSettings,
        endpoint: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let endpoint = endpoint.into();
        if let Err(e) = reqwest::Url::parse(&endpoint) {
            return Err(SourceError::InvalidEndpoint {
                endpoint,
                reason: e.to_string(),
            });
        }
        Ok(Self {
            name: name.into(),
            client: settings.build_client(settings.request_timeout)?,
            settings,
            endpoint,
        })
    }
}

#[async_trait]
impl Collector<TrendingRepo> for GithubTrendingCollector {
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
    ) -> Result<Collected<TrendingRepo>, SourceError> {
        let mut params: Vec<(&str, String)> = vec![("since", "weekly".to_string())];
        if let Some(language) = options.language.as_deref().filter(|l| !l.is_empty()) {
            params.push(("language", language.to_lowercase()));
        }

        let response = fetch_with_retry(self.settings.retry, || {
            self.client.get(&self.endpoint).query(&params)
        })
        .await?;
        let body = response.text().await?;

        let mut collected = parse_trending_body(&body, &self.name, Utc::now())?;
        if collected.skipped > 0 {
            tracing::debug!(
                source = %self.name,
                skipped = collected.skipped,
                "skipped trending entries missing owner/name"
            );
        }
        collected
            .items
            .sort_by(|a, b| b.stars_gained.cmp(&a.stars_gained));
        collected.items.truncate(options.limit);
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_counts() {
        assert_eq!(loose_count(Some(&json!(42))), 42);
        assert_eq!(loose_count(Some(&json!("1,234"))), 1_234);
        assert_eq!(loose_count(Some(&json!("1.2k"))), 1_200);
        assert_eq!(loose_count(Some(&json!("312 stars this week"))), 312);
        assert_eq!(loose_count(Some(&json!(null))), 0);
        assert_eq!(loose_count(None), 0);
    }

    #[test]
    fn parses_aliased_fields_and_counts_skips() {
        let body = r#"[
            {"author":"astral-sh","name":"uv","stars":"41,532","currentPeriodStars":2310,"forks":1204,"language":"Rust"},
            {"username":"tokio-rs","repositoryName":"axum","totalStars":19000,"starsSince":"450"},
            {"description":"no owner or name"},
        ]"#;
        let out = parse_trending_body(body, "github_trending", Utc::now()).unwrap();
        assert_eq!(out.skipped, 1);
        assert_eq!(out.items.len(), 2);
        assert_eq!(out.items[0].full_name, "astral-sh/uv");
        assert_eq!(out.items[0].stars, 41_532);
        assert_eq!(out.items[0].stars_gained, 2_310);
        assert_eq!(out.items[1].full_name, "tokio-rs/axum");
        assert_eq!(out.items[1].stars_gained, 450);
        assert_eq!(out.items[1].url, "https://github.com/tokio-rs/axum");
    }

    #[test]
    fn accepts_wrapped_array_and_owner_objects() {
        let body = r#"{"items":[{"owner":{"login":"rust-lang"},"name":"rust","stars":100}]}"#;
        let out = parse_trending_body(body, "github_trending", Utc::now()).unwrap();
        assert_eq!(out.items[0].full_name, "rust-lang/rust");
    }

    #[test]
    fn non_json_non_html_is_unparseable() {
        let err = parse_trending_body("rate limited, try later", "github_trending", Utc::now())
            .unwrap_err();
        assert!(matches!(err, SourceError::Unparseable { .. }));
    }

    #[test]
    fn rejects_malformed_endpoint() {
        let err =
            GithubTrendingCollector::with_endpoint("t", HttpSettings::for_tests(1), "not a url")
                .err()
                .expect("invalid endpoint");
        assert!(matches!(err, SourceError::InvalidEndpoint { .. }));
    }
}
