//! Outcome types for collection attempts.

use serde::{Deserialize, Serialize};

/// Logical data need served by a priority-ordered list of sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Repos,
    Posts,
}

impl Category {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Repos => "repos",
            Category::Posts => "posts",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repos" => Ok(Category::Repos),
            "posts" => Ok(Category::Posts),
            other => Err(format!("unknown category \"{other}\"")),
        }
    }
}

/// Closed set of collector shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorVariant {
    Graphql,
    RestScrape,
    Rss,
    Snapshot,
}

impl CollectorVariant {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CollectorVariant::Graphql => "graphql",
            CollectorVariant::RestScrape => "rest_scrape",
            CollectorVariant::Rss => "rss",
            CollectorVariant::Snapshot => "snapshot",
        }
    }
}

impl std::fmt::Display for CollectorVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a failed collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network failure, timeout, 5xx or 429 that survived all retries.
    Transient,
    /// 4xx other than 429, or an upstream-reported application error.
    Permanent,
    /// Payload could not be interpreted even leniently.
    Parse,
    /// Source cannot run: missing credentials or configuration.
    Unavailable,
    /// Skipped because the health check reported the source unhealthy.
    Unhealthy,
    /// Every configured source for the category failed.
    Exhausted,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Parse => "parse",
            ErrorClass::Unavailable => "unavailable",
            ErrorClass::Unhealthy => "unhealthy",
            ErrorClass::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

/// Per-call options passed to every collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectOptions {
    pub limit: usize,
    /// General search query; overrides community targeting when set.
    pub query: Option<String>,
    /// Restrict community-based collectors to this subset.
    pub communities: Option<Vec<String>>,
    pub language: Option<String>,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            query: None,
            communities: None,
            language: None,
        }
    }
}

/// Raw output of a successful fetch, before timing and provenance are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<T> {
    pub items: Vec<T>,
    /// Upstream records dropped because required fields were missing or invalid.
    pub skipped: usize,
}

impl<T> Collected<T> {
    #[must_use]
    pub fn new(items: Vec<T>, skipped: usize) -> Self {
        Self { items, skipped }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSuccess<T> {
    pub source: String,
    pub items: Vec<T>,
    pub latency_ms: u64,
    pub skipped_items: usize,
}

/// One source's contribution to an aggregated failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttempt {
    pub source: String,
    pub class: ErrorClass,
    pub message: String,
    /// `true` when the source was skipped by its health check rather than attempted.
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionFailure {
    /// The failing source, or a `+`-joined list of all sources on exhaustion.
    pub source: String,
    pub class: ErrorClass,
    pub message: String,
    #[serde(default)]
    pub attempts: Vec<SourceAttempt>,
}

/// Tagged outcome of one collection attempt. Exactly one variant is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectionResult<T> {
    Success(CollectionSuccess<T>),
    Failure(CollectionFailure),
}

impl<T> CollectionResult<T> {
    #[must_use]
    pub fn success(source: impl Into<String>, collected: Collected<T>, latency_ms: u64) -> Self {
        CollectionResult::Success(CollectionSuccess {
            source: source.into(),
            items: collected.items,
            latency_ms,
            skipped_items: collected.skipped,
        })
    }

    #[must_use]
    pub fn failure(
        source: impl Into<String>,
        class: ErrorClass,
        message: impl Into<String>,
    ) -> Self {
        CollectionResult::Failure(CollectionFailure {
            source: source.into(),
            class,
            message: message.into(),
            attempts: Vec::new(),
        })
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, CollectionResult::Success(_))
    }

    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            CollectionResult::Success(s) => &s.source,
            CollectionResult::Failure(f) => &f.source,
        }
    }

    /// Items for a success, empty for a failure.
    #[must_use]
    pub fn items(&self) -> &[T] {
        match self {
            CollectionResult::Success(s) => &s.items,
            CollectionResult::Failure(_) => &[],
        }
    }

    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        match self {
            CollectionResult::Success(s) => s.items,
            CollectionResult::Failure(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn failure_ref(&self) -> Option<&CollectionFailure> {
        match self {
            CollectionResult::Success(_) => None,
            CollectionResult::Failure(f) => Some(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_never_exposes_items() {
        let result: CollectionResult<u32> =
            CollectionResult::failure("github_graphql", ErrorClass::Transient, "503");
        assert!(!result.is_success());
        assert!(result.items().is_empty());
        assert_eq!(result.source(), "github_graphql");
        assert!(result.into_items().is_empty());
    }

    #[test]
    fn success_carries_skipped_count_and_latency() {
        let result = CollectionResult::success("reddit_rss", Collected::new(vec![1, 2, 3], 2), 40);
        match result {
            CollectionResult::Success(s) => {
                assert_eq!(s.items, vec![1, 2, 3]);
                assert_eq!(s.skipped_items, 2);
                assert_eq!(s.latency_ms, 40);
            }
            CollectionResult::Failure(f) => panic!("unexpected failure: {f:?}"),
        }
    }

    #[test]
    fn result_serializes_with_outcome_tag() {
        let result: CollectionResult<u32> =
            CollectionResult::failure("reddit_json", ErrorClass::Parse, "bad listing");
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["class"], "parse");
    }

    #[test]
    fn category_round_trips_through_str() {
        assert_eq!("repos".parse::<Category>(), Ok(Category::Repos));
        assert_eq!(Category::Posts.to_string(), "posts");
        assert!("videos".parse::<Category>().is_err());
    }
}
