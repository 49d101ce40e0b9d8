//! Upstream trend sources for trendkit.
//!
//! Collects trending repositories from the GitHub GraphQL API and an
//! unofficial trending endpoint, and community posts from Reddit's public JSON
//! listings and RSS/Atom feeds. Every collector implements [`Collector`] so the
//! fallback orchestrator can treat them interchangeably.
//!
//! The error-recovery primitives the collectors share (bounded retry with
//! jittered back-off, panic-safe fallbacks, lenient JSON parsing) live in
//! [`recovery`] and [`json`].

pub mod collector;
pub mod error;
pub mod filters;
pub mod github_graphql;
pub mod github_trending;
pub mod json;
pub mod reddit_json;
pub mod reddit_rss;
pub mod recovery;

mod feed_parse;
mod trending_html;

pub use collector::{Collector, HttpSettings};
pub use error::SourceError;
pub use github_graphql::GithubGraphqlCollector;
pub use github_trending::GithubTrendingCollector;
pub use json::{lenient_json_parse, safe_json_parse, safe_json_parse_as};
pub use reddit_json::RedditJsonCollector;
pub use reddit_rss::RedditRssCollector;
pub use recovery::{
    fetch_with_retry, retry_with_backoff, sleep, with_error_recovery, with_error_recovery_else,
    Recovered, RetryPolicy,
};
