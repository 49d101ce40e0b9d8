//! Collected trend items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Common view over collected items used by dedup, ranking and topic extraction.
pub trait TrendItem {
    /// Stable identifier used for deduplication within a category.
    fn identifier(&self) -> &str;

    fn collected_at(&self) -> DateTime<Utc>;

    /// Primary ranking key. Higher is more popular.
    fn popularity(&self) -> i64;

    /// Secondary ranking key, used to break ties on [`TrendItem::popularity`].
    fn secondary_popularity(&self) -> i64 {
        0
    }

    /// Raw tags/keywords for topic extraction. Not normalized.
    fn keywords(&self) -> Vec<String>;
}

/// One externally observed repository signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingRepo {
    /// `owner/name`.
    pub full_name: String,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub stars: u64,
    /// Stars gained over the collection period.
    pub stars_gained: u64,
    pub forks: u64,
    #[serde(default)]
    pub topics: Vec<String>,
    pub url: String,
    pub collected_at: DateTime<Utc>,
    pub source: String,
}

impl TrendingRepo {
    /// Split an `owner/name` string. Returns `None` unless both halves are non-empty.
    #[must_use]
    pub fn split_full_name(full_name: &str) -> Option<(String, String)> {
        let (owner, name) = full_name.trim().trim_matches('/').split_once('/')?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some((owner.to_string(), name.to_string()))
    }
}

impl TrendItem for TrendingRepo {
    fn identifier(&self) -> &str {
        &self.full_name
    }

    fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    fn popularity(&self) -> i64 {
        i64::try_from(self.stars_gained).unwrap_or(i64::MAX)
    }

    fn secondary_popularity(&self) -> i64 {
        i64::try_from(self.stars).unwrap_or(i64::MAX)
    }

    fn keywords(&self) -> Vec<String> {
        let mut out = self.topics.clone();
        if let Some(language) = &self.language {
            out.push(language.clone());
        }
        out
    }
}

/// One externally observed community post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub subreddit: String,
    pub author: Option<String>,
    pub score: i64,
    pub num_comments: u64,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
    pub source: String,
}

const TITLE_STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "you", "your", "this", "that", "from", "are", "was", "what",
    "how", "why", "who", "when", "where", "have", "has", "not", "but", "can", "all", "any", "our",
    "out", "just", "about", "into", "new", "now", "get", "got", "its", "it's", "use", "using",
    "does", "don't", "i'm", "been", "will", "more", "than", "then", "they", "them", "their",
    "there", "here", "one", "two", "like", "some", "want", "need", "make", "made", "way", "should",
    "would", "could", "after", "before", "over", "under", "via", "vs",
];

impl RedditPost {
    /// Lowercased title words of at least three characters, minus stopwords.
    #[must_use]
    pub fn title_keywords(&self) -> Vec<String> {
        self.title
            .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#' || c == '\''))
            .map(|w| w.trim_matches('\'').to_lowercase())
            .filter(|w| w.chars().count() >= 3)
            .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
            .filter(|w| !TITLE_STOPWORDS.contains(&w.as_str()))
            .collect()
    }
}

impl TrendItem for RedditPost {
    fn identifier(&self) -> &str {
        &self.id
    }

    fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    fn popularity(&self) -> i64 {
        self.score
    }

    fn secondary_popularity(&self) -> i64 {
        i64::try_from(self.num_comments).unwrap_or(i64::MAX)
    }

    fn keywords(&self) -> Vec<String> {
        let mut out = self.title_keywords();
        out.push(self.subreddit.clone());
        out
    }
}
