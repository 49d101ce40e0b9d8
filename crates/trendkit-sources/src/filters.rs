//! Pure selection helpers over collected items.

use std::collections::BTreeMap;

use trendkit_core::{RedditPost, TrendItem, TrendingRepo};

/// Items whose keywords (or identifier) contain any of `keywords`, case-insensitively.
///
/// An empty keyword list keeps everything.
#[must_use]
pub fn filter_by_keywords<T: TrendItem + Clone>(items: &[T], keywords: &[&str]) -> Vec<T> {
    if keywords.is_empty() {
        return items.to_vec();
    }
    let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    items
        .iter()
        .filter(|item| {
            let identifier = item.identifier().to_lowercase();
            let item_keywords: Vec<String> =
                item.keywords().iter().map(|k| k.to_lowercase()).collect();
            needles.iter().any(|needle| {
                identifier.contains(needle.as_str()) || item_keywords.iter().any(|k| k == needle)
            })
        })
        .cloned()
        .collect()
}

/// The `n` items with the highest `key`, highest first. Ties keep input order.
#[must_use]
pub fn top_n_by<T, K, F>(items: &[T], n: usize, key: F) -> Vec<T>
where
    T: Clone,
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| key(b).cmp(&key(a)));
    sorted.into_iter().take(n).cloned().collect()
}

/// Group repositories by primary language. Repositories without one land under `"unknown"`.
#[must_use]
pub fn partition_by_language(repos: &[TrendingRepo]) -> BTreeMap<String, Vec<TrendingRepo>> {
    let mut out: BTreeMap<String, Vec<TrendingRepo>> = BTreeMap::new();
    for repo in repos {
        let key = repo
            .language
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .map_or_else(|| "unknown".to_string(), str::to_lowercase);
        out.entry(key).or_default().push(repo.clone());
    }
    out
}

/// Posts from the given communities, matched case-insensitively.
#[must_use]
pub fn filter_by_subreddits(posts: &[RedditPost], subreddits: &[&str]) -> Vec<RedditPost> {
    posts
        .iter()
        .filter(|p| subreddits.iter().any(|s| s.eq_ignore_ascii_case(&p.subreddit)))
        .cloned()
        .collect()
}

/// Items whose popularity is at least `min`.
#[must_use]
pub fn min_popularity<T: TrendItem + Clone>(items: &[T], min: i64) -> Vec<T> {
    items
        .iter()
        .filter(|i| i.popularity() >= min)
        .cloned()
        .collect()
}
