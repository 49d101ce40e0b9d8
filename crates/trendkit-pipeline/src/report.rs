//! Pure report-building steps: dedup, ranking, topic extraction, digest.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

use trendkit_core::{
    CategoryProvenance, EmergingTopic, RedditPost, TrendItem, TrendingRepo, WeeklyTrendReport,
};

/// Thresholds for emerging-topic detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmergingConfig {
    /// Minimum occurrences this week.
    pub min_count: u32,
    /// Required multiple of the historical average.
    pub growth_ratio: f64,
    /// How many previous weeks form the baseline.
    pub history_weeks: usize,
    pub max_topics: usize,
}

impl Default for EmergingConfig {
    fn default() -> Self {
        Self {
            min_count: 3,
            growth_ratio: 2.0,
            history_weeks: 4,
            max_topics: 20,
        }
    }
}

/// One entry per identifier, keeping the instance with the latest
/// `collected_at`. First-seen order is preserved.
#[must_use]
pub fn dedupe_latest<T: TrendItem>(items: Vec<T>) -> Vec<T> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        match index.get(item.identifier()) {
            Some(&pos) => {
                if item.collected_at() > out[pos].collected_at() {
                    out[pos] = item;
                }
            }
            None => {
                index.insert(item.identifier().to_string(), out.len());
                out.push(item);
            }
        }
    }
    out
}

/// Sort by popularity, then the secondary key, both descending. Identifier breaks ties.
pub fn rank<T: TrendItem>(items: &mut [T]) {
    items.sort_by(|a, b| {
        b.popularity()
            .cmp(&a.popularity())
            .then_with(|| b.secondary_popularity().cmp(&a.secondary_popularity()))
            .then_with(|| a.identifier().cmp(b.identifier()))
    });
}

/// Dedupe, rank and keep the top `n`.
#[must_use]
pub fn select_top<T: TrendItem>(items: Vec<T>, n: usize) -> Vec<T> {
    let mut items = dedupe_latest(items);
    rank(&mut items);
    items.truncate(n);
    items
}

/// Case-fold and separator normalization; no stemming.
///
/// `"#Machine_Learning"` and `"machine learning"` both become `"machine-learning"`.
/// Returns `None` for input that normalizes to nothing.
#[must_use]
pub fn normalize_topic(raw: &str) -> Option<String> {
    let lowered = raw.trim().trim_start_matches('#').to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        let c = if c == '_' || c.is_whitespace() { '-' } else { c };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    while out.ends_with('-') {
        out.pop();
    }
    (!out.is_empty()).then_some(out)
}

/// Topic frequencies across both categories. Each item counts a topic once.
#[must_use]
pub fn count_topics(repos: &[TrendingRepo], posts: &[RedditPost]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    let keyword_sets = repos
        .iter()
        .map(TrendItem::keywords)
        .chain(posts.iter().map(TrendItem::keywords));
    for keywords in keyword_sets {
        let distinct: BTreeSet<String> = keywords
            .iter()
            .filter_map(|k| normalize_topic(k))
            .collect();
        for topic in distinct {
            *counts.entry(topic).or_insert(0u32) += 1;
        }
    }
    counts
}

/// Topics whose count this week clears `min_count` and `growth_ratio` times
/// the average over `history`. Weeks without a stored report are left out of
/// the average; with no history at all the average is 0.
#[must_use]
pub fn detect_emerging(
    current: &BTreeMap<String, u32>,
    history: &[BTreeMap<String, u32>],
    config: &EmergingConfig,
) -> Vec<EmergingTopic> {
    #[allow(clippy::cast_precision_loss)]
    let weeks = history.len() as f64;

    let mut emerging: Vec<EmergingTopic> = current
        .iter()
        .filter_map(|(topic, &count)| {
            let previous_average = if history.is_empty() {
                0.0
            } else {
                let total: u32 = history.iter().filter_map(|h| h.get(topic)).sum();
                f64::from(total) / weeks
            };
            let count_f = f64::from(count);
            if count < config.min_count || count_f < config.growth_ratio * previous_average {
                return None;
            }
            let growth = if previous_average > 0.0 {
                count_f / previous_average
            } else {
                count_f
            };
            Some(EmergingTopic {
                topic: topic.clone(),
                count,
                previous_average,
                growth,
            })
        })
        .collect();

    emerging.sort_by(|a, b| {
        b.growth
            .total_cmp(&a.growth)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.topic.cmp(&b.topic))
    });
    emerging.truncate(config.max_topics);
    emerging
}

fn provenance_line(p: &CategoryProvenance) -> String {
    match &p.source {
        Some(source) if p.skipped_items > 0 => format!(
            "{}: {} items from {source} ({} skipped)",
            p.category, p.item_count, p.skipped_items
        ),
        Some(source) => format!("{}: {} items from {source}", p.category, p.item_count),
        None => format!(
            "{}: no data ({})",
            p.category,
            p.gap_reason.as_deref().unwrap_or("all sources failed")
        ),
    }
}

/// Plain-text digest for operators.
#[must_use]
pub fn summarize_report(report: &WeeklyTrendReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Weekly trends {} ({} to {})",
        report.week, report.period_start, report.period_end
    );
    for p in &report.provenance {
        let _ = writeln!(out, "  {}", provenance_line(p));
    }

    if !report.repos.is_empty() {
        let _ = writeln!(out, "\nTop repositories:");
        for (i, repo) in report.repos.iter().take(10).enumerate() {
            let language = repo.language.as_deref().unwrap_or("n/a");
            let _ = writeln!(
                out,
                "  {:>2}. {} +{} stars ({} total, {language})",
                i + 1,
                repo.full_name,
                repo.stars_gained,
                repo.stars
            );
        }
    }

    if !report.posts.is_empty() {
        let _ = writeln!(out, "\nTop posts:");
        for (i, post) in report.posts.iter().take(10).enumerate() {
            let _ = writeln!(
                out,
                "  {:>2}. [r/{}] {} ({} points, {} comments)",
                i + 1,
                post.subreddit,
                post.title,
                post.score,
                post.num_comments
            );
        }
    }

    if report.emerging_topics.is_empty() {
        let _ = writeln!(out, "\nNo emerging topics this week.");
    } else {
        let _ = writeln!(out, "\nEmerging topics:");
        for topic in &report.emerging_topics {
            let _ = writeln!(
                out,
                "  - {} ({} mentions, {:.1}x vs {:.1} avg)",
                topic.topic, topic.count, topic.growth, topic.previous_average
            );
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
#[path = "report_test.rs"]
mod tests;
