//! Source priority configuration (`config/sources.yaml`).
//!
//! Each category lists its sources in priority order. The order is used as-is
//! by the fallback orchestrator and never changes during a run.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collection::Category;
use crate::{ConfigError, MAX_WEEK_SPAN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    GithubGraphql,
    GithubTrending,
    RedditJson,
    RedditRss,
    Snapshot,
}

impl SourceKind {
    /// Whether this kind can serve `category`.
    #[must_use]
    pub fn serves(self, category: Category) -> bool {
        match self {
            SourceKind::GithubGraphql | SourceKind::GithubTrending => category == Category::Repos,
            SourceKind::RedditJson | SourceKind::RedditRss => category == Category::Posts,
            SourceKind::Snapshot => true,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::GithubGraphql => "github_graphql",
            SourceKind::GithubTrending => "github_trending",
            SourceKind::RedditJson => "reddit_json",
            SourceKind::RedditRss => "reddit_rss",
            SourceKind::Snapshot => "snapshot",
        };
        f.write_str(s)
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Override for the upstream base URL.
    pub endpoint: Option<String>,
    /// Communities (subreddits) for community-based collectors.
    #[serde(default)]
    pub communities: Vec<String>,
    pub query: Option<String>,
    pub language: Option<String>,
    pub limit: Option<usize>,
    /// Snapshot look-back in weeks.
    pub lookback_weeks: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesFile {
    #[serde(default)]
    pub repos: Vec<SourceConfig>,
    #[serde(default)]
    pub posts: Vec<SourceConfig>,
}

impl SourcesFile {
    /// Enabled sources for `category`, in priority order.
    #[must_use]
    pub fn enabled(&self, category: Category) -> Vec<&SourceConfig> {
        self.for_category(category)
            .iter()
            .filter(|s| s.enabled)
            .collect()
    }

    #[must_use]
    pub fn for_category(&self, category: Category) -> &[SourceConfig] {
        match category {
            Category::Repos => &self.repos,
            Category::Posts => &self.posts,
        }
    }
}

/// Load and validate the sources configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_sources(path: &Path) -> Result<SourcesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SourcesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_sources(&content)
}

/// Parse and validate sources YAML already in memory.
///
/// # Errors
///
/// Returns `ConfigError` on malformed YAML or failed validation.
pub fn parse_sources(content: &str) -> Result<SourcesFile, ConfigError> {
    let file: SourcesFile = serde_yaml::from_str(content)?;
    validate_sources(&file)?;
    Ok(file)
}

fn validate_sources(file: &SourcesFile) -> Result<(), ConfigError> {
    let mut seen_names = HashSet::new();

    for category in [Category::Repos, Category::Posts] {
        let sources = file.for_category(category);
        for source in sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{category} source names must be non-empty"
                )));
            }
            if !seen_names.insert(source.name.to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate source name: '{}'",
                    source.name
                )));
            }
            if !source.kind.serves(category) {
                return Err(ConfigError::Validation(format!(
                    "source '{}' of kind {} cannot serve category {category}",
                    source.name, source.kind
                )));
            }
            if source.lookback_weeks.is_some_and(|w| w > MAX_WEEK_SPAN) {
                return Err(ConfigError::Validation(format!(
                    "source '{}' lookback_weeks must be at most {MAX_WEEK_SPAN}",
                    source.name
                )));
            }
            if source.limit == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "source '{}' has limit 0",
                    source.name
                )));
            }
        }

        if !sources.iter().any(|s| s.enabled) {
            return Err(ConfigError::Validation(format!(
                "category {category} has no enabled sources"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r"
repos:
  - name: github_graphql
    kind: github_graphql
  - name: github_trending
    kind: github_trending
    endpoint: https://trending.example.com/repositories
  - name: repos_snapshot
    kind: snapshot
    lookback_weeks: 4
posts:
  - name: reddit_json
    kind: reddit_json
    communities: [rust, programming]
  - name: reddit_rss
    kind: reddit_rss
    enabled: false
    communities: [rust]
  - name: posts_snapshot
    kind: snapshot
";

    #[test]
    fn parses_priority_order_and_defaults() {
        let file = parse_sources(VALID).expect("valid sources");
        let repos: Vec<&str> = file
            .enabled(Category::Repos)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(repos, vec!["github_graphql", "github_trending", "repos_snapshot"]);
        assert!(file.repos[0].enabled, "enabled defaults to true");
        assert_eq!(file.repos[2].lookback_weeks, Some(4));

        let posts: Vec<&str> = file
            .enabled(Category::Posts)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(posts, vec!["reddit_json", "posts_snapshot"]);
    }

    #[test]
    fn rejects_kind_in_wrong_category() {
        let yaml = r"
repos:
  - name: reddit_json
    kind: reddit_json
posts:
  - name: reddit_rss
    kind: reddit_rss
";
        let err = parse_sources(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("cannot serve")));
    }

    #[test]
    fn rejects_oversized_lookback() {
        let yaml = r"
repos:
  - name: repos_snapshot
    kind: snapshot
    lookback_weeks: 20000000
posts:
  - name: reddit_rss
    kind: reddit_rss
";
        let err = parse_sources(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("lookback_weeks")));
    }

    #[test]
    fn rejects_duplicate_names_across_categories() {
        let yaml = r"
repos:
  - name: cache
    kind: snapshot
posts:
  - name: Cache
    kind: snapshot
";
        let err = parse_sources(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn rejects_category_without_enabled_sources() {
        let yaml = r"
repos:
  - name: github_graphql
    kind: github_graphql
    enabled: false
posts:
  - name: reddit_rss
    kind: reddit_rss
";
        let err = parse_sources(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("no enabled sources")));
    }

    #[test]
    fn rejects_unknown_kind() {
        let yaml = r"
repos:
  - name: gitlab
    kind: gitlab_api
posts: []
";
        assert!(matches!(
            parse_sources(yaml),
            Err(ConfigError::SourcesFileParse(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_sources(Path::new("/nonexistent/sources.yaml")).unwrap_err();
        assert!(
            matches!(err, ConfigError::SourcesFileIo { ref path, .. } if path.contains("nonexistent"))
        );
    }
}
