//! Builds each category's priority-ordered collector list from `sources.yaml`.

use std::sync::Arc;

use async_trait::async_trait;
use trendkit_core::{
    Category, CollectOptions, Collected, CollectorVariant, ConfigError, HealthVerdict, Period,
    RedditPost, SourceConfig, SourceKind, SourcesFile, TrendingRepo,
};
use trendkit_db::TrendStorage;
use trendkit_sources::{
    Collector, GithubGraphqlCollector, GithubTrendingCollector, HttpSettings, RedditJsonCollector,
    RedditRssCollector, SourceError,
};

use crate::error::PipelineError;
use crate::orchestrator::SourceList;
use crate::snapshot::{SnapshotCollector, DEFAULT_LOOKBACK_WEEKS};

/// Everything a collector needs besides its own `SourceConfig` entry.
#[derive(Clone)]
pub struct RegistryContext {
    pub http: HttpSettings,
    pub github_token: Option<String>,
    pub storage: TrendStorage,
}

/// The collector lists for both categories, in configured priority order.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    pub repos: SourceList<TrendingRepo>,
    pub posts: SourceList<RedditPost>,
}

impl SourceRegistry {
    /// Build collectors for every enabled source in `file`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SourceSetup`] if a collector cannot be
    /// constructed, or [`PipelineError::Config`] for a kind that cannot serve
    /// its category.
    pub fn build(file: &SourcesFile, ctx: &RegistryContext) -> Result<Self, PipelineError> {
        let repos = file
            .enabled(Category::Repos)
            .into_iter()
            .map(|cfg| build_repo_source(cfg, ctx).map(|c| configured(cfg, c)))
            .collect::<Result<Vec<_>, _>>()?;
        let posts = file
            .enabled(Category::Posts)
            .into_iter()
            .map(|cfg| build_post_source(cfg, ctx).map(|c| configured(cfg, c)))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            repos = repos.len(),
            posts = posts.len(),
            "source registry built"
        );
        Ok(Self { repos, posts })
    }

    /// `(category, name, variant)` for every registered source, in priority order.
    #[must_use]
    pub fn describe(&self) -> Vec<(Category, String, CollectorVariant)> {
        let repos = self
            .repos
            .iter()
            .map(|c| (Category::Repos, c.name().to_string(), c.variant()));
        let posts = self
            .posts
            .iter()
            .map(|c| (Category::Posts, c.name().to_string(), c.variant()));
        repos.chain(posts).collect()
    }
}

fn setup_err(cfg: &SourceConfig) -> impl FnOnce(SourceError) -> PipelineError + '_ {
    move |source| PipelineError::SourceSetup {
        name: cfg.name.clone(),
        source,
    }
}

fn wrong_category(cfg: &SourceConfig, category: Category) -> PipelineError {
    PipelineError::Config(ConfigError::Validation(format!(
        "source '{}' of kind {} cannot serve category {category}",
        cfg.name, cfg.kind
    )))
}

fn lookback(cfg: &SourceConfig) -> u32 {
    cfg.lookback_weeks.unwrap_or(DEFAULT_LOOKBACK_WEEKS)
}

fn build_repo_source(
    cfg: &SourceConfig,
    ctx: &RegistryContext,
) -> Result<Arc<dyn Collector<TrendingRepo>>, PipelineError> {
    let http = ctx.http.clone();
    let collector: Arc<dyn Collector<TrendingRepo>> = match cfg.kind {
        SourceKind::GithubGraphql => Arc::new(match &cfg.endpoint {
            Some(endpoint) => GithubGraphqlCollector::with_endpoint(
                &cfg.name,
                http,
                ctx.github_token.clone(),
                endpoint,
            ),
            None => GithubGraphqlCollector::new(&cfg.name, http, ctx.github_token.clone()),
        }
        .map_err(setup_err(cfg))?),
        SourceKind::GithubTrending => Arc::new(match &cfg.endpoint {
            Some(endpoint) => GithubTrendingCollector::with_endpoint(&cfg.name, http, endpoint),
            None => GithubTrendingCollector::new(&cfg.name, http),
        }
        .map_err(setup_err(cfg))?),
        SourceKind::Snapshot => Arc::new(SnapshotCollector::<TrendingRepo>::new(
            &cfg.name,
            Category::Repos,
            ctx.storage.clone(),
            lookback(cfg),
        )),
        SourceKind::RedditJson | SourceKind::RedditRss => {
            return Err(wrong_category(cfg, Category::Repos))
        }
    };
    Ok(collector)
}

fn build_post_source(
    cfg: &SourceConfig,
    ctx: &RegistryContext,
) -> Result<Arc<dyn Collector<RedditPost>>, PipelineError> {
    let http = ctx.http.clone();
    let communities = cfg.communities.clone();
    let collector: Arc<dyn Collector<RedditPost>> = match cfg.kind {
        SourceKind::RedditJson => Arc::new(match &cfg.endpoint {
            Some(endpoint) => {
                RedditJsonCollector::with_endpoint(&cfg.name, http, communities, endpoint)
            }
            None => RedditJsonCollector::new(&cfg.name, http, communities),
        }
        .map_err(setup_err(cfg))?),
        SourceKind::RedditRss => Arc::new(match &cfg.endpoint {
            Some(endpoint) => {
                RedditRssCollector::with_endpoint(&cfg.name, http, communities, endpoint)
            }
            None => RedditRssCollector::new(&cfg.name, http, communities),
        }
        .map_err(setup_err(cfg))?),
        SourceKind::Snapshot => Arc::new(SnapshotCollector::<RedditPost>::new(
            &cfg.name,
            Category::Posts,
            ctx.storage.clone(),
            lookback(cfg),
        )),
        SourceKind::GithubGraphql | SourceKind::GithubTrending => {
            return Err(wrong_category(cfg, Category::Posts))
        }
    };
    Ok(collector)
}

/// Wrap `inner` when its config entry carries per-source option overrides.
fn configured<T: Send + 'static>(
    cfg: &SourceConfig,
    inner: Arc<dyn Collector<T>>,
) -> Arc<dyn Collector<T>> {
    if cfg.limit.is_none() && cfg.query.is_none() && cfg.language.is_none() {
        return inner;
    }
    Arc::new(ConfiguredCollector {
        inner,
        limit: cfg.limit,
        query: cfg.query.clone(),
        language: cfg.language.clone(),
    })
}

/// Applies a source's configured `limit`, `query` and `language` on top of
/// the run's options. Run-level `query`/`language` take precedence; the
/// configured limit caps the run-level one.
pub struct ConfiguredCollector<T> {
    inner: Arc<dyn Collector<T>>,
    limit: Option<usize>,
    query: Option<String>,
    language: Option<String>,
}

impl<T> ConfiguredCollector<T> {
    fn merge(&self, options: &CollectOptions) -> CollectOptions {
        CollectOptions {
            limit: self.limit.map_or(options.limit, |l| l.min(options.limit)),
            query: options.query.clone().or_else(|| self.query.clone()),
            communities: options.communities.clone(),
            language: options.language.clone().or_else(|| self.language.clone()),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Collector<T> for ConfiguredCollector<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn variant(&self) -> CollectorVariant {
        self.inner.variant()
    }

    async fn fetch(
        &self,
        period: &Period,
        options: &CollectOptions,
    ) -> Result<Collected<T>, SourceError> {
        let merged = self.merge(options);
        self.inner.fetch(period, &merged).await
    }

    async fn health_check(&self) -> Option<HealthVerdict> {
        self.inner.health_check().await
    }
}
