//! The pipeline facade used by the CLI, the server and the scheduler.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use trendkit_core::{
    get_week_string, load_sources, AppConfig, Category, PipelineStatus, SourceHealth,
    SourceStatus, StorageBackend, WeeklyTrendReport,
};
use trendkit_db::{
    connect_pool_from_config, run_migrations, CleanupSummary, KvStore, MemoryKvStore, PgKvStore,
    ReportIndexEntry, TrendStorage,
};
use trendkit_sources::HttpSettings;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::generator::{GeneratedReport, ReportGenerator, ReportSettings};
use crate::health::HealthCache;
use crate::orchestrator::FallbackOrchestrator;
use crate::registry::{RegistryContext, SourceRegistry};
use crate::status::SourceStatusTracker;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub report: ReportSettings,
    pub retention_weeks: u32,
    pub health_ttl: Duration,
    pub health_timeout: Duration,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            report: ReportSettings::with_top_n(config.report_top_n),
            retention_weeks: config.report_retention_weeks,
            health_ttl: Duration::from_secs(config.health_ttl_secs),
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            report: ReportSettings::default(),
            retention_weeks: 12,
            health_ttl: Duration::from_secs(300),
            health_timeout: Duration::from_secs(5),
        }
    }
}

/// Open the configured storage backend. Postgres migrations run on connect.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the database is unreachable or a
/// migration fails.
pub async fn open_storage(config: &AppConfig) -> Result<TrendStorage, PipelineError> {
    let store: Arc<dyn KvStore> = match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; reports will not survive restart");
            Arc::new(MemoryKvStore::new())
        }
        StorageBackend::Postgres => {
            let pool = connect_pool_from_config(config).await?;
            let applied = run_migrations(&pool)
                .await
                .map_err(trendkit_db::DbError::from)?;
            tracing::info!(applied, "database migrations complete");
            Arc::new(PgKvStore::new(pool))
        }
    };
    Ok(TrendStorage::new(store))
}

/// Owns storage, the health cache, source statuses and the collector lists.
pub struct TrendPipeline {
    storage: TrendStorage,
    registry: SourceRegistry,
    health: HealthCache,
    status: SourceStatusTracker,
    settings: PipelineSettings,
    run_lock: tokio::sync::Mutex<()>,
}

impl TrendPipeline {
    #[must_use]
    pub fn new(
        storage: TrendStorage,
        registry: SourceRegistry,
        settings: PipelineSettings,
    ) -> Self {
        let status = SourceStatusTracker::new();
        for (category, name, _) in registry.describe() {
            status.register(&name, category);
        }
        Self {
            storage,
            registry,
            health: HealthCache::new(settings.health_ttl, settings.health_timeout),
            status,
            settings,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Open storage, load `sources.yaml`, build collectors and restore the
    /// source statuses of the last persisted run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if storage cannot be opened, the sources file
    /// is invalid, or a collector cannot be built.
    pub async fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let storage = open_storage(config).await?;
        Self::from_config_with_storage(config, storage).await
    }

    /// Like [`TrendPipeline::from_config`] with an already opened store.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the sources file is invalid, a collector
    /// cannot be built, or the stored status cannot be read.
    pub async fn from_config_with_storage(
        config: &AppConfig,
        storage: TrendStorage,
    ) -> Result<Self, PipelineError> {
        let sources = load_sources(&config.sources_path)?;
        let ctx = RegistryContext {
            http: HttpSettings::from_config(config),
            github_token: config.github_token.clone(),
            storage: storage.clone(),
        };
        let registry = SourceRegistry::build(&sources, &ctx)?;
        let pipeline = Self::new(storage, registry, PipelineSettings::from_config(config));
        pipeline.restore_status().await?;
        Ok(pipeline)
    }

    #[must_use]
    pub fn storage(&self) -> &TrendStorage {
        &self.storage
    }

    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn orchestrator(&self) -> FallbackOrchestrator<'_> {
        FallbackOrchestrator::new(&self.health, &self.status)
    }

    /// Reload per-source statuses from the last persisted run. Sources no
    /// longer configured are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if the status cannot be read.
    pub async fn restore_status(&self) -> Result<(), PipelineError> {
        let Some(stored) = self.storage.load_pipeline_status().await? else {
            return Ok(());
        };
        let known: HashSet<String> = self
            .registry
            .describe()
            .into_iter()
            .map(|(_, name, _)| name)
            .collect();
        let restored: Vec<SourceStatus> = stored
            .sources
            .into_iter()
            .filter(|s| known.contains(&s.source))
            .collect();
        tracing::debug!(count = restored.len(), "restored source statuses");
        self.status.restore(restored);
        Ok(())
    }

    /// Generate (or reuse) the report for the week containing `date` and
    /// persist the run's [`PipelineStatus`]. Runs are serialized.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if storage fails at any point.
    pub async fn run_weekly(
        &self,
        date: NaiveDate,
        force: bool,
    ) -> Result<GeneratedReport, PipelineError> {
        let _guard = self.run_lock.lock().await;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%run_id, week = %get_week_string(date), force, "pipeline run started");

        let generator = ReportGenerator::new(
            &self.storage,
            &self.registry,
            self.orchestrator(),
            self.settings.report,
        );
        let generated = generator.generate(date, force).await?;

        let status = PipelineStatus {
            run_id,
            week: generated.report.week.clone(),
            date,
            started_at,
            finished_at: Some(Utc::now()),
            categories: generated.report.provenance.clone(),
            sources: self.status.snapshot(),
            health: self.cached_health(),
        };
        self.storage.save_pipeline_status(&status).await?;
        tracing::info!(
            %run_id,
            week = %status.week,
            reused = generated.reused,
            "pipeline run finished"
        );
        Ok(generated)
    }

    /// The last persisted run, with this process's source statuses and
    /// cached health verdicts laid over it. Never probes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if the status cannot be read.
    pub async fn get_pipeline_status(&self) -> Result<Option<PipelineStatus>, PipelineError> {
        let Some(mut status) = self.storage.load_pipeline_status().await? else {
            return Ok(None);
        };
        status.sources = self.status.snapshot();
        for cached in self.cached_health() {
            if cached.verdict.is_none() {
                continue;
            }
            match status.health.iter_mut().find(|h| h.source == cached.source) {
                Some(existing) => *existing = cached,
                None => status.health.push(cached),
            }
        }
        Ok(Some(status))
    }

    #[must_use]
    pub fn get_source_statuses(&self) -> Vec<SourceStatus> {
        self.status.snapshot()
    }

    /// Cached verdicts for every source, repos first. Never probes.
    #[must_use]
    pub fn cached_health(&self) -> Vec<SourceHealth> {
        let orchestrator = self.orchestrator();
        let mut health = orchestrator.cached_health(Category::Repos, &self.registry.repos);
        health.extend(orchestrator.cached_health(Category::Posts, &self.registry.posts));
        health
    }

    /// Probe every source now, refreshing the health cache.
    pub async fn check_all_sources(&self) -> Vec<SourceHealth> {
        let orchestrator = self.orchestrator();
        let mut health = orchestrator
            .check_sources(Category::Repos, &self.registry.repos)
            .await;
        health.extend(
            orchestrator
                .check_sources(Category::Posts, &self.registry.posts)
                .await,
        );
        health
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if the read fails.
    pub async fn get_latest_trend_report(
        &self,
    ) -> Result<Option<WeeklyTrendReport>, PipelineError> {
        Ok(self.storage.get_latest_trend_report().await?)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if the read fails.
    pub async fn get_trend_report(
        &self,
        week: &str,
    ) -> Result<Option<WeeklyTrendReport>, PipelineError> {
        trendkit_core::parse_week_string(week)?;
        Ok(self.storage.get_trend_report(week).await?)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if the read fails.
    pub async fn list_trend_reports(&self) -> Result<Vec<ReportIndexEntry>, PipelineError> {
        Ok(self.storage.list_trend_reports().await?)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if a read fails.
    pub async fn get_recent_reports(
        &self,
        n: usize,
    ) -> Result<Vec<WeeklyTrendReport>, PipelineError> {
        Ok(self.storage.get_recent_reports(n).await?)
    }

    /// Apply the configured retention policy as of `today`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if the backend fails.
    pub async fn cleanup_old_reports(
        &self,
        today: NaiveDate,
    ) -> Result<CleanupSummary, PipelineError> {
        self.cleanup_with_retention(self.settings.retention_weeks, today)
            .await
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if the backend fails.
    pub async fn cleanup_with_retention(
        &self,
        retention_weeks: u32,
        today: NaiveDate,
    ) -> Result<CleanupSummary, PipelineError> {
        let summary = self
            .storage
            .cleanup_old_reports(retention_weeks, today)
            .await?;
        tracing::info!(
            retention_weeks,
            reports_deleted = summary.reports_deleted.len(),
            snapshots_deleted = summary.snapshots_deleted,
            "retention cleanup finished"
        );
        Ok(summary)
    }
}
