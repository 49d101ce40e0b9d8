//! Shared domain types and configuration for the trendkit pipeline.

pub mod app_config;
pub mod collection;
pub mod config;
pub mod items;
pub mod report;
pub mod sources;
pub mod status;
pub mod week;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, StorageBackend};
pub use collection::{
    Category, CollectOptions, Collected, CollectionFailure, CollectionResult, CollectionSuccess,
    CollectorVariant, ErrorClass, SourceAttempt,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use items::{RedditPost, TrendItem, TrendingRepo};
pub use report::{CategoryProvenance, EmergingTopic, StorageEntry, WeeklyTrendReport};
pub use sources::{load_sources, parse_sources, SourceConfig, SourceKind, SourcesFile};
pub use status::{HealthVerdict, PipelineStatus, SourceHealth, SourceStatus};
pub use week::{
    get_last_n_weeks, get_week_string, parse_week_string, period_for, week_range, weeks_before,
    Period, MAX_WEEK_SPAN,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read sources file {path}: {source}")]
    SourcesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sources file: {0}")]
    SourcesFileParse(#[from] serde_yaml::Error),

    #[error("invalid sources configuration: {0}")]
    Validation(String),

    #[error("invalid week identifier \"{0}\"")]
    InvalidWeek(String),
}
