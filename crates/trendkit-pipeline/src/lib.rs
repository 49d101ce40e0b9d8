//! Weekly trend pipeline: fallback orchestration across sources, health and
//! status tracking, report generation and retention.
//!
//! [`TrendPipeline`] is the entry point. It owns the storage handle, the
//! [`HealthCache`] and [`SourceStatusTracker`], and the per-category collector
//! lists built from `sources.yaml`.

pub mod error;
pub mod generator;
pub mod health;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod snapshot;
pub mod status;

pub use error::PipelineError;
pub use generator::{GeneratedReport, ReportGenerator, ReportSettings};
pub use health::HealthCache;
pub use orchestrator::{FallbackOrchestrator, SourceList};
pub use pipeline::{open_storage, PipelineSettings, TrendPipeline};
pub use registry::{ConfiguredCollector, RegistryContext, SourceRegistry};
pub use report::{
    count_topics, dedupe_latest, detect_emerging, normalize_topic, rank, select_top,
    summarize_report, EmergingConfig,
};
pub use snapshot::{SnapshotCollector, DEFAULT_LOOKBACK_WEEKS};
pub use status::SourceStatusTracker;
