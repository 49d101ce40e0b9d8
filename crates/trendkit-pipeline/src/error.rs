use thiserror::Error;
use trendkit_core::ConfigError;
use trendkit_db::{DbError, StorageError};
use trendkit_sources::SourceError;

/// Errors that abort a pipeline operation.
///
/// Individual source failures never appear here; the orchestrator absorbs
/// them into fallback steps and report gaps.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build source '{name}': {source}")]
    SourceSetup {
        name: String,
        #[source]
        source: SourceError,
    },

    #[error("database error: {0}")]
    Db(#[from] DbError),
}
