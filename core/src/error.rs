use std::sync::Arc;
use thiserror::Error;

/// Opaque failure value delivered by the host document when a script fails to load.
///
/// The loader never inspects it, it is cached on the load record and handed to
/// every batch that observes the failure.
pub type HostError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    #[error("At least one script must be provided")]
    EmptyBatch,
    #[error("Failed to load script {url}: {source}")]
    ResourceLoad {
        url: String,
        #[source]
        source: HostError,
    },
    #[error("Delayed load requested outside of a tokio runtime")]
    SchedulerUnavailable,
    #[error("Script loader was torn down before the batch resolved")]
    Abandoned,
}

impl LoaderError {
    pub(crate) fn resource_load(url: &str, source: HostError) -> Self {
        Self::ResourceLoad {
            url: url.to_owned(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid loader config")]
    Json(#[from] serde_json::Error),
    #[error("Identifier prefix must not be empty")]
    EmptyIdPrefix,
}
