use calrissian_kube::ClusterError;
use calrissian_resilience::Retryable;
use std::time::Duration;
use thiserror::Error;

pub type StagingResult<T> = Result<T, StagingError>;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Helper pod wait or exec drain exceeded its bound
    #[error("Timed out after {after:?} while {operation}")]
    Timeout { operation: String, after: Duration },

    #[error("Helper pod '{0}' disappeared before it started")]
    HelperPodGone(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("External copy failed: {0}")]
    Fallback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StagingError {
    /// Exec-stream failures that the external copy tool may get around
    pub fn warrants_fallback(&self) -> bool {
        matches!(self, StagingError::Cluster(e) if !e.is_not_found())
    }
}

impl Retryable for StagingError {
    fn is_retryable(&self) -> bool {
        matches!(self, StagingError::Fallback(_) | StagingError::Io(_))
    }
}
