//! Error types for job execution

use calrissian_kube::ClusterError;
use calrissian_staging::StagingError;
use thiserror::Error;

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    /// No pod carries the job's label, e.g. it was killed before scheduling
    #[error("No pod found for job '{0}'")]
    PodNotFound(String),

    #[error("Invalid execution state: {0}")]
    InvalidState(String),

    #[error("Job has not been submitted")]
    NotSubmitted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
