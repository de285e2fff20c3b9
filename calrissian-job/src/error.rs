use calrissian_context::ContextError;
use thiserror::Error;

pub type JobResult<T> = Result<T, JobError>;

#[derive(Error, Debug)]
pub enum JobError {
    /// Neither explicit limits nor the CWL requirements yield a value
    #[error("Invalid resource specification: {0}")]
    InvalidResourceSpec(String),

    #[error("Failed to stage config map '{name}': {source}")]
    ConfigMapStagingFailed {
        name: String,
        #[source]
        source: ContextError,
    },

    #[error("Invalid job name '{0}'")]
    InvalidName(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for JobError {
    fn from(err: serde_yaml::Error) -> Self {
        JobError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Serialization(err.to_string())
    }
}
