//! Cluster error classification

use calrissian_resilience::Retryable;
use thiserror::Error;

use crate::kind::ResourceKind;

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors returned by the cluster resource client
#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    /// The API server answered with a failure status
    #[error("API error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    /// The request never got a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failure on an open exec stream
    #[error("Exec stream error: {0}")]
    Stream(String),

    /// Kubeconfig or client construction failure
    #[error("Client configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ClusterError {
    pub fn api(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        ClusterError::Api {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: ResourceKind, name: &str) -> Self {
        Self::api(404, "NotFound", format!("{} \"{}\" not found", kind, name))
    }

    pub fn conflict(kind: ResourceKind, name: &str) -> Self {
        Self::api(409, "AlreadyExists", format!("{} \"{}\" already exists", kind, name))
    }

    /// HTTP status code, if the server answered
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClusterError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }

    /// 4xx other than throttling; these signal a caller mistake and are final
    pub fn is_client_error(&self) -> bool {
        matches!(self.status_code(), Some(code) if (400..500).contains(&code) && code != 429)
    }
}

impl Retryable for ClusterError {
    fn is_retryable(&self) -> bool {
        match self {
            ClusterError::Api { code, .. } => *code == 429 || *code >= 500,
            ClusterError::Transport(_) | ClusterError::Stream(_) => true,
            ClusterError::Config(_) | ClusterError::Serialization(_) => false,
        }
    }
}

impl From<kube::Error> for ClusterError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) => ClusterError::Api {
                code: response.code,
                reason: response.reason,
                message: response.message,
            },
            kube::Error::SerdeError(e) => ClusterError::Serialization(e.to_string()),
            kube::Error::InferConfig(e) => ClusterError::Config(e.to_string()),
            other => ClusterError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(error: serde_json::Error) -> Self {
        ClusterError::Serialization(error.to_string())
    }
}
