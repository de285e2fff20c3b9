use calrissian_kube::{ClusterError, ResourceKind};
use thiserror::Error;

pub type ContextResult<T> = Result<T, ContextError>;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Invalid namespace name '{0}': must be a DNS label of at most 63 characters")]
    InvalidNamespace(String),

    /// The resource never became observable, or transient errors outlasted the retry budget
    #[error("Provisioning of {kind} '{name}' failed: {reason}")]
    ProvisioningFailed {
        kind: ResourceKind,
        name: String,
        reason: String,
    },

    /// The working-directory claim was created but never showed up
    #[error("Timed out waiting for {kind} '{name}' to be created")]
    ProvisioningTimeout { kind: ResourceKind, name: String },

    #[error("Namespace '{0}' was not found and cannot be reused")]
    NamespaceNotFound(String),

    #[error("Invalid image pull secret configuration: {0}")]
    InvalidSecretConfig(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl ContextError {
    /// Whether the failure came from a resource that never became observable
    pub fn is_provisioning_error(&self) -> bool {
        matches!(
            self,
            ContextError::ProvisioningFailed { .. } | ContextError::ProvisioningTimeout { .. }
        )
    }
}
