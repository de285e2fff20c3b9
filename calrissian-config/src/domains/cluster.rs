//! Cluster access configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigResult;
use crate::validation::Validatable;

/// How to reach the Kubernetes API server
///
/// When no kubeconfig is given the client falls back to `KUBECONFIG`,
/// `~/.kube/config` and finally the in-cluster service account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Explicit kubeconfig file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Context to select inside the kubeconfig
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Validatable for ClusterConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(context) = &self.context {
            if context.trim().is_empty() {
                return Err(self.validation_error("context cannot be empty when set"));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "cluster"
    }
}
