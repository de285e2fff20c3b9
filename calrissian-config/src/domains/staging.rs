//! Volume staging configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_quantity, validate_required_string, Validatable};

/// Helper-pod and copy settings used to move files off the shared volume
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Minimal long-lived image run by helper pods
    #[serde(default = "default_helper_image")]
    pub helper_image: String,

    #[serde(default = "default_helper_cpu")]
    pub helper_cpu: String,

    #[serde(default = "default_helper_memory")]
    pub helper_memory: String,

    /// Poll interval while the helper pod is Pending
    #[serde(
        with = "crate::domains::utils::seconds",
        default = "default_phase_poll_interval"
    )]
    pub phase_poll_interval: Duration,

    /// Upper bound on the helper pod leaving Pending
    #[serde(
        with = "crate::domains::utils::seconds",
        default = "default_phase_timeout"
    )]
    pub phase_timeout: Duration,

    /// Upper bound on draining one exec stream
    #[serde(
        with = "crate::domains::utils::seconds",
        default = "default_exec_timeout"
    )]
    pub exec_timeout: Duration,

    /// External copy tool used when exec streams are blocked
    #[serde(default = "default_kubectl_binary")]
    pub kubectl_binary: String,

    #[serde(default = "default_fallback_attempts")]
    pub fallback_attempts: u32,

    #[serde(
        with = "crate::domains::utils::seconds",
        default = "default_fallback_interval"
    )]
    pub fallback_interval: Duration,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            helper_image: default_helper_image(),
            helper_cpu: default_helper_cpu(),
            helper_memory: default_helper_memory(),
            phase_poll_interval: default_phase_poll_interval(),
            phase_timeout: default_phase_timeout(),
            exec_timeout: default_exec_timeout(),
            kubectl_binary: default_kubectl_binary(),
            fallback_attempts: default_fallback_attempts(),
            fallback_interval: default_fallback_interval(),
        }
    }
}

impl Validatable for StagingConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.helper_image, "helper_image", self.domain_name())?;
        validate_quantity(&self.helper_cpu, "helper_cpu", self.domain_name())?;
        validate_quantity(&self.helper_memory, "helper_memory", self.domain_name())?;
        validate_positive(self.phase_timeout.as_secs(), "phase_timeout", self.domain_name())?;
        validate_positive(self.exec_timeout.as_secs(), "exec_timeout", self.domain_name())?;
        validate_required_string(&self.kubectl_binary, "kubectl_binary", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "staging"
    }
}

fn default_helper_image() -> String {
    "busybox".to_string()
}

fn default_helper_cpu() -> String {
    "100m".to_string()
}

fn default_helper_memory() -> String {
    "100Mi".to_string()
}

fn default_phase_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_phase_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_exec_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_kubectl_binary() -> String {
    "kubectl".to_string()
}

fn default_fallback_attempts() -> u32 {
    3
}

fn default_fallback_interval() -> Duration {
    Duration::from_secs(5)
}
