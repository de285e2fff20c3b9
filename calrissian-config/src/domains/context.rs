//! Namespace provisioning configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_quantity, validate_required_string, Validatable};

/// Settings used when an execution namespace is provisioned
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// ReadWriteMany storage class for the working-directory claim
    #[serde(default = "default_storage_class")]
    pub storage_class: String,

    /// Requested size of the working-directory claim
    #[serde(default = "default_volume_size")]
    pub volume_size: String,

    /// Claim name of the working-directory volume
    #[serde(default = "default_working_dir_claim")]
    pub working_dir_claim: String,

    /// Name of the dockerconfigjson secret created from the pull-secret payload
    #[serde(default = "default_image_pull_secret_name")]
    pub image_pull_secret_name: String,

    /// Name of the resource quota object
    #[serde(default = "default_resource_quota_name")]
    pub resource_quota_name: String,

    /// Namespace additional image pull secrets are copied from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_namespace: Option<String>,

    /// Attempts made while waiting for a provisioned object to appear
    #[serde(default = "default_provisioning_attempts")]
    pub provisioning_attempts: u32,

    /// Sleep between provisioning attempts
    #[serde(
        with = "crate::domains::utils::seconds",
        default = "default_provisioning_interval"
    )]
    pub provisioning_interval: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            storage_class: default_storage_class(),
            volume_size: default_volume_size(),
            working_dir_claim: default_working_dir_claim(),
            image_pull_secret_name: default_image_pull_secret_name(),
            resource_quota_name: default_resource_quota_name(),
            origin_namespace: None,
            provisioning_attempts: default_provisioning_attempts(),
            provisioning_interval: default_provisioning_interval(),
        }
    }
}

impl Validatable for ContextConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.storage_class, "storage_class", self.domain_name())?;
        validate_quantity(&self.volume_size, "volume_size", self.domain_name())?;
        validate_required_string(&self.working_dir_claim, "working_dir_claim", self.domain_name())?;
        validate_required_string(
            &self.image_pull_secret_name,
            "image_pull_secret_name",
            self.domain_name(),
        )?;
        validate_required_string(
            &self.resource_quota_name,
            "resource_quota_name",
            self.domain_name(),
        )?;
        validate_positive(
            self.provisioning_attempts,
            "provisioning_attempts",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "context"
    }
}

fn default_storage_class() -> String {
    "standard".to_string()
}

fn default_volume_size() -> String {
    "10Gi".to_string()
}

fn default_working_dir_claim() -> String {
    "calrissian-wdir".to_string()
}

fn default_image_pull_secret_name() -> String {
    "container-rg".to_string()
}

fn default_resource_quota_name() -> String {
    "calrissian-resource-quota".to_string()
}

fn default_provisioning_attempts() -> u32 {
    10
}

fn default_provisioning_interval() -> Duration {
    Duration::from_secs(5)
}
