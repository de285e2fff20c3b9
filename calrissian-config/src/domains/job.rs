//! Workflow job configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{
    validate_enum_choice, validate_positive, validate_quantity, validate_required_string,
    Validatable,
};

/// Defaults applied to every workflow-engine job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Workflow-engine container image
    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default = "default_image_pull_policy")]
    pub image_pull_policy: String,

    /// Retries of the underlying batch job
    #[serde(default = "default_backoff_limit")]
    pub backoff_limit: i32,

    #[serde(default)]
    pub resources: EngineResources,

    /// Seconds the pre-stop hook sleeps before the engine container stops
    #[serde(default = "default_pre_stop_sleep_seconds")]
    pub pre_stop_sleep_seconds: u32,

    #[serde(default = "default_termination_grace_period_seconds")]
    pub termination_grace_period_seconds: i64,
}

/// Requests and limits of the workflow-engine container itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineResources {
    #[serde(default = "default_request_cpu")]
    pub request_cpu: String,
    #[serde(default = "default_request_memory")]
    pub request_memory: String,
    #[serde(default = "default_limit_cpu")]
    pub limit_cpu: String,
    #[serde(default = "default_limit_memory")]
    pub limit_memory: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            image_pull_policy: default_image_pull_policy(),
            backoff_limit: default_backoff_limit(),
            resources: EngineResources::default(),
            pre_stop_sleep_seconds: default_pre_stop_sleep_seconds(),
            termination_grace_period_seconds: default_termination_grace_period_seconds(),
        }
    }
}

impl Default for EngineResources {
    fn default() -> Self {
        Self {
            request_cpu: default_request_cpu(),
            request_memory: default_request_memory(),
            limit_cpu: default_limit_cpu(),
            limit_memory: default_limit_memory(),
        }
    }
}

impl Validatable for JobConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.image, "image", self.domain_name())?;
        validate_enum_choice(
            &self.image_pull_policy,
            &["Always", "IfNotPresent", "Never"],
            "image_pull_policy",
            self.domain_name(),
        )?;

        if self.backoff_limit < 0 {
            return Err(self.validation_error("backoff_limit cannot be negative"));
        }

        validate_positive(
            self.termination_grace_period_seconds,
            "termination_grace_period_seconds",
            self.domain_name(),
        )?;

        self.resources.validate()
    }

    fn domain_name(&self) -> &'static str {
        "job"
    }
}

impl Validatable for EngineResources {
    fn validate(&self) -> ConfigResult<()> {
        validate_quantity(&self.request_cpu, "request_cpu", self.domain_name())?;
        validate_quantity(&self.request_memory, "request_memory", self.domain_name())?;
        validate_quantity(&self.limit_cpu, "limit_cpu", self.domain_name())?;
        validate_quantity(&self.limit_memory, "limit_memory", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "job.resources"
    }
}

fn default_image() -> String {
    "terradue/calrissian:0.12.0".to_string()
}

fn default_image_pull_policy() -> String {
    "Always".to_string()
}

fn default_backoff_limit() -> i32 {
    2
}

fn default_pre_stop_sleep_seconds() -> u32 {
    30
}

fn default_termination_grace_period_seconds() -> i64 {
    120
}

fn default_request_cpu() -> String {
    "1000m".to_string()
}

fn default_request_memory() -> String {
    "1G".to_string()
}

fn default_limit_cpu() -> String {
    "2000m".to_string()
}

fn default_limit_memory() -> String {
    "2G".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_config_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.image, "terradue/calrissian:0.12.0");
        assert_eq!(config.backoff_limit, 2);
        assert_eq!(config.termination_grace_period_seconds, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_job_config_rejects_unknown_pull_policy() {
        let config = JobConfig {
            image_pull_policy: "Sometimes".to_string(),
            ..JobConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
