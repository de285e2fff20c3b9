//! Job monitoring configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Polling behaviour of the execution monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sleep between two status polls
    #[serde(with = "crate::domains::utils::seconds", default = "default_interval")]
    pub interval: Duration,

    /// Time a job may spend pulling images before ImagePullBackOff kills it
    #[serde(
        with = "crate::domains::utils::seconds",
        default = "default_grace_period"
    )]
    pub grace_period: Duration,

    /// Hard wall-clock limit for the whole job
    #[serde(
        with = "crate::domains::utils::optional_seconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub wall_time: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            grace_period: default_grace_period(),
            wall_time: None,
        }
    }
}

impl Validatable for MonitorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.interval.as_secs(), "interval", self.domain_name())?;

        if let Some(wall_time) = self.wall_time {
            if wall_time < self.interval {
                return Err(self.validation_error("wall_time must be at least one interval"));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "monitor"
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_grace_period() -> Duration {
    Duration::from_secs(120)
}
