//! Domain-specific configuration modules

pub mod cluster;
pub mod context;
pub mod job;
pub mod logging;
pub mod monitor;
pub mod staging;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CalrissianConfig {
    /// Cluster access
    #[serde(default)]
    pub cluster: cluster::ClusterConfig,

    /// Namespace provisioning
    #[serde(default)]
    pub context: context::ContextConfig,

    /// Workflow job construction
    #[serde(default)]
    pub job: job::JobConfig,

    /// Job monitoring
    #[serde(default)]
    pub monitor: monitor::MonitorConfig,

    /// Helper-pod volume staging
    #[serde(default)]
    pub staging: staging::StagingConfig,

    /// Logging
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl CalrissianConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.cluster.validate()?;
        self.context.validate()?;
        self.job.validate()?;
        self.monitor.validate()?;
        self.staging.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = CalrissianConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CalrissianConfig::default().validate_all().is_ok());
    }

    #[test]
    fn test_sample_round_trips() {
        let sample = CalrissianConfig::generate_sample();
        let parsed: CalrissianConfig = serde_yaml::from_str(&sample).unwrap();
        assert!(parsed.validate_all().is_ok());
        assert_eq!(parsed.job.image, CalrissianConfig::default().job.image);
    }
}
