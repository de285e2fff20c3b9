//! Configuration loading and environment variable handling

use crate::domains::CalrissianConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with the `CALRISSIAN` prefix
    pub fn new() -> Self {
        Self {
            prefix: "CALRISSIAN".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<CalrissianConfig> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let mut config: CalrissianConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<CalrissianConfig> {
        let mut config = CalrissianConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<CalrissianConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut CalrissianConfig) -> ConfigResult<()> {
        self.apply_cluster_overrides(&mut config.cluster);
        self.apply_context_overrides(&mut config.context);
        self.apply_job_overrides(&mut config.job);
        self.apply_monitor_overrides(&mut config.monitor)?;
        self.apply_staging_overrides(&mut config.staging);
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_cluster_overrides(&self, config: &mut crate::domains::cluster::ClusterConfig) {
        if let Ok(path) = std::env::var("KUBECONFIG") {
            if config.kubeconfig.is_none() && !path.is_empty() {
                config.kubeconfig = Some(path.into());
            }
        }

        if let Ok(context) = self.get_env_var("KUBE_CONTEXT") {
            config.context = Some(context);
        }
    }

    fn apply_context_overrides(&self, config: &mut crate::domains::context::ContextConfig) {
        if let Ok(storage_class) = self.get_env_var("STORAGE_CLASS") {
            config.storage_class = storage_class;
        }

        if let Ok(volume_size) = self.get_env_var("VOLUME_SIZE") {
            config.volume_size = volume_size;
        }

        // The bare variable is what in-cluster deployments usually set
        if let Ok(origin) = self
            .get_env_var("ORIGIN_NAMESPACE")
            .or_else(|_| std::env::var("ORIGIN_NAMESPACE"))
        {
            if !origin.is_empty() {
                config.origin_namespace = Some(origin);
            }
        }
    }

    fn apply_job_overrides(&self, config: &mut crate::domains::job::JobConfig) {
        if let Ok(image) = self.get_env_var("IMAGE") {
            config.image = image;
        }
    }

    fn apply_monitor_overrides(
        &self,
        config: &mut crate::domains::monitor::MonitorConfig,
    ) -> ConfigResult<()> {
        if let Some(interval) = self.get_env_seconds("MONITOR_INTERVAL")? {
            config.interval = interval;
        }

        if let Some(grace) = self.get_env_seconds("GRACE_PERIOD")? {
            config.grace_period = grace;
        }

        if let Some(wall_time) = self.get_env_seconds("WALL_TIME")? {
            config.wall_time = Some(wall_time);
        }

        Ok(())
    }

    fn apply_staging_overrides(&self, config: &mut crate::domains::staging::StagingConfig) {
        if let Ok(helper_image) = self.get_env_var("HELPER_IMAGE") {
            config.helper_image = helper_image;
        }
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    fn get_env_seconds(&self, name: &str) -> ConfigResult<Option<Duration>> {
        match self.get_env_var(name) {
            Ok(value) => {
                let seconds: u64 = value.parse().map_err(|e| {
                    ConfigError::EnvError(format!("Invalid {}_{}: {}", self.prefix, name, e))
                })?;
                Ok(Some(Duration::from_secs(seconds)))
            }
            Err(_) => Ok(None),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
