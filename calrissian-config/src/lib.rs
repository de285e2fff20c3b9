//! Domain-driven configuration management for Calrissian
//!
//! Configuration is split by functional domain (cluster access, namespace
//! provisioning, job construction, monitoring, volume staging, logging),
//! loaded from YAML, overridden from `CALRISSIAN_*` environment variables
//! and validated before use.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    cluster::ClusterConfig, context::ContextConfig, job::JobConfig, logging::LoggingConfig,
    monitor::MonitorConfig, staging::StagingConfig, CalrissianConfig,
};

// Re-export utilities
pub use domains::utils::{optional_seconds, seconds};
