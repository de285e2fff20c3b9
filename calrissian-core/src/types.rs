//! Core type definitions for Calrissian

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Observed state of a submitted workflow job
///
/// `Active` is the initial state and also what a job with no status yet
/// reports. `Killed` is never read from the cluster; it is set locally when
/// the monitor gives up on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum JobStatus {
    #[default]
    Active,
    Succeeded,
    Failed,
    Killed,
}

impl JobStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Killed
        )
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Active => "active",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Killed => "killed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(JobStatus::Active),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "killed" => Ok(JobStatus::Killed),
            _ => Err(ParseError::InvalidJobStatus(s.to_string())),
        }
    }
}

/// Containers whose logs can be looked up inside a job pod
///
/// Only the workflow engine container is created by the job builder; the
/// sidecar identities are reserved for deployments that attach output and
/// usage-report sidecars to the engine pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerName {
    WorkflowEngine,
    SidecarOutput,
    SidecarUsage,
}

impl ContainerName {
    /// Name of the container in the pod specification
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerName::WorkflowEngine => "calrissian",
            ContainerName::SidecarOutput => "sidecar-container-output",
            ContainerName::SidecarUsage => "sidecar-container-usage",
        }
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse errors for core types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid job status: {0}")]
    InvalidJobStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Active.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Killed.is_terminal());
        assert_eq!(JobStatus::default(), JobStatus::Active);
    }

    #[test]
    fn test_job_status_from_str() {
        assert_eq!("SUCCEEDED".parse::<JobStatus>().unwrap(), JobStatus::Succeeded);
        assert_eq!("killed".parse::<JobStatus>().unwrap(), JobStatus::Killed);
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_container_names() {
        assert_eq!(ContainerName::WorkflowEngine.as_str(), "calrissian");
        assert_eq!(ContainerName::SidecarUsage.to_string(), "sidecar-container-usage");
    }
}
