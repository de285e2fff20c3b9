//! Lifecycle of one submitted workflow job

use calrissian_config::{MonitorConfig, StagingConfig};
use calrissian_context::ExecutionContext;
use calrissian_core::{ContainerName, JobStatus, WorkingDirLayout};
use calrissian_job::job::JOB_NAME_LABEL;
use calrissian_job::CalrissianJob;
use calrissian_kube::{ClusterClient, ClusterError, ResourceKind};
use calrissian_staging::VolumeStager;
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{ExecutionError, ExecutionResult};
use crate::status;

/// Container waiting reason that marks an image as unobtainable
pub const IMAGE_PULL_BACK_OFF: &str = "ImagePullBackOff";

/// A job in a namespace session, from submission to result retrieval
pub struct CalrissianExecution {
    job: CalrissianJob,
    client: Arc<dyn ClusterClient>,
    namespace: String,
    layout: WorkingDirLayout,
    staging: StagingConfig,
    submitted: bool,
    killed: bool,
}

impl CalrissianExecution {
    pub fn new(job: CalrissianJob, context: &ExecutionContext) -> Self {
        Self {
            job,
            client: context.client().clone(),
            namespace: context.namespace().to_string(),
            layout: context.layout().clone(),
            staging: StagingConfig::default(),
            submitted: false,
            killed: false,
        }
    }

    pub fn with_staging_config(mut self, staging: StagingConfig) -> Self {
        self.staging = staging;
        self
    }

    pub fn job(&self) -> &CalrissianJob {
        &self.job
    }

    pub fn job_name(&self) -> &str {
        self.job.name()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    /// Post the job to the cluster
    pub async fn submit(&mut self) -> ExecutionResult<()> {
        let manifest = self.job.to_k8s_job();
        self.client.create_job(&self.namespace, &manifest).await?;
        self.submitted = true;
        info!("Submitted job {} in {}", self.job_name(), self.namespace);
        Ok(())
    }

    async fn read_job(&self) -> ExecutionResult<Job> {
        if !self.submitted {
            return Err(ExecutionError::NotSubmitted);
        }
        self.client
            .get_job(&self.namespace, self.job_name())
            .await?
            .ok_or_else(|| ClusterError::not_found(ResourceKind::Job, self.job_name()).into())
    }

    pub async fn get_status(&self) -> ExecutionResult<JobStatus> {
        if self.killed {
            return Ok(JobStatus::Killed);
        }
        let job = self.read_job().await?;
        Ok(status::classify(&job))
    }

    pub async fn is_complete(&self) -> ExecutionResult<bool> {
        Ok(self.get_status().await?.is_terminal())
    }

    pub async fn is_succeeded(&self) -> ExecutionResult<bool> {
        Ok(self.get_status().await? == JobStatus::Succeeded)
    }

    pub async fn is_active(&self) -> ExecutionResult<bool> {
        Ok(self.get_status().await? == JobStatus::Active)
    }

    /// Poll until the job finishes.
    ///
    /// The job is killed once `wall_time` is exceeded, or once `grace_period`
    /// has passed and one of its pods is stuck in `ImagePullBackOff`.
    pub async fn monitor(
        &mut self,
        interval: Duration,
        grace_period: Duration,
        wall_time: Option<Duration>,
    ) -> ExecutionResult<JobStatus> {
        if !self.submitted {
            warn!("Job {} is not submitted", self.job_name());
            return Err(ExecutionError::NotSubmitted);
        }

        let grace_ticks = ticks_within(grace_period, interval);
        let wall_ticks = wall_time.map(|wall_time| ticks_within(wall_time, interval));
        let mut ticks: u64 = 0;

        while self.is_active().await? {
            info!("Job {} is active", self.job_name());
            tokio::time::sleep(interval).await;
            ticks += 1;

            if wall_ticks.is_some_and(|limit| ticks > limit) {
                warn!("Job {} reached its wall time, killing it", self.job_name());
                self.kill().await?;
                return Ok(JobStatus::Killed);
            }

            if ticks > grace_ticks && self.has_image_pull_back_off().await? {
                warn!(
                    "Job {} has a pod waiting with {}, killing it",
                    self.job_name(),
                    IMAGE_PULL_BACK_OFF
                );
                self.kill().await?;
                return Ok(JobStatus::Killed);
            }
        }

        let status = self.get_status().await?;
        info!("Execution of {} is complete: {}", self.job_name(), status);
        Ok(status)
    }

    /// [`monitor`](Self::monitor) with the timings of a [`MonitorConfig`]
    pub async fn monitor_with(&mut self, config: &MonitorConfig) -> ExecutionResult<JobStatus> {
        self.monitor(config.interval, config.grace_period, config.wall_time)
            .await
    }

    async fn kill(&mut self) -> ExecutionResult<()> {
        self.killed = true;
        self.client
            .delete_job(&self.namespace, self.job_name())
            .await?;
        Ok(())
    }

    async fn job_pods(&self) -> ExecutionResult<Vec<Pod>> {
        let selector = format!("{}={}", JOB_NAME_LABEL, self.job_name());
        Ok(self
            .client
            .list_pods(&self.namespace, Some(&selector))
            .await?)
    }

    async fn has_image_pull_back_off(&self) -> ExecutionResult<bool> {
        let pods = self.job_pods().await?;
        Ok(pods.iter().any(|pod| {
            pod.status
                .as_ref()
                .and_then(|status| status.container_statuses.as_ref())
                .into_iter()
                .flatten()
                .filter_map(|container| container.state.as_ref()?.waiting.as_ref())
                .any(|waiting| waiting.reason.as_deref() == Some(IMAGE_PULL_BACK_OFF))
        }))
    }

    fn stager(&self) -> VolumeStager {
        VolumeStager::new(
            self.client.clone(),
            self.namespace.clone(),
            self.layout.clone(),
            self.staging.clone(),
        )
    }

    /// Stage files from the root of the working directory into `destination`
    pub async fn get_file_from_volume(
        &self,
        file_names: &[&str],
        destination: &Path,
    ) -> ExecutionResult<Vec<PathBuf>> {
        let paths: Vec<String> = file_names
            .iter()
            .map(|name| self.layout.path_of(name))
            .collect();
        Ok(self.stager().copy_from_volume(&paths, destination).await?)
    }

    /// Stage one file and parse it as JSON. `None` when nothing was staged or
    /// the content does not parse.
    async fn stage_json(&self, file_name: &str) -> ExecutionResult<Option<Value>> {
        let workdir = tempfile::tempdir()?;
        let staged = self.get_file_from_volume(&[file_name], workdir.path()).await?;
        let Some(path) = staged.first() else {
            warn!("{} could not be staged", file_name);
            return Ok(None);
        };

        let content = tokio::fs::read(path).await?;
        match serde_json::from_slice(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                error!("Could not parse {}: {}", file_name, e);
                Ok(None)
            }
        }
    }

    /// The workflow output object, once the job succeeded
    pub async fn get_output(&self) -> ExecutionResult<Option<Value>> {
        let status = self.get_status().await?;
        if status != JobStatus::Succeeded {
            return Err(ExecutionError::InvalidState(format!(
                "output of job {} requested while {}",
                self.job_name(),
                status
            )));
        }
        self.stage_json(calrissian_core::layout::OUTPUT_FILE).await
    }

    /// The usage report, or an empty object when it is missing or invalid
    pub async fn get_usage_report(&self) -> ExecutionResult<Value> {
        self.ensure_complete("usage report").await?;
        let report = self
            .stage_json(calrissian_core::layout::USAGE_REPORT_FILE)
            .await?;
        Ok(report
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Log of the workflow engine container
    pub async fn get_log(&self) -> ExecutionResult<String> {
        self.ensure_complete("log").await?;
        self.container_log(ContainerName::WorkflowEngine).await
    }

    async fn container_log(&self, container: ContainerName) -> ExecutionResult<String> {
        let pods = self.job_pods().await?;
        let pod_name = pods
            .first()
            .and_then(|pod| pod.metadata.name.clone())
            .ok_or_else(|| ExecutionError::PodNotFound(self.job_name().to_string()))?;

        debug!("Reading {} log of pod {}", container, pod_name);
        Ok(self
            .client
            .read_pod_log(&self.namespace, &pod_name, Some(container.as_str()))
            .await?)
    }

    /// Stage the log of every child tool listed in the usage report
    pub async fn get_tool_logs(&self, destination: &Path) -> ExecutionResult<Vec<PathBuf>> {
        let report = self.get_usage_report().await?;
        let names = child_names(&report);
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let paths: Vec<String> = names
            .iter()
            .map(|name| self.layout.tool_log_path(name))
            .collect();
        Ok(self.stager().copy_from_volume(&paths, destination).await?)
    }

    pub async fn get_start_time(&self) -> ExecutionResult<Option<DateTime<Utc>>> {
        Ok(status::start_time(&self.read_job().await?))
    }

    pub async fn get_completion_time(&self) -> ExecutionResult<Option<DateTime<Utc>>> {
        Ok(status::completion_time(&self.read_job().await?))
    }

    async fn ensure_complete(&self, what: &str) -> ExecutionResult<()> {
        let status = self.get_status().await?;
        if !status.is_terminal() {
            return Err(ExecutionError::InvalidState(format!(
                "{} of job {} requested while {}",
                what,
                self.job_name(),
                status
            )));
        }
        Ok(())
    }
}

/// Whole polling intervals that fit in `limit`
fn ticks_within(limit: Duration, interval: Duration) -> u64 {
    let interval = interval.as_millis().max(1);
    (limit.as_millis() / interval) as u64
}

fn child_names(report: &Value) -> Vec<String> {
    report
        .get("children")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|child| child.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ticks_within() {
        assert_eq!(
            ticks_within(Duration::from_secs(120), Duration::from_secs(15)),
            8
        );
        assert_eq!(
            ticks_within(Duration::from_secs(10), Duration::from_secs(15)),
            0
        );
        assert_eq!(ticks_within(Duration::from_secs(1), Duration::ZERO), 1000);
    }

    #[test]
    fn test_child_names() {
        let report = json!({
            "name": "main",
            "children": [{"name": "node_a", "cores": 1}, {"cores": 2}, {"name": "node_b"}]
        });
        assert_eq!(child_names(&report), vec!["node_a", "node_b"]);
        assert!(child_names(&json!({})).is_empty());
    }
}
