//! CWL execution request and its Kubernetes Job

use calrissian_config::JobConfig;
use calrissian_context::ExecutionContext;
use calrissian_core::{generate_job_name, sanitize_dns_label, WorkingDirLayout};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::error::{JobError, JobResult};
use crate::manifest::{self, Payload};
use crate::requirements::ResourceRequirements;
use crate::security::SecurityContext;

/// Label carrying the job name on the job and its pods
pub const JOB_NAME_LABEL: &str = "job-name";

/// Collects the inputs of a job. Nothing touches the cluster until
/// [`build`](CalrissianJobBuilder::build).
#[derive(Debug, Clone)]
pub struct CalrissianJobBuilder {
    cwl: Value,
    params: Value,
    name: Option<String>,
    entry_point: Option<String>,
    pod_env_vars: Option<BTreeMap<String, String>>,
    pod_node_selector: Option<BTreeMap<String, String>>,
    max_cores: Option<u32>,
    max_ram: Option<String>,
    security_context: Option<SecurityContext>,
    debug: bool,
    no_read_only: bool,
    keep_pods: bool,
    tool_logs: bool,
    config: JobConfig,
}

impl CalrissianJobBuilder {
    pub fn new(cwl: Value, params: Value) -> Self {
        Self {
            cwl,
            params,
            name: None,
            entry_point: None,
            pod_env_vars: None,
            pod_node_selector: None,
            max_cores: None,
            max_ram: None,
            security_context: None,
            debug: false,
            no_read_only: false,
            keep_pods: false,
            tool_logs: false,
            config: JobConfig::default(),
        }
    }

    /// Use `name` instead of a generated one
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Process of a packed document to run, appended as `#fragment`
    pub fn entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn pod_env_vars(mut self, env_vars: BTreeMap<String, String>) -> Self {
        self.pod_env_vars = Some(env_vars);
        self
    }

    pub fn pod_node_selector(mut self, node_selector: BTreeMap<String, String>) -> Self {
        self.pod_node_selector = Some(node_selector);
        self
    }

    pub fn max_cores(mut self, max_cores: u32) -> Self {
        self.max_cores = Some(max_cores);
        self
    }

    pub fn max_ram(mut self, max_ram: impl Into<String>) -> Self {
        self.max_ram = Some(max_ram.into());
        self
    }

    pub fn security_context(mut self, security_context: SecurityContext) -> Self {
        self.security_context = Some(security_context);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn no_read_only(mut self, no_read_only: bool) -> Self {
        self.no_read_only = no_read_only;
        self
    }

    /// Keep the step pods the engine creates
    pub fn keep_pods(mut self, keep_pods: bool) -> Self {
        self.keep_pods = keep_pods;
        self
    }

    /// Have the engine write one log per tool to the working directory
    pub fn tool_logs(mut self, tool_logs: bool) -> Self {
        self.tool_logs = tool_logs;
        self
    }

    pub fn backoff_limit(mut self, backoff_limit: i32) -> Self {
        self.config.backoff_limit = backoff_limit;
        self
    }

    pub fn config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve limits and the job name, then stage the documents as config
    /// maps in the context's namespace
    pub async fn build(self, context: &ExecutionContext) -> JobResult<CalrissianJob> {
        let (max_cores, max_ram) = self.resolve_limits()?;

        let name = match &self.name {
            Some(name) => {
                let sanitized = sanitize_dns_label(name);
                if sanitized.is_empty() {
                    return Err(JobError::InvalidName(name.clone()));
                }
                sanitized
            }
            None => generate_job_name(),
        };
        info!("Job name: {}", name);

        let security_context = self.security_context.unwrap_or_else(|| {
            info!("Using default security context (runAsUser 0, runAsGroup 0, fsGroup 0)");
            SecurityContext::default()
        });

        let job = CalrissianJob {
            name,
            namespace: context.namespace().to_string(),
            layout: context.layout().clone(),
            cwl: self.cwl,
            params: self.params,
            entry_point: self.entry_point,
            pod_env_vars: self.pod_env_vars,
            pod_node_selector: self.pod_node_selector,
            max_cores,
            max_ram,
            security_context,
            debug: self.debug,
            no_read_only: self.no_read_only,
            keep_pods: self.keep_pods,
            tool_logs: self.tool_logs,
            config: self.config,
        };
        job.stage_payloads(context).await?;
        Ok(job)
    }

    fn resolve_limits(&self) -> JobResult<(u32, String)> {
        let evaluated = match (&self.max_cores, &self.max_ram) {
            (Some(_), Some(_)) => None,
            _ => Some(ResourceRequirements::evaluate(&self.cwl)),
        };

        let max_cores = self
            .max_cores
            .filter(|cores| *cores > 0)
            .or_else(|| evaluated.as_ref().and_then(ResourceRequirements::max_cores))
            .ok_or_else(|| {
                JobError::InvalidResourceSpec(
                    "max cores not given and not found in the CWL requirements".to_string(),
                )
            })?;

        let max_ram = self
            .max_ram
            .clone()
            .filter(|ram| !ram.trim().is_empty())
            .or_else(|| evaluated.as_ref().and_then(ResourceRequirements::max_ram))
            .ok_or_else(|| {
                JobError::InvalidResourceSpec(
                    "max RAM not given and not found in the CWL requirements".to_string(),
                )
            })?;

        Ok((max_cores, max_ram))
    }
}

/// A workflow execution request bound to one execution namespace
#[derive(Debug, Clone)]
pub struct CalrissianJob {
    name: String,
    namespace: String,
    layout: WorkingDirLayout,
    cwl: Value,
    params: Value,
    entry_point: Option<String>,
    pod_env_vars: Option<BTreeMap<String, String>>,
    pod_node_selector: Option<BTreeMap<String, String>>,
    max_cores: u32,
    max_ram: String,
    security_context: SecurityContext,
    debug: bool,
    no_read_only: bool,
    keep_pods: bool,
    tool_logs: bool,
    config: JobConfig,
}

impl CalrissianJob {
    pub fn builder(cwl: Value, params: Value) -> CalrissianJobBuilder {
        CalrissianJobBuilder::new(cwl, params)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn layout(&self) -> &WorkingDirLayout {
        &self.layout
    }

    pub fn max_cores(&self) -> u32 {
        self.max_cores
    }

    pub fn max_ram(&self) -> &str {
        &self.max_ram
    }

    pub fn tool_logs(&self) -> bool {
        self.tool_logs
    }

    pub fn backoff_limit(&self) -> i32 {
        self.config.backoff_limit
    }

    async fn stage_payloads(&self, context: &ExecutionContext) -> JobResult<()> {
        info!("Creating CWL config map");
        stage(context, Payload::CWL, &serde_yaml::to_string(&self.cwl)?).await?;

        info!("Creating processing parameters config map");
        stage(context, Payload::PARAMS, &serde_yaml::to_string(&self.params)?).await?;

        if let Some(env_vars) = self.pod_env_vars.as_ref().filter(|m| !m.is_empty()) {
            info!("Creating pod environment variables config map");
            stage(context, Payload::POD_ENV_VARS, &serde_json::to_string(env_vars)?).await?;
        }

        if let Some(selector) = self.pod_node_selector.as_ref().filter(|m| !m.is_empty()) {
            info!("Creating pod node selector config map");
            stage(context, Payload::POD_NODE_SELECTOR, &serde_json::to_string(selector)?)
                .await?;
        }
        Ok(())
    }

    fn payloads(&self) -> Vec<Payload> {
        let mut payloads = vec![Payload::CWL, Payload::PARAMS];
        if self.has_pod_env_vars() {
            payloads.push(Payload::POD_ENV_VARS);
        }
        if self.has_pod_node_selector() {
            payloads.push(Payload::POD_NODE_SELECTOR);
        }
        payloads
    }

    fn has_pod_env_vars(&self) -> bool {
        self.pod_env_vars.as_ref().is_some_and(|m| !m.is_empty())
    }

    fn has_pod_node_selector(&self) -> bool {
        self.pod_node_selector.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Command line of the workflow engine
    pub fn args(&self) -> Vec<String> {
        let layout = &self.layout;
        let mut args: Vec<String> = vec![
            "--stdout".into(),
            layout.output_path(),
            "--stderr".into(),
            layout.stderr_path(),
            "--usage-report".into(),
            layout.usage_report_path(),
            "--max-ram".into(),
            self.max_ram.clone(),
            "--max-cores".into(),
            self.max_cores.to_string(),
            "--tmp-outdir-prefix".into(),
            layout.mount_prefix(),
            "--outdir".into(),
            layout.mount_prefix(),
        ];

        if self.has_pod_node_selector() {
            args.extend(["--pod-nodeselectors".into(), Payload::POD_NODE_SELECTOR.path()]);
        }
        if self.has_pod_env_vars() {
            args.extend(["--pod-env-vars".into(), Payload::POD_ENV_VARS.path()]);
        }
        if self.debug {
            args.push("--debug".into());
        }
        if self.no_read_only {
            args.push("--no-read-only".into());
        }
        if self.tool_logs {
            args.extend(["--tool-logs-basepath".into(), layout.mount_path.clone()]);
        }
        args.push("--enable-ext".into());

        let cwl_path = match &self.entry_point {
            Some(entry_point) => format!("{}#{}", Payload::CWL.path(), entry_point),
            None => Payload::CWL.path(),
        };
        args.extend([cwl_path, Payload::PARAMS.path()]);
        args
    }

    /// The submittable Job. Pure: derived from the job's own fields only.
    pub fn to_k8s_job(&self) -> Job {
        let payloads = self.payloads();

        let mut volumes: Vec<_> = payloads.iter().map(Payload::volume).collect();
        volumes.push(manifest::working_dir_volume(&self.layout));

        let mut volume_mounts: Vec<_> = payloads.iter().map(Payload::volume_mount).collect();
        volume_mounts.push(manifest::working_dir_mount(&self.layout));

        let container = manifest::engine_container(
            &self.config,
            self.args(),
            manifest::engine_env(self.keep_pods),
            volume_mounts,
        );

        let labels = BTreeMap::from([(JOB_NAME_LABEL.to_string(), self.name.clone())]);

        Job {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(self.config.backoff_limit),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        restart_policy: Some("Never".to_string()),
                        containers: vec![container],
                        volumes: Some(volumes),
                        security_context: Some(self.security_context.into()),
                        termination_grace_period_seconds: Some(
                            self.config.termination_grace_period_seconds,
                        ),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Write the Job manifest as YAML
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> JobResult<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(&self.to_k8s_job())?;
        std::fs::write(path, yaml)?;
        info!("Job {} serialized to {}", self.name, path.display());
        Ok(())
    }
}

async fn stage(context: &ExecutionContext, payload: Payload, content: &str) -> JobResult<()> {
    context
        .create_configmap(payload.config_map, payload.key(), content)
        .await
        .map_err(|source| JobError::ConfigMapStagingFailed {
            name: payload.config_map.to_string(),
            source,
        })?;
    Ok(())
}
