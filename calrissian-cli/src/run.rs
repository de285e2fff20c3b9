//! One workflow run: provision, execute, collect, clean up

use anyhow::{Context, Result};
use calrissian_config::CalrissianConfig;
use calrissian_context::{ExecutionContext, ImagePullSecrets};
use calrissian_core::{generate_namespace_name, JobStatus};
use calrissian_execution::{CalrissianExecution, ExecutionError};
use calrissian_job::{CalrissianJob, ResourceRequirements, SecurityContext};
use calrissian_kube::ClusterClient;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::inputs::{self, CwlLocation};

/// What a finished run reports back
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub namespace: String,
    pub status: JobStatus,
    pub output: Option<Value>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

/// Run the workflow described by `cli` in a fresh namespace
pub async fn run(
    cli: &Cli,
    config: &CalrissianConfig,
    client: Arc<dyn ClusterClient>,
) -> Result<RunOutcome> {
    let params = inputs::parse_params(&cli.params)?;
    let location = CwlLocation::parse(&cli.cwl);
    let cwl = location.load().await?;
    let requirements = ResourceRequirements::evaluate(&cwl);

    let volume_size = cli
        .volume_size
        .clone()
        .or_else(|| requirements.volume_size())
        .unwrap_or_else(|| config.context.volume_size.clone());
    let storage_class = cli
        .storage_class
        .clone()
        .unwrap_or_else(|| config.context.storage_class.clone());

    let namespace = generate_namespace_name();
    info!("namespace: {}", namespace);
    let context = build_context(cli, config, client, &namespace, &storage_class, &volume_size)?;

    let result = execute(cli, config, &context, &location, cwl, params).await;

    if cli.keep_resources {
        info!("Keeping resources in namespace {}", namespace);
    } else {
        info!("Cleaning up namespace {}", namespace);
        if let Err(e) = context.dispose().await {
            error!("Failed to dispose of namespace {}: {}", namespace, e);
        }
    }

    let (status, output) = result?;
    Ok(RunOutcome {
        namespace,
        status,
        output,
    })
}

fn build_context(
    cli: &Cli,
    config: &CalrissianConfig,
    client: Arc<dyn ClusterClient>,
    namespace: &str,
    storage_class: &str,
    volume_size: &str,
) -> Result<ExecutionContext> {
    let mut context = ExecutionContext::new(client, namespace, storage_class, volume_size)?
        .with_config(&config.context);

    if let Some(path) = &cli.secret_config {
        context = context.with_image_pull_secrets(ImagePullSecrets::from_file(path)?);
    }
    if let Some(path) = &cli.namespace_quota {
        context = context.with_resource_quota(inputs::read_string_map(path)?);
    }
    if let Some(path) = &cli.namespace_labels {
        context = context.with_labels(inputs::read_string_map(path)?);
    }
    if let Some(path) = &cli.namespace_annotations {
        context = context.with_annotations(inputs::read_string_map(path)?);
    }
    Ok(context)
}

async fn execute(
    cli: &Cli,
    config: &CalrissianConfig,
    context: &ExecutionContext,
    location: &CwlLocation,
    cwl: Value,
    params: Value,
) -> Result<(JobStatus, Option<Value>)> {
    context
        .initialise()
        .await
        .context("Failed to provision the namespace")?;

    let mut builder = CalrissianJob::builder(cwl, params)
        .entry_point(location.entry_point.clone())
        .debug(cli.debug)
        .no_read_only(cli.no_read_only)
        .tool_logs(cli.tool_logs)
        .config(config.job.clone());
    if let Some(max_cores) = cli.max_cores {
        builder = builder.max_cores(max_cores);
    }
    if let Some(max_ram) = &cli.max_ram {
        builder = builder.max_ram(max_ram.clone());
    }
    if let Some(path) = &cli.pod_env_vars {
        builder = builder.pod_env_vars(inputs::read_string_map(path)?);
    }
    if let Some(path) = &cli.pod_node_selector {
        builder = builder.pod_node_selector(inputs::read_string_map(path)?);
    }
    if let Some(path) = &cli.security_context {
        builder = builder.security_context(inputs::read_yaml::<SecurityContext>(path)?);
    }
    let job = builder.build(context).await?;

    let mut execution =
        CalrissianExecution::new(job, context).with_staging_config(config.staging.clone());
    execution.submit().await?;

    let interval = cli
        .monitor_interval
        .map(Duration::from_secs)
        .unwrap_or(config.monitor.interval);
    let grace_period = cli
        .grace_period
        .map(Duration::from_secs)
        .unwrap_or(config.monitor.grace_period);
    let wall_time = cli.wall_time.map(Duration::from_secs).or(config.monitor.wall_time);
    let status = execution.monitor(interval, grace_period, wall_time).await?;

    if status == JobStatus::Succeeded {
        info!("execution successful");
    } else {
        info!("execution failed: {}", status);
    }

    let output = handle_outputs(cli, &execution, status).await?;
    Ok((status, output))
}

async fn handle_outputs(
    cli: &Cli,
    execution: &CalrissianExecution,
    status: JobStatus,
) -> Result<Option<Value>> {
    let output = if status == JobStatus::Succeeded {
        execution.get_output().await?
    } else {
        None
    };
    if output.is_none() {
        error!("Failed to retrieve the execution output");
    }

    if let Some(path) = &cli.stdout {
        write_json(path, output.as_ref().unwrap_or(&Value::Null))?;
    }

    if let Some(path) = &cli.stderr {
        match execution.get_log().await {
            Ok(log) => std::fs::write(path, log)
                .with_context(|| format!("Failed to write {}", path.display()))?,
            Err(ExecutionError::PodNotFound(job)) => {
                warn!("No pod left for job {}, no log to write", job)
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(path) = &cli.usage_report {
        write_json(path, &execution.get_usage_report().await?)?;
    }

    if cli.tool_logs {
        let staged = execution.get_tool_logs(Path::new(".")).await?;
        info!("Staged {} tool log(s)", staged.len());
    }

    Ok(output)
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let content = serde_json::to_string(value)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
