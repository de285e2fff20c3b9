//! End-to-end scenarios against the in-memory cluster

use anyhow::Result;
use calrissian_config::{JobConfig, StagingConfig};
use calrissian_context::ExecutionContext;
use calrissian_core::JobStatus;
use calrissian_execution::CalrissianExecution;
use calrissian_job::CalrissianJob;
use calrissian_kube::testing::{InMemoryCluster, Verb};
use calrissian_kube::ResourceKind;
use calrissian_staging::VolumeStager;
use k8s_openapi::api::batch::v1::{Job, JobStatus as K8sJobStatus};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const WORKFLOW: &str = r##"
cwlVersion: v1.2
$graph:
  - class: Workflow
    id: main
    inputs:
      message: string
    outputs:
      message:
        type: string
        outputSource: echo/message
    steps:
      echo:
        run: "#echo"
        in:
          message: message
        out: [message]
  - class: CommandLineTool
    id: echo
    baseCommand: echo
    stdout: message.txt
    inputs:
      message:
        type: string
        inputBinding:
          position: 1
    outputs:
      message:
        type: string
        outputBinding:
          glob: message.txt
          loadContents: true
          outputEval: $(self[0].contents.trim())
"##;

fn workflow() -> Value {
    serde_yaml::from_str(WORKFLOW).expect("workflow parses")
}

async fn context(cluster: &InMemoryCluster, namespace: &str) -> Result<ExecutionContext> {
    let context = ExecutionContext::new(Arc::new(cluster.clone()), namespace, "longhorn", "10Gi")?;
    context.initialise().await?;
    Ok(context)
}

#[tokio::test(start_paused = true)]
async fn scenario_a_echo_workflow_output() -> Result<()> {
    let cluster = InMemoryCluster::new();
    let context = context(&cluster, "scenario-a").await?;

    let job = CalrissianJob::builder(workflow(), json!({"message": "hello world!"}))
        .name("echo-job")
        .entry_point("main")
        .max_cores(2)
        .max_ram("4G")
        .build(&context)
        .await?;

    let args = job.args();
    let flag = |name: &str| {
        args.iter()
            .position(|arg| arg == name)
            .map(|i| args[i + 1].clone())
    };
    assert_eq!(flag("--max-cores").as_deref(), Some("2"));
    assert_eq!(flag("--max-ram").as_deref(), Some("4G"));

    let mut execution = CalrissianExecution::new(job, &context);
    execution.submit().await?;
    let submitted: Job = cluster
        .object(ResourceKind::Job, "scenario-a", "echo-job")
        .expect("job was posted");
    assert_eq!(
        submitted.metadata.labels.unwrap()["job-name"],
        "echo-job".to_string()
    );

    cluster.script_job_statuses(
        "scenario-a",
        "echo-job",
        vec![
            K8sJobStatus::default(),
            K8sJobStatus {
                active: Some(1),
                ..Default::default()
            },
            K8sJobStatus {
                succeeded: Some(1),
                ..Default::default()
            },
        ],
    );
    cluster.put_volume_file(
        "scenario-a",
        "/calrissian/output.json",
        r#"{"message": "hello world!"}"#,
    );

    let status = execution
        .monitor(Duration::from_secs(15), Duration::from_secs(120), None)
        .await?;
    assert_eq!(status, JobStatus::Succeeded);
    assert_eq!(
        execution.get_output().await?,
        Some(json!({"message": "hello world!"}))
    );

    assert!(context.dispose().await?);
    assert!(!cluster.contains(ResourceKind::Namespace, "", "scenario-a"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scenario_b_missing_image_is_killed_after_grace_period() -> Result<()> {
    let cluster = InMemoryCluster::new();
    let config = JobConfig {
        image: "registry.example/does-not-exist:0.0.0".to_string(),
        ..JobConfig::default()
    };
    cluster.mark_image_unpullable(&config.image);
    let context = context(&cluster, "scenario-b").await?;

    let job = CalrissianJob::builder(workflow(), json!({"message": "hello world!"}))
        .name("unpullable")
        .max_cores(2)
        .max_ram("4G")
        .config(config)
        .build(&context)
        .await?;

    let mut execution = CalrissianExecution::new(job, &context);
    execution.submit().await?;

    let wall_time = Duration::from_secs(24 * 3600);
    let started = tokio::time::Instant::now();
    let status = execution
        .monitor(Duration::from_secs(15), Duration::from_secs(120), Some(wall_time))
        .await?;

    assert_eq!(status, JobStatus::Killed);
    assert!(started.elapsed() < wall_time);
    assert!(execution.is_complete().await?);
    assert!(!execution.is_succeeded().await?);
    assert!(!cluster.contains(ResourceKind::Job, "scenario-b", "unpullable"));
    Ok(())
}

#[tokio::test]
async fn scenario_c_missing_file_is_not_staged() -> Result<()> {
    let cluster = InMemoryCluster::new();
    let context = context(&cluster, "scenario-c").await?;
    let destination = tempfile::tempdir()?;

    let stager = VolumeStager::new(
        context.client().clone(),
        context.namespace(),
        context.layout().clone(),
        StagingConfig::default(),
    );
    let staged = stager
        .copy_from_volume(&[context.layout().output_path()], destination.path())
        .await?;

    assert!(staged.is_empty());
    assert_eq!(std::fs::read_dir(destination.path())?.count(), 0);
    assert!(cluster.names(ResourceKind::Pod, "scenario-c").is_empty());
    Ok(())
}

#[tokio::test]
async fn scenario_d_configmap_is_recreated_not_merged() -> Result<()> {
    let cluster = InMemoryCluster::new();
    let context = context(&cluster, "scenario-d").await?;

    context
        .create_configmap("params", "params", "message: first\nextra: kept?\n")
        .await?;
    context
        .create_configmap("params", "params", "message: second\n")
        .await?;

    assert_eq!(
        context.read_configmap("params", "params").await?.as_deref(),
        Some("message: second\n")
    );
    assert_eq!(cluster.count_calls(Verb::Delete, ResourceKind::ConfigMap), 1);
    Ok(())
}

#[tokio::test]
async fn initialise_twice_performs_no_mutations() -> Result<()> {
    let cluster = InMemoryCluster::new();
    let context = context(&cluster, "idempotent").await?;

    cluster.clear_calls();
    context.initialise().await?;

    assert!(cluster.mutating_calls().is_empty());
    assert!(!cluster.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn configmap_round_trip_preserves_yaml_and_json() -> Result<()> {
    let cluster = InMemoryCluster::new();
    let context = context(&cluster, "round-trip").await?;

    let yaml = serde_yaml::to_string(&workflow())?;
    let json = serde_json::to_string(&json!({"A": "1", "B": "two words"}))?;
    context.create_configmap("cwl-workflow", "cwl-workflow", &yaml).await?;
    context.create_configmap("pod-env-vars", "pod-env-vars", &json).await?;

    let read_yaml = context
        .read_configmap("cwl-workflow", "cwl-workflow")
        .await?
        .expect("yaml stored");
    let read_json = context
        .read_configmap("pod-env-vars", "pod-env-vars")
        .await?
        .expect("json stored");
    assert_eq!(serde_yaml::from_str::<Value>(&read_yaml)?, workflow());
    assert_eq!(read_json, json);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn killed_execution_stays_killed() -> Result<()> {
    let cluster = InMemoryCluster::new();
    let context = context(&cluster, "killed").await?;
    let job = CalrissianJob::builder(workflow(), json!({}))
        .name("slow")
        .max_cores(1)
        .max_ram("1G")
        .build(&context)
        .await?;

    let mut execution = CalrissianExecution::new(job, &context);
    execution.submit().await?;
    cluster.script_job_statuses(
        "killed",
        "slow",
        vec![K8sJobStatus {
            active: Some(1),
            ..Default::default()
        }],
    );

    execution
        .monitor(
            Duration::from_secs(5),
            Duration::from_secs(600),
            Some(Duration::from_secs(20)),
        )
        .await?;

    assert_eq!(execution.get_status().await?, JobStatus::Killed);
    assert!(execution.is_complete().await?);
    assert!(!execution.is_succeeded().await?);
    assert!(!execution.is_active().await?);
    Ok(())
}
