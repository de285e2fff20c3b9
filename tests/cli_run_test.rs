//! Whole `calrissiantool` runs against the in-memory cluster

use anyhow::Result;
use calrissian_cli::{run, Cli};
use calrissian_config::CalrissianConfig;
use calrissian_core::JobStatus;
use calrissian_kube::testing::{InMemoryCluster, Verb};
use calrissian_kube::ResourceKind;
use clap::Parser;
use std::sync::Arc;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("calrissiantool").chain(args.iter().copied()))
        .expect("valid command line")
}

const TOOL: &str = "cwlVersion: v1.2\nclass: CommandLineTool\nbaseCommand: echo\ninputs: {}\noutputs: {}\n";

#[tokio::test(start_paused = true)]
async fn run_kills_overdue_job_and_cleans_up() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cwl = dir.path().join("app.cwl");
    let stdout = dir.path().join("out.json");
    std::fs::write(&cwl, TOOL)?;

    let cluster = InMemoryCluster::new();
    let cli = parse(&[
        "--max-cores",
        "1",
        "--max-ram",
        "512Mi",
        "--monitor-interval",
        "10",
        "--wall-time",
        "30",
        "--stdout",
        stdout.to_str().expect("utf-8 path"),
        cwl.to_str().expect("utf-8 path"),
        "--message=hello",
    ]);

    let outcome = run(&cli, &CalrissianConfig::default(), Arc::new(cluster.clone())).await?;

    assert_eq!(outcome.status, JobStatus::Killed);
    assert!(!outcome.succeeded());
    assert_eq!(outcome.output, None);
    assert_eq!(std::fs::read_to_string(&stdout)?, "null");
    assert!(outcome.namespace.starts_with("calrissian-"));
    assert!(!cluster.contains(ResourceKind::Namespace, "", &outcome.namespace));
    assert_eq!(cluster.count_calls(Verb::Delete, ResourceKind::Job), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn keep_resources_leaves_namespace() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cwl = dir.path().join("app.cwl");
    let params = dir.path().join("params.yml");
    std::fs::write(&cwl, TOOL)?;
    std::fs::write(&params, "message: hello\n")?;

    let cluster = InMemoryCluster::new();
    let cli = parse(&[
        "--max-cores",
        "1",
        "--max-ram",
        "512Mi",
        "--monitor-interval",
        "5",
        "--wall-time",
        "5",
        "--keep-resources",
        cwl.to_str().expect("utf-8 path"),
        params.to_str().expect("utf-8 path"),
    ]);

    let outcome = run(&cli, &CalrissianConfig::default(), Arc::new(cluster.clone())).await?;

    assert_eq!(outcome.status, JobStatus::Killed);
    assert!(cluster.contains(ResourceKind::Namespace, "", &outcome.namespace));
    assert!(cluster.contains(ResourceKind::ConfigMap, &outcome.namespace, "params"));
    Ok(())
}

#[tokio::test]
async fn missing_params_fail_before_touching_the_cluster() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cwl = dir.path().join("app.cwl");
    std::fs::write(&cwl, TOOL)?;

    let cluster = InMemoryCluster::new();
    let cli = parse(&[cwl.to_str().expect("utf-8 path")]);

    let result = run(&cli, &CalrissianConfig::default(), Arc::new(cluster.clone())).await;

    assert!(result.is_err());
    assert!(cluster.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn unresolvable_limits_dispose_the_namespace() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cwl = dir.path().join("app.cwl");
    std::fs::write(&cwl, TOOL)?;

    let cluster = InMemoryCluster::new();
    // No --max-cores and a tool without ResourceRequirement
    let cli = parse(&[cwl.to_str().expect("utf-8 path"), "--message=hello"]);

    let result = run(&cli, &CalrissianConfig::default(), Arc::new(cluster.clone())).await;

    assert!(result.is_err());
    assert_eq!(cluster.count_calls(Verb::Create, ResourceKind::Namespace), 1);
    assert_eq!(cluster.count_calls(Verb::Create, ResourceKind::Job), 0);
    assert!(cluster.names(ResourceKind::Namespace, "").is_empty());
    Ok(())
}
