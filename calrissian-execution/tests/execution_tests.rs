use calrissian_config::JobConfig;
use calrissian_context::ExecutionContext;
use calrissian_core::JobStatus;
use calrissian_execution::{CalrissianExecution, ExecutionError};
use calrissian_job::CalrissianJob;
use calrissian_kube::testing::{InMemoryCluster, Verb};
use calrissian_kube::ResourceKind;
use k8s_openapi::api::batch::v1::JobStatus as K8sJobStatus;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const NS: &str = "execution-test";

async fn submitted(cluster: &InMemoryCluster) -> CalrissianExecution {
    let context = ExecutionContext::new(Arc::new(cluster.clone()), NS, "standard", "1Gi").unwrap();
    context.initialise().await.unwrap();

    let job = CalrissianJob::builder(json!({"class": "Workflow", "steps": []}), json!({}))
        .name("echo")
        .max_cores(2)
        .max_ram("4G")
        .build(&context)
        .await
        .unwrap();

    let mut execution = CalrissianExecution::new(job, &context);
    execution.submit().await.unwrap();
    execution
}

fn running() -> K8sJobStatus {
    K8sJobStatus {
        active: Some(1),
        ..Default::default()
    }
}

fn succeeded() -> K8sJobStatus {
    K8sJobStatus {
        succeeded: Some(1),
        ..Default::default()
    }
}

fn failed() -> K8sJobStatus {
    K8sJobStatus {
        failed: Some(1),
        ..Default::default()
    }
}

#[tokio::test]
async fn unsubmitted_job_has_no_status() {
    let cluster = InMemoryCluster::new();
    let context = ExecutionContext::new(Arc::new(cluster.clone()), NS, "standard", "1Gi").unwrap();
    context.initialise().await.unwrap();
    let job = CalrissianJob::builder(json!({}), json!({}))
        .max_cores(1)
        .max_ram("1G")
        .build(&context)
        .await
        .unwrap();

    let execution = CalrissianExecution::new(job, &context);
    assert!(matches!(
        execution.get_status().await,
        Err(ExecutionError::NotSubmitted)
    ));
}

#[tokio::test]
async fn submit_creates_labelled_job() {
    let cluster = InMemoryCluster::new();
    let execution = submitted(&cluster).await;

    assert!(cluster.contains(ResourceKind::Job, NS, "echo"));
    assert!(cluster.contains(ResourceKind::Pod, NS, "echo-pod"));
    // No status yet counts as active
    assert_eq!(execution.get_status().await.unwrap(), JobStatus::Active);
    assert!(execution.is_active().await.unwrap());
    assert!(!execution.is_complete().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn monitor_follows_job_to_success() {
    let cluster = InMemoryCluster::new();
    let mut execution = submitted(&cluster).await;
    cluster.script_job_statuses(NS, "echo", vec![running(), running(), succeeded()]);

    let status = execution
        .monitor(Duration::from_secs(5), Duration::from_secs(120), None)
        .await
        .unwrap();

    assert_eq!(status, JobStatus::Succeeded);
    assert!(execution.is_succeeded().await.unwrap());
    assert!(!execution.is_killed());
    assert!(cluster.contains(ResourceKind::Job, NS, "echo"));
}

#[tokio::test(start_paused = true)]
async fn monitor_reports_failure() {
    let cluster = InMemoryCluster::new();
    let mut execution = submitted(&cluster).await;
    cluster.script_job_statuses(NS, "echo", vec![running(), failed()]);

    let status = execution
        .monitor(Duration::from_secs(5), Duration::from_secs(120), None)
        .await
        .unwrap();

    assert_eq!(status, JobStatus::Failed);
    assert!(execution.is_complete().await.unwrap());
    assert!(!execution.is_succeeded().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn wall_time_kills_job() {
    let cluster = InMemoryCluster::new();
    let mut execution = submitted(&cluster).await;
    cluster.script_job_statuses(NS, "echo", vec![running()]);

    let status = execution
        .monitor(
            Duration::from_secs(10),
            Duration::from_secs(3600),
            Some(Duration::from_secs(60)),
        )
        .await
        .unwrap();

    assert_eq!(status, JobStatus::Killed);
    assert!(execution.is_killed());
    assert!(!cluster.contains(ResourceKind::Job, NS, "echo"));
    assert_eq!(cluster.count_calls(Verb::Delete, ResourceKind::Job), 1);
}

#[tokio::test(start_paused = true)]
async fn killed_status_short_circuits_cluster_reads() {
    let cluster = InMemoryCluster::new();
    let mut execution = submitted(&cluster).await;
    cluster.script_job_statuses(NS, "echo", vec![running()]);

    execution
        .monitor(
            Duration::from_secs(1),
            Duration::from_secs(3600),
            Some(Duration::from_secs(2)),
        )
        .await
        .unwrap();

    cluster.clear_calls();
    assert_eq!(execution.get_status().await.unwrap(), JobStatus::Killed);
    assert!(execution.is_complete().await.unwrap());
    assert!(!execution.is_succeeded().await.unwrap());
    assert!(!execution.is_active().await.unwrap());
    assert!(cluster.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn image_pull_back_off_kills_after_grace_period() {
    let cluster = InMemoryCluster::new();
    cluster.mark_image_unpullable(&JobConfig::default().image);
    let mut execution = submitted(&cluster).await;

    let started = tokio::time::Instant::now();
    let status = execution
        .monitor(
            Duration::from_secs(15),
            Duration::from_secs(120),
            Some(Duration::from_secs(3600)),
        )
        .await
        .unwrap();

    assert_eq!(status, JobStatus::Killed);
    assert!(!execution.is_succeeded().await.unwrap());
    let waited = started.elapsed();
    assert!(waited > Duration::from_secs(120));
    assert!(waited < Duration::from_secs(3600));
}

#[tokio::test(start_paused = true)]
async fn image_pull_back_off_of_another_job_is_ignored() {
    let cluster = InMemoryCluster::new();
    let mut execution = submitted(&cluster).await;
    cluster.insert(
        ResourceKind::Pod,
        NS,
        &k8s_openapi::api::core::v1::Pod {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("other-pod".to_string()),
                labels: Some([("job-name".to_string(), "other".to_string())].into()),
                ..Default::default()
            },
            spec: Some(k8s_openapi::api::core::v1::PodSpec {
                containers: vec![k8s_openapi::api::core::v1::Container {
                    name: "calrissian".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    cluster.set_waiting_reason(NS, "other-pod", "ImagePullBackOff");
    cluster.script_job_statuses(
        NS,
        "echo",
        std::iter::repeat_n(running(), 12)
            .chain([succeeded()])
            .collect(),
    );

    let status = execution
        .monitor(Duration::from_secs(15), Duration::from_secs(30), None)
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn output_and_usage_report_are_staged() {
    let cluster = InMemoryCluster::new();
    let mut execution = submitted(&cluster).await;
    cluster.script_job_statuses(NS, "echo", vec![succeeded()]);
    cluster.put_volume_file(NS, "/calrissian/output.json", r#"{"message": "hello world!"}"#);
    cluster.put_volume_file(
        NS,
        "/calrissian/report.json",
        r#"{"cores": 2, "children": [{"name": "node_a"}]}"#,
    );
    cluster.put_volume_file(NS, "/calrissian/node_a.log", "tool says hi");
    execution
        .monitor(Duration::from_secs(1), Duration::from_secs(120), None)
        .await
        .unwrap();

    let output = execution.get_output().await.unwrap();
    assert_eq!(output, Some(json!({"message": "hello world!"})));

    let report = execution.get_usage_report().await.unwrap();
    assert_eq!(report["cores"], 2);

    let dir = tempfile::tempdir().unwrap();
    let logs = execution.get_tool_logs(dir.path()).await.unwrap();
    assert_eq!(logs, vec![dir.path().join("node_a.log")]);
    assert_eq!(std::fs::read_to_string(&logs[0]).unwrap(), "tool says hi");

    // Every staging pod is gone again
    assert_eq!(cluster.names(ResourceKind::Pod, NS), vec!["echo-pod".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn unparsable_output_is_absent() {
    let cluster = InMemoryCluster::new();
    let execution = submitted(&cluster).await;
    cluster.script_job_statuses(NS, "echo", vec![succeeded()]);
    cluster.put_volume_file(NS, "/calrissian/output.json", "not json {");

    assert_eq!(execution.get_output().await.unwrap(), None);
    // Missing report degrades to an empty object
    assert_eq!(execution.get_usage_report().await.unwrap(), json!({}));
}

#[tokio::test(start_paused = true)]
async fn non_utf8_output_and_report_degrade() {
    let cluster = InMemoryCluster::new();
    let execution = submitted(&cluster).await;
    cluster.script_job_statuses(NS, "echo", vec![succeeded()]);
    cluster.put_volume_file(NS, "/calrissian/output.json", vec![0xff, 0xfe, 0x7b]);
    cluster.put_volume_file(NS, "/calrissian/report.json", vec![0xff, 0xfe]);

    assert_eq!(execution.get_output().await.unwrap(), None);
    assert_eq!(execution.get_usage_report().await.unwrap(), json!({}));
}

#[tokio::test]
async fn output_requires_success() {
    let cluster = InMemoryCluster::new();
    let execution = submitted(&cluster).await;
    cluster.script_job_statuses(NS, "echo", vec![failed()]);

    assert!(matches!(
        execution.get_output().await,
        Err(ExecutionError::InvalidState(_))
    ));
}

#[tokio::test]
async fn log_is_read_from_job_pod() {
    let cluster = InMemoryCluster::new();
    let execution = submitted(&cluster).await;
    cluster.script_job_statuses(NS, "echo", vec![succeeded()]);
    cluster.set_pod_log(NS, "echo-pod", "engine finished\n");

    assert_eq!(execution.get_log().await.unwrap(), "engine finished\n");
}

#[tokio::test]
async fn log_without_pod_is_pod_not_found() {
    let cluster = InMemoryCluster::new();
    let execution = submitted(&cluster).await;
    cluster.script_job_statuses(NS, "echo", vec![failed()]);
    cluster.insert(ResourceKind::Pod, NS, &json!({"metadata": {"name": "unrelated"}}));
    {
        use calrissian_kube::ClusterClient;
        cluster.delete_pod(NS, "echo-pod").await.unwrap();
    }

    assert!(matches!(
        execution.get_log().await,
        Err(ExecutionError::PodNotFound(name)) if name == "echo"
    ));
}

#[tokio::test]
async fn start_and_completion_times() {
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::batch::v1::JobCondition;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    let cluster = InMemoryCluster::new();
    let execution = submitted(&cluster).await;
    assert_eq!(execution.get_start_time().await.unwrap(), None);
    assert_eq!(execution.get_completion_time().await.unwrap(), None);

    let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let failed_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    cluster.script_job_statuses(
        NS,
        "echo",
        vec![K8sJobStatus {
            failed: Some(1),
            start_time: Some(Time(start)),
            conditions: Some(vec![JobCondition {
                type_: "Failed".to_string(),
                status: "True".to_string(),
                last_transition_time: Some(Time(failed_at)),
                ..Default::default()
            }]),
            ..Default::default()
        }],
    );

    assert_eq!(execution.get_start_time().await.unwrap(), Some(start));
    assert_eq!(execution.get_completion_time().await.unwrap(), Some(failed_at));
}
