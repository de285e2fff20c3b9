//! Disposable pod mounting the working-directory volume

use calrissian_config::StagingConfig;
use calrissian_core::WorkingDirLayout;
use calrissian_kube::{ClusterClient, ExecStream};
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaimVolumeSource, Pod, PodSpec, ResourceRequirements, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{StagingError, StagingResult};

pub const HELPER_CONTAINER: &str = "container-kube-cp";

/// A running helper pod. Call [`dismiss`](HelperPod::dismiss) when done.
pub struct HelperPod {
    client: Arc<dyn ClusterClient>,
    namespace: String,
    name: String,
}

impl HelperPod {
    /// Create the pod and wait until it leaves `Pending`. On timeout the pod is
    /// deleted before the error is returned.
    pub async fn start(
        client: Arc<dyn ClusterClient>,
        namespace: &str,
        layout: &WorkingDirLayout,
        config: &StagingConfig,
    ) -> StagingResult<Self> {
        let name = format!("kube-cp-{}", short_uid());
        let pod = manifest(&name, layout, config);

        info!("Starting helper pod {} in {}", name, namespace);
        client.create_pod(namespace, &pod).await?;

        let helper = Self {
            client,
            namespace: namespace.to_string(),
            name,
        };
        if let Err(e) = helper
            .wait_until_started(config.phase_poll_interval, config.phase_timeout)
            .await
        {
            helper.dismiss().await;
            return Err(e);
        }
        Ok(helper)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn wait_until_started(&self, interval: Duration, timeout: Duration) -> StagingResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let pod = self
                .client
                .get_pod(&self.namespace, &self.name)
                .await?
                .ok_or_else(|| StagingError::HelperPodGone(self.name.clone()))?;

            let phase = pod.status.and_then(|status| status.phase);
            if phase.as_deref() != Some("Pending") {
                debug!("Helper pod {} is {:?}", self.name, phase);
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(StagingError::Timeout {
                    operation: format!("waiting for helper pod {} to start", self.name),
                    after: timeout,
                });
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Run `command` in the helper container
    pub async fn exec(&self, command: &[String]) -> StagingResult<Box<dyn ExecStream>> {
        debug!("Helper pod {} exec: {:?}", self.name, command);
        Ok(self
            .client
            .exec(&self.namespace, &self.name, HELPER_CONTAINER, command)
            .await?)
    }

    /// Delete the pod. Failures are logged only.
    pub async fn dismiss(&self) {
        match self.client.delete_pod(&self.namespace, &self.name).await {
            Ok(_) => debug!("Helper pod {} dismissed", self.name),
            Err(e) => error!("Failed to delete helper pod {}: {}", self.name, e),
        }
    }
}

fn short_uid() -> String {
    let uid = Uuid::new_v4().simple().to_string();
    uid[uid.len() - 6..].to_string()
}

fn manifest(name: &str, layout: &WorkingDirLayout, config: &StagingConfig) -> Pod {
    let requests = BTreeMap::from([
        ("cpu".to_string(), Quantity(config.helper_cpu.clone())),
        ("memory".to_string(), Quantity(config.helper_memory.clone())),
    ]);

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            volumes: Some(vec![Volume {
                name: layout.volume_name.clone(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: layout.claim_name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            containers: vec![Container {
                name: HELPER_CONTAINER.to_string(),
                image: Some(config.helper_image.clone()),
                args: Some(vec![
                    "/bin/sh".to_string(),
                    "-c".to_string(),
                    "while true;do date;sleep 5; done".to_string(),
                ]),
                volume_mounts: Some(vec![VolumeMount {
                    name: layout.volume_name.clone(),
                    mount_path: layout.mount_path.clone(),
                    ..Default::default()
                }]),
                resources: Some(ResourceRequirements {
                    requests: Some(requests),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calrissian_kube::testing::InMemoryCluster;
    use calrissian_kube::ResourceKind;
    use k8s_openapi::api::core::v1::Namespace;

    fn cluster_with_namespace(ns: &str) -> InMemoryCluster {
        let cluster = InMemoryCluster::new();
        cluster.insert(
            ResourceKind::Namespace,
            "",
            &Namespace {
                metadata: ObjectMeta {
                    name: Some(ns.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        cluster
    }

    #[test]
    fn test_manifest_mounts_working_dir() {
        let pod = manifest("kube-cp-abc123", &WorkingDirLayout::default(), &StagingConfig::default());
        let spec = pod.spec.unwrap();
        let container = &spec.containers[0];
        assert_eq!(container.name, HELPER_CONTAINER);
        assert_eq!(container.image.as_deref(), Some("busybox"));
        assert_eq!(
            container.volume_mounts.as_ref().unwrap()[0].mount_path,
            "/calrissian"
        );
        assert_eq!(
            spec.volumes.unwrap()[0]
                .persistent_volume_claim
                .as_ref()
                .unwrap()
                .claim_name,
            "calrissian-wdir"
        );
    }

    #[test]
    fn test_short_uid() {
        let uid = short_uid();
        assert_eq!(uid.len(), 6);
        assert!(uid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_waits_for_pending_pod() {
        let cluster = cluster_with_namespace("ns");
        cluster.set_pod_pending_polls(3);

        let helper = HelperPod::start(
            Arc::new(cluster.clone()),
            "ns",
            &WorkingDirLayout::default(),
            &StagingConfig::default(),
        )
        .await
        .unwrap();
        assert!(helper.name().starts_with("kube-cp-"));
        assert!(cluster.contains(ResourceKind::Pod, "ns", helper.name()));

        helper.dismiss().await;
        assert!(!cluster.contains(ResourceKind::Pod, "ns", helper.name()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_times_out_and_cleans_up() {
        let cluster = cluster_with_namespace("ns");
        cluster.set_pod_pending_polls(u32::MAX);
        let config = StagingConfig {
            phase_timeout: Duration::from_secs(10),
            ..StagingConfig::default()
        };

        let result = HelperPod::start(
            Arc::new(cluster.clone()),
            "ns",
            &WorkingDirLayout::default(),
            &config,
        )
        .await;
        assert!(matches!(result, Err(StagingError::Timeout { .. })));
        assert!(cluster.names(ResourceKind::Pod, "ns").is_empty());
    }
}
