//! The cluster capability consumed by the rest of the workspace

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, PersistentVolumeClaim, Pod, ResourceQuota, Secret, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};

use crate::error::ClusterResult;
use crate::exec::ExecStream;

/// Typed access to the handful of resource kinds the orchestrator needs.
///
/// One existence probe per kind (`get_*` returning `None` when absent),
/// creates that fail with 409 when the object already exists, and deletes
/// that return `false` when there was nothing to delete. Deletes always use
/// a zero grace period.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    // Namespaces
    async fn get_namespace(&self, name: &str) -> ClusterResult<Option<Namespace>>;
    async fn create_namespace(&self, namespace: &Namespace) -> ClusterResult<Namespace>;
    async fn delete_namespace(&self, name: &str) -> ClusterResult<bool>;

    // RBAC
    async fn get_role(&self, namespace: &str, name: &str) -> ClusterResult<Option<Role>>;
    async fn create_role(&self, namespace: &str, role: &Role) -> ClusterResult<Role>;
    async fn get_role_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<RoleBinding>>;
    async fn create_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> ClusterResult<RoleBinding>;

    // Quota and storage
    async fn get_resource_quota(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ResourceQuota>>;
    async fn create_resource_quota(
        &self,
        namespace: &str,
        quota: &ResourceQuota,
    ) -> ClusterResult<ResourceQuota>;
    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<PersistentVolumeClaim>>;
    async fn create_persistent_volume_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> ClusterResult<PersistentVolumeClaim>;

    // Config maps and secrets
    async fn get_config_map(&self, namespace: &str, name: &str)
        -> ClusterResult<Option<ConfigMap>>;
    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> ClusterResult<ConfigMap>;
    async fn delete_config_map(&self, namespace: &str, name: &str) -> ClusterResult<bool>;
    async fn get_secret(&self, namespace: &str, name: &str) -> ClusterResult<Option<Secret>>;
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> ClusterResult<Secret>;
    async fn delete_secret(&self, namespace: &str, name: &str) -> ClusterResult<bool>;

    // Service accounts
    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ServiceAccount>>;
    /// JSON merge patch
    async fn patch_service_account(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> ClusterResult<ServiceAccount>;

    // Jobs
    async fn create_job(&self, namespace: &str, job: &Job) -> ClusterResult<Job>;
    async fn get_job(&self, namespace: &str, name: &str) -> ClusterResult<Option<Job>>;
    /// Deletes the job and, in the background, its pods
    async fn delete_job(&self, namespace: &str, name: &str) -> ClusterResult<bool>;

    // Pods
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> ClusterResult<Pod>;
    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<Option<Pod>>;
    /// `label_selector` uses the API syntax, e.g. `job-name=job-123`
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<Pod>>;
    async fn delete_pod(&self, namespace: &str, name: &str) -> ClusterResult<bool>;
    async fn read_pod_log(
        &self,
        namespace: &str,
        name: &str,
        container: Option<&str>,
    ) -> ClusterResult<String>;

    /// Open a bidirectional exec stream with stdin, stdout and stderr attached
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> ClusterResult<Box<dyn ExecStream>>;
}
