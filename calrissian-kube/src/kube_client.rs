//! kube-rs implementation of [`ClusterClient`]

use async_trait::async_trait;
use calrissian_config::ClusterConfig;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, PersistentVolumeClaim, Pod, ResourceQuota, Secret, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{
    Api, AttachParams, DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams,
    PropagationPolicy,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

use crate::client::ClusterClient;
use crate::error::{ClusterError, ClusterResult};
use crate::exec::{ExecStream, KubeExecStream};

/// Cluster client talking to a real API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Infer configuration from `KUBECONFIG`, `~/.kube/config` or the
    /// in-cluster service account
    pub async fn try_default() -> ClusterResult<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Build a client from the cluster configuration domain
    pub async fn from_config(config: &ClusterConfig) -> ClusterResult<Self> {
        let options = KubeConfigOptions {
            context: config.context.clone(),
            ..Default::default()
        };

        let kube_config = match &config.kubeconfig {
            Some(path) => {
                info!("Using kubeconfig {}", path.display());
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| ClusterError::Config(e.to_string()))?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| ClusterError::Config(e.to_string()))?
            }
            None if config.context.is_some() => Config::from_kubeconfig(&options)
                .await
                .map_err(|e| ClusterError::Config(e.to_string()))?,
            None => Config::infer()
                .await
                .map_err(|e| ClusterError::Config(e.to_string()))?,
        };

        let client = Client::try_from(kube_config)?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn delete_params() -> DeleteParams {
    DeleteParams {
        grace_period_seconds: Some(0),
        propagation_policy: Some(PropagationPolicy::Background),
        ..Default::default()
    }
}

async fn get_opt<K>(api: &Api<K>, name: &str) -> ClusterResult<Option<K>>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    Ok(api.get_opt(name).await?)
}

async fn create<K>(api: &Api<K>, object: &K) -> ClusterResult<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    Ok(api.create(&PostParams::default(), object).await?)
}

async fn delete<K>(api: &Api<K>, name: &str) -> ClusterResult<bool>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &delete_params()).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(response)) if response.code == 404 => {
            debug!("Nothing to delete for {}", name);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_namespace(&self, name: &str) -> ClusterResult<Option<Namespace>> {
        get_opt(&Api::<Namespace>::all(self.client.clone()), name).await
    }

    async fn create_namespace(&self, namespace: &Namespace) -> ClusterResult<Namespace> {
        create(&Api::<Namespace>::all(self.client.clone()), namespace).await
    }

    async fn delete_namespace(&self, name: &str) -> ClusterResult<bool> {
        delete(&Api::<Namespace>::all(self.client.clone()), name).await
    }

    async fn get_role(&self, namespace: &str, name: &str) -> ClusterResult<Option<Role>> {
        get_opt(&self.namespaced::<Role>(namespace), name).await
    }

    async fn create_role(&self, namespace: &str, role: &Role) -> ClusterResult<Role> {
        create(&self.namespaced(namespace), role).await
    }

    async fn get_role_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<RoleBinding>> {
        get_opt(&self.namespaced::<RoleBinding>(namespace), name).await
    }

    async fn create_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> ClusterResult<RoleBinding> {
        create(&self.namespaced(namespace), binding).await
    }

    async fn get_resource_quota(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ResourceQuota>> {
        get_opt(&self.namespaced::<ResourceQuota>(namespace), name).await
    }

    async fn create_resource_quota(
        &self,
        namespace: &str,
        quota: &ResourceQuota,
    ) -> ClusterResult<ResourceQuota> {
        create(&self.namespaced(namespace), quota).await
    }

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<PersistentVolumeClaim>> {
        get_opt(&self.namespaced::<PersistentVolumeClaim>(namespace), name).await
    }

    async fn create_persistent_volume_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> ClusterResult<PersistentVolumeClaim> {
        create(&self.namespaced(namespace), claim).await
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ConfigMap>> {
        get_opt(&self.namespaced::<ConfigMap>(namespace), name).await
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> ClusterResult<ConfigMap> {
        create(&self.namespaced(namespace), config_map).await
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        delete(&self.namespaced::<ConfigMap>(namespace), name).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> ClusterResult<Option<Secret>> {
        get_opt(&self.namespaced::<Secret>(namespace), name).await
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> ClusterResult<Secret> {
        create(&self.namespaced(namespace), secret).await
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        delete(&self.namespaced::<Secret>(namespace), name).await
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ServiceAccount>> {
        get_opt(&self.namespaced::<ServiceAccount>(namespace), name).await
    }

    async fn patch_service_account(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> ClusterResult<ServiceAccount> {
        let api = self.namespaced::<ServiceAccount>(namespace);
        Ok(api
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> ClusterResult<Job> {
        create(&self.namespaced(namespace), job).await
    }

    async fn get_job(&self, namespace: &str, name: &str) -> ClusterResult<Option<Job>> {
        get_opt(&self.namespaced::<Job>(namespace), name).await
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        delete(&self.namespaced::<Job>(namespace), name).await
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> ClusterResult<Pod> {
        create(&self.namespaced(namespace), pod).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<Option<Pod>> {
        get_opt(&self.namespaced::<Pod>(namespace), name).await
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<Pod>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let pods = self.namespaced::<Pod>(namespace).list(&params).await?;
        Ok(pods.items)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        delete(&self.namespaced::<Pod>(namespace), name).await
    }

    async fn read_pod_log(
        &self,
        namespace: &str,
        name: &str,
        container: Option<&str>,
    ) -> ClusterResult<String> {
        let params = LogParams {
            container: container.map(str::to_string),
            ..Default::default()
        };
        Ok(self.namespaced::<Pod>(namespace).logs(name, &params).await?)
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> ClusterResult<Box<dyn ExecStream>> {
        debug!("Exec in {}/{}: {:?}", namespace, pod, command);
        let params = AttachParams::default()
            .container(container)
            .stdin(true)
            .stdout(true)
            .stderr(true);
        let process = self
            .namespaced::<Pod>(namespace)
            .exec(pod, command.to_vec(), &params)
            .await?;
        Ok(Box::new(KubeExecStream::new(process)))
    }
}
