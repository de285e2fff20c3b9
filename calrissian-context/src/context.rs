//! Namespace session

use calrissian_config::ContextConfig;
use calrissian_core::{is_valid_dns_label, WorkingDirLayout};
use calrissian_kube::{ClusterClient, ClusterError, ResourceKind};
use calrissian_resilience::RetryPolicy;
use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{ContextError, ContextResult};
use crate::provision::{create_verified, ensure, wait_for};
use crate::resources::{self, RoleSpec, DEFAULT_SERVICE_ACCOUNT, ROLES};
use crate::secrets::{ImagePullSecrets, SecretReference};

/// One namespace-scoped environment for workflow jobs
pub struct ExecutionContext {
    client: Arc<dyn ClusterClient>,
    namespace: String,
    storage_class: String,
    volume_size: String,
    layout: WorkingDirLayout,
    image_pull_secrets: Option<ImagePullSecrets>,
    resource_quota: Option<BTreeMap<String, String>>,
    labels: Option<BTreeMap<String, String>>,
    annotations: Option<BTreeMap<String, String>>,
    existing_namespace: bool,
    secret_name: String,
    quota_name: String,
    origin_namespace: Option<String>,
    retry_policy: RetryPolicy,
}

impl ExecutionContext {
    /// Context for a namespace that `initialise()` will create
    pub fn new(
        client: Arc<dyn ClusterClient>,
        namespace: impl Into<String>,
        storage_class: impl Into<String>,
        volume_size: impl Into<String>,
    ) -> ContextResult<Self> {
        let namespace = namespace.into();
        if !is_valid_dns_label(&namespace) {
            return Err(ContextError::InvalidNamespace(namespace));
        }

        let defaults = ContextConfig::default();
        Ok(Self {
            client,
            namespace,
            storage_class: storage_class.into(),
            volume_size: volume_size.into(),
            layout: WorkingDirLayout::with_claim(defaults.working_dir_claim),
            image_pull_secrets: None,
            resource_quota: None,
            labels: None,
            annotations: None,
            existing_namespace: false,
            secret_name: defaults.image_pull_secret_name,
            quota_name: defaults.resource_quota_name,
            origin_namespace: defaults.origin_namespace,
            retry_policy: RetryPolicy::fixed(
                defaults.provisioning_attempts,
                defaults.provisioning_interval,
            ),
        })
    }

    /// Context for a namespace that already exists, with its service account,
    /// roles and bindings in place. Only storage, secrets and quota are
    /// provisioned.
    pub fn from_existing_namespace(
        client: Arc<dyn ClusterClient>,
        namespace: impl Into<String>,
        storage_class: impl Into<String>,
        volume_size: impl Into<String>,
    ) -> ContextResult<Self> {
        let mut context = Self::new(client, namespace, storage_class, volume_size)?;
        context.existing_namespace = true;
        Ok(context)
    }

    /// Apply claim name, object names, origin namespace and retry settings
    pub fn with_config(mut self, config: &ContextConfig) -> Self {
        self.layout = WorkingDirLayout::with_claim(config.working_dir_claim.clone());
        self.secret_name = config.image_pull_secret_name.clone();
        self.quota_name = config.resource_quota_name.clone();
        if config.origin_namespace.is_some() {
            self.origin_namespace = config.origin_namespace.clone();
        }
        self.retry_policy =
            RetryPolicy::fixed(config.provisioning_attempts, config.provisioning_interval);
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Quota entries merged over the built-in conservative defaults
    pub fn with_resource_quota(mut self, quota: BTreeMap<String, String>) -> Self {
        self.resource_quota = Some(quota);
        self
    }

    pub fn with_image_pull_secrets(mut self, secrets: ImagePullSecrets) -> Self {
        self.image_pull_secrets = Some(secrets);
        self
    }

    pub fn with_origin_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.origin_namespace = Some(namespace.into());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn client(&self) -> &Arc<dyn ClusterClient> {
        &self.client
    }

    pub fn storage_class(&self) -> &str {
        &self.storage_class
    }

    pub fn volume_size(&self) -> &str {
        &self.volume_size
    }

    pub fn layout(&self) -> &WorkingDirLayout {
        &self.layout
    }

    pub fn working_dir_claim(&self) -> &str {
        &self.layout.claim_name
    }

    pub fn is_existing_namespace(&self) -> bool {
        self.existing_namespace
    }

    pub async fn is_namespace_created(&self) -> ContextResult<bool> {
        Ok(self.client.get_namespace(&self.namespace).await?.is_some())
    }

    /// Provision everything a job needs. Safe to call repeatedly.
    pub async fn initialise(&self) -> ContextResult<()> {
        info!("Initialising execution context in namespace '{}'", self.namespace);

        if self.existing_namespace {
            if !self.is_namespace_created().await? {
                warn!("Namespace '{}' does not exist", self.namespace);
                return Err(ContextError::NamespaceNotFound(self.namespace.clone()));
            }
            info!("Namespace '{}' exists, reusing it", self.namespace);
        } else {
            self.create_namespace().await?;
            for spec in &ROLES {
                self.create_role(spec).await?;
                self.create_role_binding(spec).await?;
            }
        }

        self.create_working_dir_claim().await?;

        if let Some(secrets) = &self.image_pull_secrets {
            let mut names = Vec::new();
            if let Some(docker_config) = secrets.docker_config() {
                self.create_image_pull_secret(docker_config).await?;
                names.push(self.secret_name.clone());
            }
            names.extend(self.copy_additional_secrets(secrets.additional()).await);

            if !names.is_empty() {
                self.attach_secrets(&names).await?;
            }
        }

        if let Some(quota) = &self.resource_quota {
            self.create_resource_quota(quota).await?;
        }

        info!("Execution context '{}' ready", self.namespace);
        Ok(())
    }

    /// Delete every pod, then the namespace. Pod deletion is best effort; a
    /// failure deleting the namespace is returned.
    pub async fn dispose(&self) -> ContextResult<bool> {
        match self.client.list_pods(&self.namespace, None).await {
            Ok(pods) => {
                for name in pods.into_iter().filter_map(|pod| pod.metadata.name) {
                    info!("Deleting pod {}", name);
                    if let Err(e) = self.client.delete_pod(&self.namespace, &name).await {
                        error!("Failed to delete pod {}: {}", name, e);
                    }
                }
            }
            Err(e) => warn!("Could not list pods in '{}': {}", self.namespace, e),
        }

        info!("Disposing namespace {}", self.namespace);
        let deleted = self.client.delete_namespace(&self.namespace).await?;
        if deleted {
            info!("Namespace {} deleted", self.namespace);
        } else {
            warn!("Namespace {} was already gone", self.namespace);
        }
        Ok(deleted)
    }

    /// Stage `content` under `key` of config map `name`. An existing map with
    /// that name is deleted and recreated so readers never see stale content.
    pub async fn create_configmap(
        &self,
        name: &str,
        key: &str,
        content: &str,
    ) -> ContextResult<ConfigMap> {
        let client = self.client.as_ref();
        let namespace = self.namespace.as_str();

        if client.get_config_map(namespace, name).await?.is_some() {
            debug!("Replacing config map {}", name);
            client.delete_config_map(namespace, name).await?;
        }

        let config_map = resources::config_map(namespace, name, key, content);
        create_verified(
            &self.retry_policy,
            ResourceKind::ConfigMap,
            name,
            move || client.get_config_map(namespace, name),
            || client.create_config_map(namespace, &config_map),
        )
        .await
    }

    /// Content stored under `key` of config map `name`
    pub async fn read_configmap(&self, name: &str, key: &str) -> ContextResult<Option<String>> {
        let config_map = self.client.get_config_map(&self.namespace, name).await?;
        Ok(config_map
            .and_then(|config_map| config_map.data)
            .and_then(|mut data| data.remove(key)))
    }

    async fn create_namespace(&self) -> ContextResult<()> {
        let client = self.client.as_ref();
        let name = self.namespace.as_str();
        let namespace =
            resources::namespace(name, self.labels.as_ref(), self.annotations.as_ref());

        ensure(
            &self.retry_policy,
            ResourceKind::Namespace,
            name,
            move || client.get_namespace(name),
            || client.create_namespace(&namespace),
        )
        .await?;
        Ok(())
    }

    async fn create_role(&self, spec: &RoleSpec) -> ContextResult<()> {
        let client = self.client.as_ref();
        let namespace = self.namespace.as_str();
        let role = resources::role(namespace, spec);

        ensure(
            &self.retry_policy,
            ResourceKind::Role,
            spec.role,
            move || client.get_role(namespace, spec.role),
            || client.create_role(namespace, &role),
        )
        .await?;
        Ok(())
    }

    async fn create_role_binding(&self, spec: &RoleSpec) -> ContextResult<()> {
        let client = self.client.as_ref();
        let namespace = self.namespace.as_str();
        let binding = resources::role_binding(namespace, spec);

        ensure(
            &self.retry_policy,
            ResourceKind::RoleBinding,
            spec.binding,
            move || client.get_role_binding(namespace, spec.binding),
            || client.create_role_binding(namespace, &binding),
        )
        .await?;
        Ok(())
    }

    async fn create_working_dir_claim(&self) -> ContextResult<()> {
        let client = self.client.as_ref();
        let namespace = self.namespace.as_str();
        let name = self.layout.claim_name.as_str();
        info!(
            "Ensuring claim '{}' of {} with storage class {}",
            name, self.volume_size, self.storage_class
        );
        let claim =
            resources::working_dir_claim(namespace, name, &self.volume_size, &self.storage_class);

        ensure(
            &self.retry_policy,
            ResourceKind::PersistentVolumeClaim,
            name,
            move || client.get_persistent_volume_claim(namespace, name),
            || client.create_persistent_volume_claim(namespace, &claim),
        )
        .await?;
        Ok(())
    }

    /// Create or replace the dockerconfigjson secret
    async fn create_image_pull_secret(&self, docker_config: &Value) -> ContextResult<()> {
        let client = self.client.as_ref();
        let namespace = self.namespace.as_str();
        let name = self.secret_name.as_str();

        let payload = serde_json::to_vec(docker_config)
            .map_err(|e| ContextError::InvalidSecretConfig(e.to_string()))?;
        let secret = resources::docker_config_secret(namespace, name, &payload);

        if let Some(existing) = client.get_secret(namespace, name).await? {
            if existing.data == secret.data && existing.type_ == secret.type_ {
                debug!("Secret {} is up to date", name);
                return Ok(());
            }
            info!("Replacing secret {}", name);
            client.delete_secret(namespace, name).await?;
        }

        create_verified(
            &self.retry_policy,
            ResourceKind::Secret,
            name,
            move || client.get_secret(namespace, name),
            || client.create_secret(namespace, &secret),
        )
        .await?;
        Ok(())
    }

    /// Copy named secrets from the origin namespace. Returns the names that
    /// were copied; failures are logged and skipped.
    async fn copy_additional_secrets(&self, references: &[SecretReference]) -> Vec<String> {
        if references.is_empty() {
            return Vec::new();
        }

        let Some(origin) = self.origin_namespace.as_deref() else {
            error!(
                "Cannot copy {} additional image pull secret(s): no origin namespace configured",
                references.len()
            );
            return Vec::new();
        };

        let mut copied = Vec::new();
        for reference in references {
            match self.copy_secret(origin, &reference.name).await {
                Ok(()) => copied.push(reference.name.clone()),
                Err(e) => error!(
                    "Failed to copy image pull secret {} from {}: {}",
                    reference.name, origin, e
                ),
            }
        }
        copied
    }

    async fn copy_secret(&self, origin: &str, name: &str) -> ContextResult<()> {
        let client = self.client.as_ref();
        let namespace = self.namespace.as_str();

        let source = client
            .get_secret(origin, name)
            .await?
            .ok_or_else(|| ClusterError::not_found(ResourceKind::Secret, name))?;
        let secret = resources::copied_secret(namespace, &source);

        ensure(
            &self.retry_policy,
            ResourceKind::Secret,
            name,
            move || client.get_secret(namespace, name),
            || client.create_secret(namespace, &secret),
        )
        .await?;
        Ok(())
    }

    /// Reference `names` from the default service account for both image
    /// pulls and mounts. No patch is sent when all are already referenced.
    async fn attach_secrets(&self, names: &[String]) -> ContextResult<()> {
        let client = self.client.as_ref();
        let namespace = self.namespace.as_str();

        let account = wait_for(
            &self.retry_policy,
            ResourceKind::ServiceAccount,
            DEFAULT_SERVICE_ACCOUNT,
            move || client.get_service_account(namespace, DEFAULT_SERVICE_ACCOUNT),
        )
        .await?;
        let account = serde_json::to_value(&account).map_err(ClusterError::from)?;

        let pull_secrets = referenced_names(&account["imagePullSecrets"]);
        let mount_secrets = referenced_names(&account["secrets"]);

        if names
            .iter()
            .all(|name| pull_secrets.contains(name) && mount_secrets.contains(name))
        {
            debug!("Service account already references {:?}", names);
            return Ok(());
        }

        info!("Patching service account {} with {:?}", DEFAULT_SERVICE_ACCOUNT, names);
        let patch = json!({
            "secrets": merge_references(mount_secrets, names),
            "imagePullSecrets": merge_references(pull_secrets, names),
        });
        client
            .patch_service_account(namespace, DEFAULT_SERVICE_ACCOUNT, &patch)
            .await?;
        Ok(())
    }

    async fn create_resource_quota(&self, overrides: &BTreeMap<String, String>) -> ContextResult<()> {
        let client = self.client.as_ref();
        let namespace = self.namespace.as_str();
        let name = self.quota_name.as_str();
        let quota = resources::resource_quota(namespace, name, overrides);

        ensure(
            &self.retry_policy,
            ResourceKind::ResourceQuota,
            name,
            move || client.get_resource_quota(namespace, name),
            || client.create_resource_quota(namespace, &quota),
        )
        .await?;
        Ok(())
    }
}

fn referenced_names(references: &Value) -> Vec<String> {
    references
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn merge_references(mut existing: Vec<String>, names: &[String]) -> Vec<Value> {
    for name in names {
        if !existing.contains(name) {
            existing.push(name.clone());
        }
    }
    existing.into_iter().map(|name| json!({ "name": name })).collect()
}
