use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::{
    ConfigMap, ContainerState, ContainerStateWaiting, ContainerStatus, Namespace,
    PersistentVolumeClaim, Pod, PodStatus, ResourceQuota, Secret, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::exec::{FakeExecStream, Volumes};
use crate::client::ClusterClient;
use crate::error::{ClusterError, ClusterResult};
use crate::exec::ExecStream;
use crate::kind::ResourceKind;

/// Operation recorded by [`InMemoryCluster`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Patch,
    Delete,
    Logs,
    Exec,
}

impl Verb {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Verb::Create | Verb::Patch | Verb::Delete)
    }
}

/// One call made against the fake cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCall {
    pub verb: Verb,
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

type ObjectKey = (ResourceKind, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    calls: Vec<ClusterCall>,
    failures: Vec<(Verb, ResourceKind, ClusterError)>,
    /// Number of reads that still report a freshly created object as absent
    hidden: HashMap<(ResourceKind, String), u32>,
    job_scripts: HashMap<(String, String), VecDeque<JobStatus>>,
    pod_logs: HashMap<(String, String), String>,
    unpullable_images: HashSet<String>,
    pending_polls: u32,
    pod_pending: HashMap<(String, String), u32>,
    stalled_paths: HashSet<String>,
}

/// In-memory stand-in for a Kubernetes API server
#[derive(Clone)]
pub struct InMemoryCluster {
    state: Arc<Mutex<State>>,
    volumes: Volumes,
    chunk_size: usize,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            volumes: Arc::new(Mutex::new(BTreeMap::new())),
            chunk_size: 512,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("cluster state lock poisoned")
    }

    // ---- Test setup -------------------------------------------------------

    /// Fail the next matching call with `error`
    pub fn fail_next(&self, verb: Verb, kind: ResourceKind, error: ClusterError) {
        self.lock().failures.push((verb, kind, error));
    }

    /// Fail the next `times` matching calls with `error`
    pub fn fail_times(&self, verb: Verb, kind: ResourceKind, error: ClusterError, times: usize) {
        let mut state = self.lock();
        for _ in 0..times {
            state.failures.push((verb, kind, error.clone()));
        }
    }

    /// Report the named object as absent for the next `reads` probes after it
    /// is created
    pub fn hide_after_create(&self, kind: ResourceKind, name: &str, reads: u32) {
        self.lock().hidden.insert((kind, name.to_string()), reads);
    }

    /// Statuses handed out by successive `get_job` calls; the last one sticks
    pub fn script_job_statuses(&self, namespace: &str, job: &str, statuses: Vec<JobStatus>) {
        self.lock()
            .job_scripts
            .insert((namespace.to_string(), job.to_string()), statuses.into());
    }

    /// Job pods running this image report `ImagePullBackOff`
    pub fn mark_image_unpullable(&self, image: &str) {
        self.lock().unpullable_images.insert(image.to_string());
    }

    /// Newly created pods stay `Pending` for this many `get_pod` reads
    pub fn set_pod_pending_polls(&self, polls: u32) {
        self.lock().pending_polls = polls;
    }

    /// Exec commands naming this path never produce output
    pub fn stall_exec_on(&self, path: &str) {
        self.lock().stalled_paths.insert(path.to_string());
    }

    pub fn set_pod_log(&self, namespace: &str, pod: &str, log: &str) {
        self.lock()
            .pod_logs
            .insert((namespace.to_string(), pod.to_string()), log.to_string());
    }

    /// Set a waiting reason on every container status of a pod
    pub fn set_waiting_reason(&self, namespace: &str, pod: &str, reason: &str) {
        let mut state = self.lock();
        let key = (ResourceKind::Pod, namespace.to_string(), pod.to_string());
        if let Some(value) = state.objects.get_mut(&key) {
            if let Ok(mut pod) = serde_json::from_value::<Pod>(value.clone()) {
                let names: Vec<String> = pod
                    .spec
                    .as_ref()
                    .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
                    .unwrap_or_default();
                let status = pod.status.get_or_insert_with(PodStatus::default);
                status.container_statuses = Some(
                    names
                        .into_iter()
                        .map(|name| waiting_status(&name, reason))
                        .collect(),
                );
                if let Ok(updated) = serde_json::to_value(&pod) {
                    *value = updated;
                }
            }
        }
    }

    /// Put a file on the shared volume of a namespace
    pub fn put_volume_file(&self, namespace: &str, path: &str, data: impl Into<Vec<u8>>) {
        self.volumes
            .lock()
            .expect("volume lock poisoned")
            .entry(namespace.to_string())
            .or_default()
            .insert(path.to_string(), data.into());
    }

    pub fn volume_file(&self, namespace: &str, path: &str) -> Option<Vec<u8>> {
        self.volumes
            .lock()
            .expect("volume lock poisoned")
            .get(namespace)
            .and_then(|files| files.get(path).cloned())
    }

    /// Insert an object directly, bypassing call recording
    pub fn insert<K: Serialize>(&self, kind: ResourceKind, namespace: &str, object: &K) {
        if let Ok(value) = serde_json::to_value(object) {
            let name = object_name(&value);
            let namespace = scope(kind, namespace);
            self.lock().objects.insert((kind, namespace, name), value);
        }
    }

    // ---- Inspection -------------------------------------------------------

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn mutating_calls(&self) -> Vec<ClusterCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.verb.is_mutating())
            .collect()
    }

    pub fn count_calls(&self, verb: Verb, kind: ResourceKind) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.verb == verb && call.kind == kind)
            .count()
    }

    pub fn contains(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&(kind, scope(kind, namespace), name.to_string()))
    }

    /// Stored object, typed
    pub fn object<K: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Option<K> {
        self.lock()
            .objects
            .get(&(kind, scope(kind, namespace), name.to_string()))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn names(&self, kind: ResourceKind, namespace: &str) -> Vec<String> {
        let namespace = scope(kind, namespace);
        self.lock()
            .objects
            .keys()
            .filter(|(k, ns, _)| *k == kind && *ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    // ---- Generic object store ---------------------------------------------

    fn begin(
        &self,
        verb: Verb,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> ClusterResult<()> {
        let mut state = self.lock();
        state.calls.push(ClusterCall {
            verb,
            kind,
            namespace: namespace.map(str::to_string),
            name: name.map(str::to_string),
        });

        if let Some(index) = state
            .failures
            .iter()
            .position(|(v, k, _)| *v == verb && *k == kind)
        {
            let (_, _, error) = state.failures.remove(index);
            return Err(error);
        }
        Ok(())
    }

    fn get<K: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<K>> {
        self.begin(Verb::Get, kind, Some(namespace), Some(name))?;
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Some(remaining) = state.hidden.get_mut(&(kind, name.to_string())) {
            let key = (kind, scope(kind, namespace), name.to_string());
            if *remaining > 0 && state.objects.contains_key(&key) {
                *remaining -= 1;
                return Ok(None);
            }
        }

        state
            .objects
            .get(&(kind, scope(kind, namespace), name.to_string()))
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(Into::into)
    }

    fn create<K: Serialize + DeserializeOwned>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        object: &K,
    ) -> ClusterResult<K> {
        let mut value = serde_json::to_value(object)?;
        let name = object_name(&value);
        self.begin(Verb::Create, kind, Some(namespace), Some(&name))?;

        if name.is_empty() {
            return Err(ClusterError::api(422, "Invalid", "metadata.name: Required value"));
        }

        let mut state = self.lock();
        if kind.is_namespaced() {
            let ns_key = (ResourceKind::Namespace, String::new(), namespace.to_string());
            if !state.objects.contains_key(&ns_key) {
                return Err(ClusterError::not_found(ResourceKind::Namespace, namespace));
            }
            value["metadata"]["namespace"] = Value::String(namespace.to_string());
        }

        let key = (kind, scope(kind, namespace), name.clone());
        if state.objects.contains_key(&key) {
            return Err(ClusterError::conflict(kind, &name));
        }
        state.objects.insert(key, value.clone());
        drop(state);

        Ok(serde_json::from_value(value)?)
    }

    fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClusterResult<bool> {
        self.begin(Verb::Delete, kind, Some(namespace), Some(name))?;
        let mut state = self.lock();
        let removed = state
            .objects
            .remove(&(kind, scope(kind, namespace), name.to_string()))
            .is_some();

        if removed && kind == ResourceKind::Namespace {
            state
                .objects
                .retain(|(k, ns, _), _| !(k.is_namespaced() && ns == name));
            drop(state);
            self.volumes
                .lock()
                .expect("volume lock poisoned")
                .remove(name);
        }
        Ok(removed)
    }

    /// Pod the job controller would have started
    fn spawn_job_pod(&self, namespace: &str, job: &Job) {
        let Some(job_name) = job.metadata.name.clone() else {
            return;
        };
        let spec = job
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.clone())
            .unwrap_or_default();

        let unpullable = {
            let state = self.lock();
            spec.containers.iter().any(|c| {
                c.image
                    .as_ref()
                    .map(|image| state.unpullable_images.contains(image))
                    .unwrap_or(false)
            })
        };

        let mut labels = BTreeMap::new();
        labels.insert("job-name".to_string(), job_name.clone());

        let container_statuses = unpullable.then(|| {
            spec.containers
                .iter()
                .map(|c| waiting_status(&c.name, "ImagePullBackOff"))
                .collect()
        });

        let pod = Pod {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some(format!("{}-pod", job_name)),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(spec),
            status: Some(PodStatus {
                phase: Some(if unpullable { "Pending" } else { "Running" }.to_string()),
                container_statuses,
                ..Default::default()
            }),
        };
        self.insert(ResourceKind::Pod, namespace, &pod);
    }
}

fn scope(kind: ResourceKind, namespace: &str) -> String {
    if kind.is_namespaced() {
        namespace.to_string()
    } else {
        String::new()
    }
}

fn object_name(value: &Value) -> String {
    value["metadata"]["name"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

fn waiting_status(name: &str, reason: &str) -> ContainerStatus {
    ContainerStatus {
        name: name.to_string(),
        ready: false,
        restart_count: 0,
        image: String::new(),
        image_id: String::new(),
        state: Some(ContainerState {
            waiting: Some(ContainerStateWaiting {
                reason: Some(reason.to_string()),
                message: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels
                .and_then(|labels| labels.get(key.trim()))
                .map(|actual| actual == value.trim())
                .unwrap_or(false),
            None => labels.map(|labels| labels.contains_key(term)).unwrap_or(false),
        })
}

/// JSON merge patch (RFC 7386)
fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(entries) => {
            if !target.is_object() {
                *target = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(map) = target {
                for (key, value) in entries {
                    if value.is_null() {
                        map.remove(key);
                    } else {
                        merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn get_namespace(&self, name: &str) -> ClusterResult<Option<Namespace>> {
        self.get(ResourceKind::Namespace, "", name)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> ClusterResult<Namespace> {
        let created = self.create(ResourceKind::Namespace, "", namespace)?;
        if let Some(name) = created.metadata.name.as_deref() {
            // The cluster provisions a default service account in every namespace
            let account = ServiceAccount {
                metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                    name: Some("default".to_string()),
                    namespace: Some(name.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            };
            self.insert(ResourceKind::ServiceAccount, name, &account);
        }
        Ok(created)
    }

    async fn delete_namespace(&self, name: &str) -> ClusterResult<bool> {
        self.delete(ResourceKind::Namespace, "", name)
    }

    async fn get_role(&self, namespace: &str, name: &str) -> ClusterResult<Option<Role>> {
        self.get(ResourceKind::Role, namespace, name)
    }

    async fn create_role(&self, namespace: &str, role: &Role) -> ClusterResult<Role> {
        self.create(ResourceKind::Role, namespace, role)
    }

    async fn get_role_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<RoleBinding>> {
        self.get(ResourceKind::RoleBinding, namespace, name)
    }

    async fn create_role_binding(
        &self,
        namespace: &str,
        binding: &RoleBinding,
    ) -> ClusterResult<RoleBinding> {
        self.create(ResourceKind::RoleBinding, namespace, binding)
    }

    async fn get_resource_quota(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ResourceQuota>> {
        self.get(ResourceKind::ResourceQuota, namespace, name)
    }

    async fn create_resource_quota(
        &self,
        namespace: &str,
        quota: &ResourceQuota,
    ) -> ClusterResult<ResourceQuota> {
        self.create(ResourceKind::ResourceQuota, namespace, quota)
    }

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<PersistentVolumeClaim>> {
        self.get(ResourceKind::PersistentVolumeClaim, namespace, name)
    }

    async fn create_persistent_volume_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> ClusterResult<PersistentVolumeClaim> {
        self.create(ResourceKind::PersistentVolumeClaim, namespace, claim)
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ConfigMap>> {
        self.get(ResourceKind::ConfigMap, namespace, name)
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> ClusterResult<ConfigMap> {
        self.create(ResourceKind::ConfigMap, namespace, config_map)
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        self.delete(ResourceKind::ConfigMap, namespace, name)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> ClusterResult<Option<Secret>> {
        self.get(ResourceKind::Secret, namespace, name)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> ClusterResult<Secret> {
        self.create(ResourceKind::Secret, namespace, secret)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        self.delete(ResourceKind::Secret, namespace, name)
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ServiceAccount>> {
        self.get(ResourceKind::ServiceAccount, namespace, name)
    }

    async fn patch_service_account(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> ClusterResult<ServiceAccount> {
        self.begin(
            Verb::Patch,
            ResourceKind::ServiceAccount,
            Some(namespace),
            Some(name),
        )?;
        let mut state = self.lock();
        let key = (
            ResourceKind::ServiceAccount,
            namespace.to_string(),
            name.to_string(),
        );
        let value = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| ClusterError::not_found(ResourceKind::ServiceAccount, name))?;
        merge_patch(value, patch);
        Ok(serde_json::from_value(value.clone())?)
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> ClusterResult<Job> {
        let created = self.create(ResourceKind::Job, namespace, job)?;
        self.spawn_job_pod(namespace, &created);
        Ok(created)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> ClusterResult<Option<Job>> {
        let job: Option<Job> = self.get(ResourceKind::Job, namespace, name)?;
        let Some(mut job) = job else {
            return Ok(None);
        };

        let mut state = self.lock();
        if let Some(script) = state
            .job_scripts
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            let status = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            if let Some(status) = status {
                job.status = Some(status);
                let key = (ResourceKind::Job, namespace.to_string(), name.to_string());
                if let Ok(value) = serde_json::to_value(&job) {
                    state.objects.insert(key, value);
                }
            }
        }
        Ok(Some(job))
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        let removed = self.delete(ResourceKind::Job, namespace, name)?;
        if removed {
            let mut state = self.lock();
            state.objects.retain(|(kind, ns, _), value| {
                !(*kind == ResourceKind::Pod
                    && ns == namespace
                    && value["metadata"]["labels"]["job-name"].as_str() == Some(name))
            });
        }
        Ok(removed)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> ClusterResult<Pod> {
        let mut pod = pod.clone();
        let pending = {
            let state = self.lock();
            state.pending_polls
        };
        pod.status = Some(PodStatus {
            phase: Some(if pending > 0 { "Pending" } else { "Running" }.to_string()),
            ..Default::default()
        });

        let created = self.create(ResourceKind::Pod, namespace, &pod)?;
        if pending > 0 {
            if let Some(name) = created.metadata.name.clone() {
                self.lock()
                    .pod_pending
                    .insert((namespace.to_string(), name), pending);
            }
        }
        Ok(created)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<Option<Pod>> {
        let pod: Option<Pod> = self.get(ResourceKind::Pod, namespace, name)?;
        let Some(mut pod) = pod else {
            return Ok(None);
        };

        let mut state = self.lock();
        let key = (namespace.to_string(), name.to_string());
        if let Some(remaining) = state.pod_pending.get_mut(&key) {
            if *remaining == 0 {
                state.pod_pending.remove(&key);
                let status = pod.status.get_or_insert_with(PodStatus::default);
                status.phase = Some("Running".to_string());
                let object_key = (ResourceKind::Pod, namespace.to_string(), name.to_string());
                if let Ok(value) = serde_json::to_value(&pod) {
                    state.objects.insert(object_key, value);
                }
            } else {
                *remaining -= 1;
            }
        }
        Ok(Some(pod))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<Pod>> {
        self.begin(Verb::List, ResourceKind::Pod, Some(namespace), None)?;
        let state = self.lock();
        let pods = state
            .objects
            .iter()
            .filter(|((kind, ns, _), _)| *kind == ResourceKind::Pod && ns == namespace)
            .filter_map(|(_, value)| serde_json::from_value::<Pod>(value.clone()).ok())
            .filter(|pod| {
                label_selector
                    .map(|selector| matches_selector(pod.metadata.labels.as_ref(), selector))
                    .unwrap_or(true)
            })
            .collect();
        Ok(pods)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        self.delete(ResourceKind::Pod, namespace, name)
    }

    async fn read_pod_log(
        &self,
        namespace: &str,
        name: &str,
        _container: Option<&str>,
    ) -> ClusterResult<String> {
        self.begin(Verb::Logs, ResourceKind::Pod, Some(namespace), Some(name))?;
        let state = self.lock();
        if !state
            .objects
            .contains_key(&(ResourceKind::Pod, namespace.to_string(), name.to_string()))
        {
            return Err(ClusterError::not_found(ResourceKind::Pod, name));
        }
        Ok(state
            .pod_logs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        _container: &str,
        command: &[String],
    ) -> ClusterResult<Box<dyn ExecStream>> {
        self.begin(Verb::Exec, ResourceKind::Pod, Some(namespace), Some(pod))?;
        if !self.contains(ResourceKind::Pod, namespace, pod) {
            return Err(ClusterError::not_found(ResourceKind::Pod, pod));
        }
        let stalled = {
            let state = self.lock();
            command.iter().any(|arg| state.stalled_paths.contains(arg))
        };
        if stalled {
            return Ok(Box::new(FakeExecStream::stalled(namespace, self.volumes.clone())));
        }
        Ok(Box::new(FakeExecStream::spawn(
            namespace,
            self.volumes.clone(),
            command,
            self.chunk_size,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let cluster = InMemoryCluster::new();
        cluster.create_namespace(&namespace("ns")).await.unwrap();
        assert!(cluster.get_namespace("ns").await.unwrap().is_some());
        assert!(cluster
            .get_service_account("ns", "default")
            .await
            .unwrap()
            .is_some());

        cluster.create_config_map("ns", &config_map("cm")).await.unwrap();
        let err = cluster
            .create_config_map("ns", &config_map("cm"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        assert!(cluster.delete_config_map("ns", "cm").await.unwrap());
        assert!(!cluster.delete_config_map("ns", "cm").await.unwrap());
        assert!(cluster.get_config_map("ns", "cm").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_namespaced_create_requires_namespace() {
        let cluster = InMemoryCluster::new();
        let err = cluster
            .create_config_map("missing", &config_map("cm"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_namespace_delete_cascades() {
        let cluster = InMemoryCluster::new();
        cluster.create_namespace(&namespace("ns")).await.unwrap();
        cluster.create_config_map("ns", &config_map("cm")).await.unwrap();
        cluster.put_volume_file("ns", "/calrissian/output.json", "{}");

        assert!(cluster.delete_namespace("ns").await.unwrap());
        assert!(!cluster.contains(ResourceKind::ConfigMap, "ns", "cm"));
        assert!(cluster.volume_file("ns", "/calrissian/output.json").is_none());
    }

    #[tokio::test]
    async fn test_failure_injection_and_hidden_objects() {
        let cluster = InMemoryCluster::new();
        cluster.fail_next(
            Verb::Create,
            ResourceKind::Namespace,
            ClusterError::api(500, "InternalError", "boom"),
        );
        assert!(cluster.create_namespace(&namespace("ns")).await.is_err());

        cluster.hide_after_create(ResourceKind::Namespace, "ns", 1);
        cluster.create_namespace(&namespace("ns")).await.unwrap();
        assert!(cluster.get_namespace("ns").await.unwrap().is_none());
        assert!(cluster.get_namespace("ns").await.unwrap().is_some());
        assert_eq!(cluster.count_calls(Verb::Create, ResourceKind::Namespace), 2);
    }

    #[tokio::test]
    async fn test_service_account_merge_patch() {
        let cluster = InMemoryCluster::new();
        cluster.create_namespace(&namespace("ns")).await.unwrap();
        let patch = serde_json::json!({
            "imagePullSecrets": [{"name": "container-rg"}],
            "secrets": [{"name": "container-rg"}],
        });
        let account = cluster
            .patch_service_account("ns", "default", &patch)
            .await
            .unwrap();
        let account = serde_json::to_value(&account).unwrap();
        assert_eq!(account["imagePullSecrets"][0]["name"], "container-rg");
        assert_eq!(account["secrets"][0]["name"], "container-rg");
    }

    #[test]
    fn test_selector_matching() {
        let mut labels = BTreeMap::new();
        labels.insert("job-name".to_string(), "job-1".to_string());
        assert!(matches_selector(Some(&labels), "job-name=job-1"));
        assert!(!matches_selector(Some(&labels), "job-name=job-2"));
        assert!(matches_selector(Some(&labels), "job-name"));
        assert!(!matches_selector(None, "job-name=job-1"));
    }

    #[tokio::test]
    async fn test_tar_exec_round_trip() {
        let cluster = InMemoryCluster::new();
        cluster.create_namespace(&namespace("ns")).await.unwrap();
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("helper".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        cluster.create_pod("ns", &pod).await.unwrap();
        cluster.put_volume_file("ns", "/calrissian/report.json", "{\"cores\": 2}");

        let command: Vec<String> = ["tar", "cf", "-", "/calrissian/report.json"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut stream = cluster.exec("ns", "helper", "c", &command).await.unwrap();
        let mut archive = Vec::new();
        while let Some(output) = stream.next_output().await.unwrap() {
            if let crate::exec::ExecOutput::Stdout(data) = output {
                archive.extend(data);
            }
        }
        assert!(!stream.is_open());

        let command: Vec<String> = ["tar", "xvf", "-", "-C", "/", "--absolute-names"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        cluster.create_namespace(&namespace("other")).await.unwrap();
        cluster.create_pod("other", &pod).await.unwrap();
        let mut stream = cluster.exec("other", "helper", "c", &command).await.unwrap();
        stream.write_stdin(&archive).await.unwrap();
        stream.close_stdin().await.unwrap();
        while stream.next_output().await.unwrap().is_some() {}

        assert_eq!(
            cluster.volume_file("other", "/calrissian/report.json").unwrap(),
            b"{\"cores\": 2}".to_vec()
        );
    }
}
