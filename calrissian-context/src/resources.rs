//! Manifests provisioned inside an execution namespace

use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, PersistentVolumeClaim, PersistentVolumeClaimSpec, ResourceQuota,
    ResourceQuotaSpec, Secret, VolumeResourceRequirements,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

/// Service account every job pod runs as
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

pub const DOCKER_CONFIG_SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";
pub const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";

/// A role and the binding granting it to the default service account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSpec {
    pub role: &'static str,
    pub binding: &'static str,
    pub verbs: &'static [&'static str],
}

/// The fixed two-role model: the engine manages its step pods and reads their logs
pub const ROLES: [RoleSpec; 2] = [
    RoleSpec {
        role: "pod-manager-role",
        binding: "pod-manager-default-binding",
        verbs: &["create", "patch", "delete", "list", "watch"],
    },
    RoleSpec {
        role: "log-reader-role",
        binding: "log-reader-default-binding",
        verbs: &["get", "list"],
    },
];

const ROLE_RESOURCES: [&str; 2] = ["pods", "pods/log"];

/// Quota applied underneath caller overrides
pub fn default_quota() -> BTreeMap<String, String> {
    [
        ("requests.cpu", "1"),
        ("requests.memory", "512M"),
        ("limits.cpu", "2"),
        ("limits.memory", "512M"),
        ("requests.storage", "1Gi"),
        ("services.nodeports", "0"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}

fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

pub fn namespace(
    name: &str,
    labels: Option<&BTreeMap<String, String>>,
    annotations: Option<&BTreeMap<String, String>>,
) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            labels: labels.cloned(),
            annotations: annotations.cloned(),
            ..meta(name, None)
        },
        ..Default::default()
    }
}

pub fn role(namespace: &str, spec: &RoleSpec) -> Role {
    Role {
        metadata: meta(spec.role, Some(namespace)),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["*".to_string()]),
            resources: Some(ROLE_RESOURCES.iter().map(|r| r.to_string()).collect()),
            verbs: spec.verbs.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        }]),
    }
}

pub fn role_binding(namespace: &str, spec: &RoleSpec) -> RoleBinding {
    RoleBinding {
        metadata: meta(spec.binding, Some(namespace)),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: spec.role.to_string(),
        },
        subjects: Some(vec![Subject {
            api_group: Some(String::new()),
            kind: "ServiceAccount".to_string(),
            name: DEFAULT_SERVICE_ACCOUNT.to_string(),
            namespace: Some(namespace.to_string()),
        }]),
    }
}

pub fn working_dir_claim(
    namespace: &str,
    name: &str,
    size: &str,
    storage_class: &str,
) -> PersistentVolumeClaim {
    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), Quantity(size.to_string()));

    PersistentVolumeClaim {
        metadata: meta(name, Some(namespace)),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteMany".to_string()]),
            storage_class_name: Some(storage_class.to_string()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn docker_config_secret(namespace: &str, name: &str, docker_config: &[u8]) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(
        DOCKER_CONFIG_KEY.to_string(),
        ByteString(docker_config.to_vec()),
    );

    Secret {
        metadata: meta(name, Some(namespace)),
        data: Some(data),
        type_: Some(DOCKER_CONFIG_SECRET_TYPE.to_string()),
        ..Default::default()
    }
}

/// Copy of a secret from another namespace, stripped of server-set metadata
pub fn copied_secret(namespace: &str, source: &Secret) -> Secret {
    let name = source.metadata.name.clone().unwrap_or_default();
    Secret {
        metadata: meta(&name, Some(namespace)),
        data: source.data.clone(),
        type_: source.type_.clone(),
        ..Default::default()
    }
}

/// Quota with `overrides` merged over [`default_quota`]
pub fn resource_quota(
    namespace: &str,
    name: &str,
    overrides: &BTreeMap<String, String>,
) -> ResourceQuota {
    let mut hard = default_quota();
    hard.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    ResourceQuota {
        metadata: meta(name, Some(namespace)),
        spec: Some(ResourceQuotaSpec {
            hard: Some(hard.into_iter().map(|(k, v)| (k, Quantity(v))).collect()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn config_map(namespace: &str, name: &str, key: &str, content: &str) -> ConfigMap {
    let mut data = BTreeMap::new();
    data.insert(key.to_string(), content.to_string());

    ConfigMap {
        metadata: meta(name, Some(namespace)),
        data: Some(data),
        ..Default::default()
    }
}
