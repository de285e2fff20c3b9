//! Pieces of the workflow-engine pod: payload volumes, the working-directory
//! mount and the engine container itself

use calrissian_config::JobConfig;
use calrissian_core::{ContainerName, WorkingDirLayout};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, ExecAction, KeyToPath, Lifecycle,
    LifecycleHandler, ObjectFieldSelector, PersistentVolumeClaimVolumeSource,
    ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// rw-r--r--
const PAYLOAD_FILE_MODE: i32 = 0o644;

/// A document staged in a config map and mounted as a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    pub config_map: &'static str,
    pub volume: &'static str,
    pub mount_path: &'static str,
    pub file_name: &'static str,
}

impl Payload {
    pub const CWL: Payload = Payload {
        config_map: "cwl-workflow",
        volume: "volume-cwl-workflow",
        mount_path: "/workflow-input",
        file_name: "workflow.cwl",
    };

    pub const PARAMS: Payload = Payload {
        config_map: "params",
        volume: "volume-params",
        mount_path: "/workflow-params",
        file_name: "params.yml",
    };

    pub const POD_ENV_VARS: Payload = Payload {
        config_map: "pod-env-vars",
        volume: "volume-pod-env-vars",
        mount_path: "/pod-env-vars",
        file_name: "pod_env_vars.json",
    };

    pub const POD_NODE_SELECTOR: Payload = Payload {
        config_map: "pod-node-selector",
        volume: "volume-pod-node-selector",
        mount_path: "/pod-node-selector",
        file_name: "pod_nodeselectors.yml",
    };

    /// Config map key holding the document
    pub fn key(&self) -> &'static str {
        self.config_map
    }

    /// Path of the document inside the engine container
    pub fn path(&self) -> String {
        format!("{}/{}", self.mount_path, self.file_name)
    }

    pub fn volume(&self) -> Volume {
        Volume {
            name: self.volume.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: self.config_map.to_string().into(),
                optional: Some(false),
                default_mode: Some(PAYLOAD_FILE_MODE),
                items: Some(vec![KeyToPath {
                    key: self.key().to_string(),
                    path: self.file_name.to_string(),
                    mode: Some(PAYLOAD_FILE_MODE),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn volume_mount(&self) -> VolumeMount {
        VolumeMount {
            name: self.volume.to_string(),
            mount_path: self.mount_path.to_string(),
            ..Default::default()
        }
    }
}

pub fn working_dir_volume(layout: &WorkingDirLayout) -> Volume {
    Volume {
        name: layout.volume_name.clone(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: layout.claim_name.clone(),
            read_only: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn working_dir_mount(layout: &WorkingDirLayout) -> VolumeMount {
    VolumeMount {
        name: layout.volume_name.clone(),
        mount_path: layout.mount_path.clone(),
        read_only: Some(false),
        ..Default::default()
    }
}

/// Environment of the engine container. The engine names its step pods after
/// its own pod, read through the downward API.
pub fn engine_env(keep_pods: bool) -> Vec<EnvVar> {
    let mut env = vec![EnvVar {
        name: "CALRISSIAN_POD_NAME".to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: "metadata.name".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }];

    if keep_pods {
        env.push(EnvVar {
            name: "CALRISSIAN_DELETE_PODS".to_string(),
            value: Some("false".to_string()),
            ..Default::default()
        });
    }
    env
}

pub fn engine_container(
    config: &JobConfig,
    args: Vec<String>,
    env: Vec<EnvVar>,
    volume_mounts: Vec<VolumeMount>,
) -> Container {
    let quantities = |cpu: &str, memory: &str| {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    };
    let resources = &config.resources;

    Container {
        name: ContainerName::WorkflowEngine.as_str().to_string(),
        image: Some(config.image.clone()),
        image_pull_policy: Some(config.image_pull_policy.clone()),
        command: Some(vec!["calrissian".to_string()]),
        args: Some(args),
        env: Some(env),
        volume_mounts: Some(volume_mounts),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        format!("sleep {}", config.pre_stop_sleep_seconds),
                    ]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        resources: Some(ResourceRequirements {
            requests: Some(quantities(&resources.request_cpu, &resources.request_memory)),
            limits: Some(quantities(&resources.limit_cpu, &resources.limit_memory)),
            ..Default::default()
        }),
        ..Default::default()
    }
}
