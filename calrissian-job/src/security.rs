//! Pod security context of the workflow-engine pod

use k8s_openapi::api::core::v1::PodSecurityContext;
use serde::{Deserialize, Serialize};

/// User, group and filesystem group the engine pod runs as. Root unless set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityContext {
    pub run_as_user: i64,
    pub run_as_group: i64,
    pub fs_group: i64,
}

impl From<SecurityContext> for PodSecurityContext {
    fn from(context: SecurityContext) -> Self {
        PodSecurityContext {
            run_as_user: Some(context.run_as_user),
            run_as_group: Some(context.run_as_group),
            fs_group: Some(context.fs_group),
            ..Default::default()
        }
    }
}
