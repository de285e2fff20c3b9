//! Image pull secret payload

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{ContextError, ContextResult};

/// Registry credentials handed to a context.
///
/// ```json
/// {
///   "imagePullSecrets": {"auths": {"registry.example": {"auth": "..."}}},
///   "additionalImagePullSecrets": [{"name": "shared-registry"}]
/// }
/// ```
///
/// `imagePullSecrets` is stored verbatim as the `.dockerconfigjson` of a new
/// secret. Each additional secret is copied by name from the origin namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePullSecrets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secrets: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_image_pull_secrets: Option<Vec<SecretReference>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReference {
    pub name: String,
}

impl ImagePullSecrets {
    pub fn from_json(content: &str) -> ContextResult<Self> {
        serde_json::from_str(content).map_err(|e| ContextError::InvalidSecretConfig(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> ContextResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ContextError::InvalidSecretConfig(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// The docker config payload, when one with at least one entry was given
    pub fn docker_config(&self) -> Option<&Value> {
        self.image_pull_secrets.as_ref().filter(|value| match value {
            Value::Object(map) => !map.is_empty(),
            Value::Null => false,
            _ => true,
        })
    }

    pub fn additional(&self) -> &[SecretReference] {
        self.additional_image_pull_secrets.as_deref().unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.docker_config().is_none() && self.additional().is_empty()
    }
}
