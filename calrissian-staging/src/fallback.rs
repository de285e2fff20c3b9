//! `kubectl cp` for clusters reached through a proxy that blocks exec streams

use calrissian_config::StagingConfig;
use calrissian_resilience::{RetryExecutor, RetryPolicy};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::error::{StagingError, StagingResult};

/// External copy tool invoked with a fixed retry budget
#[derive(Debug, Clone)]
pub struct KubectlCopy {
    binary: String,
    policy: RetryPolicy,
}

impl KubectlCopy {
    pub fn new(binary: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            binary: binary.into(),
            policy,
        }
    }

    pub fn from_config(config: &StagingConfig) -> Self {
        Self::new(
            config.kubectl_binary.clone(),
            RetryPolicy::fixed(config.fallback_attempts, config.fallback_interval),
        )
    }

    /// Copy `source` out of a pod into `destination_dir`. Returns `None` once
    /// every attempt has failed.
    pub async fn copy_from_pod(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        source: &str,
        destination_dir: &Path,
    ) -> Option<PathBuf> {
        let file_name = Path::new(source).file_name()?;
        let target = destination_dir.join(file_name);
        let remote = format!("{}/{}:{}", namespace, pod, source);

        let executor = RetryExecutor::new(self.policy.clone());
        let (remote_ref, target_ref) = (&remote, &target);
        let result = executor
            .execute(move || self.run(remote_ref, target_ref, container))
            .await;

        match result {
            Ok(()) => Some(target),
            Err(e) => {
                error!("Could not copy {} with {}: {}", remote, self.binary, e);
                None
            }
        }
    }

    async fn run(&self, remote: &str, target: &Path, container: &str) -> StagingResult<()> {
        debug!("{} cp {} {}", self.binary, remote, target.display());
        let output = Command::new(&self.binary)
            .arg("cp")
            .arg(remote)
            .arg(target)
            .arg("-c")
            .arg(container)
            .output()
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!("{}: {}", self.binary, stderr.trim_end());
        }

        if !output.status.success() {
            return Err(StagingError::Fallback(format!(
                "{} exited with {}",
                self.binary, output.status
            )));
        }
        if !target.exists() {
            return Err(StagingError::Fallback(format!(
                "{} reported success but {} is missing",
                self.binary,
                target.display()
            )));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn script(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-kubectl");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_copy_succeeds_through_tool() {
        let dir = tempfile::tempdir().unwrap();
        // $1=cp $2=<ns>/<pod>:<src> $3=<dest>
        let binary = script(dir.path(), r#"echo "$2" > "$3""#);
        let copy = KubectlCopy::new(binary, RetryPolicy::fixed(2, Duration::from_millis(1)));

        let staged = copy
            .copy_from_pod("ns", "kube-cp-1", "c", "/calrissian/output.json", dir.path())
            .await
            .unwrap();
        assert_eq!(staged, dir.path().join("output.json"));
        assert_eq!(
            std::fs::read_to_string(staged).unwrap().trim(),
            "ns/kube-cp-1:/calrissian/output.json"
        );
    }

    #[tokio::test]
    async fn test_failing_tool_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(dir.path(), "echo 'error: unable to upgrade connection' >&2; exit 1");
        let copy = KubectlCopy::new(binary, RetryPolicy::fixed(2, Duration::from_millis(1)));

        let staged = copy
            .copy_from_pod("ns", "pod", "c", "/calrissian/output.json", dir.path())
            .await;
        assert!(staged.is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let copy = KubectlCopy::new(
            dir.path().join("no-such-kubectl").to_string_lossy().into_owned(),
            RetryPolicy::fixed(2, Duration::from_millis(1)),
        );

        let staged = copy
            .copy_from_pod("ns", "pod", "c", "/calrissian/report.json", dir.path())
            .await;
        assert!(staged.is_none());
    }
}
