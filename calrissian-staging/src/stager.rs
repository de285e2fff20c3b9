//! Copy files between the working-directory volume and local storage

use calrissian_config::StagingConfig;
use calrissian_core::WorkingDirLayout;
use calrissian_kube::{ClusterClient, ExecOutput, ExecStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::archive;
use crate::error::{StagingError, StagingResult};
use crate::fallback::KubectlCopy;
use crate::helper::{HelperPod, HELPER_CONTAINER};

/// Stages files through a fresh helper pod per operation
pub struct VolumeStager {
    client: Arc<dyn ClusterClient>,
    namespace: String,
    layout: WorkingDirLayout,
    config: StagingConfig,
    fallback: KubectlCopy,
}

impl VolumeStager {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        namespace: impl Into<String>,
        layout: WorkingDirLayout,
        config: StagingConfig,
    ) -> Self {
        let fallback = KubectlCopy::from_config(&config);
        Self {
            client,
            namespace: namespace.into(),
            layout,
            config,
            fallback,
        }
    }

    pub fn with_fallback(mut self, fallback: KubectlCopy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn layout(&self) -> &WorkingDirLayout {
        &self.layout
    }

    /// Stage each of `paths` from the volume into `destination`.
    ///
    /// A path that cannot be staged is logged and yields no file. The helper
    /// pod is deleted whatever the outcome.
    pub async fn copy_from_volume(
        &self,
        paths: &[String],
        destination: &Path,
    ) -> StagingResult<Vec<PathBuf>> {
        let helper = self.start_helper().await?;
        let result = self.stage_out(&helper, paths, destination).await;
        helper.dismiss().await;
        result
    }

    /// Write each of `sources` into `destination_dir` on the volume. Returns
    /// the volume paths reported by the unpacking `tar`.
    pub async fn copy_to_volume(
        &self,
        sources: &[PathBuf],
        destination_dir: &str,
    ) -> StagingResult<Vec<String>> {
        let helper = self.start_helper().await?;
        let result = self.stage_in(&helper, sources, destination_dir).await;
        helper.dismiss().await;
        result
    }

    async fn start_helper(&self) -> StagingResult<HelperPod> {
        HelperPod::start(
            self.client.clone(),
            &self.namespace,
            &self.layout,
            &self.config,
        )
        .await
    }

    async fn stage_out(
        &self,
        helper: &HelperPod,
        paths: &[String],
        destination: &Path,
    ) -> StagingResult<Vec<PathBuf>> {
        let mut staged = Vec::new();
        for path in paths {
            match self.read_archive(helper, path).await {
                Ok(archive) if archive.is_empty() => {
                    warn!("Nothing to stage from {}", path);
                }
                Ok(archive) => match archive::unpack_flat(&archive, destination) {
                    Ok(files) => {
                        info!("Staged {} file(s) from {}", files.len(), path);
                        staged.extend(files);
                    }
                    Err(e) => error!("Could not unpack {}: {}", path, e),
                },
                Err(e) if e.warrants_fallback() => {
                    warn!("Exec copy of {} failed ({}), trying {}", path, e, self.config.kubectl_binary);
                    if let Some(file) = self
                        .fallback
                        .copy_from_pod(
                            helper.namespace(),
                            helper.name(),
                            HELPER_CONTAINER,
                            path,
                            destination,
                        )
                        .await
                    {
                        staged.push(file);
                    }
                }
                Err(e @ (StagingError::Cluster(_) | StagingError::Timeout { .. })) => {
                    error!("Could not stage {}: {}", path, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(staged)
    }

    async fn stage_in(
        &self,
        helper: &HelperPod,
        sources: &[PathBuf],
        destination_dir: &str,
    ) -> StagingResult<Vec<String>> {
        let destination_dir = destination_dir.trim_end_matches('/');
        let command = to_strings(&["tar", "xvf", "-", "-C", "/", "--absolute-names"]);

        let mut written = Vec::new();
        for source in sources {
            let file_name = source
                .file_name()
                .ok_or_else(|| StagingError::Archive(format!("{} has no file name", source.display())))?;
            let target = format!("{}/{}", destination_dir, file_name.to_string_lossy());
            let archive = archive::pack(source, &target)?;

            let mut stream = helper.exec(&command).await?;
            let exchange = tokio::time::timeout(
                self.config.exec_timeout,
                upload(stream.as_mut(), &archive),
            )
            .await;
            close(stream.as_mut()).await;

            let listing = exchange.map_err(|_| timeout(&target, self.config.exec_timeout))??;
            for line in String::from_utf8_lossy(&listing).lines().filter(|l| !l.is_empty()) {
                debug!("tar: {}", line);
                written.push(line.to_string());
            }
        }
        Ok(written)
    }

    async fn read_archive(&self, helper: &HelperPod, path: &str) -> StagingResult<Vec<u8>> {
        let command = to_strings(&["tar", "cf", "-", path]);
        let mut stream = helper.exec(&command).await?;
        let drained = tokio::time::timeout(self.config.exec_timeout, drain(stream.as_mut())).await;
        close(stream.as_mut()).await;
        drained.map_err(|_| timeout(path, self.config.exec_timeout))?
    }
}

/// Read stdout to the end, reporting stderr as it arrives
async fn drain(stream: &mut dyn ExecStream) -> StagingResult<Vec<u8>> {
    let mut stdout = Vec::new();
    while let Some(chunk) = stream.next_output().await? {
        match chunk {
            ExecOutput::Stdout(data) => stdout.extend_from_slice(&data),
            ExecOutput::Stderr(data) => {
                warn!("helper pod: {}", String::from_utf8_lossy(&data).trim_end())
            }
        }
    }
    Ok(stdout)
}

async fn upload(stream: &mut dyn ExecStream, archive: &[u8]) -> StagingResult<Vec<u8>> {
    stream.write_stdin(archive).await?;
    stream.close_stdin().await?;
    drain(stream).await
}

async fn close(stream: &mut dyn ExecStream) {
    if let Err(e) = stream.close().await {
        debug!("Closing exec stream: {}", e);
    }
}

fn timeout(path: &str, after: Duration) -> StagingError {
    StagingError::Timeout {
        operation: format!("copying {}", path),
        after,
    }
}

fn to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}
