use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::io::Read;
use std::sync::{Arc, Mutex};

use crate::error::{ClusterError, ClusterResult};
use crate::exec::{ExecOutput, ExecStream};

/// Files on the fake shared volume, keyed by namespace then absolute path
pub(crate) type Volumes = Arc<Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>>;

enum Mode {
    /// Output is fixed when the stream opens
    Replay,
    /// Collects stdin and unpacks it onto the volume on close
    Extract { input: Vec<u8> },
    /// Never produces output, like a drain stuck behind a dead connection
    Stall,
}

/// Exec stream that understands the two `tar` invocations used for staging
pub(crate) struct FakeExecStream {
    namespace: String,
    volumes: Volumes,
    mode: Mode,
    stdin_open: bool,
    pending: VecDeque<ExecOutput>,
    chunk_size: usize,
}

impl FakeExecStream {
    pub(crate) fn spawn(
        namespace: &str,
        volumes: Volumes,
        command: &[String],
        chunk_size: usize,
    ) -> Self {
        let mut stream = Self {
            namespace: namespace.to_string(),
            volumes,
            mode: Mode::Replay,
            stdin_open: true,
            pending: VecDeque::new(),
            chunk_size: chunk_size.max(1),
        };

        let args: Vec<&str> = command.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["tar", "cf", "-", path] => stream.archive(path),
            ["tar", "xvf", "-", ..] => stream.mode = Mode::Extract { input: Vec::new() },
            _ => stream.pending.push_back(ExecOutput::Stderr(
                format!("sh: {}: not found\n", args.first().unwrap_or(&"")).into_bytes(),
            )),
        }
        stream
    }

    pub(crate) fn stalled(namespace: &str, volumes: Volumes) -> Self {
        Self {
            namespace: namespace.to_string(),
            volumes,
            mode: Mode::Stall,
            stdin_open: true,
            pending: VecDeque::new(),
            chunk_size: 1,
        }
    }

    fn archive(&mut self, path: &str) {
        let files: Vec<(String, Vec<u8>)> = {
            let volumes = self.volumes.lock().expect("volume lock poisoned");
            let prefix = format!("{}/", path.trim_end_matches('/'));
            volumes
                .get(&self.namespace)
                .map(|files| {
                    files
                        .iter()
                        .filter(|(name, _)| name.as_str() == path || name.starts_with(&prefix))
                        .map(|(name, data)| (name.clone(), data.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        if files.is_empty() {
            self.pending.push_back(ExecOutput::Stderr(
                format!(
                    "tar: {}: No such file or directory\ntar: Exiting with failure status due to previous errors\n",
                    path
                )
                .into_bytes(),
            ));
            return;
        }

        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in &files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            let relative = name.trim_start_matches('/');
            if let Err(e) = builder.append_data(&mut header, relative, data.as_slice()) {
                self.pending
                    .push_back(ExecOutput::Stderr(format!("tar: {}\n", e).into_bytes()));
                return;
            }
        }

        match builder.into_inner() {
            Ok(archive) => {
                for chunk in archive.chunks(self.chunk_size) {
                    self.pending.push_back(ExecOutput::Stdout(chunk.to_vec()));
                }
            }
            Err(e) => self
                .pending
                .push_back(ExecOutput::Stderr(format!("tar: {}\n", e).into_bytes())),
        }
    }

    fn extract(&mut self, input: &[u8]) {
        let mut archive = tar::Archive::new(input);
        let mut extracted = Vec::new();

        let entries = match archive.entries() {
            Ok(entries) => entries,
            Err(e) => {
                self.pending
                    .push_back(ExecOutput::Stderr(format!("tar: {}\n", e).into_bytes()));
                return;
            }
        };

        for entry in entries {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.pending
                        .push_back(ExecOutput::Stderr(format!("tar: {}\n", e).into_bytes()));
                    return;
                }
            };
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = match entry.path() {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(_) => continue,
            };
            let mut data = Vec::new();
            if entry.read_to_end(&mut data).is_err() {
                continue;
            }
            let absolute = format!("/{}", name.trim_start_matches('/'));
            self.pending
                .push_back(ExecOutput::Stdout(format!("{}\n", absolute).into_bytes()));
            extracted.push((absolute, data));
        }

        let mut volumes = self.volumes.lock().expect("volume lock poisoned");
        let files = volumes.entry(self.namespace.clone()).or_default();
        for (path, data) in extracted {
            files.insert(path, data);
        }
    }
}

#[async_trait]
impl ExecStream for FakeExecStream {
    async fn write_stdin(&mut self, data: &[u8]) -> ClusterResult<()> {
        if !self.stdin_open {
            return Err(ClusterError::Stream("stdin is closed".to_string()));
        }
        if let Mode::Extract { input } = &mut self.mode {
            input.extend_from_slice(data);
        }
        Ok(())
    }

    async fn close_stdin(&mut self) -> ClusterResult<()> {
        if !self.stdin_open {
            return Ok(());
        }
        self.stdin_open = false;

        if let Mode::Extract { input } = &mut self.mode {
            let input = std::mem::take(input);
            self.extract(&input);
        }
        Ok(())
    }

    async fn next_output(&mut self) -> ClusterResult<Option<ExecOutput>> {
        if matches!(self.mode, Mode::Stall) {
            std::future::pending::<()>().await;
        }
        // An extracting tar produces nothing until its input ends
        if matches!(self.mode, Mode::Extract { .. }) && self.stdin_open {
            return Ok(None);
        }
        Ok(self.pending.pop_front())
    }

    fn is_open(&self) -> bool {
        matches!(self.mode, Mode::Stall)
            || !self.pending.is_empty() || (matches!(self.mode, Mode::Extract { .. }) && self.stdin_open)
    }

    async fn close(&mut self) -> ClusterResult<()> {
        self.stdin_open = false;
        self.pending.clear();
        Ok(())
    }
}
