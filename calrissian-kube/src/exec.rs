//! Exec stream primitive

use async_trait::async_trait;
use kube::api::AttachedProcess;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};

const READ_CHUNK: usize = 16 * 1024;

/// One chunk read from an exec stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutput {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// A command running inside a pod container.
///
/// The stream is open while either output channel can still produce data.
#[async_trait]
pub trait ExecStream: Send {
    async fn write_stdin(&mut self, data: &[u8]) -> ClusterResult<()>;

    /// Signal end of input to the remote command
    async fn close_stdin(&mut self) -> ClusterResult<()>;

    /// Next chunk from stdout or stderr, `None` once both are exhausted
    async fn next_output(&mut self) -> ClusterResult<Option<ExecOutput>>;

    fn is_open(&self) -> bool;

    /// Release the stream; safe to call more than once
    async fn close(&mut self) -> ClusterResult<()>;
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// [`ExecStream`] backed by a kube websocket attachment
pub struct KubeExecStream {
    process: Option<AttachedProcess>,
    stdin: Option<BoxedWriter>,
    stdout: Option<BoxedReader>,
    stderr: Option<BoxedReader>,
}

impl KubeExecStream {
    pub fn new(mut process: AttachedProcess) -> Self {
        let stdin = process.stdin().map(|w| Box::new(w) as BoxedWriter);
        let stdout = process.stdout().map(|r| Box::new(r) as BoxedReader);
        let stderr = process.stderr().map(|r| Box::new(r) as BoxedReader);

        Self {
            process: Some(process),
            stdin,
            stdout,
            stderr,
        }
    }
}

enum Chunk {
    Stdout(std::io::Result<usize>),
    Stderr(std::io::Result<usize>),
}

async fn read_from(reader: Option<&mut BoxedReader>, buf: &mut [u8]) -> std::io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

fn stream_error(channel: &str, error: std::io::Error) -> ClusterError {
    ClusterError::Stream(format!("{} read failed: {}", channel, error))
}

#[async_trait]
impl ExecStream for KubeExecStream {
    async fn write_stdin(&mut self, data: &[u8]) -> ClusterResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ClusterError::Stream("stdin is closed".to_string()))?;
        stdin
            .write_all(data)
            .await
            .map_err(|e| ClusterError::Stream(format!("stdin write failed: {}", e)))
    }

    async fn close_stdin(&mut self) -> ClusterResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .shutdown()
                .await
                .map_err(|e| ClusterError::Stream(format!("stdin shutdown failed: {}", e)))?;
        }
        Ok(())
    }

    async fn next_output(&mut self) -> ClusterResult<Option<ExecOutput>> {
        let mut out_buf = vec![0u8; READ_CHUNK];
        let mut err_buf = vec![0u8; READ_CHUNK];

        loop {
            if self.stdout.is_none() && self.stderr.is_none() {
                return Ok(None);
            }

            let chunk = tokio::select! {
                n = read_from(self.stdout.as_mut(), &mut out_buf) => Chunk::Stdout(n),
                n = read_from(self.stderr.as_mut(), &mut err_buf) => Chunk::Stderr(n),
            };

            match chunk {
                Chunk::Stdout(Ok(0)) => self.stdout = None,
                Chunk::Stderr(Ok(0)) => self.stderr = None,
                Chunk::Stdout(Ok(n)) => return Ok(Some(ExecOutput::Stdout(out_buf[..n].to_vec()))),
                Chunk::Stderr(Ok(n)) => return Ok(Some(ExecOutput::Stderr(err_buf[..n].to_vec()))),
                Chunk::Stdout(Err(e)) => return Err(stream_error("stdout", e)),
                Chunk::Stderr(Err(e)) => return Err(stream_error("stderr", e)),
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stdout.is_some() || self.stderr.is_some()
    }

    async fn close(&mut self) -> ClusterResult<()> {
        self.stdin = None;
        self.stdout = None;
        self.stderr = None;

        if let Some(process) = self.process.take() {
            if let Err(e) = process.join().await {
                debug!("Exec attachment ended with: {}", e);
            }
        }
        Ok(())
    }
}
