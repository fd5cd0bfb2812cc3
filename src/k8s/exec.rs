//! Remote execution boundary.
//!
//! Everything the sync engine does on the remote side goes through
//! [`RemoteExecutor`]: short commands (`mkdir -p`) and commands fed a byte
//! stream on stdin (`tar -x`).

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Byte stream fed into a remote command's stdin. The stream ends when
/// every sender is dropped.
pub type InputStream = mpsc::Receiver<Vec<u8>>;

/// The container a session syncs into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub namespace: String,
    pub pod: String,
    /// Container inside the pod; `None` uses the pod's default container.
    pub container: Option<String>,
}

impl Workload {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: None,
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod)?;
        if let Some(container) = &self.container {
            write!(f, ":{}", container)?;
        }
        Ok(())
    }
}

/// Captured output of a finished remote command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command to completion. A non-zero exit is an error carrying
    /// the remote status and captured stderr.
    async fn run(&self, workload: &Workload, argv: Vec<String>) -> Result<ExecOutput>;

    /// Run a command with `input` piped into its stdin.
    async fn run_with_input(
        &self,
        workload: &Workload,
        argv: Vec<String>,
        input: InputStream,
    ) -> Result<ExecOutput>;
}

/// Build an argv from string slices.
pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}
