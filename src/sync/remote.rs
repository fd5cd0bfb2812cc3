//! Remote-side operations used by the transports.

use anyhow::{anyhow, Context, Result};
use std::path::Path;

use crate::k8s::exec::argv;
use crate::k8s::{InputStream, RemoteExecutor, Workload};
use crate::sync::archive::single_file_archive;
use crate::sync::paths::{remote_file_name, remote_parent};

/// `mkdir -p` on the remote side.
pub async fn make_dir(executor: &dyn RemoteExecutor, workload: &Workload, dir: &str) -> Result<()> {
    executor
        .run(workload, argv(&["mkdir", "-p", dir]))
        .await
        .with_context(|| format!("Failed to create remote directory {}", dir))?;
    Ok(())
}

/// Unpack a gzip'd tar stream into `target`.
pub async fn extract_archive(
    executor: &dyn RemoteExecutor,
    workload: &Workload,
    target: &str,
    archive: InputStream,
) -> Result<()> {
    executor
        .run_with_input(workload, argv(&["tar", "-xzf", "-", "-C", target]), archive)
        .await
        .with_context(|| format!("Failed to extract archive into {}", target))?;
    Ok(())
}

/// Copy one local file to `remote_path`. The parent directory must exist.
pub async fn copy_file(
    executor: &dyn RemoteExecutor,
    workload: &Workload,
    local: &Path,
    remote_path: &str,
) -> Result<()> {
    let parent = remote_parent(remote_path)
        .ok_or_else(|| anyhow!("Remote path {} has no parent directory", remote_path))?;
    let name = remote_file_name(remote_path)
        .ok_or_else(|| anyhow!("Remote path {} has no file name", remote_path))?;

    let local_path = local.to_path_buf();
    let entry_name = name.to_string();
    let data = tokio::task::spawn_blocking(move || single_file_archive(&local_path, &entry_name))
        .await
        .context("Archive task panicked")??;

    let (tx, rx) = tokio::sync::mpsc::channel(1);
    tx.send(data)
        .await
        .map_err(|_| anyhow!("Archive stream closed before sending"))?;
    drop(tx);

    executor
        .run_with_input(workload, argv(&["tar", "-xf", "-", "-C", parent]), rx)
        .await
        .with_context(|| format!("Failed to copy {} to {}", local.display(), remote_path))?;
    Ok(())
}
