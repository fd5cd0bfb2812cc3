//! One-shot transfer of a whole directory tree.
//!
//! Packing and extraction are two tasks joined by an in-memory pipe: a
//! blocking packer writes the gzip'd tar, the remote `tar -x` consumes it.
//! Either side failing fails the transfer and tears down the other. A
//! failed transfer may leave a partially extracted tree behind; running
//! it again is the recovery path.

use anyhow::Context;
use humansize::{format_size, DECIMAL};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::k8s::{RemoteExecutor, Workload};
use crate::sync::archive::{pack_tree, pipe, TransferStats};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::exclude::{ExcludeMatcher, ExclusionConfig};
use crate::sync::paths::{resolve_local_root, DEFAULT_WORKSPACE_ROOT};
use crate::sync::remote::{extract_archive, make_dir};

#[derive(Clone)]
pub struct BulkTransport {
    executor: Arc<dyn RemoteExecutor>,
    workspace_root: String,
}

impl BulkTransport {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            executor,
            workspace_root: DEFAULT_WORKSPACE_ROOT.to_string(),
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<String>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn workspace_root(&self) -> &str {
        &self.workspace_root
    }

    pub fn executor(&self) -> &Arc<dyn RemoteExecutor> {
        &self.executor
    }

    /// Mirror `local_root` into the workspace root of `workload`.
    pub async fn transfer(
        &self,
        local_root: &Path,
        workload: &Workload,
        exclusion: &ExclusionConfig,
    ) -> SyncResult<TransferStats> {
        let destination = self.workspace_root.clone();
        self.transfer_to(local_root, workload, &destination, exclusion).await
    }

    /// Mirror `source` into an arbitrary remote directory.
    pub async fn initial_sync_to_custom_path(
        &self,
        source: &Path,
        workload: &Workload,
        destination: &str,
        exclusion: &ExclusionConfig,
    ) -> SyncResult<TransferStats> {
        self.transfer_to(source, workload, destination, exclusion).await
    }

    async fn transfer_to(
        &self,
        local_root: &Path,
        workload: &Workload,
        destination: &str,
        exclusion: &ExclusionConfig,
    ) -> SyncResult<TransferStats> {
        let root = resolve_local_root(local_root)?;

        // Only explicit patterns and the VCS safety net apply at pack time.
        let matcher = ExcludeMatcher::new(&ExclusionConfig {
            use_ignore_file: false,
            ..exclusion.rebased(&root)
        });
        let exclude_args = matcher.archive_exclude_args();
        debug!("Packing {} with {:?}", root.display(), exclude_args);

        info!("Syncing {} -> {}:{}", root.display(), workload, destination);

        let transfer_error = |source: anyhow::Error| SyncError::Transfer {
            path: root.clone(),
            destination: destination.to_string(),
            source,
        };

        make_dir(self.executor.as_ref(), workload, destination)
            .await
            .map_err(transfer_error)?;

        let (writer, stream) = pipe();
        let pack_root = root.clone();
        let packer = async move {
            tokio::task::spawn_blocking(move || {
                pack_tree(&pack_root, &exclude_args, writer).map(|(stats, _)| stats)
            })
            .await
            .context("Archive packer panicked")?
        };
        let extractor = extract_archive(self.executor.as_ref(), workload, destination, stream);

        let (stats, ()) = tokio::try_join!(packer, extractor).map_err(transfer_error)?;

        info!(
            "Synced {} files ({}) to {}",
            stats.files,
            format_size(stats.bytes, DECIMAL),
            destination
        );
        Ok(stats)
    }
}
