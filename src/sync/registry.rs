//! Named sync sessions and custom-directory batches.
//!
//! The session map is guarded by an async mutex that is never held across a
//! bulk transfer or while waiting for a watcher to shut down. A name is
//! reserved before its session initializes, so concurrent starts with the
//! same name cannot both proceed.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::k8s::Workload;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::exclude::ExclusionConfig;
use crate::sync::expand::{expand_unit, SyncUnit};
use crate::sync::watcher::{IncrementalWatcher, SessionState, WatchHandle};

/// Everything needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub name: String,
    pub local_root: PathBuf,
    pub workload: Workload,
    pub exclusion: ExclusionConfig,
}

impl SessionRequest {
    pub fn new(name: impl Into<String>, local_root: impl Into<PathBuf>, workload: Workload) -> Self {
        let local_root = local_root.into();
        Self {
            name: name.into(),
            exclusion: ExclusionConfig::with_defaults(&local_root),
            local_root,
            workload,
        }
    }

    pub fn with_exclusion(mut self, exclusion: ExclusionConfig) -> Self {
        self.exclusion = exclusion;
        self
    }
}

/// Snapshot of one registered session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub name: String,
    pub local_root: PathBuf,
    pub remote_root: String,
    pub workload: Workload,
    pub state: SessionState,
    pub started_at: DateTime<Local>,
}

/// Outcome of a custom-directory batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CustomSyncReport {
    pub synced: usize,
    pub failed: usize,
    pub total: usize,
}

enum SessionSlot {
    Initializing { token: u64, info: SessionInfo },
    Active { handle: WatchHandle, info: SessionInfo },
}

impl SessionSlot {
    fn snapshot(&self) -> SessionInfo {
        match self {
            SessionSlot::Initializing { info, .. } => info.clone(),
            SessionSlot::Active { handle, info } => SessionInfo {
                state: handle.state(),
                ..info.clone()
            },
        }
    }
}

pub struct SyncSessionRegistry {
    watcher: IncrementalWatcher,
    sessions: Mutex<HashMap<String, SessionSlot>>,
    next_token: AtomicU64,
}

impl SyncSessionRegistry {
    pub fn new(watcher: IncrementalWatcher) -> Self {
        Self {
            watcher,
            sessions: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// Register a session and run its initial sync. Returns once the session
    /// is watching.
    pub async fn start(&self, request: SessionRequest) -> SyncResult<SessionInfo> {
        let SessionRequest {
            name,
            local_root,
            workload,
            exclusion,
        } = request;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let remote_root = self.watcher.transport().workspace_root().to_string();

        {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(&name) {
                return Err(SyncError::SessionExists { name });
            }
            let info = SessionInfo {
                name: name.clone(),
                local_root: local_root.clone(),
                remote_root,
                workload: workload.clone(),
                state: SessionState::Initializing,
                started_at: Local::now(),
            };
            sessions.insert(name.clone(), SessionSlot::Initializing { token, info });
        }

        info!("Starting sync session '{}' for {}", name, local_root.display());
        let result = self.watcher.start(&local_root, workload, &exclusion).await;

        let mut sessions = self.sessions.lock().await;
        let reservation = match sessions.remove(&name) {
            Some(SessionSlot::Initializing { token: held, info }) if held == token => Some(info),
            Some(other) => {
                sessions.insert(name.clone(), other);
                None
            }
            None => None,
        };

        match (result, reservation) {
            (Ok(handle), Some(reserved)) => {
                let info = SessionInfo {
                    local_root: handle.local_root().to_path_buf(),
                    state: handle.state(),
                    ..reserved
                };
                sessions.insert(
                    name.clone(),
                    SessionSlot::Active {
                        handle,
                        info: info.clone(),
                    },
                );
                info!("Sync session '{}' is watching", name);
                Ok(info)
            }
            (Ok(handle), None) => {
                drop(sessions);
                handle.stop().await;
                Err(SyncError::SessionCancelled { name })
            }
            (Err(e), _) => {
                warn!("Sync session '{}' failed to start: {}", name, e);
                Err(e)
            }
        }
    }

    /// Stop a session. Stopping an unknown session is not an error.
    pub async fn stop(&self, name: &str) -> SyncResult<()> {
        let slot = self.sessions.lock().await.remove(name);

        match slot {
            Some(SessionSlot::Active { handle, .. }) => {
                handle.stop().await;
                info!("Stopped sync session '{}'", name);
            }
            Some(SessionSlot::Initializing { .. }) => {
                info!("Cancelled sync session '{}' during initialization", name);
            }
            None => debug!("No sync session named '{}'", name),
        }
        Ok(())
    }

    /// Stop every registered session.
    pub async fn stop_all(&self) {
        let slots: Vec<(String, SessionSlot)> = self.sessions.lock().await.drain().collect();

        for (name, slot) in slots {
            if let SessionSlot::Active { handle, .. } = slot {
                handle.stop().await;
            }
            info!("Stopped sync session '{}'", name);
        }
    }

    pub async fn status(&self, name: &str) -> SyncResult<SessionState> {
        let sessions = self.sessions.lock().await;
        match sessions.get(name) {
            Some(SessionSlot::Initializing { .. }) => Ok(SessionState::Initializing),
            Some(SessionSlot::Active { handle, .. }) => Ok(handle.state()),
            None => Err(SyncError::SessionNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// All registered sessions, sorted by name.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().await;
        let mut infos: Vec<SessionInfo> = sessions.values().map(SessionSlot::snapshot).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Expand and transfer a batch of custom directories.
    ///
    /// Individual failures are logged and counted. The batch only fails when
    /// it had units and none of them synced.
    pub async fn sync_custom_dirs(
        &self,
        units: &[SyncUnit],
        workload: &Workload,
        defaults: &ExclusionConfig,
    ) -> SyncResult<CustomSyncReport> {
        let mut report = CustomSyncReport::default();

        for declared in units {
            let expanded = match expand_unit(declared, defaults) {
                Ok(expanded) => expanded,
                Err(e) => {
                    warn!("Skipping custom directory {}: {}", declared.source.display(), e);
                    report.total += 1;
                    report.failed += 1;
                    continue;
                }
            };

            for unit in expanded {
                report.total += 1;
                match self.sync_unit(&unit, workload, defaults).await {
                    Ok(()) => report.synced += 1,
                    Err(e) => {
                        warn!(
                            "Failed to sync {} -> {}: {}",
                            unit.source.display(),
                            unit.destination,
                            e
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            "Custom directories: {} synced, {} failed",
            report.synced, report.failed
        );

        if report.synced == 0 && report.total > 0 {
            return Err(SyncError::AllUnitsFailed {
                total: report.total,
            });
        }
        Ok(report)
    }

    async fn sync_unit(
        &self,
        unit: &SyncUnit,
        workload: &Workload,
        defaults: &ExclusionConfig,
    ) -> SyncResult<()> {
        let exclusion = unit.exclusion.resolve(&unit.source, defaults);
        self.watcher
            .transport()
            .initial_sync_to_custom_path(&unit.source, workload, &unit.destination, &exclusion)
            .await?;
        Ok(())
    }
}
