//! Incremental sync of a watched directory tree.
//!
//! A session goes `Initializing -> Watching -> Stopped`. Initializing runs
//! the bulk transfer and subscribes every non-excluded directory; Watching
//! runs a single task that batches create/write events behind a debounce
//! deadline and copies each changed file to the remote workspace.
//!
//! Delivery is at most once per debounce window: the pending set is cleared
//! after every flush whatever the per-file outcome.

use jwalk::{Parallelism, WalkDir};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::k8s::{RemoteExecutor, Workload};
use crate::sync::bulk::BulkTransport;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::exclude::{ExcludeMatcher, ExclusionConfig};
use crate::sync::paths::{remote_join, remote_parent, resolve_local_root};
use crate::sync::remote::{copy_file, make_dir};
use crate::sync::source::{ChangeEvent, ChangeKind, ChangeSource, ChangeSourceFactory, EventStream};

/// Quiet period after the last change before a batch is flushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Lifecycle state of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Watching,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Initializing => "initializing",
            SessionState::Watching => "watching",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Changed files waiting for the next flush.
#[derive(Debug, Default)]
pub struct PendingChanges {
    paths: HashSet<PathBuf>,
}

impl PendingChanges {
    /// Returns false if the path was already pending.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        self.paths.insert(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Take every pending path, leaving the set empty.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = std::mem::take(&mut self.paths).into_iter().collect();
        paths.sort();
        paths
    }
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub attempted: usize,
    pub copied: usize,
    pub failed: usize,
}

/// Starts watch sessions.
#[derive(Clone)]
pub struct IncrementalWatcher {
    transport: BulkTransport,
    sources: Arc<dyn ChangeSourceFactory>,
    options: WatchOptions,
}

impl IncrementalWatcher {
    pub fn new(
        transport: BulkTransport,
        sources: Arc<dyn ChangeSourceFactory>,
        options: WatchOptions,
    ) -> Self {
        Self {
            transport,
            sources,
            options,
        }
    }

    pub fn transport(&self) -> &BulkTransport {
        &self.transport
    }

    /// Run the Initializing phase and spawn the watch loop.
    ///
    /// Returns only after the initial bulk transfer has completed. Any
    /// failure here leaves nothing running.
    pub async fn start(
        &self,
        local_root: &Path,
        workload: Workload,
        exclusion: &ExclusionConfig,
    ) -> SyncResult<WatchHandle> {
        let root = resolve_local_root(local_root)?;
        let exclusion = exclusion.rebased(&root);

        self.transport.transfer(&root, &workload, &exclusion).await?;

        let matcher = Arc::new(ExcludeMatcher::new(&exclusion));
        let subscribe_error = |source: anyhow::Error| SyncError::Subscribe {
            path: root.clone(),
            source,
        };

        let (mut source, events) = self.sources.open().map_err(subscribe_error)?;

        let (dirs, _) = scan_tree_blocking(root.clone(), Arc::clone(&matcher))
            .await
            .map_err(subscribe_error)?;

        for dir in &dirs {
            source.subscribe(dir).map_err(|source| SyncError::Subscribe {
                path: dir.clone(),
                source,
            })?;
        }

        let remote_root = self.transport.workspace_root().to_string();
        info!(
            "Watching {} ({} directories) -> {}:{}",
            root.display(),
            dirs.len(),
            workload,
            remote_root
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Watching);

        let event_loop = EventLoop {
            flusher: Flusher {
                local_root: root.clone(),
                remote_root: remote_root.clone(),
                workload,
                executor: Arc::clone(self.transport.executor()),
            },
            matcher,
            source,
            pending: PendingChanges::default(),
            debounce: self.options.debounce,
        };
        let task = tokio::spawn(event_loop.run(events, stop_rx, state_tx));

        Ok(WatchHandle {
            local_root: root,
            remote_root,
            stop: stop_tx,
            task,
            state: state_rx,
        })
    }
}

/// A running watch session. Dropping the handle also stops the session.
#[derive(Debug)]
pub struct WatchHandle {
    local_root: PathBuf,
    remote_root: String,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
    state: watch::Receiver<SessionState>,
}

impl WatchHandle {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    /// Signal the loop to stop and wait for it. A flush in progress is
    /// allowed to finish first.
    pub async fn stop(self) {
        let WatchHandle {
            local_root,
            stop,
            task,
            ..
        } = self;

        let _ = stop.send(());
        if let Err(e) = task.await {
            warn!("Watcher for {} ended abnormally: {}", local_root.display(), e);
        }
    }
}

/// Collect non-excluded directories and files under `root`, pruning
/// excluded subtrees without reading them.
fn scan_tree(root: &Path, matcher: &Arc<ExcludeMatcher>) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let prune = Arc::clone(matcher);
    let walker = WalkDir::new(root)
        .skip_hidden(false)
        .follow_links(false)
        .parallelism(Parallelism::Serial)
        .process_read_dir(move |_depth, _path, _state, children| {
            children.retain(|entry| match entry {
                Ok(entry) if entry.file_type().is_dir() => !prune.should_exclude_dir(&entry.path()),
                Ok(entry) => !prune.should_exclude(&entry.path()),
                Err(_) => true,
            });
        });

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => dirs.push(entry.path()),
            Ok(entry) if entry.file_type().is_file() => files.push(entry.path()),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry under {}: {}", root.display(), e),
        }
    }
    (dirs, files)
}

/// Run [`scan_tree`] on a blocking worker.
async fn scan_tree_blocking(
    root: PathBuf,
    matcher: Arc<ExcludeMatcher>,
) -> anyhow::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let scanned = tokio::task::spawn_blocking(move || scan_tree(&root, &matcher)).await?;
    Ok(scanned)
}

/// Copies batches of changed files to the remote workspace.
struct Flusher {
    local_root: PathBuf,
    remote_root: String,
    workload: Workload,
    executor: Arc<dyn RemoteExecutor>,
}

impl Flusher {
    async fn flush(&self, batch: Vec<PathBuf>) -> FlushReport {
        let mut report = FlushReport::default();

        for path in batch {
            if !path.is_file() {
                debug!("Skipping {}: no longer a regular file", path.display());
                continue;
            }
            let Ok(rel) = path.strip_prefix(&self.local_root) else {
                continue;
            };
            report.attempted += 1;

            let destination = remote_join(&self.remote_root, rel);
            if let Some(parent) = remote_parent(&destination) {
                if let Err(e) = make_dir(self.executor.as_ref(), &self.workload, parent).await {
                    warn!("{:#}", e);
                }
            }

            match copy_file(self.executor.as_ref(), &self.workload, &path, &destination).await {
                Ok(()) => {
                    debug!("Copied {} -> {}", rel.display(), destination);
                    report.copied += 1;
                }
                Err(e) => {
                    warn!("{:#}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}

struct EventLoop {
    flusher: Flusher,
    matcher: Arc<ExcludeMatcher>,
    source: Box<dyn ChangeSource>,
    pending: PendingChanges,
    debounce: Duration,
}

impl EventLoop {
    async fn run(
        mut self,
        mut events: EventStream,
        mut stop: oneshot::Receiver<()>,
        state: watch::Sender<SessionState>,
    ) {
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                _ = &mut stop => break,

                event = events.recv() => match event {
                    Some(Ok(change)) => {
                        if self.handle(change).await {
                            deadline = Some(Instant::now() + self.debounce);
                        }
                    }
                    Some(Err(e)) => warn!("Watch error under {}: {}", self.flusher.local_root.display(), e),
                    None => {
                        warn!("Change notifications for {} ended", self.flusher.local_root.display());
                        break;
                    }
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    let batch = self.pending.drain();
                    let report = self.flusher.flush(batch).await;
                    if report.attempted > 0 {
                        info!(
                            "Synced {}/{} changed files to {}",
                            report.copied, report.attempted, self.flusher.remote_root
                        );
                    }
                }
            }
        }

        drop(self.source);
        state.send_replace(SessionState::Stopped);
        debug!("Stopped watching {}", self.flusher.local_root.display());
    }

    /// Queue a change. Returns true when something new became pending.
    async fn handle(&mut self, change: ChangeEvent) -> bool {
        if !change.is_create_or_write() {
            return false;
        }

        let path = change.path;
        if path.is_dir() {
            if change.kind != ChangeKind::Created || self.matcher.should_exclude_dir(&path) {
                return false;
            }
            return self.watch_new_dir(path).await;
        }

        if self.matcher.should_exclude(&path) {
            debug!("Ignoring excluded change {}", path.display());
            return false;
        }
        self.pending.insert(path);
        true
    }

    /// Subscribe a directory created after the session started and queue
    /// the files already inside it.
    async fn watch_new_dir(&mut self, dir: PathBuf) -> bool {
        let (dirs, files) = match scan_tree_blocking(dir.clone(), Arc::clone(&self.matcher)).await {
            Ok(scanned) => scanned,
            Err(e) => {
                warn!("Failed to scan new directory {}: {}", dir.display(), e);
                return false;
            }
        };
        for sub in &dirs {
            if let Err(e) = self.source.subscribe(sub) {
                warn!("Failed to watch new directory {}: {}", sub.display(), e);
            }
        }

        let queued = !files.is_empty();
        for file in files {
            self.pending.insert(file);
        }
        queued
    }
}
