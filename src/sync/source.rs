//! File-change event sources.
//!
//! The watcher consumes an unbounded stream of [`ChangeEvent`]s from a
//! [`ChangeSource`]. Each session opens its own source; dropping the source
//! ends the subscription.

use anyhow::Result;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Type of file system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File or directory appeared (including the target of a rename).
    Created,
    /// File contents changed.
    Written,
    /// File or directory went away (including the source of a rename).
    Removed,
    /// Metadata, access and anything else.
    Other,
}

/// A single change to a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Flatten a notify event into one change per affected path.
    pub fn from_notify(event: Event) -> Vec<Self> {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                ChangeKind::Written
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                // paths are [from, to]; only the destination carries content
                return event
                    .paths
                    .last()
                    .map(|to| vec![Self::new(ChangeKind::Created, to.clone())])
                    .unwrap_or_default();
            }
            EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_) => ChangeKind::Removed,
            _ => ChangeKind::Other,
        };

        event
            .paths
            .into_iter()
            .map(|path| Self::new(kind, path))
            .collect()
    }

    /// Whether this change can carry new file content to sync.
    pub fn is_create_or_write(&self) -> bool {
        matches!(self.kind, ChangeKind::Created | ChangeKind::Written)
    }
}

/// Receiving half of a change source. Errors are per-event and non-fatal.
pub type EventStream = mpsc::UnboundedReceiver<Result<ChangeEvent>>;

/// A live subscription that can be extended one directory at a time.
pub trait ChangeSource: Send {
    /// Observe direct children of `dir` (not its subdirectories).
    fn subscribe(&mut self, dir: &Path) -> Result<()>;
}

/// Opens fresh, independent change sources.
pub trait ChangeSourceFactory: Send + Sync {
    fn open(&self) -> Result<(Box<dyn ChangeSource>, EventStream)>;
}

/// Change source backed by the platform's native watcher.
pub struct NotifySource {
    watcher: RecommendedWatcher,
}

impl ChangeSource for NotifySource {
    fn subscribe(&mut self, dir: &Path) -> Result<()> {
        self.watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotifySourceFactory;

impl ChangeSourceFactory for NotifySourceFactory {
    fn open(&self) -> Result<(Box<dyn ChangeSource>, EventStream)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in ChangeEvent::from_notify(event) {
                    let _ = tx.send(Ok(change));
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e.into()));
            }
        })?;

        Ok((Box::new(NotifySource { watcher }), rx))
    }
}
