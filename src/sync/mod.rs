//! Local-to-remote sync engine
//!
//! One-shot transfers go through [`BulkTransport`]; standing sessions are
//! owned by the [`SyncSessionRegistry`], which runs an initial bulk transfer
//! and then keeps an [`IncrementalWatcher`] session alive.

pub mod archive;
pub mod bulk;
pub mod error;
pub mod exclude;
pub mod expand;
pub mod paths;
pub mod registry;
pub mod remote;
pub mod source;
pub mod watcher;

pub use archive::TransferStats;
pub use bulk::BulkTransport;
pub use error::{SyncError, SyncResult};
pub use exclude::{ExcludeMatcher, ExclusionConfig, ExclusionOverrides, DEFAULT_EXCLUDES};
pub use expand::{expand, expand_unit, SyncUnit};
pub use paths::DEFAULT_WORKSPACE_ROOT;
pub use registry::{CustomSyncReport, SessionInfo, SessionRequest, SyncSessionRegistry};
pub use source::{ChangeEvent, ChangeKind, ChangeSource, ChangeSourceFactory, EventStream, NotifySourceFactory};
pub use watcher::{FlushReport, IncrementalWatcher, SessionState, WatchHandle, WatchOptions};
