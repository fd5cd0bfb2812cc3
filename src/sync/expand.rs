//! Expansion of declared custom sync directories into transferable units.
//!
//! A recursive unit fans out into one unit per immediate, non-excluded
//! child directory. Files directly under a recursive source are not
//! carried by any expanded unit.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::sync::error::{SyncError, SyncResult};
use crate::sync::exclude::{ExcludeMatcher, ExclusionConfig, ExclusionOverrides};
use crate::sync::paths::{remote_join, resolve_local_root};

/// One declared (or expanded) local-to-remote directory mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncUnit {
    pub source: PathBuf,
    pub destination: String,
    pub exclusion: ExclusionOverrides,
    pub recursive: bool,
}

impl SyncUnit {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            exclusion: ExclusionOverrides::default(),
            recursive: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_exclusion(mut self, exclusion: ExclusionOverrides) -> Self {
        self.exclusion = exclusion;
        self
    }
}

/// Expand every unit in declaration order. Stops at the first unit whose
/// source cannot be resolved.
pub fn expand(units: &[SyncUnit], defaults: &ExclusionConfig) -> SyncResult<Vec<SyncUnit>> {
    let mut expanded = Vec::with_capacity(units.len());
    for unit in units {
        expanded.extend(expand_unit(unit, defaults)?);
    }
    Ok(expanded)
}

/// Expand a single unit. Non-recursive units pass through unchanged.
pub fn expand_unit(unit: &SyncUnit, defaults: &ExclusionConfig) -> SyncResult<Vec<SyncUnit>> {
    if !unit.recursive {
        return Ok(vec![unit.clone()]);
    }

    let source = resolve_local_root(&unit.source)?;
    let matcher = ExcludeMatcher::new(&unit.exclusion.resolve(&source, defaults));

    let entries = std::fs::read_dir(&source).map_err(|e| SyncError::from_io(e, source.clone()))?;

    let mut children = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SyncError::from_io(e, source.clone()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if matcher.should_exclude_dir(&path) {
            debug!("Skipping excluded directory {}", path.display());
            continue;
        }
        children.push((entry.file_name(), path));
    }
    children.sort_by(|a, b| a.0.cmp(&b.0));

    info!(
        "Expanded {} into {} directories under {}",
        source.display(),
        children.len(),
        unit.destination
    );

    Ok(children
        .into_iter()
        .map(|(name, path)| SyncUnit {
            source: path,
            destination: remote_join(&unit.destination, Path::new(&name)),
            exclusion: unit.exclusion.clone(),
            recursive: false,
        })
        .collect())
}
