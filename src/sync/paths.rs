// Path helpers shared by the transport, watcher and expander.
// Local paths use the platform separator; remote paths are always POSIX.

use std::path::{Component, Path, PathBuf};

use crate::sync::error::{SyncError, SyncResult};

/// Default remote directory a session's local root is mirrored into.
pub const DEFAULT_WORKSPACE_ROOT: &str = "/workspace";

/// Resolve a local sync root to an absolute, canonical directory.
pub fn resolve_local_root(path: &Path) -> SyncResult<PathBuf> {
    let expanded = expand_home(path);
    let canonical = expanded
        .canonicalize()
        .map_err(|e| SyncError::from_io(e, expanded.clone()))?;

    if !canonical.is_dir() {
        return Err(SyncError::NotADirectory { path: canonical });
    }
    Ok(canonical)
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Join a remote directory with a local relative path.
pub fn remote_join(base: &str, rel: &Path) -> String {
    let mut joined = base.trim_end_matches('/').to_string();
    for component in rel.components() {
        if let Component::Normal(name) = component {
            joined.push('/');
            joined.push_str(&name.to_string_lossy());
        }
    }
    if joined.is_empty() {
        joined.push('/');
    }
    joined
}

/// Parent directory of a remote path, `None` for the filesystem root.
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        return if trimmed.len() > 1 { Some("/") } else { None };
    }
    Some(&trimmed[..idx])
}

/// Final component of a remote path.
pub fn remote_file_name(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}
