//! Application configuration
//!
//! Loaded from `~/.config/podsync/config.toml` (or `PODSYNC_CONFIG`, or an
//! explicit `--config` path). A missing file means defaults. Command-line
//! flags are applied on top by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::exclude::{ExclusionConfig, ExclusionOverrides, DEFAULT_EXCLUDES};
use crate::sync::expand::SyncUnit;
use crate::sync::paths::{expand_home, DEFAULT_WORKSPACE_ROOT};
use crate::sync::watcher::{WatchOptions, DEFAULT_DEBOUNCE};

const ENV_CONFIG: &str = "PODSYNC_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Namespace of the target pod; falls back to the kubeconfig context.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Container inside the pod; `None` uses the pod's default container.
    #[serde(default)]
    pub container: Option<String>,

    /// Remote directory the local root is mirrored into.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,

    /// Quiet period before a batch of changes is flushed.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_excludes")]
    pub exclude: Vec<String>,

    #[serde(default = "default_true")]
    pub use_gitignore: bool,

    /// Extra directories synced alongside the workspace.
    #[serde(default)]
    pub custom_dirs: Vec<CustomDir>,
}

/// A `[[custom_dirs]]` declaration. Unset exclusion fields inherit the
/// top-level values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomDir {
    pub source: PathBuf,
    pub destination: String,
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
    #[serde(default)]
    pub use_gitignore: Option<bool>,
    #[serde(default)]
    pub recursive: bool,
}

fn default_workspace_root() -> String {
    DEFAULT_WORKSPACE_ROOT.to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_excludes() -> Vec<String> {
    DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect()
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: None,
            container: None,
            workspace_root: default_workspace_root(),
            debounce_ms: default_debounce_ms(),
            exclude: default_excludes(),
            use_gitignore: true,
            custom_dirs: Vec::new(),
        }
    }
}

impl Settings {
    /// Load from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_path(&Self::config_file_path()),
        }
    }

    /// Load from a specific file. If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::load_from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        toml::from_str(toml_content).context("Failed to parse config TOML")
    }

    /// Can be overridden with the PODSYNC_CONFIG environment variable.
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podsync")
            .join("config.toml")
    }

    /// Top-level exclusion settings rooted at `base_path`.
    pub fn exclusion(&self, base_path: &Path) -> ExclusionConfig {
        ExclusionConfig::new(base_path, self.exclude.clone(), self.use_gitignore)
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    pub fn custom_units(&self) -> Vec<SyncUnit> {
        self.custom_dirs.iter().map(CustomDir::to_unit).collect()
    }
}

impl CustomDir {
    pub fn to_unit(&self) -> SyncUnit {
        SyncUnit::new(expand_home(&self.source), self.destination.clone())
            .recursive(self.recursive)
            .with_exclusion(ExclusionOverrides {
                patterns: self.exclude.clone(),
                use_ignore_file: self.use_gitignore,
            })
    }
}
