//! Exclude pattern matching for sync operations.
//!
//! Two independent sources decide whether a path participates in sync:
//! an ordered list of explicit glob patterns, and (optionally) the
//! `.gitignore` found at the sync root. Explicit patterns are always
//! checked first and win on their own.

use globset::{GlobBuilder, GlobMatcher};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Version-control metadata directory that bulk archives never carry,
/// whether or not the caller lists it.
pub const VCS_SAFETY_NET: &str = ".git";

/// Ignore file looked up at the sync root when `use_ignore_file` is set.
pub const IGNORE_FILE_NAME: &str = ".gitignore";

/// Default patterns applied when the configuration does not list any.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    // Version control
    ".git/",
    ".svn/",
    ".hg/",

    // OS-specific
    ".DS_Store",
    "Thumbs.db",
    "*.swp",
    "*.swo",
    "*~",

    // Build artifacts
    "node_modules/",
    "target/",
    "__pycache__/",
    "*.pyc",
];

/// Exclusion settings for one sync root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionConfig {
    /// Root that relative paths are computed against.
    pub base_path: PathBuf,
    /// Explicit patterns, in declaration order.
    pub patterns: Vec<String>,
    /// Whether to honour `.gitignore` at `base_path`.
    pub use_ignore_file: bool,
}

impl ExclusionConfig {
    pub fn new(base_path: impl Into<PathBuf>, patterns: Vec<String>, use_ignore_file: bool) -> Self {
        Self {
            base_path: base_path.into(),
            patterns,
            use_ignore_file,
        }
    }

    /// The built-in default patterns with ignore-file matching enabled.
    pub fn with_defaults(base_path: impl Into<PathBuf>) -> Self {
        Self::new(
            base_path,
            DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect(),
            true,
        )
    }

    /// Same settings, re-rooted at another directory.
    pub fn rebased(&self, base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..self.clone()
        }
    }
}

/// Per-unit exclusion settings where each field may be left unset and
/// inherited from the defaults independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionOverrides {
    pub patterns: Option<Vec<String>>,
    pub use_ignore_file: Option<bool>,
}

impl ExclusionOverrides {
    /// Resolve against `defaults`, rooted at `base_path`.
    pub fn resolve(&self, base_path: &Path, defaults: &ExclusionConfig) -> ExclusionConfig {
        ExclusionConfig {
            base_path: base_path.to_path_buf(),
            patterns: self
                .patterns
                .clone()
                .unwrap_or_else(|| defaults.patterns.clone()),
            use_ignore_file: self.use_ignore_file.unwrap_or(defaults.use_ignore_file),
        }
    }
}

#[derive(Debug, Clone)]
enum PatternKind {
    /// Trailing-slash pattern, matched literally as a path segment.
    Directory(String),
    /// Shell glob; `None` when the pattern failed to compile and can never match.
    Glob(Option<GlobMatcher>),
}

#[derive(Debug, Clone)]
struct ExplicitPattern {
    kind: PatternKind,
}

impl ExplicitPattern {
    fn compile(raw: &str) -> Self {
        if let Some(dir) = raw.strip_suffix('/') {
            return Self {
                kind: PatternKind::Directory(dir.to_string()),
            };
        }

        // Recursive wildcards are simplified to a single-segment wildcard.
        let collapsed = raw.replace("**", "*");
        let matcher = match GlobBuilder::new(&collapsed).literal_separator(true).build() {
            Ok(glob) => Some(glob.compile_matcher()),
            Err(e) => {
                warn!("Ignoring invalid exclude pattern '{}': {}", raw, e);
                None
            }
        };

        Self {
            kind: PatternKind::Glob(matcher),
        }
    }

    fn matches(&self, rel: &str) -> bool {
        match &self.kind {
            PatternKind::Directory(dir) => {
                rel == dir
                    || rel.starts_with(&format!("{}/", dir))
                    || rel.contains(&format!("/{}/", dir))
                    || rel.ends_with(&format!("/{}", dir))
            }
            PatternKind::Glob(None) => false,
            PatternKind::Glob(Some(glob)) => {
                glob.is_match(rel) || rel.split('/').any(|component| glob.is_match(component))
            }
        }
    }
}

/// Compiled membership test over paths below one sync root.
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    base_path: PathBuf,
    patterns: Vec<ExplicitPattern>,
    ignore_file: Option<Gitignore>,
    archive_patterns: Vec<String>,
}

impl ExcludeMatcher {
    /// Build a matcher. A missing or unparseable ignore file is not an
    /// error; the matcher simply has no ignore-file rules.
    pub fn new(config: &ExclusionConfig) -> Self {
        let ignore_file = if config.use_ignore_file {
            load_ignore_file(&config.base_path)
        } else {
            None
        };

        Self::build(&config.base_path, &config.patterns, ignore_file)
    }

    /// Build an explicit-only matcher from tar-style `--exclude=<pattern>`
    /// arguments, as produced by [`ExcludeMatcher::archive_exclude_args`].
    pub fn from_exclude_args(base_path: &Path, args: &[String]) -> Self {
        let patterns: Vec<String> = args
            .iter()
            .map(|arg| arg.strip_prefix("--exclude=").unwrap_or(arg).to_string())
            .collect();
        Self::build(base_path, &patterns, None)
    }

    fn build(base_path: &Path, patterns: &[String], ignore_file: Option<Gitignore>) -> Self {
        let mut archive_patterns = patterns.to_vec();
        let has_safety_net = patterns
            .iter()
            .any(|p| p.trim_end_matches('/') == VCS_SAFETY_NET);
        if !has_safety_net {
            archive_patterns.push(VCS_SAFETY_NET.to_string());
        }

        Self {
            base_path: base_path.to_path_buf(),
            patterns: patterns.iter().map(|p| ExplicitPattern::compile(p)).collect(),
            ignore_file,
            archive_patterns,
        }
    }

    /// Whether an ignore file was found and parsed.
    pub fn has_ignore_file(&self) -> bool {
        self.ignore_file.is_some()
    }

    /// Check if an absolute path should be left out of sync.
    ///
    /// Paths outside the root (and the root itself) are never excluded.
    pub fn should_exclude(&self, path: &Path) -> bool {
        self.check(path, false)
    }

    /// Same rule as [`should_exclude`](Self::should_exclude), for directory
    /// walkers pruning whole subtrees. Directory-only ignore-file rules apply.
    pub fn should_exclude_dir(&self, path: &Path) -> bool {
        self.check(path, true)
    }

    fn check(&self, path: &Path, is_dir: bool) -> bool {
        let Some(rel) = self.relative(path) else {
            return false;
        };
        if rel.is_empty() {
            return false;
        }

        if self.patterns.iter().any(|p| p.matches(&rel)) {
            return true;
        }

        match &self.ignore_file {
            Some(gitignore) => gitignore
                .matched_path_or_any_parents(Path::new(&rel), is_dir)
                .is_ignore(),
            None => false,
        }
    }

    /// Relative path with `/` separators, or `None` outside the root.
    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.base_path).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(parts.join("/"))
    }

    /// Exclusion arguments for the bulk archive packer: one per explicit
    /// pattern plus the [`VCS_SAFETY_NET`] entry unless already listed.
    ///
    /// Ignore-file rules are deliberately not part of this list.
    pub fn archive_exclude_args(&self) -> Vec<String> {
        self.archive_patterns
            .iter()
            .map(|p| format!("--exclude={}", p))
            .collect()
    }
}

fn load_ignore_file(base_path: &Path) -> Option<Gitignore> {
    let path = base_path.join(IGNORE_FILE_NAME);
    if !path.is_file() {
        return None;
    }

    let mut builder = GitignoreBuilder::new(base_path);
    if let Some(e) = builder.add(&path) {
        warn!("Failed to parse {}: {}", path.display(), e);
        return None;
    }

    match builder.build() {
        Ok(gitignore) => {
            debug!("Loaded ignore rules from {}", path.display());
            Some(gitignore)
        }
        Err(e) => {
            warn!("Failed to build ignore rules from {}: {}", path.display(), e);
            None
        }
    }
}
