//! Streaming tar packing for transfers.
//!
//! The packer runs on a blocking worker and writes into a [`PipeWriter`],
//! whose chunks arrive on the async side as an [`InputStream`] ready to be
//! fed into a remote `tar -x`.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use jwalk::WalkDir;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::k8s::InputStream;
use crate::sync::exclude::ExcludeMatcher;

const CHUNK_SIZE: usize = 64 * 1024;
const PIPE_DEPTH: usize = 16;

/// Counters for one packed archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub files: usize,
    pub bytes: u64,
}

/// Blocking writer half of an in-memory pipe.
///
/// Writes fail with `BrokenPipe` once the reading side is dropped, which is
/// how a failed extractor stops the packer.
pub struct PipeWriter {
    tx: mpsc::Sender<Vec<u8>>,
    buf: Vec<u8>,
}

/// Create a pipe whose writer is used from blocking code.
pub fn pipe() -> (PipeWriter, InputStream) {
    let (tx, rx) = mpsc::channel(PIPE_DEPTH);
    (
        PipeWriter {
            tx,
            buf: Vec::with_capacity(CHUNK_SIZE),
        },
        rx,
    )
}

impl PipeWriter {
    fn send_chunk(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        self.tx
            .blocking_send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "receiving side closed the stream"))
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_chunk()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_chunk()
    }
}

/// Pack the tree under `root` into a gzip'd tar written to `writer`.
///
/// `exclude_args` are tar-style `--exclude=<pattern>` arguments. Excluded
/// directories are pruned during the walk and never read.
pub fn pack_tree<W: Write>(root: &Path, exclude_args: &[String], writer: W) -> Result<(TransferStats, W)> {
    let prune = Arc::new(ExcludeMatcher::from_exclude_args(root, exclude_args));

    let walker = WalkDir::new(root)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
        .process_read_dir(move |_depth, _path, _state, children| {
            children.retain(|entry| match entry {
                Ok(entry) if entry.file_type().is_dir() => !prune.should_exclude_dir(&entry.path()),
                Ok(entry) => !prune.should_exclude(&entry.path()),
                Err(_) => true,
            });
        });

    let mut archive = tar::Builder::new(GzEncoder::new(writer, Compression::fast()));
    archive.follow_symlinks(false);
    let mut stats = TransferStats::default();

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.depth == 0 {
            continue;
        }

        let path = entry.path();
        let rel = path.strip_prefix(root).with_context(|| {
            format!("{} is not under {}", path.display(), root.display())
        })?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            archive
                .append_dir(rel, &path)
                .with_context(|| format!("Failed to archive directory {}", path.display()))?;
        } else if file_type.is_file() {
            let mut file = match File::open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} vanished before it could be packed", path.display());
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to open {}", path.display()));
                }
            };
            stats.bytes += file.metadata().map(|m| m.len()).unwrap_or(0);
            archive
                .append_file(rel, &mut file)
                .with_context(|| format!("Failed to archive {}", path.display()))?;
            stats.files += 1;
        } else if file_type.is_symlink() {
            archive
                .append_path_with_name(&path, rel)
                .with_context(|| format!("Failed to archive link {}", path.display()))?;
        }
    }

    let encoder = archive.into_inner().context("Failed to finish archive")?;
    let mut writer = encoder.finish().context("Failed to finish compression")?;
    writer.flush().context("Failed to flush archive stream")?;

    Ok((stats, writer))
}

/// Wrap a single local file in an uncompressed one-entry tar named `name`.
pub fn single_file_archive(path: &Path, name: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    {
        let mut archive = tar::Builder::new(&mut data);
        let mut file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        archive
            .append_file(name, &mut file)
            .with_context(|| format!("Failed to archive {}", path.display()))?;
        archive.finish()?;
    }
    Ok(data)
}
