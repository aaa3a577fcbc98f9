//! Single-file copy with size-selected strategies
//!
//! Files at or above the configured threshold are memory-mapped and written
//! out in one call; everything else goes through a fixed 8 KiB buffer. Both
//! strategies sit behind [`CopyStrategy`] so callers and tests can swap them.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::preservation::AttributePreserver;
use crate::scanner::FileEntry;

/// Buffer size used by [`BufferedCopy`]
pub const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// Which strategy moved the bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyMethod {
    Buffered,
    Mapped,
}

impl fmt::Display for CopyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyMethod::Buffered => f.write_str("buffered"),
            CopyMethod::Mapped => f.write_str("mmap"),
        }
    }
}

/// Moves the contents of an open source file into an open destination file.
///
/// Implementations run on the blocking pool and must not touch timestamps or
/// permissions; the [`Copier`] applies those afterwards.
pub trait CopyStrategy: Send + Sync + fmt::Debug {
    fn method(&self) -> CopyMethod;

    fn transfer(
        &self,
        source: &mut File,
        source_path: &Path,
        destination: &mut File,
        destination_path: &Path,
    ) -> Result<u64>;
}

/// Read/write loop through a fixed-size buffer
#[derive(Debug, Clone)]
pub struct BufferedCopy {
    buffer_size: usize,
}

impl BufferedCopy {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }
}

impl Default for BufferedCopy {
    fn default() -> Self {
        Self::new(COPY_BUFFER_SIZE)
    }
}

impl CopyStrategy for BufferedCopy {
    fn method(&self) -> CopyMethod {
        CopyMethod::Buffered
    }

    fn transfer(
        &self,
        source: &mut File,
        source_path: &Path,
        destination: &mut File,
        destination_path: &Path,
    ) -> Result<u64> {
        let mut buffer = vec![0u8; self.buffer_size];
        let mut total = 0u64;

        loop {
            let read = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(SyncError::Transfer {
                        path: source_path.to_path_buf(),
                        source: e,
                    })
                }
            };

            destination
                .write_all(&buffer[..read])
                .map_err(|e| SyncError::Transfer {
                    path: destination_path.to_path_buf(),
                    source: e,
                })?;
            total += read as u64;
        }

        Ok(total)
    }
}

/// Maps the whole source read-only and writes the mapping in one call
#[derive(Debug, Clone, Default)]
pub struct MappedCopy;

impl CopyStrategy for MappedCopy {
    fn method(&self) -> CopyMethod {
        CopyMethod::Mapped
    }

    fn transfer(
        &self,
        source: &mut File,
        source_path: &Path,
        destination: &mut File,
        destination_path: &Path,
    ) -> Result<u64> {
        let len = source
            .metadata()
            .map_err(|e| SyncError::Map {
                path: source_path.to_path_buf(),
                source: e,
            })?
            .len();

        // Zero-length mappings are rejected by mmap(2).
        if len == 0 {
            return Ok(0);
        }

        // SAFETY: the mapping is read-only and dropped before this function
        // returns. A concurrent truncation of the source by another process
        // is outside what the mirror can guard against, same as any reader.
        let map = unsafe { Mmap::map(&*source) }.map_err(|e| SyncError::Map {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        destination
            .write_all(&map)
            .map_err(|e| SyncError::Transfer {
                path: destination_path.to_path_buf(),
                source: e,
            })?;

        Ok(map.len() as u64)
    }
}

/// Result of one successful file copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOutcome {
    pub method: CopyMethod,
    pub bytes: u64,
}

/// Copies one file and its timestamps, picking a strategy by size
#[derive(Debug, Clone)]
pub struct Copier {
    size_threshold: u64,
    buffered: Arc<dyn CopyStrategy>,
    mapped: Arc<dyn CopyStrategy>,
    preserver: AttributePreserver,
}

impl Copier {
    /// Create a copier with the stock strategies.
    ///
    /// A threshold of 0 disables the mapped strategy.
    pub fn new(size_threshold: u64) -> Self {
        Self::with_strategies(
            size_threshold,
            Arc::new(BufferedCopy::default()),
            Arc::new(MappedCopy),
        )
    }

    /// Create a copier with caller-supplied strategies
    pub fn with_strategies(
        size_threshold: u64,
        buffered: Arc<dyn CopyStrategy>,
        mapped: Arc<dyn CopyStrategy>,
    ) -> Self {
        Self {
            size_threshold,
            buffered,
            mapped,
            preserver: AttributePreserver::default(),
        }
    }

    /// Strategy for a file of `size` bytes
    pub fn select(&self, size: u64) -> &dyn CopyStrategy {
        if self.size_threshold > 0 && size >= self.size_threshold {
            self.mapped.as_ref()
        } else {
            self.buffered.as_ref()
        }
    }

    /// Copy `source` to `destination` on the calling thread.
    ///
    /// The destination is created or truncated. When the transfer itself
    /// fails the partial destination is removed so the next cycle sees it as
    /// missing instead of as an up-to-date file.
    pub fn copy(&self, source: &FileEntry, destination: &Path) -> Result<CopyOutcome> {
        info!(
            source = %source.path.display(),
            destination = %destination.display(),
            size = source.size,
            "Copying {} -> {}",
            source.path.display(),
            destination.display()
        );

        let mut input = File::open(&source.path).map_err(|e| SyncError::OpenSource {
            path: source.path.clone(),
            source: e,
        })?;

        let mut output = open_or_replace_destination(destination, source.permissions)
            .map_err(|e| SyncError::OpenDestination {
                path: destination.to_path_buf(),
                source: e,
            })?;

        let strategy = self.select(source.size);
        let bytes = match strategy.transfer(&mut input, &source.path, &mut output, destination) {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(output);
                if let Err(remove_err) = std::fs::remove_file(destination) {
                    warn!(
                        path = %destination.display(),
                        error = %remove_err,
                        "Failed to remove partial copy"
                    );
                }
                return Err(e);
            }
        };

        drop(output);
        drop(input);

        self.preserver.apply(destination, source)?;

        Ok(CopyOutcome {
            method: strategy.method(),
            bytes,
        })
    }

    /// Run [`Copier::copy`] on the blocking pool and wait for it
    pub async fn copy_async(&self, source: FileEntry, destination: PathBuf) -> Result<CopyOutcome> {
        let copier = self.clone();
        let path = destination.clone();

        tokio::task::spawn_blocking(move || copier.copy(&source, &destination))
            .await
            .map_err(|e| SyncError::TaskJoin {
                path,
                message: e.to_string(),
            })?
    }
}

/// Open the destination for writing. A read-only regular file left by an
/// earlier copy of a read-only source cannot be truncated, so it is unlinked
/// and created afresh.
fn open_or_replace_destination(path: &Path, permissions: u32) -> io::Result<File> {
    match open_destination(path, permissions) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            let is_file = std::fs::symlink_metadata(path)
                .map(|metadata| metadata.is_file())
                .unwrap_or(false);
            if !is_file {
                return Err(e);
            }

            debug!(path = %path.display(), "Replacing read-only destination");
            std::fs::remove_file(path)?;
            open_destination(path, permissions)
        }
        other => other,
    }
}

#[cfg(unix)]
fn open_destination(path: &Path, permissions: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(permissions & 0o777)
        .open(path)
}

#[cfg(not(unix))]
fn open_destination(path: &Path, _permissions: u32) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
