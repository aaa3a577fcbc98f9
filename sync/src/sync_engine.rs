//! Main sync engine: root validation, the source-side walk and the cycle driver

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, error, info, info_span, Instrument};

use crate::copier::Copier;
use crate::error::{Result, SyncError};
use crate::metrics::SyncMetrics;
use crate::preservation::AttributePreserver;
use crate::purge::remove_entry;
use crate::scanner::{list_directory, stat_entry, FileEntry, FileKind};

/// Options for mirror cycles, fixed for the life of the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Descend into subdirectories (create, sync and purge them)
    pub recursive: bool,
    /// Files at or above this many bytes use the mapped copy; 0 disables it
    pub size_threshold: u64,
}

/// Canonical source and destination roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPair {
    source: PathBuf,
    destination: PathBuf,
}

impl RootPair {
    /// Resolve both roots to absolute, symlink-free paths and check that they
    /// are distinct, non-nested directories.
    pub fn new(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<Self> {
        let source = canonical_directory(source.as_ref())?;
        let destination = canonical_directory(destination.as_ref())?;

        if source.starts_with(&destination) || destination.starts_with(&source) {
            return Err(SyncError::invalid_root(
                &destination,
                format!("overlaps with source '{}'", source.display()),
            ));
        }

        Ok(Self {
            source,
            destination,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

fn canonical_directory(path: &Path) -> Result<PathBuf> {
    let resolved = std::fs::canonicalize(path)
        .map_err(|e| SyncError::invalid_root(path, e.to_string()))?;

    if !resolved.is_dir() {
        return Err(SyncError::invalid_root(path, "not a directory"));
    }

    Ok(resolved)
}

/// Mirror engine
#[derive(Debug, Clone)]
pub struct SyncEngine {
    pub(crate) options: SyncOptions,
    pub(crate) copier: Copier,
    pub(crate) preserver: AttributePreserver,
}

impl SyncEngine {
    /// Create a new sync engine with options
    pub fn new(options: SyncOptions) -> Self {
        Self::with_copier(options, Copier::new(options.size_threshold))
    }

    /// Create an engine around a caller-built copier
    pub fn with_copier(options: SyncOptions, copier: Copier) -> Self {
        Self {
            options,
            copier,
            preserver: AttributePreserver::default(),
        }
    }

    /// Run one cycle: sync the source into the destination, then purge
    /// destination entries the source no longer has.
    pub async fn run_cycle(&self, roots: &RootPair) -> SyncMetrics {
        let mut metrics = SyncMetrics::new();
        let span = info_span!("cycle", cycle_id = %metrics.cycle_id);

        async {
            self.sync_tree(roots.source(), roots.destination(), &mut metrics)
                .await;
            self.purge_tree(roots.source(), roots.destination(), &mut metrics)
                .await;
        }
        .instrument(span)
        .await;

        metrics.complete();
        metrics
    }

    /// Walk `source_root` and bring `dest_root` up to date with it.
    ///
    /// Directories are visited depth-first from an explicit stack. Failures
    /// are logged and counted; they never stop the walk.
    pub async fn sync_tree(&self, source_root: &Path, dest_root: &Path, metrics: &mut SyncMetrics) {
        let mut pending = vec![PathBuf::new()];

        while let Some(relative_dir) = pending.pop() {
            let source_dir = source_root.join(&relative_dir);
            let listing = match list_directory(&source_dir, &relative_dir).await {
                Ok(listing) => listing,
                Err(e) => {
                    error!(error = %e, "Failed to list source directory");
                    metrics.record_failure();
                    continue;
                }
            };

            if listing.skipped > 0 {
                debug!(
                    dir = %source_dir.display(),
                    skipped = listing.skipped,
                    "Skipped source entries that could not be stat'd"
                );
            }
            metrics.record_skipped(listing.skipped);

            let mut subdirectories = Vec::new();
            for entry in listing.entries {
                let dest_path = dest_root.join(&entry.relative_path);

                match entry.kind {
                    FileKind::Regular => self.sync_file(entry, dest_path, metrics).await,
                    FileKind::Directory if self.options.recursive => {
                        if self.ensure_directory(&entry, &dest_path, metrics).await {
                            subdirectories.push(entry.relative_path);
                        }
                    }
                    FileKind::Directory => {}
                    FileKind::Other => {
                        debug!(path = %entry.path.display(), "Not mirroring special file");
                    }
                }
            }

            // Reverse so the stack pops siblings in name order.
            pending.extend(subdirectories.into_iter().rev());
        }
    }

    /// Copy one regular file if the destination is missing or older
    async fn sync_file(&self, source: FileEntry, dest_path: PathBuf, metrics: &mut SyncMetrics) {
        let existing = match stat_entry(&dest_path, &source.relative_path).await {
            Ok(existing) => existing,
            Err(e) => {
                debug!(path = %dest_path.display(), error = %e, "Skipping file whose destination cannot be stat'd");
                metrics.record_skipped(1);
                return;
            }
        };

        match existing {
            Some(dest) if dest.is_regular() => {
                if !source.is_newer_than(&dest) {
                    return;
                }
            }
            Some(dest) => {
                // A directory or symlink sits where the file belongs.
                if let Err(e) = remove_entry(&dest, metrics).await {
                    error!(error = %e, "Failed to replace destination entry");
                    metrics.record_failure();
                    return;
                }
            }
            None => {}
        }

        match self.copier.copy_async(source, dest_path).await {
            Ok(outcome) => metrics.record_copy(outcome),
            Err(e) => {
                error!(error = %e, "Copy failed");
                metrics.record_failure();
            }
        }
    }

    /// Make sure a directory exists at `dest_path`, creating it with the
    /// source's permission bits when absent. Returns whether it is safe to
    /// descend into.
    async fn ensure_directory(
        &self,
        source: &FileEntry,
        dest_path: &Path,
        metrics: &mut SyncMetrics,
    ) -> bool {
        match stat_entry(dest_path, &source.relative_path).await {
            Ok(Some(dest)) if dest.is_dir() => return true,
            Ok(Some(dest)) => {
                if let Err(e) = remove_entry(&dest, metrics).await {
                    error!(error = %e, "Failed to replace destination entry");
                    metrics.record_failure();
                    return false;
                }
            }
            Ok(None) => {}
            Err(e) => {
                debug!(path = %dest_path.display(), error = %e, "Skipping directory whose destination cannot be stat'd");
                metrics.record_skipped(1);
                return false;
            }
        }

        match self.create_directory(source, dest_path).await {
            Ok(()) => {
                info!(path = %dest_path.display(), "Created directory {}", dest_path.display());
                metrics.record_directory_created();
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to create directory");
                metrics.record_failure();
                false
            }
        }
    }

    async fn create_directory(&self, source: &FileEntry, dest_path: &Path) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(source.permissions);

        builder
            .create(dest_path)
            .await
            .map_err(|e| SyncError::create_dir_error(dest_path, e))?;

        // The process umask may have masked bits off.
        self.preserver.apply_directory(dest_path, source).await
    }
}
