//! Directory listing and entry classification using tokio::fs
//!
//! Every lookup here uses the non-dereferencing stat: a symlink is classified
//! as a symlink, never as the thing it points at.

use std::cmp::Ordering;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Kind of a filesystem entry as far as mirroring is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symlink, socket, fifo or device
    Other,
}

/// File entry with metadata, derived on demand and never cached across cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute path to the entry
    pub path: PathBuf,
    /// Path relative to the root the walk started from
    pub relative_path: PathBuf,
    /// Entry kind
    pub kind: FileKind,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
    /// Last access time
    pub accessed: SystemTime,
    /// Low 9 permission bits
    pub permissions: u32,
}

impl FileEntry {
    /// Build an entry from already-fetched `lstat` metadata
    pub fn from_metadata(path: PathBuf, relative_path: PathBuf, metadata: &Metadata) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_file() {
            FileKind::Regular
        } else if file_type.is_dir() {
            FileKind::Directory
        } else {
            FileKind::Other
        };

        Self {
            path,
            relative_path,
            kind,
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            accessed: metadata.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
            permissions: get_permissions(metadata),
        }
    }

    pub fn is_regular(&self) -> bool {
        self.kind == FileKind::Regular
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// True when this entry's modification time is strictly newer than `other`'s
    pub fn is_newer_than(&self, other: &FileEntry) -> bool {
        self.modified.cmp(&other.modified) == Ordering::Greater
    }
}

/// Entries of one directory plus the number of children that could not be stat'd
#[derive(Debug, Default)]
pub struct DirectoryListing {
    pub entries: Vec<FileEntry>,
    pub skipped: usize,
}

/// List the immediate children of `dir`, sorted by name.
///
/// `relative_dir` is the position of `dir` under its walk root and is used to
/// fill in each entry's `relative_path`. Children whose metadata cannot be
/// read are left out and counted in [`DirectoryListing::skipped`].
pub async fn list_directory(dir: &Path, relative_dir: &Path) -> Result<DirectoryListing> {
    let mut read_dir = fs::read_dir(dir)
        .await
        .map_err(|e| SyncError::scan_error(dir, e))?;

    let mut listing = DirectoryListing::default();

    loop {
        let dir_entry = match read_dir.next_entry().await {
            Ok(Some(dir_entry)) => dir_entry,
            Ok(None) => break,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Directory listing ended early");
                listing.skipped += 1;
                break;
            }
        };

        let path = dir_entry.path();
        match fs::symlink_metadata(&path).await {
            Ok(metadata) => {
                let relative_path = relative_dir.join(dir_entry.file_name());
                listing
                    .entries
                    .push(FileEntry::from_metadata(path, relative_path, &metadata));
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping entry that cannot be stat'd");
                listing.skipped += 1;
            }
        }
    }

    listing
        .entries
        .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok(listing)
}

/// `lstat` a single path.
///
/// Returns `Ok(None)` only when the path does not exist; any other failure is
/// returned so callers never mistake "unreadable" for "absent".
pub async fn stat_entry(path: &Path, relative_path: &Path) -> io::Result<Option<FileEntry>> {
    match fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(Some(FileEntry::from_metadata(
            path.to_path_buf(),
            relative_path.to_path_buf(),
            &metadata,
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Get the low 9 permission bits in a cross-platform way
#[cfg(unix)]
pub fn get_permissions(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(windows)]
pub fn get_permissions(metadata: &Metadata) -> u32 {
    // Windows doesn't have Unix-style permissions
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::fs;

    #[tokio::test]
    async fn test_list_directory_classifies_entries() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("b.txt"), b"content").await.unwrap();
        fs::create_dir(root.join("a_dir")).await.unwrap();
        fs::write(root.join("a_dir").join("nested.txt"), b"nested").await.unwrap();

        let listing = list_directory(root, Path::new("")).await.unwrap();

        assert_eq!(listing.skipped, 0);
        assert_eq!(listing.entries.len(), 2);
        assert_eq!(listing.entries[0].relative_path, PathBuf::from("a_dir"));
        assert!(listing.entries[0].is_dir());
        assert_eq!(listing.entries[1].relative_path, PathBuf::from("b.txt"));
        assert!(listing.entries[1].is_regular());
        assert_eq!(listing.entries[1].size, 7);
    }

    #[tokio::test]
    async fn test_relative_paths_follow_relative_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("leaf.txt"), b"x").await.unwrap();

        let listing = list_directory(temp_dir.path(), Path::new("outer/inner"))
            .await
            .unwrap();

        assert_eq!(
            listing.entries[0].relative_path,
            PathBuf::from("outer/inner/leaf.txt")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_is_not_dereferenced() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir(root.join("target")).await.unwrap();
        std::os::unix::fs::symlink(root.join("target"), root.join("link")).unwrap();

        let entry = stat_entry(&root.join("link"), Path::new("link"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(entry.kind, FileKind::Other);
    }

    #[tokio::test]
    async fn test_stat_entry_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let entry = stat_entry(&missing, Path::new("missing")).await.unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_list_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = list_directory(&temp_dir.path().join("nope"), Path::new("")).await;

        assert!(matches!(result, Err(SyncError::DirectoryScan { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permissions_are_masked_to_nine_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("script.sh");
        fs::write(&path, b"#!/bin/sh").await.unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o4755)).unwrap();

        let entry = stat_entry(&path, Path::new("script.sh")).await.unwrap().unwrap();
        assert_eq!(entry.permissions, 0o755);
    }
}
