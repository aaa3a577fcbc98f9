//! File attribute and permission preservation functionality

use std::path::Path;
use std::time::SystemTime;
use filetime::FileTime;
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::scanner::FileEntry;

/// Copies permission bits and timestamps from a source entry onto its mirror
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributePreserver;

impl AttributePreserver {
    /// Apply the recorded attributes of `source` to the file at `path`.
    ///
    /// Blocking; runs inside the copy task. Times are set even when the
    /// permission change fails, and that failure is returned afterwards.
    pub fn apply(&self, path: &Path, source: &FileEntry) -> Result<()> {
        self.apply_with(path, source, set_permissions)
    }

    fn apply_with<F>(&self, path: &Path, source: &FileEntry, chmod: F) -> Result<()>
    where
        F: FnOnce(&Path, u32) -> Result<()>,
    {
        let permissions = chmod(path, source.permissions);
        if let Err(e) = &permissions {
            warn!(path = %path.display(), error = %e, "Failed to copy permission bits");
        }

        // Times last: nothing may touch the file after this.
        set_file_times(path, source.accessed, source.modified)?;

        permissions
    }

    /// Apply the permission bits of a source directory to a freshly created one
    pub async fn apply_directory(&self, path: &Path, source: &FileEntry) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(source.permissions);
            tokio::fs::set_permissions(path, perms)
                .await
                .map_err(|e| SyncError::attribute_error(path, e))?;
        }

        #[cfg(not(unix))]
        let _ = (path, source);

        Ok(())
    }
}

/// Set access and modification times with full sub-second precision
pub fn set_file_times(path: &Path, atime: SystemTime, mtime: SystemTime) -> Result<()> {
    filetime::set_file_times(
        path,
        FileTime::from_system_time(atime),
        FileTime::from_system_time(mtime),
    )
    .map_err(|e| SyncError::attribute_error(path, e))
}

/// Set the permission bits of a file
pub fn set_permissions(path: &Path, permissions: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(permissions & 0o777);
        std::fs::set_permissions(path, perms).map_err(|e| SyncError::attribute_error(path, e))
    }

    #[cfg(windows)]
    {
        // Only the read-only attribute maps onto Windows
        let readonly = (permissions & 0o200) == 0;
        let mut perms = std::fs::metadata(path)
            .map_err(|e| SyncError::attribute_error(path, e))?
            .permissions();
        perms.set_readonly(readonly);
        std::fs::set_permissions(path, perms).map_err(|e| SyncError::attribute_error(path, e))
    }
}
