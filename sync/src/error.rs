//! Error types for the mirror engine

use std::path::PathBuf;

/// Result type alias for mirror operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type for per-entry mirror operations.
///
/// None of these abort a cycle; the walkers log them, count them and move on
/// to the next sibling.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Root validation errors
    #[error("Invalid root '{path}': {message}")]
    InvalidRoot { path: PathBuf, message: String },

    /// Directory listing errors
    #[error("Directory scan error at '{path}': {source}")]
    DirectoryScan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source open failure
    #[error("Failed to open source '{path}': {source}")]
    OpenSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Destination open/create failure
    #[error("Failed to open destination '{path}': {source}")]
    OpenDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Memory mapping failure
    #[error("Failed to map '{path}': {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Data transfer failure (read or write)
    #[error("Failed to transfer '{path}': {source}")]
    Transfer {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File attribute preservation errors
    #[error("Attribute preservation error for '{path}': {source}")]
    AttributePreservation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation errors
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or directory deletion errors
    #[error("File deletion error at '{path}': {source}")]
    FileDeletion {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking copy task was cancelled or panicked
    #[error("Copy task for '{path}' did not complete: {message}")]
    TaskJoin { path: PathBuf, message: String },
}

impl SyncError {
    /// Create a new invalid root error
    pub fn invalid_root(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidRoot {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new directory scan error
    pub fn scan_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryScan {
            path: path.into(),
            source,
        }
    }

    /// Create a new attribute preservation error
    pub fn attribute_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::AttributePreservation {
            path: path.into(),
            source,
        }
    }

    /// Create a new directory creation error
    pub fn create_dir_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDirectory {
            path: path.into(),
            source,
        }
    }

    /// Create a new file deletion error
    pub fn deletion_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileDeletion {
            path: path.into(),
            source,
        }
    }
}
