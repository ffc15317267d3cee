//! Shared types for remote backends
//!
//! Entry representations, upload descriptors and the error type shared by every
//! backend and by the adapter layer above them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a remote entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Remote file/directory entry
///
/// `path` is relative to the remote root, `/`-separated, without leading or
/// trailing separators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// File or directory name
    pub name: String,
    /// Full path from root
    pub path: String,
    /// Whether this is a directory
    pub is_dir: bool,
    /// File size in bytes (0 for directories)
    pub size: u64,
    /// Last modification time, if the backend reports one
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    /// Create a new directory entry
    pub fn directory(name: String, path: String) -> Self {
        Self {
            name,
            path,
            is_dir: true,
            size: 0,
            modified: None,
        }
    }

    /// Create a new file entry
    pub fn file(name: String, path: String, size: u64) -> Self {
        Self {
            name,
            path,
            is_dir: false,
            size,
            modified: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.modified = modified;
        self
    }

    pub fn kind(&self) -> EntryKind {
        if self.is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

/// Descriptor of an object about to be uploaded
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    /// Destination path relative to the remote root
    pub path: String,
    /// Modification time to record on the remote
    pub modified: DateTime<Utc>,
    /// Exact number of bytes the reader will yield
    pub size: u64,
}

impl ObjectInfo {
    pub fn new(path: impl Into<String>, modified: DateTime<Utc>, size: u64) -> Self {
        Self {
            path: path.into(),
            modified,
            size,
        }
    }
}

/// Provider error type
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Size mismatch for {path}: staged {expected} bytes, remote reports {actual}")]
    IntegrityMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("Move {from} -> {to} incomplete: {reason}")]
    PartialMove {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// True for "object or directory absent", including raw IO NotFound
    pub fn is_not_found(&self) -> bool {
        match self {
            ProviderError::NotFound(_) => true,
            ProviderError::IoError(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, ProviderError::NotSupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind() {
        let file = RemoteEntry::file("a.txt".to_string(), "docs/a.txt".to_string(), 10);
        assert_eq!(file.kind(), EntryKind::File);

        let dir = RemoteEntry::directory("docs".to_string(), "docs".to_string());
        assert_eq!(dir.kind(), EntryKind::Directory);
        assert_eq!(dir.size, 0);
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ProviderError::NotFound("x".to_string()).is_not_found());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(ProviderError::IoError(io).is_not_found());
        assert!(!ProviderError::NotSupported("move".to_string()).is_not_found());
        assert!(ProviderError::NotSupported("move".to_string()).is_not_supported());
    }
}
