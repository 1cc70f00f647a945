//! Error types for the file system
//!
//! Recoverable failures surface as [`FsError`]; invariant violations
//! (double-free of a sector, a truncated header chain) abort via assertion
//! because they are bugs, not conditions to recover from.

use thiserror::Error;

/// Result type for file-system operations
pub type FsResult<T> = Result<T, FsError>;

/// File-system error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// Path length bounds violated, relative path, or empty component
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Name or path component absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Create conflict
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Free map exhausted or directory table full
    #[error("no space left on disk")]
    NoSpace,

    /// Operation applied to the wrong kind of entry
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Underlying sector device failed
    #[error("disk I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FsError::NotFound("/a/b".into());
        assert_eq!(err.to_string(), "not found: /a/b");
        assert_eq!(FsError::NoSpace.to_string(), "no space left on disk");
    }
}
