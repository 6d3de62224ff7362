//! Object store abstraction: named byte blobs under `(container, path)`.
//!
//! The pipeline only talks to storage through the `ObjectStore` trait.
//! Adapters:
//! - `LocalObjectStore`: containers are directories under a root, writes are
//!   atomic (temp file + rename), locks are exclusive lock files
//! - `MemoryObjectStore`: in-process map with fault injection, for tests
//!
//! Paths are `/`-separated and relative; `..` and empty segments are rejected.

pub mod history;
pub mod layout;
pub mod local;
pub mod memory;
pub mod readiness;

pub use history::{HistoryMeta, HistoryOptions, HistoryStore};
pub use local::{LocalObjectStore, DEFAULT_STALE_LOCK};
pub use memory::MemoryObjectStore;
pub use readiness::{wait_until_ready, ReadinessPolicy};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    #[error("container '{0}' does not exist")]
    ContainerMissing(String),

    #[error("object not found: {container}/{path}")]
    NotFound { container: String, path: String },

    #[error("dataset '{container}/{name}' is locked by another run")]
    Locked { container: String, name: String },

    #[error("invalid object path '{0}'")]
    InvalidPath(String),

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StoreError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Exclusive lock on one logical dataset. Released on drop.
pub struct StoreLock {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl StoreLock {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLock")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Byte-blob storage addressed by `(container, path)`.
pub trait ObjectStore: Send + Sync {
    /// Cheap readiness check.
    fn ping(&self) -> Result<(), StoreError>;

    fn container_exists(&self, container: &str) -> Result<bool, StoreError>;

    /// Create the container if it does not exist.
    fn ensure_container(&self, container: &str) -> Result<(), StoreError>;

    fn exists(&self, container: &str, path: &str) -> Result<bool, StoreError>;

    /// Read a whole blob. Missing blobs are `StoreError::NotFound`.
    fn read(&self, container: &str, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Replace a blob atomically: readers see the old or the new bytes, never a mix.
    fn write(&self, container: &str, path: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Every blob path under `prefix`, recursively, sorted.
    fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Immediate child "directories" of `prefix`, sorted.
    fn list_dirs(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Take the exclusive lock `name` in `container`, waiting up to `timeout`.
    fn lock(&self, container: &str, name: &str, timeout: Duration)
        -> Result<StoreLock, StoreError>;

    /// Read a blob, mapping `NotFound` to `None`.
    fn read_optional(&self, container: &str, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.read(container, path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Reject absolute paths, `..`, and empty segments.
pub fn validate_path(path: &str) -> Result<(), StoreError> {
    let ok = !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(path.to_string()))
    }
}

/// Containers are single path segments.
pub fn validate_container(container: &str) -> Result<(), StoreError> {
    if container.is_empty() || container.contains('/') {
        return Err(StoreError::InvalidPath(container.to_string()));
    }
    validate_path(container)
}

/// Immediate children of `prefix` among `paths` that have further segments.
pub(crate) fn child_dirs<'a>(paths: impl Iterator<Item = &'a str>, prefix: &str) -> Vec<String> {
    let prefix = prefix.trim_end_matches('/');
    let mut dirs: Vec<String> = paths
        .filter_map(|p| {
            let rest = if prefix.is_empty() {
                p
            } else {
                p.strip_prefix(prefix)?.strip_prefix('/')?
            };
            let (dir, _) = rest.split_once('/')?;
            Some(dir.to_string())
        })
        .collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn path_validation() {
        assert!(validate_path("processed/master.csv").is_ok());
        assert!(validate_path("raw/2024-01-02/AAPL.csv").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("raw/../secret").is_err());
        assert!(validate_path("raw//x").is_err());
        assert!(validate_container("stock-data").is_ok());
        assert!(validate_container("a/b").is_err());
    }

    #[test]
    fn child_dirs_lists_one_level() {
        let paths = [
            "raw/2024-01-02/AAPL.csv",
            "raw/2024-01-02/MSFT.csv",
            "raw/2024-01-03/AAPL.csv",
            "processed/master.csv",
        ];
        assert_eq!(
            child_dirs(paths.iter().copied(), "raw"),
            vec!["2024-01-02".to_string(), "2024-01-03".to_string()]
        );
        assert_eq!(
            child_dirs(paths.iter().copied(), ""),
            vec!["processed".to_string(), "raw".to_string()]
        );
        assert!(child_dirs(paths.iter().copied(), "processed").is_empty());
    }

    #[test]
    fn lock_releases_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let lock = StoreLock::new(move || flag.store(true, Ordering::SeqCst));
        assert!(!released.load(Ordering::SeqCst));
        drop(lock);
        assert!(released.load(Ordering::SeqCst));
    }
}
