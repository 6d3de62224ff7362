//! Filesystem object store.
//!
//! Layout: `{root}/{container}/{path}`. Writes go to a sibling temp file and
//! are renamed into place. Locks are `{root}/{container}/.locks/{name}.lock`,
//! created with `create_new` and removed when the guard drops.
//!
//! A lock file left behind by a killed process is taken over once its holder
//! pid is gone (Linux) or it is older than the stale threshold. The pid check
//! assumes the root is not shared between hosts.

use super::{child_dirs, validate_container, validate_path, ObjectStore, StoreError, StoreLock};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const LOCK_DIR: &str = ".locks";
const LOCK_POLL: Duration = Duration::from_millis(50);

/// Age after which a lock file is considered abandoned.
pub const DEFAULT_STALE_LOCK: Duration = Duration::from_secs(60 * 60);

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);
static LOCK_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    stale_after: Duration,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stale_after: DEFAULT_STALE_LOCK,
        }
    }

    /// Take over lock files older than `stale_after`.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Why the lock file at `path` with `contents` is abandoned, if it is.
    fn stale_reason(&self, path: &Path, contents: &str) -> Option<String> {
        let stamp = LockStamp::parse(contents);
        if let Some(pid) = stamp.pid {
            if pid != std::process::id() && process_alive(pid) == Some(false) {
                return Some(format!("holder pid {pid} is gone"));
            }
        }
        // A stamp that was never written falls back to the file's mtime.
        let age = match stamp.at {
            Some(at) => (Utc::now() - at).to_std().unwrap_or(Duration::ZERO),
            None => fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok())
                .unwrap_or(Duration::ZERO),
        };
        (age >= self.stale_after).then(|| format!("held for {}s", age.as_secs()))
    }

    /// Remove the lock file at `path` if it is stale. Returns whether it was removed.
    fn clear_stale_lock(&self, path: &Path) -> bool {
        let Ok(contents) = fs::read_to_string(path) else {
            return false;
        };
        let Some(reason) = self.stale_reason(path, &contents) else {
            return false;
        };
        // Only remove the stamp that was judged; a new holder may have replaced it.
        if fs::read_to_string(path).ok().as_deref() != Some(contents.as_str()) {
            return false;
        }
        match fs::remove_file(path) {
            Ok(()) => {
                warn!(path = %path.display(), reason = %reason, "took over stale lock");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove stale lock");
                false
            }
        }
    }

    fn container_dir(&self, container: &str) -> Result<PathBuf, StoreError> {
        validate_container(container)?;
        Ok(self.root.join(container))
    }

    fn object_path(&self, container: &str, path: &str) -> Result<PathBuf, StoreError> {
        validate_path(path)?;
        let dir = self.container_dir(container)?;
        if !dir.is_dir() {
            return Err(StoreError::ContainerMissing(container.to_string()));
        }
        Ok(path.split('/').fold(dir, |acc, seg| acc.join(seg)))
    }

    /// Relative `/`-joined paths of every blob in the container.
    fn walk(&self, container: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.container_dir(container)?;
        if !dir.is_dir() {
            return Err(StoreError::ContainerMissing(container.to_string()));
        }
        let mut out = Vec::new();
        let mut stack = vec![(dir, String::new())];
        while let Some((abs, rel)) = stack.pop() {
            let entries =
                fs::read_dir(&abs).map_err(|e| StoreError::io(abs.display().to_string(), e))?;
            for entry in entries {
                let entry = entry.map_err(|e| StoreError::io(abs.display().to_string(), e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if is_internal(&name) {
                    continue;
                }
                let child_rel = if rel.is_empty() {
                    name
                } else {
                    format!("{rel}/{name}")
                };
                let file_type = entry
                    .file_type()
                    .map_err(|e| StoreError::io(entry.path().display().to_string(), e))?;
                if file_type.is_dir() {
                    stack.push((entry.path(), child_rel));
                } else {
                    out.push(child_rel);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Holder details written into a lock file: `pid=<pid> at=<rfc3339> id=<n>`.
#[derive(Debug, Default, PartialEq)]
struct LockStamp {
    pid: Option<u32>,
    at: Option<DateTime<Utc>>,
}

impl LockStamp {
    fn render() -> String {
        format!(
            "pid={} at={} id={}\n",
            std::process::id(),
            Utc::now().to_rfc3339(),
            LOCK_COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    fn parse(text: &str) -> Self {
        let mut stamp = Self::default();
        for field in text.split_whitespace() {
            match field.split_once('=') {
                Some(("pid", v)) => stamp.pid = v.parse().ok(),
                Some(("at", v)) => {
                    stamp.at = DateTime::parse_from_rfc3339(v)
                        .ok()
                        .map(|t| t.with_timezone(&Utc))
                }
                _ => {}
            }
        }
        stamp
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> Option<bool> {
    Some(Path::new("/proc").join(pid.to_string()).exists())
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> Option<bool> {
    None
}

/// Lock directories and in-flight temp files are invisible to listings.
fn is_internal(name: &str) -> bool {
    name == LOCK_DIR || name.contains(".tmp-")
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl ObjectStore for LocalObjectStore {
    fn ping(&self) -> Result<(), StoreError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            Err(e) => Err(StoreError::Unavailable(format!("{}: {e}", self.root.display()))),
        }
    }

    fn container_exists(&self, container: &str) -> Result<bool, StoreError> {
        Ok(self.container_dir(container)?.is_dir())
    }

    fn ensure_container(&self, container: &str) -> Result<(), StoreError> {
        let dir = self.container_dir(container)?;
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(dir.display().to_string(), e))?;
        debug!(container, "container ready");
        Ok(())
    }

    fn exists(&self, container: &str, path: &str) -> Result<bool, StoreError> {
        Ok(self.object_path(container, path)?.is_file())
    }

    fn read(&self, container: &str, path: &str) -> Result<Vec<u8>, StoreError> {
        let file = self.object_path(container, path)?;
        match fs::read(&file) {
            Ok(bytes) => {
                debug!(container, path, bytes = bytes.len(), "read object");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                container: container.to_string(),
                path: path.to_string(),
            }),
            Err(e) => Err(StoreError::io(file.display().to_string(), e)),
        }
    }

    fn write(&self, container: &str, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let file = self.object_path(container, path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io(parent.display().to_string(), e))?;
        }

        let id = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = file.with_file_name(format!("{file_name}.tmp-{}-{id}", std::process::id()));

        fs::write(&tmp, bytes).map_err(|e| StoreError::io(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &file).map_err(|e| {
            // Clean up temp file on rename failure
            let _ = fs::remove_file(&tmp);
            StoreError::io(file.display().to_string(), format!("atomic rename failed: {e}"))
        })?;

        debug!(container, path, bytes = bytes.len(), "wrote object");
        Ok(())
    }

    fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .walk(container)?
            .into_iter()
            .filter(|p| under_prefix(p, prefix))
            .collect())
    }

    fn list_dirs(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let paths = self.walk(container)?;
        Ok(child_dirs(paths.iter().map(String::as_str), prefix))
    }

    fn lock(
        &self,
        container: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<StoreLock, StoreError> {
        validate_path(name)?;
        let dir = self.container_dir(container)?.join(LOCK_DIR);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(dir.display().to_string(), e))?;
        let lock_path = dir.join(format!("{name}.lock"));

        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(mut file) => {
                    let stamp = LockStamp::render();
                    if let Err(e) = file.write_all(stamp.as_bytes()) {
                        // An unstamped lock could never be released by its owner.
                        let _ = fs::remove_file(&lock_path);
                        return Err(StoreError::io(lock_path.display().to_string(), e));
                    }
                    debug!(container, name, "acquired lock");
                    let release_path = lock_path.clone();
                    return Ok(StoreLock::new(move || release_lock(&release_path, &stamp)));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.clear_stale_lock(&lock_path) {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(StoreError::Locked {
                            container: container.to_string(),
                            name: name.to_string(),
                        });
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(StoreError::io(lock_path.display().to_string(), e)),
            }
        }
    }
}

/// Remove the lock file, unless another holder has taken it over meanwhile.
fn release_lock(path: &Path, stamp: &str) {
    match fs::read_to_string(path) {
        Ok(current) if current == stamp => {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to release lock");
            }
        }
        Ok(_) => warn!(path = %path.display(), "lock was taken over, leaving it in place"),
        Err(e) => warn!(path = %path.display(), error = %e, "lock file vanished before release"),
    }
}
