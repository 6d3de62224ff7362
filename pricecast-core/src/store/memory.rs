//! In-memory object store for tests and dry runs.
//!
//! Supports fault injection: the whole store can be marked unavailable, and
//! writes under a given `(container, prefix)` can be made to fail.

use super::{child_dirs, validate_container, validate_path, ObjectStore, StoreError, StoreLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct State {
    available: bool,
    containers: BTreeSet<String>,
    objects: BTreeMap<(String, String), Vec<u8>>,
    locks: BTreeSet<(String, String)>,
    failing_writes: Vec<(String, String)>,
    /// Pings that fail before the store comes up.
    pending_failed_pings: usize,
}

#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                available: true,
                ..State::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned map is still consistent: every mutation is a single insert/remove.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn live(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        let state = self.state();
        if state.available {
            Ok(state)
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }

    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    /// Fail the next `n` pings, then recover.
    pub fn fail_pings(&self, n: usize) {
        self.state().pending_failed_pings = n;
    }

    /// Make every write under `prefix` in `container` fail with an I/O error.
    pub fn fail_writes_under(&self, container: &str, prefix: &str) {
        self.state()
            .failing_writes
            .push((container.to_string(), prefix.to_string()));
    }

    /// Number of stored blobs, across containers.
    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn ping(&self) -> Result<(), StoreError> {
        let mut state = self.live()?;
        if state.pending_failed_pings > 0 {
            state.pending_failed_pings -= 1;
            return Err(StoreError::Unavailable("memory store is starting".into()));
        }
        Ok(())
    }

    fn container_exists(&self, container: &str) -> Result<bool, StoreError> {
        validate_container(container)?;
        Ok(self.live()?.containers.contains(container))
    }

    fn ensure_container(&self, container: &str) -> Result<(), StoreError> {
        validate_container(container)?;
        self.live()?.containers.insert(container.to_string());
        Ok(())
    }

    fn exists(&self, container: &str, path: &str) -> Result<bool, StoreError> {
        validate_path(path)?;
        let state = self.live()?;
        Ok(state
            .objects
            .contains_key(&(container.to_string(), path.to_string())))
    }

    fn read(&self, container: &str, path: &str) -> Result<Vec<u8>, StoreError> {
        validate_path(path)?;
        let state = self.live()?;
        if !state.containers.contains(container) {
            return Err(StoreError::ContainerMissing(container.to_string()));
        }
        state
            .objects
            .get(&(container.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                container: container.to_string(),
                path: path.to_string(),
            })
    }

    fn write(&self, container: &str, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        validate_path(path)?;
        let mut state = self.live()?;
        if !state.containers.contains(container) {
            return Err(StoreError::ContainerMissing(container.to_string()));
        }
        let blocked = state
            .failing_writes
            .iter()
            .any(|(c, prefix)| c == container && path.starts_with(prefix.as_str()));
        if blocked {
            return Err(StoreError::io(
                format!("{container}/{path}"),
                "injected write failure",
            ));
        }
        state
            .objects
            .insert((container.to_string(), path.to_string()), bytes.to_vec());
        Ok(())
    }

    fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let state = self.live()?;
        if !state.containers.contains(container) {
            return Err(StoreError::ContainerMissing(container.to_string()));
        }
        let prefix = prefix.trim_end_matches('/');
        Ok(state
            .objects
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, p)| p)
            .filter(|p| {
                prefix.is_empty()
                    || p.as_str() == prefix
                    || p.strip_prefix(prefix).is_some_and(|r| r.starts_with('/'))
            })
            .cloned()
            .collect())
    }

    fn list_dirs(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let paths = self.list(container, "")?;
        Ok(child_dirs(paths.iter().map(String::as_str), prefix))
    }

    fn lock(
        &self,
        container: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<StoreLock, StoreError> {
        validate_path(name)?;
        let key = (container.to_string(), name.to_string());
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.live()?;
                if state.locks.insert(key.clone()) {
                    let shared = Arc::clone(&self.state);
                    return Ok(StoreLock::new(move || {
                        shared
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .locks
                            .remove(&key);
                    }));
                }
            }
            if Instant::now() >= deadline {
                return Err(StoreError::Locked {
                    container: container.to_string(),
                    name: name.to_string(),
                });
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
