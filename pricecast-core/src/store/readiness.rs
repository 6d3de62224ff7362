//! Bounded readiness polling for the object store.

use super::{ObjectStore, StoreError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How long to wait for the store, and how often to ping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(500),
        }
    }
}

/// Poll `ping` until the store answers, then create any missing containers.
///
/// Fails with `StoreError::Unavailable` once `policy.timeout` has elapsed
/// without a successful ping.
pub fn wait_until_ready(
    store: &dyn ObjectStore,
    containers: &[&str],
    policy: ReadinessPolicy,
) -> Result<(), StoreError> {
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match store.ping() {
            Ok(()) => break,
            Err(e) => {
                if started.elapsed() >= policy.timeout {
                    return Err(StoreError::Unavailable(format!(
                        "not ready after {attempts} attempts over {:?}: {e}",
                        policy.timeout
                    )));
                }
                debug!(attempt = attempts, error = %e, "store not ready, retrying");
                std::thread::sleep(policy.interval);
            }
        }
    }

    for container in containers {
        if !store.container_exists(container)? {
            store.ensure_container(container)?;
            info!(container, "created container");
        }
    }
    Ok(())
}
