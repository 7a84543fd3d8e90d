//! State store adapter for persisted deployment state.
//!
//! The remote key/value parameter store is an external collaborator; the
//! pipeline only ever talks to it through the [`StateStore`] trait. An
//! absent key is a valid "first run" state and surfaces as `Ok(None)`,
//! never as an error. Writes are last-writer-wins: the store performs no
//! optimistic concurrency check, and a single runner per environment is an
//! assumed invariant.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Result, StageError};
use crate::logging::Logger;

/// Store key holding the snapshot for one environment.
pub fn source_hashes_key(environment: &str) -> String {
    format!("{environment}/source_hashes")
}

/// Store key holding the injected env-var map for one environment.
pub fn env_vars_key(environment: &str) -> String {
    format!("{environment}/env_vars")
}

/// Store key recording which environment versions have been deployed.
pub const CURRENTLY_DEPLOYED_KEY: &str = "currently_deployed";

/// A remote key/value configuration store.
///
/// Implementations must be shareable across the worker pool.
pub trait StateStore: Sync {
    /// Reads a key. An absent key returns `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a key, overwriting any previous value.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Cheap connectivity check, used only by the pre-pipeline readiness
    /// probe.
    fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Retries the store's connectivity probe a bounded number of times before
/// giving up.
///
/// Applied once to supporting infrastructure before the pipeline starts;
/// pipeline reads and writes themselves are never retried.
pub fn wait_until_ready(store: &dyn StateStore, logger: &Logger) -> Result<()> {
    const ATTEMPTS: u32 = 15;
    const RETRY_INTERVAL: Duration = Duration::from_secs(3);

    let mut last_err = None;
    for attempt in 1..=ATTEMPTS {
        match store.probe() {
            Ok(()) => return Ok(()),
            Err(err) => {
                logger.info(format!(
                    "State store probe failed (attempt {attempt}/{ATTEMPTS}), retrying in {}s...",
                    RETRY_INTERVAL.as_secs()
                ));
                last_err = Some(err);
                if attempt < ATTEMPTS {
                    std::thread::sleep(RETRY_INTERVAL);
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| StageError::StoreError {
        key: String::new(),
        message: "state store never became ready".to_string(),
    }))
}

/// A store backed by a directory tree: one file per key, with slashes in the
/// key mapping to subdirectories.
///
/// This is the local adapter used by the CLI; swapping in a remote parameter
/// store is a matter of implementing [`StateStore`] against its API.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Creates a store rooted at `root`. The directory is created on first
    /// write, not here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl StateStore for DirStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StageError::StoreError {
                key: key.to_string(),
                message: format!("failed to read '{}': {err}", path.display()),
            }),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| StageError::StoreError {
                key: key.to_string(),
                message: format!("failed to create '{}': {err}", parent.display()),
            })?;
        }
        std::fs::write(&path, value).map_err(|err| StageError::StoreError {
            key: key.to_string(),
            message: format!("failed to write '{}': {err}", path.display()),
        })
    }

    fn probe(&self) -> Result<()> {
        // The backing directory must be creatable for the run to publish
        std::fs::create_dir_all(&self.root).map_err(|err| StageError::StoreError {
            key: String::new(),
            message: format!("store root '{}' is not writable: {err}", self.root.display()),
        })
    }
}

/// In-memory store used by tests and library consumers that do not need
/// persistence.
#[derive(Debug, Default)]
pub struct MemStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a key, for test setup.
    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl StateStore for MemStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_dir_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirStore::new(temp_dir.path());

        let key = source_hashes_key("staging");
        assert_eq!(store.get(&key).unwrap(), None);

        store.put(&key, r#"{"login":"abc"}"#).unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some(r#"{"login":"abc"}"#));
    }

    #[test]
    fn test_absent_key_is_first_run_not_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirStore::new(temp_dir.path());
        assert!(store.get("production/source_hashes").unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let store = MemStore::new();
        store.put(CURRENTLY_DEPLOYED_KEY, "v1").unwrap();
        store.put(CURRENTLY_DEPLOYED_KEY, "v2").unwrap();
        assert_eq!(store.get(CURRENTLY_DEPLOYED_KEY).unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(source_hashes_key("dev"), "dev/source_hashes");
        assert_eq!(env_vars_key("dev"), "dev/env_vars");
    }
}
