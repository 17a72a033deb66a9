//! The address registry: a durable map from logical deployment name to its
//! [`DeploymentRecord`].
//!
//! Writes are atomic. A failed `put` leaves the previously stored state
//! untouched, and a successful `put` has synced the new contents to disk
//! before it returns. Syncing the parent directory after the rename is best
//! effort: once the rename lands the new record is visible, so a failure
//! there is logged rather than reported as a failed write.

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{errors::ScriptError, types::DeploymentRecord};

/// A durable store of deployment records keyed by name
pub trait AddressRegistry: Send + Sync {
    /// Fetch the record for `name`, if one exists
    fn get(&self, name: &str) -> Result<Option<DeploymentRecord>, ScriptError>;

    /// Atomically write the record for `name`, replacing any previous one
    fn put(&self, name: &str, record: &DeploymentRecord) -> Result<(), ScriptError>;

    /// The names of all recorded deployments
    fn names(&self) -> Result<Vec<String>, ScriptError>;
}

impl<R: AddressRegistry + ?Sized> AddressRegistry for Arc<R> {
    fn get(&self, name: &str) -> Result<Option<DeploymentRecord>, ScriptError> {
        (**self).get(name)
    }

    fn put(&self, name: &str, record: &DeploymentRecord) -> Result<(), ScriptError> {
        (**self).put(name, record)
    }

    fn names(&self) -> Result<Vec<String>, ScriptError> {
        (**self).names()
    }
}

// ---------------------
// | JSON file backend |
// ---------------------

/// The on-disk layout of the deployments file
#[derive(Default, Serialize, Deserialize)]
struct DeploymentsFile {
    /// Records keyed by deployment name
    #[serde(default)]
    deployments: BTreeMap<String, DeploymentRecord>,
}

/// A registry persisted as a `deployments.<network>.json` file
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    /// The path of the deployments file
    path: PathBuf,
}

impl JsonFileRegistry {
    /// A registry stored at `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileRegistry { path: path.into() }
    }

    /// The path of the deployments file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file; a missing file is an empty registry
    fn read(&self) -> Result<DeploymentsFile, ScriptError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DeploymentsFile::default()),
            Err(e) => {
                return Err(ScriptError::Persistence(format!(
                    "could not read {}: {e}",
                    self.path.display()
                )))
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            ScriptError::Persistence(format!("could not parse {}: {e}", self.path.display()))
        })
    }

    /// Replace the file contents by writing a sibling temp file, syncing it,
    /// and renaming it over the target
    fn write(&self, file: &DeploymentsFile) -> Result<(), ScriptError> {
        let persistence_err =
            |e: std::io::Error| ScriptError::Persistence(format!("{}: {e}", self.path.display()));

        let json = serde_json::to_string_pretty(file)
            .map_err(|e| ScriptError::Persistence(e.to_string()))?;

        let tmp_path = self.tmp_path();
        let write_tmp = || -> std::io::Result<()> {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(json.as_bytes())?;
            tmp.write_all(b"\n")?;
            tmp.sync_all()
        };
        if let Err(e) = write_tmp().and_then(|_| fs::rename(&tmp_path, &self.path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(persistence_err(e));
        }

        // The record is visible from here on, so only log a failed dir sync
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            if let Err(e) = sync_dir(dir) {
                warn!(dir = %dir.display(), "could not sync deployments directory: {e}");
            }
        }

        Ok(())
    }

    /// The temp file written before being renamed over the deployments file
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Flush a directory's entries, making a completed rename durable
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

impl AddressRegistry for JsonFileRegistry {
    fn get(&self, name: &str) -> Result<Option<DeploymentRecord>, ScriptError> {
        Ok(self.read()?.deployments.remove(name))
    }

    fn put(&self, name: &str, record: &DeploymentRecord) -> Result<(), ScriptError> {
        let mut file = self.read()?;
        file.deployments.insert(name.to_string(), record.clone());
        self.write(&file)?;

        debug!(
            name,
            path = %self.path.display(),
            version = record.version,
            "deployment recorded"
        );
        Ok(())
    }

    fn names(&self) -> Result<Vec<String>, ScriptError> {
        Ok(self.read()?.deployments.into_keys().collect())
    }
}

// --------------------
// | In-memory backend |
// --------------------

/// A registry held in memory, for tests
#[derive(Default)]
pub struct InMemoryRegistry {
    /// Records keyed by deployment name
    records: RwLock<BTreeMap<String, DeploymentRecord>>,
    /// When set, every `put` fails
    fail_writes: AtomicBool,
}

impl InMemoryRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

/// The error returned when a registry lock was poisoned by a panicking writer
fn poisoned<T>(_: T) -> ScriptError {
    ScriptError::Persistence("registry lock poisoned".to_string())
}

impl AddressRegistry for InMemoryRegistry {
    fn get(&self, name: &str) -> Result<Option<DeploymentRecord>, ScriptError> {
        Ok(self.records.read().map_err(poisoned)?.get(name).cloned())
    }

    fn put(&self, name: &str, record: &DeploymentRecord) -> Result<(), ScriptError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ScriptError::Persistence("store unavailable".to_string()));
        }

        self.records
            .write()
            .map_err(poisoned)?
            .insert(name.to_string(), record.clone());
        Ok(())
    }

    fn names(&self) -> Result<Vec<String>, ScriptError> {
        Ok(self
            .records
            .read()
            .map_err(poisoned)?
            .keys()
            .cloned()
            .collect())
    }
}
