//! State persisters — load and save the whole broker state.
//!
//! [`LocalPersister`] keeps the state in a JSON file on disk;
//! [`MemoryPersister`] keeps it in process (for testing).

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::State;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Saves and retrieves the broker state: the provisioned service
/// instances and their credentials.
pub trait StatePersister: Send + Sync {
    /// Load the full state. A persister that has never saved anything
    /// returns an empty state.
    fn load(&self) -> StateResult<State>;

    /// Replace the stored state.
    fn save(&self, state: &State) -> StateResult<()>;
}

/// Stores the broker state as a JSON document in the local file system.
#[derive(Debug)]
pub struct LocalPersister {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalPersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StatePersister for LocalPersister {
    fn load(&self) -> StateResult<State> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "no state file yet, starting empty");
                return Ok(State::default());
            }
            Err(e) => return Err(StateError::Read(e.to_string())),
        };
        let state: State = serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
        debug!(
            path = ?self.path,
            instances = state.available_instances.len(),
            "state loaded"
        );
        Ok(state)
    }

    fn save(&self, state: &State) -> StateResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(map_err!(Write))?;
        }
        let bytes = serde_json::to_vec_pretty(state).map_err(map_err!(Serialize))?;

        // Write beside the target and rename so readers never see a torn file.
        let tmp = self.temp_path();
        write_private(&tmp, &bytes).map_err(map_err!(Write))?;
        fs::rename(&tmp, &self.path).map_err(map_err!(Write))?;
        debug!(
            path = ?self.path,
            instances = state.available_instances.len(),
            "state saved"
        );
        Ok(())
    }
}

/// Write `bytes` to a file only the owner can read; the state holds
/// database passwords.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // A leftover temp file from an older build keeps its old mode.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)?;
    file.sync_all()
}

/// Ephemeral in-process persister.
#[derive(Debug, Default)]
pub struct MemoryPersister {
    state: Mutex<State>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: State) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl StatePersister for MemoryPersister {
    fn load(&self) -> StateResult<State> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, state: &State) -> StateResult<()> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        Ok(())
    }
}
