//! Durable agent state: `{ boot_id, seq }`
//!
//! `seq` is the next sequence number to emit. Writes go through a uniquely
//! named temp file that is persisted over the target so a crash leaves either the old or the new state on disk.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const STATE_FILE: &str = "agent_state.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub boot_id: String,
    pub seq: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unparsable state loads as `None`
    pub fn load(&self) -> Option<AgentState> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No state at {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<AgentState>(&raw) {
            Ok(state) if state.seq >= 1 => Some(state),
            Ok(state) => {
                warn!("Ignoring state with seq {} at {}", state.seq, self.path.display());
                None
            }
            Err(e) => {
                warn!("Ignoring unparsable state at {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Atomic replace: temp file in the same dir, fsync, persist, fsync dir
    pub fn save(&self, state: &AgentState) -> Result<(), StateError> {
        let payload = serde_json::to_vec(state)?;

        self.write_atomic(&payload).map_err(|source| StateError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn write_atomic(&self, payload: &[u8]) -> std::io::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        // Dropped without persisting on any error, which removes it
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        sync_dir(parent)
    }
}

/// Make a rename durable. No-op where directories cannot be opened.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> std::io::Result<()> {
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(StateStore::new(dir.path()).load(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(&dir.path().join("nested"));
        let state = AgentState { boot_id: "boot-1".into(), seq: 42 };

        store.save(&state).unwrap();
        assert_eq!(store.load(), Some(state));
    }

    #[test]
    fn test_corrupt_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        fs::write(store.path(), b"{\"boot_id\": \"b\", \"se").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_stray_tmp_does_not_break_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save(&AgentState { boot_id: "b".into(), seq: 3 }).unwrap();

        // Leftover from a crash mid-write under an older naming scheme
        fs::write(dir.path().join("agent_state.json.tmp"), b"garbage").unwrap();
        assert_eq!(store.load().map(|s| s.seq), Some(3));

        store.save(&AgentState { boot_id: "b".into(), seq: 4 }).unwrap();
        assert_eq!(store.load().map(|s| s.seq), Some(4));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        for seq in 1..=5 {
            store.save(&AgentState { boot_id: "b".into(), seq }).unwrap();
        }

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![STATE_FILE.to_string()]);
    }

    #[test]
    fn test_failed_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        // A directory at the target path makes the final persist fail
        fs::create_dir(store.path()).unwrap();
        fs::write(store.path().join("keep"), b"x").unwrap();

        let err = store.save(&AgentState { boot_id: "b".into(), seq: 1 }).unwrap_err();
        assert!(matches!(err, StateError::Write { .. }));

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![STATE_FILE.to_string()]);
    }
}
