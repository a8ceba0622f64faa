//! Append-only JSON Lines spool with size-based rotation
//!
//! Each report is one line written with a single `write_all` on an append
//! handle and flushed with `sync_data` before the append counts as done.
//! A torn fragment left by a crash is terminated with `\n` before the next
//! record so it stays an isolated invalid line. A failed append is rolled
//! back to the previous length so the report's seq can be reused.

use nodehealth_contracts::HealthReport;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// How far back `last_seq` looks in each spool file
const LAST_SEQ_SCAN_BYTES: u64 = 256 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{op} failed for {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The append failed and truncating back failed too: the line may be on disk
    #[error("append to {path} failed ({append}) and could not be rolled back: {source}")]
    RollbackFailed {
        path: PathBuf,
        append: String,
        #[source]
        source: std::io::Error,
    },
}

impl SpoolError {
    fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        SpoolError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short kind for `spool_write_failed` events
    pub fn kind(&self) -> &'static str {
        match self {
            SpoolError::Serialize(_) => "serialize",
            SpoolError::Io { op, .. } => *op,
            SpoolError::RollbackFailed { .. } => "rollback",
        }
    }

    /// Whether the report's bytes may have reached the file
    pub fn may_have_written(&self) -> bool {
        matches!(self, SpoolError::RollbackFailed { .. })
    }
}

/// Result of a rotation: `new_path` is `None` when the active file was discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    pub old_path: PathBuf,
    pub new_path: Option<PathBuf>,
}

pub struct SpoolWriter {
    path: PathBuf,
    max_bytes: u64,
    rotate_count: u32,
    file: Option<File>,
    #[cfg(test)]
    pub(crate) faults: testing::Faults,
}

impl SpoolWriter {
    /// `max_bytes == 0` disables rotation
    pub fn new(path: PathBuf, max_bytes: u64, rotate_count: u32) -> Self {
        Self {
            path,
            max_bytes,
            rotate_count,
            file: None,
            #[cfg(test)]
            faults: testing::Faults::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<stem>.<index>.<ext>` next to the active file
    pub fn rotated_path(&self, index: u32) -> PathBuf {
        rotated_path(&self.path, index)
    }

    /// Rotate when the active file has reached `max_bytes`
    pub fn rotate_if_needed(&mut self) -> Result<Option<Rotation>, SpoolError> {
        if self.max_bytes == 0 {
            return Ok(None);
        }

        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SpoolError::io("stat", &self.path, e)),
        };
        if size < self.max_bytes {
            return Ok(None);
        }

        self.file = None;

        let rotation = if self.rotate_count == 0 {
            fs::remove_file(&self.path).map_err(|e| SpoolError::io("remove", &self.path, e))?;
            Rotation {
                old_path: self.path.clone(),
                new_path: None,
            }
        } else {
            // Shift .i -> .i+1 oldest first; the rename onto .rotate_count drops the oldest
            for index in (1..self.rotate_count).rev() {
                let from = self.rotated_path(index);
                if from.exists() {
                    let to = self.rotated_path(index + 1);
                    fs::rename(&from, &to).map_err(|e| SpoolError::io("rename", &from, e))?;
                }
            }

            let target = self.rotated_path(1);
            fs::rename(&self.path, &target).map_err(|e| SpoolError::io("rename", &self.path, e))?;
            Rotation {
                old_path: self.path.clone(),
                new_path: Some(target),
            }
        };

        if let Some(parent) = self.path.parent() {
            if let Err(e) = crate::state::sync_dir(parent) {
                warn!("Could not sync spool directory after rotation: {}", e);
            }
        }

        info!(
            "Rotated spool {} ({} bytes >= {})",
            self.path.display(),
            size,
            self.max_bytes
        );
        Ok(Some(rotation))
    }

    /// Write one report as one line. Returns the bytes written.
    pub fn write(&mut self, report: &HealthReport) -> Result<usize, SpoolError> {
        let mut line = serde_json::to_vec(report)?;
        line.push(b'\n');

        // A failed write drops the handle so the tail is re-checked on reopen
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open()?,
        };
        let pre_len = file
            .metadata()
            .map_err(|e| SpoolError::io("stat", &self.path, e))?
            .len();

        if let Err(e) = self.append(&mut file, &line) {
            return Err(self.roll_back(&file, pre_len, e));
        }

        self.file = Some(file);
        Ok(line.len())
    }

    fn append(&mut self, file: &mut File, line: &[u8]) -> Result<(), SpoolError> {
        file.write_all(line)
            .map_err(|e| SpoolError::io("write", &self.path, e))?;
        #[cfg(test)]
        self.faults.check_sync()?;
        file.sync_data()
            .map_err(|e| SpoolError::io("sync", &self.path, e))
    }

    /// Truncate to `pre_len` so no part of the failed line survives
    fn roll_back(&mut self, file: &File, pre_len: u64, cause: SpoolError) -> SpoolError {
        let truncated = file.set_len(pre_len).and_then(|_| file.sync_data());
        #[cfg(test)]
        let truncated = truncated.and_then(|_| self.faults.check_rollback());

        match truncated {
            Ok(()) => {
                warn!("Rolled back {} to {} bytes after: {}", self.path.display(), pre_len, cause);
                cause
            }
            Err(source) => {
                error!("Could not roll back {}: {}", self.path.display(), source);
                SpoolError::RollbackFailed {
                    path: self.path.clone(),
                    append: cause.to_string(),
                    source,
                }
            }
        }
    }

    fn open(&self) -> Result<File, SpoolError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| SpoolError::io("mkdir", parent, e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SpoolError::io("open", &self.path, e))?;

        if !ends_with_newline(&self.path).map_err(|e| SpoolError::io("read", &self.path, e))? {
            warn!("Spool {} ends in a torn line, terminating it", self.path.display());
            file.write_all(b"\n")
                .map_err(|e| SpoolError::io("write", &self.path, e))?;
        }

        debug!("Opened spool {}", self.path.display());
        Ok(file)
    }

    /// Greatest seq for `node_id` in the tails of the active and `.1` files
    pub fn last_seq(&self, node_id: &str) -> Option<u64> {
        [self.path.clone(), self.rotated_path(1)]
            .iter()
            .filter_map(|path| last_seq_in(path, node_id))
            .max()
    }
}

/// Empty or missing files count as terminated
fn ends_with_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn rotated_path(path: &Path, index: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{index}"),
    };
    path.with_file_name(name)
}

fn last_seq_in(path: &Path, node_id: &str) -> Option<u64> {
    let mut file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    let start = len.saturating_sub(LAST_SEQ_SCAN_BYTES);
    file.seek(SeekFrom::Start(start)).ok()?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).ok()?;

    let mut lines = buf.split(|b| *b == b'\n');
    if start > 0 {
        // First line is cut by the window
        lines.next();
    }

    lines
        .filter_map(|line| serde_json::from_slice::<HealthReport>(line).ok())
        .filter(|report| report.node_id() == node_id)
        .map(|report| report.seq())
        .max()
}
