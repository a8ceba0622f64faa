use std::path::PathBuf;

/// Process exit codes. 0/2/3 describe fleet health, the rest are failures.
pub mod exit {
    pub const OK: u8 = 0;
    pub const DEGRADED: u8 = 2;
    pub const UNHEALTHY: u8 = 3;
    pub const USAGE: u8 = 64;
    pub const DATA: u8 = 65;
    pub const INPUT: u8 = 66;
}

/// File-level and configuration errors that abort a triage command
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("spool not found: {0}")]
    SpoolMissing(PathBuf),
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("spool directory not found: {0}")]
    DirMissing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid glob pattern '{pattern}': {source}")]
    BadGlob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("{path}: multiple node_id values in tail ({ids})")]
    MultipleNodeIds { path: PathBuf, ids: String },
    #[error("unknown format '{name}' (available: {available})")]
    UnknownFormat { name: String, available: String },
    #[error("renderer '{0}' is already registered")]
    DuplicateRenderer(String),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

impl TriageError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TriageError::Read {
            path: path.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            TriageError::SpoolMissing(_)
            | TriageError::NotAFile(_)
            | TriageError::DirMissing(_)
            | TriageError::Read { .. }
            | TriageError::Output(_) => exit::INPUT,
            TriageError::BadGlob { .. }
            | TriageError::MultipleNodeIds { .. }
            | TriageError::UnknownFormat { .. }
            | TriageError::DuplicateRenderer(_)
            | TriageError::Encode(_) => exit::DATA,
        }
    }
}
