//! Health report envelope (schema_version "1")
//!
//! One `HealthReport` is serialized per spool line. Field declaration order is
//! the on-disk key order, so do not reorder fields without bumping
//! `SCHEMA_VERSION`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const SCHEMA_VERSION: &str = "1";

/// Signal names emitted by the default collectors
pub mod signal {
    pub const HEARTBEAT_OK: &str = "heartbeat_ok";
    pub const LOADAVG_1M: &str = "loadavg_1m";
    pub const LOADAVG_5M: &str = "loadavg_5m";
    pub const LOADAVG_15M: &str = "loadavg_15m";
    pub const CPU_COUNT_LOGICAL: &str = "cpu_count_logical";
    pub const MEM_TOTAL: &str = "mem_total";
    pub const MEM_AVAILABLE: &str = "mem_available";
    pub const DISK_TOTAL: &str = "disk_total";
    pub const DISK_USED: &str = "disk_used";
    pub const DISK_FREE: &str = "disk_free";
}

/// Health level, ordered by severity (`Ok < Degraded < Unhealthy`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Health {
    Ok,
    Degraded,
    Unhealthy,
}

impl Health {
    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Ok => "OK",
            Health::Degraded => "DEGRADED",
            Health::Unhealthy => "UNHEALTHY",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single signal value. Absent keys mean the producing collector failed;
/// there is no null value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl SignalValue {
    /// Numeric view, `None` for booleans
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            SignalValue::Bool(_) => None,
            SignalValue::Int(v) => Some(v as f64),
            SignalValue::Float(v) => Some(v),
        }
    }
}

impl From<bool> for SignalValue {
    fn from(v: bool) -> Self {
        SignalValue::Bool(v)
    }
}

impl From<f64> for SignalValue {
    fn from(v: f64) -> Self {
        SignalValue::Float(v)
    }
}

impl From<u64> for SignalValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => SignalValue::Int(v),
            Err(_) => SignalValue::Float(v as f64),
        }
    }
}

impl From<usize> for SignalValue {
    fn from(v: usize) -> Self {
        SignalValue::from(v as u64)
    }
}

/// Signals keyed by name; `BTreeMap` keeps serialization order stable
pub type Signals = BTreeMap<String, SignalValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub node_id: String,
    pub boot_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub seq: u64,
    /// RFC 3339, UTC
    pub emitted_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub health: Health,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub schema_version: String,
    pub agent_version: String,
}

/// Complete report envelope, immutable once appended to a spool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub identity: Identity,
    pub timing: Timing,
    #[serde(default)]
    pub signals: Signals,
    pub assessment: Assessment,
    pub meta: Meta,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("identity.node_id is empty")]
    EmptyNodeId,
    #[error("identity.boot_id is empty")]
    EmptyBootId,
    #[error("timing.seq must be >= 1")]
    SeqOutOfRange,
    #[error("timing.emitted_at is empty")]
    EmptyEmittedAt,
    #[error("schema_version must be '1', got '{0}'")]
    SchemaVersion(String),
    #[error("meta.agent_version is empty")]
    EmptyAgentVersion,
}

impl HealthReport {
    /// Structural checks run before a report is allowed onto the spool
    pub fn validate(&self) -> Result<(), ReportError> {
        if self.identity.node_id.trim().is_empty() {
            return Err(ReportError::EmptyNodeId);
        }
        if self.identity.boot_id.trim().is_empty() {
            return Err(ReportError::EmptyBootId);
        }
        if self.timing.seq < 1 {
            return Err(ReportError::SeqOutOfRange);
        }
        if self.timing.emitted_at.is_empty() {
            return Err(ReportError::EmptyEmittedAt);
        }
        if self.schema_version != SCHEMA_VERSION {
            return Err(ReportError::SchemaVersion(self.schema_version.clone()));
        }
        if self.meta.schema_version != SCHEMA_VERSION {
            return Err(ReportError::SchemaVersion(self.meta.schema_version.clone()));
        }
        if self.meta.agent_version.is_empty() {
            return Err(ReportError::EmptyAgentVersion);
        }
        Ok(())
    }

    pub fn node_id(&self) -> &str {
        &self.identity.node_id
    }

    pub fn seq(&self) -> u64 {
        self.timing.seq
    }

    pub fn health(&self) -> Health {
        self.assessment.health
    }
}
