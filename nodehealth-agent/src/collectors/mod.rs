//! Signal collectors for NodeHealth agents
//!
//! Every collector exposes one capability, `collect() -> signals | failure`.
//! The registry runs them in registration order and turns failures into data:
//! - a failed collector contributes no signal keys
//! - its name is reported so the evaluator can add `collector_failed:<name>`
//! - one failure never stops the remaining collectors

mod system;

pub use system::{CpuCollector, DiskCollector, HeartbeatCollector, MemoryCollector};

use nodehealth_contracts::{SignalValue, Signals};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Env prefix used to force a collector failure (`NODE_AGENT_FAIL_CPU=1`)
pub const FAIL_ENV_PREFIX: &str = "NODE_AGENT_FAIL_";

/// Collector failure modes
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("{0} unavailable")]
    Unavailable(String),
    #[error("simulated failure via NODE_AGENT_FAIL_{0}")]
    Simulated(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectorError {
    /// Short machine-readable kind for `collector_failed` events
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorError::Unavailable(_) => "unavailable",
            CollectorError::Simulated(_) => "simulated",
            CollectorError::Io(_) => "io",
        }
    }
}

/// One signal producer. Implementations hold no shared mutable state.
pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;
    fn collect(&self) -> Result<Signals, CollectorError>;
}

/// A collector that failed during this tick
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorFailure {
    pub name: &'static str,
    pub error_type: &'static str,
    pub message: String,
}

/// Joined result of one registry pass
#[derive(Debug, Default)]
pub struct CollectorOutcome {
    pub signals: Signals,
    pub failures: Vec<CollectorFailure>,
}

impl CollectorOutcome {
    /// Failed collector names, in registration order
    pub fn failed_names(&self) -> Vec<&'static str> {
        self.failures.iter().map(|f| f.name).collect()
    }
}

/// Ordered set of collectors
pub struct CollectorRegistry {
    collectors: Vec<Box<dyn Collector>>,
    forced_failures: BTreeSet<String>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self {
            collectors: Vec::new(),
            forced_failures: BTreeSet::new(),
        }
    }

    /// Default set in fixed order: heartbeat, cpu, memory, disk
    pub fn with_defaults(disk_path: PathBuf) -> Self {
        let mut registry = Self::new();
        registry.register(HeartbeatCollector);
        registry.register(CpuCollector);
        registry.register(MemoryCollector);
        registry.register(DiskCollector::new(disk_path));
        registry.forced_failures = forced_failures_from_env(&registry.names());
        registry
    }

    pub fn register<C: Collector + 'static>(&mut self, collector: C) {
        self.collectors.push(Box::new(collector));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Run every collector once and join the results
    pub fn collect_all(&self) -> CollectorOutcome {
        let mut outcome = CollectorOutcome::default();

        for collector in &self.collectors {
            let name = collector.name();
            let result = if self.forced_failures.contains(name) {
                Err(CollectorError::Simulated(name.to_uppercase()))
            } else {
                collector.collect()
            };

            match result {
                Ok(signals) => {
                    debug!("Collector {} produced {} signals", name, signals.len());
                    outcome.signals.extend(signals);
                }
                Err(e) => {
                    warn!("Collector {} failed: {}", name, e);
                    outcome.failures.push(CollectorFailure {
                        name,
                        error_type: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        outcome
    }
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn forced_failures_from_env(names: &[&'static str]) -> BTreeSet<String> {
    names
        .iter()
        .filter(|name| {
            std::env::var(format!("{FAIL_ENV_PREFIX}{}", name.to_uppercase()))
                .map(|v| v == "1")
                .unwrap_or(false)
        })
        .map(|name| name.to_string())
        .collect()
}

/// Insert helper used by collector implementations
pub(crate) fn put(signals: &mut Signals, name: &str, value: impl Into<SignalValue>) {
    signals.insert(name.to_string(), value.into());
}
