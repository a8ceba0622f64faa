//! Classification thresholds and reason tags
//!
//! CPU is compared as a load-to-core ratio, memory and disk as percent of
//! capacity still available.

use serde::{Deserialize, Serialize};

/// Reason tags written into `assessment.reasons`
pub mod reason {
    pub const CPU_HIGH: &str = "signal:cpu_high";
    pub const CPU_CRITICAL: &str = "signal:cpu_critical";
    pub const MEM_AVAILABLE_LOW: &str = "signal:mem_available_low";
    pub const MEM_AVAILABLE_CRITICAL: &str = "signal:mem_available_critical";
    pub const DISK_FREE_LOW: &str = "signal:disk_free_low";
    pub const DISK_FREE_CRITICAL: &str = "signal:disk_free_critical";

    pub const COLLECTOR_FAILED_PREFIX: &str = "collector_failed:";

    pub fn collector_failed(name: &str) -> String {
        format!("{COLLECTOR_FAILED_PREFIX}{name}")
    }

    /// Unhealthy-tier threshold tags
    pub fn is_critical(tag: &str) -> bool {
        matches!(tag, CPU_CRITICAL | MEM_AVAILABLE_CRITICAL | DISK_FREE_CRITICAL)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// load_1m > cores * factor => degraded
    pub cpu_degraded_factor: f64,
    /// load_1m > cores * factor => unhealthy
    pub cpu_unhealthy_factor: f64,
    /// available memory % below this => degraded
    pub mem_degraded_pct: f64,
    pub mem_unhealthy_pct: f64,
    /// free disk % below this => degraded
    pub disk_degraded_pct: f64,
    pub disk_unhealthy_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_degraded_factor: 0.85,
            cpu_unhealthy_factor: 1.25,
            mem_degraded_pct: 15.0,
            mem_unhealthy_pct: 8.0,
            disk_degraded_pct: 10.0,
            disk_unhealthy_pct: 5.0,
        }
    }
}

/// `available / total` as a percentage; `None` when capacity is unknown
pub fn percent(available: f64, total: f64) -> Option<f64> {
    if total <= 0.0 {
        return None;
    }
    Some(available / total * 100.0)
}
