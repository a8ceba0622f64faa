//! Health evaluation from collected signals
//!
//! Pure function of (signals, failed collectors, thresholds). Reason order is
//! part of the report contract: collector failures in registration order,
//! then CPU, memory and disk checks.

use crate::collectors::CollectorOutcome;
use nodehealth_contracts::{percent, reason, signal, Assessment, Health, Signals, Thresholds};

pub fn evaluate(outcome: &CollectorOutcome, thresholds: &Thresholds) -> Assessment {
    assess(&outcome.signals, &outcome.failed_names(), thresholds)
}

pub fn assess(signals: &Signals, failed: &[&str], thresholds: &Thresholds) -> Assessment {
    let mut reasons: Vec<String> = failed.iter().map(|name| reason::collector_failed(name)).collect();

    if let Some(tag) = check_cpu(signals, thresholds) {
        reasons.push(tag.to_string());
    }
    if let Some(tag) = check_memory(signals, thresholds) {
        reasons.push(tag.to_string());
    }
    if let Some(tag) = check_disk(signals, thresholds) {
        reasons.push(tag.to_string());
    }

    let health = if reasons.iter().any(|r| reason::is_critical(r)) {
        Health::Unhealthy
    } else if reasons.is_empty() {
        Health::Ok
    } else {
        Health::Degraded
    };

    Assessment { health, reasons }
}

fn value(signals: &Signals, name: &str) -> Option<f64> {
    signals.get(name).and_then(|v| v.as_f64())
}

fn check_cpu(signals: &Signals, t: &Thresholds) -> Option<&'static str> {
    let load = value(signals, signal::LOADAVG_1M)?;
    let cores = value(signals, signal::CPU_COUNT_LOGICAL).filter(|c| *c > 0.0)?;

    if load > cores * t.cpu_unhealthy_factor {
        Some(reason::CPU_CRITICAL)
    } else if load > cores * t.cpu_degraded_factor {
        Some(reason::CPU_HIGH)
    } else {
        None
    }
}

fn check_memory(signals: &Signals, t: &Thresholds) -> Option<&'static str> {
    let pct = percent(
        value(signals, signal::MEM_AVAILABLE)?,
        value(signals, signal::MEM_TOTAL)?,
    )?;

    if pct < t.mem_unhealthy_pct {
        Some(reason::MEM_AVAILABLE_CRITICAL)
    } else if pct < t.mem_degraded_pct {
        Some(reason::MEM_AVAILABLE_LOW)
    } else {
        None
    }
}

fn check_disk(signals: &Signals, t: &Thresholds) -> Option<&'static str> {
    let pct = percent(
        value(signals, signal::DISK_FREE)?,
        value(signals, signal::DISK_TOTAL)?,
    )?;

    if pct < t.disk_unhealthy_pct {
        Some(reason::DISK_FREE_CRITICAL)
    } else if pct < t.disk_degraded_pct {
        Some(reason::DISK_FREE_LOW)
    } else {
        None
    }
}
