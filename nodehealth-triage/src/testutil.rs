//! Fixture builders for triage tests

use nodehealth_contracts::{
    Assessment, Health, HealthReport, Identity, Meta, SignalValue, Signals, Timing,
};
use std::fs;
use std::path::{Path, PathBuf};

pub fn report(node: &str, seq: u64, health: Health, reasons: &[&str]) -> HealthReport {
    HealthReport {
        schema_version: "1".into(),
        identity: Identity {
            node_id: node.into(),
            boot_id: format!("{node}-boot"),
        },
        timing: Timing {
            seq,
            emitted_at: format!("2026-01-01T00:00:{:02}.000000+00:00", seq % 60),
        },
        signals: Signals::new(),
        assessment: Assessment {
            health,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
        },
        meta: Meta {
            schema_version: "1".into(),
            agent_version: "0.1.0".into(),
        },
    }
}

pub fn with_signals(mut report: HealthReport, pairs: &[(&str, SignalValue)]) -> HealthReport {
    for (name, value) in pairs {
        report.signals.insert(name.to_string(), *value);
    }
    report
}

pub fn line(report: &HealthReport) -> String {
    serde_json::to_string(report).unwrap()
}

/// Write reports as JSON lines into `dir/name`
pub fn write_spool(dir: &Path, name: &str, reports: &[HealthReport]) -> PathBuf {
    let path = dir.join(name);
    let body: String = reports.iter().map(|r| format!("{}\n", line(r))).collect();
    fs::write(&path, body).unwrap();
    path
}

/// Three node-a records, one degraded by a cpu collector failure
pub fn small_spool(dir: &Path) -> PathBuf {
    write_spool(
        dir,
        "spool_small.jsonl",
        &[
            report("node-a", 1, Health::Ok, &[]),
            report("node-a", 2, Health::Degraded, &["collector_failed:cpu"]),
            report("node-a", 3, Health::Ok, &[]),
        ],
    )
}
