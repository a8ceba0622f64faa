//! Report builder: assembles one `HealthReport` per tick

use crate::identity::NodeIdentity;
use chrono::{DateTime, SecondsFormat, Utc};
use nodehealth_contracts::{
    Assessment, HealthReport, Identity, Meta, ReportError, Signals, Timing, SCHEMA_VERSION,
};

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// UTC RFC 3339 with microseconds and an explicit `+00:00` offset
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn build_report(
    identity: &NodeIdentity,
    seq: u64,
    signals: Signals,
    assessment: Assessment,
    emitted_at: DateTime<Utc>,
) -> Result<HealthReport, ReportError> {
    let report = HealthReport {
        schema_version: SCHEMA_VERSION.to_string(),
        identity: Identity {
            node_id: identity.node_id.clone(),
            boot_id: identity.boot_id.clone(),
        },
        timing: Timing {
            seq,
            emitted_at: format_timestamp(emitted_at),
        },
        signals,
        assessment,
        meta: Meta {
            schema_version: SCHEMA_VERSION.to_string(),
            agent_version: AGENT_VERSION.to_string(),
        },
    };
    report.validate()?;
    Ok(report)
}
