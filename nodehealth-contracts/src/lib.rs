/*!
# NodeHealth Contracts - on-disk report contract

Shared between the agent (writer) and triage (reader):
- `HealthReport` envelope, one JSON object per spool line
- `Health` levels with severity ordering
- Signal names and reason tags
- Classification thresholds
*/

pub mod report;
pub mod thresholds;

pub use report::{
    signal, Assessment, Health, HealthReport, Identity, Meta, ReportError, SignalValue, Signals,
    Timing, SCHEMA_VERSION,
};
pub use thresholds::{reason, percent, Thresholds};
