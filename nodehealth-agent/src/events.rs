//! Structured diagnostic events on stdout
//!
//! One compact JSON object per line with sorted keys. Every event carries
//! `event_type`, `utc_now` and `agent_version`. The vocabulary is closed:
//! adding an event means adding an `AgentEvent` variant.
//!
//! Human-oriented logs go through `tracing` to stderr; these events are the
//! machine-ingestible channel.

use crate::report::{format_timestamp, AGENT_VERSION};
use chrono::Utc;
use nodehealth_contracts::{Health, HealthReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use tracing::warn;

pub const MESSAGE_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Run,
    Oneshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    IterationLimit,
    Signal,
    Error,
}

/// Per-tick timings and outcome, flattened into `agent_tick`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickStats {
    pub mode: RunMode,
    pub interval_s: f64,
    pub tick_elapsed_ms: u64,
    pub collect_elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emit_elapsed_ms: Option<u64>,
    pub sleep_ms: u64,
    pub overrun: bool,
    pub reports_emitted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_emit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_persist_failed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentStart {
        node_id: String,
        boot_id: String,
        mode: RunMode,
        interval_s: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        iterations: Option<u64>,
        spool_path: String,
        state_path: String,
        next_seq: u64,
    },
    AgentTick(TickStats),
    HealthReportEmitted {
        node_id: String,
        seq: u64,
        health: Health,
        reasons: Vec<String>,
        bytes: usize,
        spool_path: String,
    },
    CollectorFailed {
        collector: String,
        error_type: String,
        message: String,
    },
    SpoolWriteFailed {
        spool_path: String,
        seq: u64,
        error_type: String,
        message: String,
    },
    SpoolRotated {
        old_path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_path: Option<String>,
        max_bytes: u64,
        rotate_count: u32,
    },
    AgentShutdown {
        reason: ShutdownReason,
        ticks: u64,
        reports_emitted: u64,
    },
}

impl AgentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::AgentStart { .. } => "agent_start",
            AgentEvent::AgentTick(_) => "agent_tick",
            AgentEvent::HealthReportEmitted { .. } => "health_report_emitted",
            AgentEvent::CollectorFailed { .. } => "collector_failed",
            AgentEvent::SpoolWriteFailed { .. } => "spool_write_failed",
            AgentEvent::SpoolRotated { .. } => "spool_rotated",
            AgentEvent::AgentShutdown { .. } => "agent_shutdown",
        }
    }
}

/// Cap a message at `MESSAGE_LIMIT` chars
pub fn truncate_message(message: &str) -> String {
    let total = message.chars().count();
    if total <= MESSAGE_LIMIT {
        return message.to_string();
    }
    let kept: String = message.chars().take(MESSAGE_LIMIT).collect();
    format!("{kept}...[truncated {} chars]", total - MESSAGE_LIMIT)
}

/// Render one event as a compact, key-sorted JSON line (no trailing newline)
pub fn to_json_line(event: &AgentEvent) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(event)?;

    if let Value::Object(map) = &mut value {
        map.insert("utc_now".into(), Value::String(format_timestamp(Utc::now())));
        map.insert("agent_version".into(), Value::String(AGENT_VERSION.into()));
        if let Some(Value::String(message)) = map.get_mut("message") {
            *message = truncate_message(message);
        }
    }

    serde_json::to_string(&value)
}

/// Destination for diagnostic events
pub trait EventSink {
    fn emit(&mut self, event: &AgentEvent);

    /// Echo a report that reached the spool. Ignored unless overridden.
    fn echo_report(&mut self, _report: &HealthReport) {}
}

#[derive(Debug, Default)]
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&mut self, event: &AgentEvent) {
        let line = match to_json_line(event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Could not serialize {} event: {}", event.event_type(), e);
                return;
            }
        };

        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
            warn!("Could not write {} event: {}", event.event_type(), e);
        }
    }

    fn echo_report(&mut self, report: &HealthReport) {
        let line = match serde_json::to_string(report) {
            Ok(line) => line,
            Err(e) => {
                warn!("Could not serialize report seq {}: {}", report.seq(), e);
                return;
            }
        };

        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
            warn!("Could not echo report seq {}: {}", report.seq(), e);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_untouched() {
        assert_eq!(truncate_message("disk unavailable"), "disk unavailable");
    }

    #[test]
    fn test_long_message_truncated() {
        let long = "x".repeat(250);
        let out = truncate_message(&long);
        assert!(out.starts_with(&"x".repeat(200)));
        assert!(out.ends_with("...[truncated 50 chars]"));
    }

    #[test]
    fn test_event_line_has_required_fields_and_sorted_keys() {
        let event = AgentEvent::CollectorFailed {
            collector: "cpu".into(),
            error_type: "simulated".into(),
            message: "m".repeat(300),
        };
        let line = to_json_line(&event).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["event_type"], "collector_failed");
        assert_eq!(value["agent_version"], AGENT_VERSION);
        assert!(value["utc_now"].as_str().unwrap().ends_with("+00:00"));
        assert!(value["message"].as_str().unwrap().contains("[truncated 100 chars]"));

        // serde_json maps are ordered by key
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(line.find("\"agent_version\"").unwrap() < line.find("\"utc_now\"").unwrap());
    }

    #[test]
    fn test_tick_event_optional_fields() {
        let stats = TickStats {
            mode: RunMode::Run,
            interval_s: 30.0,
            tick_elapsed_ms: 12,
            collect_elapsed_ms: 10,
            sleep_ms: 29988,
            reports_emitted: 1,
            seq: Some(1),
            node_id: Some("node-a".into()),
            ..Default::default()
        };
        let value: Value = serde_json::from_str(&to_json_line(&AgentEvent::AgentTick(stats)).unwrap()).unwrap();

        assert_eq!(value["event_type"], "agent_tick");
        assert_eq!(value["mode"], "run");
        assert_eq!(value["overrun"], false);
        assert_eq!(value["seq"], 1);
        assert!(value.get("skip_emit").is_none());
        assert!(value.get("state_persist_failed").is_none());
    }

    #[test]
    fn test_event_type_matches_serialized_tag() {
        let event = AgentEvent::AgentShutdown {
            reason: ShutdownReason::IterationLimit,
            ticks: 2,
            reports_emitted: 2,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], event.event_type());
        assert_eq!(value["reason"], "iteration_limit");
    }
}
