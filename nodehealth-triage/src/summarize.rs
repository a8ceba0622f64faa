/**
 * SUMMARIZER - per-node and fleet aggregation over a tail window
 *
 * Threshold-free: counts use each record's own `assessment.health`, never a
 * re-evaluation. Output is recomputed on every invocation and sorted by
 * node_id so renderers stay byte-deterministic.
 */

use crate::read::FileTail;
use nodehealth_contracts::{Health, HealthReport, Signals};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const TRIAGE_SCHEMA_VERSION: &str = "1";
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node_id: String,
    pub current_boot_id: String,
    pub latest_health: Health,
    pub latest_seq: u64,
    pub latest_emitted_at: String,
    pub current_reasons: Vec<String>,
    pub reports_seen_tail: usize,
    pub degraded_count_tail: usize,
    pub unhealthy_count_tail: usize,
    pub top_reasons_tail: Vec<ReasonCount>,
    #[serde(default)]
    pub latest_signals: Signals,
}

impl NodeSummary {
    pub fn signal(&self, name: &str) -> Option<f64> {
        self.latest_signals.get(name).and_then(|v| v.as_f64())
    }
}

/// Header block shared by every renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMeta {
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spool_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spool_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
    pub tail_n: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_seen: Option<usize>,
    pub nodes_seen_tail: usize,
    pub nodes_emitted: usize,
    pub reports_parsed: usize,
    pub reports_invalid: usize,
    /// Directory mode only: invalid records summed over every matched file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports_invalid_total: Option<usize>,
    pub computed_at: String,
}

impl SummaryMeta {
    pub fn for_spool(path: &Path, tail_n: usize, computed_at: String) -> Self {
        Self::new(tail_n, computed_at).with_spool_path(path)
    }

    pub fn for_dir(dir: &Path, glob: &str, tail_n: usize, files_seen: usize, computed_at: String) -> Self {
        let mut meta = Self::new(tail_n, computed_at);
        meta.spool_dir = Some(dir.display().to_string());
        meta.glob = Some(glob.to_string());
        meta.files_seen = Some(files_seen);
        meta
    }

    fn new(tail_n: usize, computed_at: String) -> Self {
        Self {
            schema_version: TRIAGE_SCHEMA_VERSION.to_string(),
            spool_path: None,
            spool_dir: None,
            glob: None,
            tail_n,
            files_seen: None,
            nodes_seen_tail: 0,
            nodes_emitted: 0,
            reports_parsed: 0,
            reports_invalid: 0,
            reports_invalid_total: None,
            computed_at,
        }
    }

    fn with_spool_path(mut self, path: &Path) -> Self {
        self.spool_path = Some(path.display().to_string());
        self
    }
}

/// Full triage result, serialized as `{meta, nodes}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub meta: SummaryMeta,
    pub nodes: Vec<NodeSummary>,
}

/// Summarize the records of a single node. `records` must be non-empty.
fn summarize_node(node_id: &str, records: &[&HealthReport], top_k: usize) -> Option<NodeSummary> {
    // Greatest seq wins; on equal seq the later record does
    let latest = records
        .iter()
        .copied()
        .reduce(|best, r| if r.seq() >= best.seq() { r } else { best })?;

    let mut degraded = 0;
    let mut unhealthy = 0;
    let mut reason_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        match record.health() {
            Health::Degraded => degraded += 1,
            Health::Unhealthy => unhealthy += 1,
            Health::Ok => {}
        }
        for reason in &record.assessment.reasons {
            *reason_counts.entry(reason.as_str()).or_default() += 1;
        }
    }

    Some(NodeSummary {
        node_id: node_id.to_string(),
        current_boot_id: latest.identity.boot_id.clone(),
        latest_health: latest.health(),
        latest_seq: latest.seq(),
        latest_emitted_at: latest.timing.emitted_at.clone(),
        current_reasons: latest.assessment.reasons.clone(),
        reports_seen_tail: records.len(),
        degraded_count_tail: degraded,
        unhealthy_count_tail: unhealthy,
        top_reasons_tail: top_reasons(reason_counts, top_k),
        latest_signals: latest.signals.clone(),
    })
}

/// Count descending, then reason ascending; `top_k == 0` keeps everything
fn top_reasons(counts: BTreeMap<&str, usize>, top_k: usize) -> Vec<ReasonCount> {
    let mut ordered: Vec<(&str, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    if top_k > 0 {
        ordered.truncate(top_k);
    }
    ordered
        .into_iter()
        .map(|(reason, count)| ReasonCount {
            reason: reason.to_string(),
            count,
        })
        .collect()
}

/// Group by node_id and summarize each group, sorted by node_id
pub fn summarize_by_node<'a>(
    reports: impl IntoIterator<Item = &'a HealthReport>,
    top_k: usize,
) -> Vec<NodeSummary> {
    let mut by_node: BTreeMap<&str, Vec<&HealthReport>> = BTreeMap::new();
    for report in reports {
        by_node.entry(report.node_id()).or_default().push(report);
    }

    by_node
        .into_iter()
        .filter_map(|(node_id, records)| summarize_node(node_id, &records, top_k))
        .collect()
}

/// Merge every file's tail, grouping records of the same node across files
pub fn summarize_fleet(files: &[FileTail], top_k: usize) -> Vec<NodeSummary> {
    summarize_by_node(files.iter().flat_map(|f| f.tail.reports.iter()), top_k)
}
