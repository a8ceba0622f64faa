use super::utils::format_load;
use super::Renderer;
use crate::error::TriageError;
use crate::summarize::{NodeSummary, SummaryMeta};
use nodehealth_contracts::{percent, reason, signal, Thresholds};

/// One narrative per node. Each current reason names the threshold it
/// crossed and the margin, computed from the latest record's signals.
#[derive(Default)]
pub struct ExplainRenderer {
    thresholds: Thresholds,
}

impl ExplainRenderer {
    #[cfg(test)]
    pub fn with_thresholds(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    fn reason_line(&self, s: &NodeSummary, tag: &str) -> String {
        let t = &self.thresholds;
        match tag {
            reason::CPU_HIGH => cpu_line(s, "CPU load high", t.cpu_degraded_factor),
            reason::CPU_CRITICAL => cpu_line(s, "CPU load critical", t.cpu_unhealthy_factor),
            reason::MEM_AVAILABLE_LOW => capacity_line(
                "Memory available low",
                s.signal(signal::MEM_AVAILABLE),
                s.signal(signal::MEM_TOTAL),
                t.mem_degraded_pct,
            ),
            reason::MEM_AVAILABLE_CRITICAL => capacity_line(
                "Memory available critical",
                s.signal(signal::MEM_AVAILABLE),
                s.signal(signal::MEM_TOTAL),
                t.mem_unhealthy_pct,
            ),
            reason::DISK_FREE_LOW => capacity_line(
                "Disk free low",
                s.signal(signal::DISK_FREE),
                s.signal(signal::DISK_TOTAL),
                t.disk_degraded_pct,
            ),
            reason::DISK_FREE_CRITICAL => capacity_line(
                "Disk free critical",
                s.signal(signal::DISK_FREE),
                s.signal(signal::DISK_TOTAL),
                t.disk_unhealthy_pct,
            ),
            other => match other.strip_prefix(reason::COLLECTOR_FAILED_PREFIX) {
                Some(name) => format!("Collector failed: {name} (its signals are missing from this report)"),
                None => other.to_string(),
            },
        }
    }
}

fn cpu_line(s: &NodeSummary, label: &str, factor: f64) -> String {
    match (s.signal(signal::LOADAVG_1M), s.signal(signal::CPU_COUNT_LOGICAL)) {
        (Some(load), Some(cores)) if cores > 0.0 => {
            let limit = cores * factor;
            format!(
                "{label} ({} > {limit:.2} = {cores:.0} cores x {factor}, over by {:.2})",
                format_load(Some(load)),
                load - limit
            )
        }
        _ => label.to_string(),
    }
}

fn capacity_line(label: &str, available: Option<f64>, total: Option<f64>, threshold_pct: f64) -> String {
    match available.zip(total).and_then(|(a, t)| percent(a, t)) {
        Some(pct) => format!(
            "{label} ({pct:.1}% < {threshold_pct:.0}% threshold, short by {:.1} points)",
            threshold_pct - pct
        ),
        None => format!("{label} ({threshold_pct:.0}% threshold)"),
    }
}

impl Renderer for ExplainRenderer {
    fn name(&self) -> &'static str {
        "explain"
    }

    fn render(&self, summaries: &[NodeSummary], _meta: &SummaryMeta) -> Result<String, TriageError> {
        let mut lines: Vec<String> = Vec::new();

        for s in summaries {
            lines.push(format!("Node: {}", s.node_id));
            lines.push(format!("Status: {}", s.latest_health));
            lines.push(String::new());
            lines.push("Reasons:".to_string());
            if s.current_reasons.is_empty() {
                lines.push("- none".to_string());
            }
            for tag in &s.current_reasons {
                lines.push(format!("- {}", self.reason_line(s, tag)));
            }

            lines.push(String::new());
            lines.push("Tail Summary:".to_string());
            lines.push(format!("- Degraded: {} / {}", s.degraded_count_tail, s.reports_seen_tail));
            lines.push(format!("- Unhealthy: {} / {}", s.unhealthy_count_tail, s.reports_seen_tail));
            let most_frequent = s.top_reasons_tail.first().map_or("none", |r| r.reason.as_str());
            lines.push(format!("- Most frequent issue: {most_frequent}"));
            lines.push(String::new());
        }

        Ok(lines.join("\n").trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::sample;
    use crate::summarize::summarize_by_node;
    use crate::testutil::{report, with_signals};
    use nodehealth_contracts::{Health, SignalValue};

    fn explain_one(reasons: &[&str], signals: &[(&str, f64)]) -> String {
        let pairs: Vec<(&str, SignalValue)> =
            signals.iter().map(|(k, v)| (*k, SignalValue::from(*v))).collect();
        let r = with_signals(report("node-x", 1, Health::Unhealthy, reasons), &pairs);
        let summaries = summarize_by_node([&r], 5);
        let (_, meta) = sample();
        ExplainRenderer::default().render(&summaries, &meta).unwrap()
    }

    #[test]
    fn test_cpu_reason_cites_threshold_and_margin() {
        let out = explain_one(
            &[reason::CPU_CRITICAL],
            &[(signal::LOADAVG_1M, 5.5), (signal::CPU_COUNT_LOGICAL, 4.0)],
        );
        assert!(out.contains("- CPU load critical (5.50 > 5.00 = 4 cores x 1.25, over by 0.50)"));
    }

    #[test]
    fn test_capacity_reason_cites_threshold_and_margin() {
        let out = explain_one(
            &[reason::DISK_FREE_LOW],
            &[(signal::DISK_FREE, 8.0), (signal::DISK_TOTAL, 100.0)],
        );
        assert!(out.contains("- Disk free low (8.0% < 10% threshold, short by 2.0 points)"));

        let out = explain_one(&[reason::MEM_AVAILABLE_CRITICAL], &[]);
        assert!(out.contains("- Memory available critical (8% threshold)"));
    }

    #[test]
    fn test_collector_failure_and_unknown_tags() {
        let out = explain_one(&["collector_failed:cpu", "custom:thing"], &[]);
        assert!(out.contains("- Collector failed: cpu"));
        assert!(out.contains("- custom:thing"));
        assert!(out.contains("- Most frequent issue: collector_failed:cpu"));
    }

    #[test]
    fn test_healthy_node_narrative() {
        let (summaries, meta) = sample();
        let out = ExplainRenderer::default().render(&summaries[..1], &meta).unwrap();
        assert_eq!(
            out,
            "Node: node-a\nStatus: OK\n\nReasons:\n- none\n\nTail Summary:\n- Degraded: 0 / 1\n- Unhealthy: 0 / 1\n- Most frequent issue: none"
        );
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = Thresholds { disk_degraded_pct: 20.0, ..Thresholds::default() };
        let r = with_signals(
            report("n", 1, Health::Degraded, &[reason::DISK_FREE_LOW]),
            &[(signal::DISK_FREE, 15.0f64.into()), (signal::DISK_TOTAL, 100.0f64.into())],
        );
        let (_, meta) = sample();
        let out = ExplainRenderer::with_thresholds(thresholds)
            .render(&summarize_by_node([&r], 5), &meta)
            .unwrap();
        assert!(out.contains("(15.0% < 20% threshold, short by 5.0 points)"));
    }
}
