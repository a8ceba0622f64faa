use super::utils::{format_gb, format_load, join_reason_counts};
use super::Renderer;
use crate::error::TriageError;
use crate::summarize::{NodeSummary, SummaryMeta};
use nodehealth_contracts::signal;

/// Operator blocks with GB and load units
pub struct PrettyRenderer;

impl Renderer for PrettyRenderer {
    fn name(&self) -> &'static str {
        "pretty"
    }

    fn render(&self, summaries: &[NodeSummary], _meta: &SummaryMeta) -> Result<String, TriageError> {
        let mut lines: Vec<String> = Vec::new();

        for s in summaries {
            let title = format!("NODE {}", s.node_id);
            let rule = "-".repeat(title.len());
            lines.push(title);
            lines.push(rule);
            lines.push(format!("Health: {}", s.latest_health));
            lines.push(format!("Seq: {}   Boot: {}", s.latest_seq, s.current_boot_id));
            lines.push(format!("Emitted: {}", s.latest_emitted_at));
            lines.push(String::new());

            lines.push(format!(
                "CPU load (1m/5m/15m): {} / {} / {}",
                format_load(s.signal(signal::LOADAVG_1M)),
                format_load(s.signal(signal::LOADAVG_5M)),
                format_load(s.signal(signal::LOADAVG_15M)),
            ));
            lines.push(format!("Disk free: {}", format_gb(s.signal(signal::DISK_FREE))));
            lines.push(format!(
                "Memory available: {}",
                format_gb(s.signal(signal::MEM_AVAILABLE))
            ));
            lines.push(String::new());

            lines.push(format!(
                "Degraded (tail): {} / {}",
                s.degraded_count_tail, s.reports_seen_tail
            ));
            lines.push(format!(
                "Unhealthy (tail): {} / {}",
                s.unhealthy_count_tail, s.reports_seen_tail
            ));
            lines.push(format!("Top reasons: {}", join_reason_counts(&s.top_reasons_tail)));
            lines.push(String::new());
        }

        Ok(lines.join("\n").trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::sample;

    #[test]
    fn test_pretty_units_and_missing_signals() {
        let (summaries, meta) = sample();
        let out = PrettyRenderer.render(&summaries, &meta).unwrap();

        assert!(out.starts_with("NODE node-a\n-----------\nHealth: OK\n"));
        assert!(out.contains("CPU load (1m/5m/15m): 0.75 / n/a / n/a"));
        assert!(out.contains("Disk free: 120 GB"));
        assert!(out.contains("Memory available: 6.0 GB"));
        assert!(out.contains("Top reasons: none"));

        let node_b = &out[out.find("NODE node-b").unwrap()..];
        assert!(node_b.contains("Disk free: n/a"));
        assert!(node_b.contains("Degraded (tail): 1 / 1"));
        assert!(node_b.ends_with("Top reasons: signal:cpu_high:1"));
    }
}
