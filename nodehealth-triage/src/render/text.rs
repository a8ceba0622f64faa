use super::utils::join_reason_counts;
use super::Renderer;
use crate::error::TriageError;
use crate::summarize::{NodeSummary, SummaryMeta};
use nodehealth_contracts::Health;

/// Script-safe `key=value` lines: a header block, then one block per node
/// separated by a blank line. `computed_at` is left out so equal spools diff
/// clean between runs.
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn name(&self) -> &'static str {
        "text"
    }

    fn render(&self, summaries: &[NodeSummary], meta: &SummaryMeta) -> Result<String, TriageError> {
        let mut lines = header(meta);

        for s in summaries {
            let current_reasons = if s.latest_health == Health::Ok || s.current_reasons.is_empty() {
                "none".to_string()
            } else {
                s.current_reasons.join(", ")
            };

            lines.push(String::new());
            lines.push(format!("node_id={}", s.node_id));
            lines.push(format!("current_boot_id={}", s.current_boot_id));
            lines.push(format!("latest_health={}", s.latest_health));
            lines.push(format!("latest_seq={}", s.latest_seq));
            lines.push(format!("latest_emitted_at={}", s.latest_emitted_at));
            lines.push(format!("reports_seen_tail={}", s.reports_seen_tail));
            lines.push(format!("degraded_count_tail={}", s.degraded_count_tail));
            lines.push(format!("unhealthy_count_tail={}", s.unhealthy_count_tail));
            lines.push(format!("top_reasons_tail={}", join_reason_counts(&s.top_reasons_tail)));
            lines.push(format!("current_reasons={current_reasons}"));
        }

        Ok(lines.join("\n"))
    }
}

fn header(meta: &SummaryMeta) -> Vec<String> {
    let mut lines = vec![format!("schema_version={}", meta.schema_version)];
    if let Some(path) = &meta.spool_path {
        lines.push(format!("spool_path={path}"));
    }
    if let Some(dir) = &meta.spool_dir {
        lines.push(format!("spool_dir={dir}"));
    }
    if let Some(glob) = &meta.glob {
        lines.push(format!("glob={glob}"));
    }
    lines.push(format!("tail_n={}", meta.tail_n));
    if let Some(files) = meta.files_seen {
        lines.push(format!("files_seen={files}"));
    }
    lines.push(format!("nodes_seen_tail={}", meta.nodes_seen_tail));
    lines.push(format!("nodes_emitted={}", meta.nodes_emitted));
    lines.push(format!("reports_parsed={}", meta.reports_parsed));
    lines.push(format!("reports_invalid={}", meta.reports_invalid));
    if let Some(total) = meta.reports_invalid_total {
        lines.push(format!("reports_invalid_total={total}"));
    }
    lines
}
