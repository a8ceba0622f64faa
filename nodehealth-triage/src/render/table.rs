use super::utils::{format_gb_compact, format_load};
use super::Renderer;
use crate::error::TriageError;
use crate::summarize::{NodeSummary, SummaryMeta};
use nodehealth_contracts::signal;

const HEADERS: [&str; 7] = ["NODE", "HEALTH", "CPU1", "MEM_FREE", "DISK_FREE", "DEG", "UNH"];

/// One row per node, columns left-aligned to their widest cell
pub struct TableRenderer;

impl Renderer for TableRenderer {
    fn name(&self) -> &'static str {
        "table"
    }

    fn render(&self, summaries: &[NodeSummary], _meta: &SummaryMeta) -> Result<String, TriageError> {
        let mut rows: Vec<[String; 7]> = vec![HEADERS.map(str::to_string)];
        for s in summaries {
            rows.push([
                s.node_id.clone(),
                s.latest_health.to_string(),
                format_load(s.signal(signal::LOADAVG_1M)),
                format_gb_compact(s.signal(signal::MEM_AVAILABLE)),
                format_gb_compact(s.signal(signal::DISK_FREE)),
                s.degraded_count_tail.to_string(),
                s.unhealthy_count_tail.to_string(),
            ]);
        }

        let mut widths = [0usize; 7];
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let last = HEADERS.len() - 1;
        let lines: Vec<String> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(widths)
                    .enumerate()
                    .map(|(i, (cell, width))| {
                        if i == last {
                            cell.clone()
                        } else {
                            format!("{cell:<width$}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("  ")
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
