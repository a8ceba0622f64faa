use crate::error::exit;
use crate::summarize::NodeSummary;
use nodehealth_contracts::Health;

/// Post-summary narrowing. All set criteria must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub only_degraded: bool,
    pub only_unhealthy: bool,
    pub min_degraded_count: Option<usize>,
    pub node_id: Option<String>,
}

/// Nodes to render plus the process exit code
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub nodes: Vec<NodeSummary>,
    pub exit_code: u8,
}

impl Filters {
    pub fn has_health_filter(&self) -> bool {
        self.only_degraded || self.only_unhealthy || self.min_degraded_count.is_some()
    }

    fn node_matches(&self, summary: &NodeSummary) -> bool {
        self.node_id.as_deref().map_or(true, |id| summary.node_id == id)
    }

    fn health_matches(&self, summary: &NodeSummary) -> bool {
        if self.only_degraded && summary.latest_health != Health::Degraded {
            return false;
        }
        if self.only_unhealthy && summary.latest_health != Health::Unhealthy {
            return false;
        }
        self.min_degraded_count
            .map_or(true, |k| summary.degraded_count_tail >= k)
    }

    /// Narrow `summaries` and derive the exit code. With a health filter the
    /// code reflects what survived; otherwise it reflects the whole fleet,
    /// whatever `node_id` selects for display.
    pub fn apply(&self, summaries: Vec<NodeSummary>) -> Filtered {
        let fleet_code = exit_code_for(&summaries);
        let scoped: Vec<NodeSummary> = summaries
            .into_iter()
            .filter(|s| self.node_matches(s))
            .collect();

        if !self.has_health_filter() {
            return Filtered { nodes: scoped, exit_code: fleet_code };
        }

        let nodes: Vec<NodeSummary> = scoped
            .into_iter()
            .filter(|s| self.health_matches(s))
            .collect();
        let exit_code = exit_code_for(&nodes);
        Filtered { nodes, exit_code }
    }
}

/// 3 if any node is UNHEALTHY, else 2 if any is DEGRADED, else 0
pub fn exit_code_for(summaries: &[NodeSummary]) -> u8 {
    match summaries.iter().map(|s| s.latest_health).max() {
        Some(Health::Unhealthy) => exit::UNHEALTHY,
        Some(Health::Degraded) => exit::DEGRADED,
        _ => exit::OK,
    }
}
