use super::Renderer;
use crate::error::TriageError;
use crate::summarize::{NodeSummary, SummaryMeta};
use serde::Serialize;

/// Compact `{"meta":..,"nodes":[..]}`; field order follows struct order
pub struct JsonRenderer;

#[derive(Serialize)]
struct Payload<'a> {
    meta: &'a SummaryMeta,
    nodes: &'a [NodeSummary],
}

impl Renderer for JsonRenderer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn render(&self, summaries: &[NodeSummary], meta: &SummaryMeta) -> Result<String, TriageError> {
        Ok(serde_json::to_string(&Payload { meta, nodes: summaries })?)
    }
}
