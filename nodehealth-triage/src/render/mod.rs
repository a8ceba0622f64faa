/**
 * RENDERERS - summary data to text, one registered name per format
 *
 * ROLE: every output format is a pure function over `(summaries, meta)`.
 * The registry is the catalogue the CLI consults for `--format` and
 * `formats`; names are unique and listed in sorted order.
 *
 * Equal input must give byte-identical output, so renderers never read the
 * clock or the environment and never iterate unordered maps.
 */

mod explain;
mod json;
mod pretty;
mod table;
mod text;
pub mod utils;

use crate::error::TriageError;
use crate::summarize::{NodeSummary, SummaryMeta};
use std::collections::BTreeMap;

pub use explain::ExplainRenderer;
pub use json::JsonRenderer;
pub use pretty::PrettyRenderer;
pub use table::TableRenderer;
pub use text::TextRenderer;

pub const DEFAULT_FORMAT: &str = "text";

pub trait Renderer {
    /// Registry key, also the `--format` value
    fn name(&self) -> &'static str;

    fn render(&self, summaries: &[NodeSummary], meta: &SummaryMeta) -> Result<String, TriageError>;
}

pub struct RendererRegistry {
    renderers: BTreeMap<&'static str, Box<dyn Renderer + Send + Sync>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self {
            renderers: BTreeMap::new(),
        }
    }

    /// text, pretty, table, explain, json
    pub fn with_defaults() -> Result<Self, TriageError> {
        let mut registry = Self::new();
        registry.register(Box::new(TextRenderer))?;
        registry.register(Box::new(PrettyRenderer))?;
        registry.register(Box::new(TableRenderer))?;
        registry.register(Box::new(ExplainRenderer::default()))?;
        registry.register(Box::new(JsonRenderer))?;
        Ok(registry)
    }

    pub fn register(&mut self, renderer: Box<dyn Renderer + Send + Sync>) -> Result<(), TriageError> {
        let name = renderer.name();
        if self.renderers.contains_key(name) {
            return Err(TriageError::DuplicateRenderer(name.to_string()));
        }
        self.renderers.insert(name, renderer);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&(dyn Renderer + Send + Sync), TriageError> {
        self.renderers
            .get(name)
            .map(|r| r.as_ref())
            .ok_or_else(|| TriageError::UnknownFormat {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.renderers.keys().copied().collect()
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new()
    }
}
