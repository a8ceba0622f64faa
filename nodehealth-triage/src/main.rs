/**
 * NODEHEALTH TRIAGE - operator queries over agent spools
 *
 * ROLE: bounded tail reads, per-node and fleet summaries, pluggable output
 * formats. Synchronous and stateless: every invocation recomputes from the
 * spool tail.
 *
 * EXIT CODES: 0 healthy, 2 degraded, 3 unhealthy (over the filtered or
 * node-scoped set), 64 usage, 65 data, 66 input. Only renderer output goes
 * to stdout; diagnostics go to stderr.
 */

mod error;
mod filter;
mod read;
mod render;
mod summarize;
#[cfg(test)]
mod testutil;

use crate::error::{exit, TriageError};
use crate::filter::Filters;
use crate::render::{RendererRegistry, DEFAULT_FORMAT};
use crate::summarize::{summarize_by_node, summarize_fleet, NodeSummary, SummaryMeta, DEFAULT_TOP_K};

use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nodehealth-triage", version, about = "Triage NodeHealth spools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Count valid records in the spool tail and show the newest seq
    Tail {
        #[arg(long, default_value = "spool/node_reports.jsonl")]
        spool: PathBuf,
        #[arg(long, default_value_t = 50)]
        n: usize,
    },
    /// Summarize one spool per node
    Summarize {
        #[arg(long, default_value = "spool/node_reports.jsonl")]
        spool: PathBuf,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Summarize every matching spool in a directory as one fleet
    SummarizeDir {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value = "*.jsonl")]
        glob: String,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// List registered output formats
    Formats,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Records to read from the end of each spool
    #[arg(long, default_value_t = 200)]
    tail: usize,
    #[arg(long, default_value = DEFAULT_FORMAT)]
    format: String,
    /// Reasons listed per node; 0 lists all
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k_reasons: usize,
    #[command(flatten)]
    filters: FilterArgs,
}

#[derive(Debug, Args)]
struct FilterArgs {
    /// Keep nodes whose latest health is DEGRADED
    #[arg(long)]
    only_degraded: bool,
    /// Keep nodes whose latest health is UNHEALTHY
    #[arg(long)]
    only_unhealthy: bool,
    /// Keep nodes with at least K degraded records in the tail
    #[arg(long, value_name = "K")]
    min_degraded_count: Option<usize>,
    /// Keep only this node_id
    #[arg(long = "node", value_name = "ID")]
    node_id: Option<String>,
}

impl From<FilterArgs> for Filters {
    fn from(args: FilterArgs) -> Self {
        Filters {
            only_degraded: args.only_degraded,
            only_unhealthy: args.only_unhealthy,
            min_degraded_count: args.min_degraded_count,
            node_id: args.node_id,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nodehealth_triage=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not usage errors
            let code = if e.use_stderr() { exit::USAGE } else { exit::OK };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let stdout = std::io::stdout();
    match execute(cli, &mut stdout.lock()) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("nodehealth-triage: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Run one command, writing its output to `out`; returns the exit code
fn execute(cli: Cli, out: &mut impl Write) -> Result<u8, TriageError> {
    match cli.command {
        Command::Tail { spool, n } => {
            let read = read::tail(&spool, n)?;
            let last_seq = read
                .reports
                .last()
                .map_or_else(|| "unknown".to_string(), |r| r.seq().to_string());
            let body = format!(
                "reports_parsed={}\nreports_invalid={}\nlast_seq={last_seq}",
                read.reports.len(),
                read.invalid
            );
            emit(out, &body)?;
            Ok(exit::OK)
        }
        Command::Summarize { spool, query } => {
            let registry = RendererRegistry::with_defaults()?;
            registry.get(&query.format)?;

            let read = read::tail(&spool, query.tail)?;
            if read.invalid > 0 {
                warn!("{}: {} invalid records in tail", spool.display(), read.invalid);
            }
            let summaries = summarize_by_node(&read.reports, query.top_k_reasons);

            let mut meta = SummaryMeta::for_spool(&spool, query.tail, computed_at());
            meta.reports_parsed = read.reports.len();
            meta.reports_invalid = read.invalid;
            finish(&registry, query, summaries, meta, out)
        }
        Command::SummarizeDir { dir, glob, query } => {
            let registry = RendererRegistry::with_defaults()?;
            registry.get(&query.format)?;

            let files = read::read_dir(&dir, &glob, query.tail)?;
            info!("{} files matched {} in {}", files.len(), glob, dir.display());
            let summaries = summarize_fleet(&files, query.top_k_reasons);

            let mut meta = SummaryMeta::for_dir(&dir, &glob, query.tail, files.len(), computed_at());
            meta.reports_parsed = files.iter().map(|f| f.tail.reports.len()).sum();
            meta.reports_invalid = files.iter().map(|f| f.tail.invalid).sum();
            meta.reports_invalid_total = Some(meta.reports_invalid);
            if meta.reports_invalid > 0 {
                warn!("{}: {} invalid records across tails", dir.display(), meta.reports_invalid);
            }
            finish(&registry, query, summaries, meta, out)
        }
        Command::Formats => {
            let registry = RendererRegistry::with_defaults()?;
            emit(out, &registry.names().join("\n"))?;
            Ok(exit::OK)
        }
    }
}

/// Filter, fill in node counts, render
fn finish(
    registry: &RendererRegistry,
    query: QueryArgs,
    summaries: Vec<NodeSummary>,
    mut meta: SummaryMeta,
    out: &mut impl Write,
) -> Result<u8, TriageError> {
    meta.nodes_seen_tail = summaries.len();
    let filtered = Filters::from(query.filters).apply(summaries);
    meta.nodes_emitted = filtered.nodes.len();

    let rendered = registry.get(&query.format)?.render(&filtered.nodes, &meta)?;
    emit(out, &rendered)?;
    Ok(filtered.exit_code)
}

fn emit(out: &mut impl Write, body: &str) -> Result<(), TriageError> {
    writeln!(out, "{body}")
        .and_then(|_| out.flush())
        .map_err(TriageError::Output)
}

fn computed_at() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}
