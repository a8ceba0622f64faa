//! Agent loop: INIT -> TICK -> (TICK | SHUTDOWN)
//!
//! One tick runs collectors, evaluates, builds a report, appends it to the
//! spool and only then persists the next seq. A failed append is rolled back
//! and leaves seq untouched; if the rollback fails too the seq is skipped. `agent_shutdown` is emitted exactly once,
//! from `shutdown` or, failing that, from `Drop`.

use crate::collectors::CollectorRegistry;
use crate::config::AgentConfig;
use crate::evaluate::evaluate;
use crate::events::{AgentEvent, EventSink, RunMode, ShutdownReason, TickStats};
use crate::identity::NodeIdentity;
use crate::report::build_report;
use crate::spool::SpoolWriter;
use crate::state::{AgentState, StateStore};
use chrono::Utc;
use nodehealth_contracts::{HealthReport, Thresholds};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Result of a single tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub emitted: bool,
    pub sleep: Duration,
    pub stats: TickStats,
}

pub struct Agent<S: EventSink> {
    mode: RunMode,
    interval: Duration,
    interval_s: f64,
    iterations: Option<u64>,
    thresholds: Thresholds,
    identity: NodeIdentity,
    registry: CollectorRegistry,
    spool: SpoolWriter,
    max_bytes: u64,
    rotate_count: u32,
    emit_stdout: bool,
    state_store: StateStore,
    sink: S,
    next_seq: u64,
    ticks: u64,
    reports_emitted: u64,
    shutdown_emitted: bool,
}

impl<S: EventSink> Agent<S> {
    /// Load state, resolve identity, reconcile seq with the spool, emit `agent_start`
    pub fn init(config: &AgentConfig, mode: RunMode, registry: CollectorRegistry, mut sink: S) -> Self {
        let state_store = StateStore::new(&config.state.dir);
        let stored = state_store.load();
        let identity = NodeIdentity::resolve(config.agent.node_id.as_deref(), &config.state.dir);
        let spool = SpoolWriter::new(
            config.spool.path.clone(),
            config.spool.max_bytes,
            config.spool.rotate_count,
        );

        if let Some(state) = &stored {
            if state.boot_id != identity.boot_id {
                info!(
                    "Boot changed ({} -> {}), keeping seq {}",
                    state.boot_id, identity.boot_id, state.seq
                );
            }
        }

        let stored_next = stored.as_ref().map(|s| s.seq).unwrap_or(1);
        let spool_next = spool
            .last_seq(&identity.node_id)
            .map(|seq| seq + 1)
            .unwrap_or(1);
        let next_seq = stored_next.max(spool_next);
        if spool_next > stored_next {
            warn!(
                "State seq {} behind spool, resuming at {}",
                stored_next, next_seq
            );
        }

        sink.emit(&AgentEvent::AgentStart {
            node_id: identity.node_id.clone(),
            boot_id: identity.boot_id.clone(),
            mode,
            interval_s: config.agent.interval_s,
            iterations: config.agent.iterations,
            spool_path: config.spool.path.display().to_string(),
            state_path: state_store.path().display().to_string(),
            next_seq,
        });

        Self {
            mode,
            interval: config.interval(),
            interval_s: config.agent.interval_s,
            iterations: config.agent.iterations,
            thresholds: config.thresholds.clone(),
            identity,
            registry,
            spool,
            max_bytes: config.spool.max_bytes,
            rotate_count: config.spool.rotate_count,
            emit_stdout: config.agent.emit_stdout,
            state_store,
            sink,
            next_seq,
            ticks: 0,
            reports_emitted: 0,
            shutdown_emitted: false,
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn reports_emitted(&self) -> u64 {
        self.reports_emitted
    }

    /// Run one tick. `final_tick` suppresses the planned sleep.
    pub fn tick(&mut self, final_tick: bool) -> TickOutcome {
        let started = Instant::now();
        self.ticks += 1;

        let outcome = self.registry.collect_all();
        let collect_elapsed = started.elapsed();
        for failure in &outcome.failures {
            self.sink.emit(&AgentEvent::CollectorFailed {
                collector: failure.name.to_string(),
                error_type: failure.error_type.to_string(),
                message: failure.message.clone(),
            });
        }

        let mut stats = TickStats {
            mode: self.mode,
            interval_s: self.interval_s,
            collect_elapsed_ms: millis(collect_elapsed),
            node_id: Some(self.identity.node_id.clone()),
            ..Default::default()
        };

        let build_started = Instant::now();
        let assessment = evaluate(&outcome, &self.thresholds);
        let built = build_report(
            &self.identity,
            self.next_seq,
            outcome.signals,
            assessment,
            Utc::now(),
        );
        stats.build_elapsed_ms = Some(millis(build_started.elapsed()));

        let emitted = match built {
            Ok(report) => {
                let emit_started = Instant::now();
                let emitted = self.emit_report(&report, &mut stats);
                stats.emit_elapsed_ms = Some(millis(emit_started.elapsed()));
                emitted
            }
            Err(e) => {
                error!("Report for seq {} failed validation: {}", self.next_seq, e);
                false
            }
        };
        if !emitted {
            stats.skip_emit = Some(true);
        }

        let elapsed = started.elapsed();
        let sleep = if final_tick || self.mode == RunMode::Oneshot {
            Duration::ZERO
        } else {
            self.interval.saturating_sub(elapsed)
        };

        stats.tick_elapsed_ms = millis(elapsed);
        stats.sleep_ms = millis(sleep);
        stats.overrun = elapsed >= self.interval;
        stats.reports_emitted = self.reports_emitted;
        self.sink.emit(&AgentEvent::AgentTick(stats.clone()));

        if stats.overrun {
            warn!("Tick took {:?}, longer than interval {:?}", elapsed, self.interval);
        }

        TickOutcome { emitted, sleep, stats }
    }

    /// Rotate, append, then persist. Returns whether the report is durable.
    fn emit_report(&mut self, report: &HealthReport, stats: &mut TickStats) -> bool {
        let seq = report.seq();
        let spool_path = self.spool.path().display().to_string();

        let appended = self
            .spool
            .rotate_if_needed()
            .and_then(|rotation| {
                if let Some(rotation) = rotation {
                    self.sink.emit(&AgentEvent::SpoolRotated {
                        old_path: rotation.old_path.display().to_string(),
                        new_path: rotation.new_path.map(|p| p.display().to_string()),
                        max_bytes: self.max_bytes,
                        rotate_count: self.rotate_count,
                    });
                }
                self.spool.write(report)
            });

        let bytes = match appended {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Dropping report seq {}: {}", seq, e);
                if e.may_have_written() {
                    // The line may still be in the spool; never hand its seq out again
                    self.next_seq = seq + 1;
                    stats.seq = Some(seq);
                }
                self.sink.emit(&AgentEvent::SpoolWriteFailed {
                    spool_path,
                    seq,
                    error_type: e.kind().to_string(),
                    message: e.to_string(),
                });
                return false;
            }
        };

        // The line is durable: seq is consumed whether or not state persists
        self.next_seq = seq + 1;
        self.reports_emitted += 1;
        stats.seq = Some(seq);

        let state = AgentState {
            boot_id: self.identity.boot_id.clone(),
            seq: self.next_seq,
        };
        if let Err(e) = self.state_store.save(&state) {
            error!("Failed to persist state after seq {}: {}", seq, e);
            stats.state_persist_failed = Some(true);
        }

        if self.emit_stdout {
            self.sink.echo_report(report);
        }
        self.sink.emit(&AgentEvent::HealthReportEmitted {
            node_id: report.node_id().to_string(),
            seq,
            health: report.health(),
            reasons: report.assessment.reasons.clone(),
            bytes,
            spool_path,
        });
        debug!("Emitted seq {} ({} bytes)", seq, bytes);
        true
    }

    /// Tick until the iteration limit or a stop request
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> ShutdownReason {
        info!(
            "Agent loop started - node_id: {}, interval: {:?}",
            self.identity.node_id, self.interval
        );

        let reason = loop {
            if *stop.borrow() {
                break ShutdownReason::Signal;
            }

            let final_tick = self.iterations.is_some_and(|limit| self.ticks + 1 >= limit);
            let outcome = self.tick(final_tick);
            if final_tick {
                break ShutdownReason::IterationLimit;
            }

            if wait_or_stop(outcome.sleep, &mut stop).await {
                break ShutdownReason::Signal;
            }
        };

        self.shutdown(reason);
        reason
    }

    /// Emit `agent_shutdown` once
    pub fn shutdown(&mut self, reason: ShutdownReason) {
        if self.shutdown_emitted {
            return;
        }
        self.shutdown_emitted = true;
        info!(
            "Agent shutting down ({:?}) after {} ticks, {} reports",
            reason, self.ticks, self.reports_emitted
        );
        self.sink.emit(&AgentEvent::AgentShutdown {
            reason,
            ticks: self.ticks,
            reports_emitted: self.reports_emitted,
        });
    }
}

impl<S: EventSink> Drop for Agent<S> {
    fn drop(&mut self) {
        self.shutdown(ShutdownReason::Error);
    }
}

/// Sleep for `duration` unless a stop is requested first. Returns true on stop.
async fn wait_or_stop(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = stop.changed() => match changed {
                Ok(()) if *stop.borrow() => return true,
                Ok(()) => continue,
                Err(_) => {
                    // Sender gone: nobody can stop us during this sleep
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::FixedCollector;
    use crate::events::testing::MemorySink;
    use std::fs;
    use std::path::Path;

    fn config(root: &Path) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.agent.node_id = Some("node-test".into());
        config.agent.interval_s = 0.01;
        config.spool.path = root.join("spool").join("node_reports.jsonl");
        config.state.dir = root.join("state");
        config
    }

    fn registry() -> CollectorRegistry {
        let mut registry = CollectorRegistry::new();
        registry.register(FixedCollector::ok("heartbeat", &[("heartbeat_ok", true.into())]));
        registry.register(FixedCollector::failing("cpu"));
        registry.register(FixedCollector::ok(
            "disk",
            &[("disk_free", 50u64.into()), ("disk_total", 100u64.into())],
        ));
        registry
    }

    fn spool_seqs(path: &Path) -> Vec<u64> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<HealthReport>(l).unwrap().seq())
            .collect()
    }

    #[tokio::test]
    async fn test_run_until_iteration_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.agent.iterations = Some(3);
        let sink = MemorySink::default();

        let mut agent = Agent::init(&config, RunMode::Run, registry(), sink.clone());
        let (_tx, rx) = watch::channel(false);
        let reason = agent.run(rx).await;
        drop(agent);

        assert_eq!(reason, ShutdownReason::IterationLimit);
        assert_eq!(spool_seqs(&config.spool.path), vec![1, 2, 3]);
        assert_eq!(sink.of_type("agent_start").len(), 1);
        assert_eq!(sink.of_type("agent_tick").len(), 3);
        assert_eq!(sink.of_type("health_report_emitted").len(), 3);
        assert_eq!(sink.of_type("collector_failed").len(), 3);

        let shutdown = sink.of_type("agent_shutdown");
        assert_eq!(shutdown.len(), 1);
        assert_eq!(shutdown[0]["reason"], "iteration_limit");
        assert_eq!(shutdown[0]["reports_emitted"], 3);

        // Last tick does not plan a sleep
        let ticks = sink.of_type("agent_tick");
        assert_eq!(ticks[2]["sleep_ms"], 0);
    }

    #[tokio::test]
    async fn test_reports_carry_collector_failures() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut agent = Agent::init(&config, RunMode::Oneshot, registry(), MemorySink::default());
        assert!(agent.tick(true).emitted);

        let line = fs::read_to_string(&config.spool.path).unwrap();
        let report: HealthReport = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(report.assessment.reasons, vec!["collector_failed:cpu"]);
        assert!(!report.signals.contains_key("loadavg_1m"));
        assert_eq!(report.identity.node_id, "node-test");
    }

    #[tokio::test]
    async fn test_seq_continues_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.agent.iterations = Some(2);

        {
            let mut agent = Agent::init(&config, RunMode::Run, registry(), MemorySink::default());
            let (_tx, rx) = watch::channel(false);
            agent.run(rx).await;
        }

        let mut agent = Agent::init(&config, RunMode::Run, registry(), MemorySink::default());
        assert_eq!(agent.next_seq(), 3);
        agent.tick(true);
        assert_eq!(spool_seqs(&config.spool.path), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_spool_ahead_of_state_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        {
            let mut agent = Agent::init(&config, RunMode::Run, registry(), MemorySink::default());
            for _ in 0..5 {
                agent.tick(false);
            }
        }
        // Simulate a crash after append but before the state write
        StateStore::new(&config.state.dir)
            .save(&AgentState { boot_id: "old-boot".into(), seq: 2 })
            .unwrap();

        let agent = Agent::init(&config, RunMode::Run, registry(), MemorySink::default());
        assert_eq!(agent.next_seq(), 6);
    }

    #[tokio::test]
    async fn test_emit_stdout_echoes_spooled_reports() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        let sink = MemorySink::default();
        let mut agent = Agent::init(&config, RunMode::Run, registry(), sink.clone());
        agent.tick(true);
        assert!(sink.echoed().is_empty());

        config.agent.emit_stdout = true;
        let sink = MemorySink::default();
        let mut agent = Agent::init(&config, RunMode::Run, registry(), sink.clone());
        agent.tick(true);
        agent.tick(true);

        let echoed: Vec<u64> = sink.echoed().iter().map(|r| r.seq()).collect();
        assert_eq!(echoed, vec![2, 3]);
        assert_eq!(spool_seqs(&config.spool.path), vec![1, 2, 3]);

        // Nothing is echoed for a report that never reached the spool
        config.spool.path = dir.path().to_path_buf();
        let sink = MemorySink::default();
        let mut agent = Agent::init(&config, RunMode::Oneshot, registry(), sink.clone());
        assert!(!agent.tick(true).emitted);
        assert!(sink.echoed().is_empty());
    }

    #[tokio::test]
    async fn test_spool_failure_drops_report_without_consuming_seq() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        // A directory where the spool file should be
        config.spool.path = dir.path().to_path_buf();
        let sink = MemorySink::default();

        let mut agent = Agent::init(&config, RunMode::Oneshot, registry(), sink.clone());
        let outcome = agent.tick(true);

        assert!(!outcome.emitted);
        assert_eq!(outcome.stats.skip_emit, Some(true));
        assert_eq!(agent.next_seq(), 1);
        assert_eq!(agent.reports_emitted(), 0);
        assert_eq!(sink.of_type("spool_write_failed").len(), 1);
        assert_eq!(sink.of_type("health_report_emitted").len(), 0);
        assert_eq!(StateStore::new(&config.state.dir).load(), None);
    }

    #[tokio::test]
    async fn test_failed_sync_reuses_seq_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let sink = MemorySink::default();
        let mut agent = Agent::init(&config, RunMode::Run, registry(), sink.clone());

        assert!(agent.tick(false).emitted);
        agent.spool.faults.fail_sync = true;
        let outcome = agent.tick(false);
        assert!(!outcome.emitted);
        assert_eq!(agent.next_seq(), 2);
        assert!(agent.tick(false).emitted);

        assert_eq!(spool_seqs(&config.spool.path), vec![1, 2]);
        let failed = sink.of_type("spool_write_failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["error_type"], "sync");
    }

    #[tokio::test]
    async fn test_unrolled_append_skips_seq() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut agent = Agent::init(&config, RunMode::Run, registry(), MemorySink::default());

        agent.spool.faults.fail_sync = true;
        agent.spool.faults.fail_rollback = true;
        assert!(!agent.tick(false).emitted);
        assert_eq!(agent.next_seq(), 2);
        assert_eq!(agent.reports_emitted(), 0);

        assert!(agent.tick(false).emitted);
        let seqs = spool_seqs(&config.spool.path);
        let mut unique = seqs.clone();
        unique.dedup();
        assert_eq!(seqs, unique);
        assert_eq!(seqs.last(), Some(&2));
    }

    #[tokio::test]
    async fn test_state_persist_failure_still_advances_seq() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        // A regular file where the state directory should be
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        config.state.dir = blocker;
        let sink = MemorySink::default();

        let mut agent = Agent::init(&config, RunMode::Run, registry(), sink.clone());
        let first = agent.tick(false);
        let second = agent.tick(true);

        assert!(first.emitted && second.emitted);
        assert_eq!(first.stats.state_persist_failed, Some(true));
        assert_eq!(spool_seqs(&config.spool.path), vec![1, 2]);
        assert_eq!(sink.of_type("agent_tick")[0]["state_persist_failed"], true);
    }

    #[tokio::test]
    async fn test_tick_event_fields() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let sink = MemorySink::default();

        let mut agent = Agent::init(&config, RunMode::Run, registry(), sink.clone());
        agent.tick(false);

        let tick = &sink.of_type("agent_tick")[0];
        for field in [
            "mode",
            "interval_s",
            "tick_elapsed_ms",
            "collect_elapsed_ms",
            "build_elapsed_ms",
            "emit_elapsed_ms",
            "sleep_ms",
            "overrun",
            "reports_emitted",
            "seq",
            "node_id",
            "utc_now",
            "agent_version",
        ] {
            assert!(tick.get(field).is_some(), "missing {field}");
        }
        assert_eq!(tick["mode"], "run");
        assert_eq!(tick["seq"], 1);
        assert!(tick.get("skip_emit").is_none());
    }

    #[tokio::test]
    async fn test_rotation_emits_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.spool.max_bytes = 1;
        config.spool.rotate_count = 2;
        let sink = MemorySink::default();

        let mut agent = Agent::init(&config, RunMode::Run, registry(), sink.clone());
        agent.tick(false);
        agent.tick(false);

        let rotated = sink.of_type("spool_rotated");
        assert_eq!(rotated.len(), 1);
        assert!(rotated[0]["new_path"].as_str().unwrap().ends_with("node_reports.1.jsonl"));
        assert_eq!(spool_seqs(&config.spool.path), vec![2]);
    }

    #[tokio::test]
    async fn test_stop_signal_interrupts_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.agent.interval_s = 60.0;
        let sink = MemorySink::default();

        let mut agent = Agent::init(&config, RunMode::Run, registry(), sink.clone());
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let reason = tokio::time::timeout(Duration::from_secs(5), agent.run(rx))
            .await
            .unwrap();
        assert_eq!(reason, ShutdownReason::Signal);
        assert_eq!(agent.reports_emitted(), 1);
        drop(agent);

        let shutdown = sink.of_type("agent_shutdown");
        assert_eq!(shutdown.len(), 1);
        assert_eq!(shutdown[0]["reason"], "signal");
    }

    #[tokio::test]
    async fn test_drop_emits_shutdown_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let sink = MemorySink::default();

        let mut agent = Agent::init(&config, RunMode::Run, registry(), sink.clone());
        agent.tick(false);
        drop(agent);

        let shutdown = sink.of_type("agent_shutdown");
        assert_eq!(shutdown.len(), 1);
        assert_eq!(shutdown[0]["reason"], "error");
    }
}
