//! Agent configuration
//!
//! Handles:
//! - TOML file at `--config` or the OS config dir
//! - Environment override for node identity
//! - CLI overrides
//!
//! Precedence: CLI flag > environment > file > defaults.

use crate::events::RunMode;
use anyhow::{bail, Context, Result};
use nodehealth_contracts::Thresholds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const NODE_ID_ENV: &str = "NODE_AGENT_NODE_ID";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub agent: AgentSection,
    pub spool: SpoolSection,
    pub state: StateSection,
    pub collectors: CollectorsSection,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub interval_s: f64,
    /// Stop after this many ticks; unset runs until signalled
    pub iterations: Option<u64>,
    pub node_id: Option<String>,
    pub mode: RunMode,
    /// Also print each spooled report line to stdout
    pub emit_stdout: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolSection {
    pub path: PathBuf,
    /// 0 disables rotation
    pub max_bytes: u64,
    pub rotate_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSection {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsSection {
    /// Filesystem measured by the disk collector
    pub disk_path: PathBuf,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            interval_s: 30.0,
            iterations: None,
            node_id: None,
            mode: RunMode::Run,
            emit_stdout: false,
        }
    }
}

impl Default for SpoolSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("spool/node_reports.jsonl"),
            max_bytes: 10 * 1024 * 1024,
            rotate_count: 5,
        }
    }
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("state"),
        }
    }
}

impl Default for CollectorsSection {
    fn default() -> Self {
        Self {
            disk_path: PathBuf::from("/"),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub interval_s: Option<f64>,
    pub iterations: Option<u64>,
    pub node_id: Option<String>,
    pub spool: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub emit_stdout: bool,
}

impl AgentConfig {
    /// Load from an explicit path (must exist) or the default location (optional)
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_file(path).await,
            None => {
                let path = Self::config_file_path()?;
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    Self::load_file(&path).await
                } else {
                    debug!("No config at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    async fn load_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: AgentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("nodehealth-agent");
        path.push("config.toml");
        Ok(path)
    }

    /// Apply environment overrides via `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup(NODE_ID_ENV).filter(|id| !id.trim().is_empty()) {
            self.agent.node_id = Some(id);
        }
    }

    pub fn apply_overrides(&mut self, cli: &CliOverrides) {
        if let Some(interval_s) = cli.interval_s {
            self.agent.interval_s = interval_s;
        }
        if let Some(iterations) = cli.iterations {
            self.agent.iterations = Some(iterations);
        }
        if let Some(node_id) = &cli.node_id {
            self.agent.node_id = Some(node_id.clone());
        }
        if let Some(spool) = &cli.spool {
            self.spool.path = spool.clone();
        }
        if let Some(dir) = &cli.state_dir {
            self.state.dir = dir.clone();
        }
        if cli.emit_stdout {
            self.agent.emit_stdout = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if Duration::try_from_secs_f64(self.agent.interval_s).is_err() || self.agent.interval_s <= 0.0 {
            bail!("agent.interval_s must be a positive number of seconds, got {}", self.agent.interval_s);
        }
        if self.agent.iterations == Some(0) {
            bail!("agent.iterations must be at least 1 when set");
        }
        if self.spool.path.as_os_str().is_empty() {
            bail!("spool.path must not be empty");
        }
        Ok(())
    }

    /// Tick interval; call after `validate`
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.agent.interval_s).unwrap_or(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.agent.interval_s, 30.0);
        assert_eq!(config.spool.path, PathBuf::from("spool/node_reports.jsonl"));
        assert_eq!(config.spool.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.spool.rotate_count, 5);
        assert_eq!(config.state.dir, PathBuf::from("state"));
        assert!(!config.agent.emit_stdout);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_path() {
        let path = AgentConfig::config_file_path().unwrap();
        assert!(path.to_string_lossy().contains("nodehealth-agent"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(
            &path,
            "[agent]\ninterval_s = 5.0\nmode = \"oneshot\"\n\n[spool]\nrotate_count = 2\n\n[thresholds]\ndisk_unhealthy_pct = 2.5\n",
        )
        .await
        .unwrap();

        let config = AgentConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.agent.interval_s, 5.0);
        assert_eq!(config.agent.mode, RunMode::Oneshot);
        assert_eq!(config.spool.rotate_count, 2);
        assert_eq!(config.spool.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.thresholds.disk_unhealthy_pct, 2.5);
        assert_eq!(config.thresholds.disk_degraded_pct, 10.0);
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = AgentConfig::load(Some(&dir.path().join("missing.toml"))).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let mut config = AgentConfig::default();
        config.agent.node_id = Some("from-file".into());

        config.apply_env(|key| (key == NODE_ID_ENV).then(|| "from-env".to_string()));
        assert_eq!(config.agent.node_id.as_deref(), Some("from-env"));

        config.apply_overrides(&CliOverrides {
            node_id: Some("from-cli".into()),
            iterations: Some(3),
            ..Default::default()
        });
        assert_eq!(config.agent.node_id.as_deref(), Some("from-cli"));
        assert_eq!(config.agent.iterations, Some(3));
    }

    #[test]
    fn test_emit_stdout_from_file_or_flag() {
        let config: AgentConfig = toml::from_str("[agent]\nemit_stdout = true\n").unwrap();
        assert!(config.agent.emit_stdout);

        let mut config = AgentConfig::default();
        config.apply_overrides(&CliOverrides::default());
        assert!(!config.agent.emit_stdout);
        config.apply_overrides(&CliOverrides { emit_stdout: true, ..Default::default() });
        assert!(config.agent.emit_stdout);
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let mut config = AgentConfig::default();
        config.apply_env(|_| Some("  ".to_string()));
        assert_eq!(config.agent.node_id, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AgentConfig::default();
        config.agent.interval_s = 0.0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.agent.interval_s = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.agent.iterations = Some(0);
        assert!(config.validate().is_err());
    }
}
