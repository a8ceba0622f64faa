//! Node identification for NodeHealth agents
//!
//! This module handles:
//! - node_id selection (explicit override > hostname > random fallback)
//! - boot_id detection tied to the host boot epoch
//!
//! Resolution never fails: every step has a fallback so agent startup is
//! never blocked on identity.

use std::path::Path;
use sysinfo::System;
use tracing::{debug, info, warn};

const LINUX_BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";

/// Cached boot id, used when the OS exposes neither boot_id nor boot time
const CACHED_BOOT_ID_FILE: &str = "boot_id";

/// Where an identity value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Override,
    Hostname,
    Random,
    LinuxProc,
    BootTime,
    StateCache,
}

#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub node_id: String,
    pub boot_id: String,
    pub node_source: IdentitySource,
    pub boot_source: IdentitySource,
}

impl NodeIdentity {
    /// Resolve identity. `override_id` is the already-merged CLI/env/config value.
    pub fn resolve(override_id: Option<&str>, state_dir: &Path) -> Self {
        let (node_id, node_source) = resolve_node_id(override_id, || {
            gethostname::gethostname().to_string_lossy().to_string()
        });
        let (boot_id, boot_source) = resolve_boot_id(state_dir);

        info!(
            "Identity resolved - node_id: {} ({:?}), boot_id: {} ({:?})",
            node_id, node_source, boot_id, boot_source
        );

        NodeIdentity {
            node_id,
            boot_id,
            node_source,
            boot_source,
        }
    }
}

fn resolve_node_id(
    override_id: Option<&str>,
    hostname: impl FnOnce() -> String,
) -> (String, IdentitySource) {
    if let Some(id) = override_id.map(str::trim).filter(|id| !id.is_empty()) {
        return (id.to_string(), IdentitySource::Override);
    }

    let host = hostname();
    let host = host.trim();
    if !host.is_empty() {
        return (host.to_string(), IdentitySource::Hostname);
    }

    let generated = format!("node-{}", uuid::Uuid::new_v4());
    warn!("Hostname unavailable, using generated node_id {}", generated);
    (generated, IdentitySource::Random)
}

fn resolve_boot_id(state_dir: &Path) -> (String, IdentitySource) {
    if let Some(id) = read_linux_boot_id() {
        return (id, IdentitySource::LinuxProc);
    }

    let boot_time = System::boot_time();
    if boot_time > 0 {
        return (format!("boot-{boot_time}"), IdentitySource::BootTime);
    }

    match read_or_create_cached_boot_id(state_dir) {
        Ok(id) => (id, IdentitySource::StateCache),
        Err(e) => {
            let id = uuid::Uuid::new_v4().to_string();
            warn!("Could not persist fallback boot_id ({}), using ephemeral {}", e, id);
            (id, IdentitySource::Random)
        }
    }
}

fn read_linux_boot_id() -> Option<String> {
    match std::fs::read_to_string(LINUX_BOOT_ID_PATH) {
        Ok(raw) => Some(raw.trim().to_string()).filter(|id| !id.is_empty()),
        Err(e) => {
            debug!("No Linux boot_id: {}", e);
            None
        }
    }
}

fn read_or_create_cached_boot_id(state_dir: &Path) -> std::io::Result<String> {
    let path = state_dir.join(CACHED_BOOT_ID_FILE);
    if let Ok(raw) = std::fs::read_to_string(&path) {
        let id = raw.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }

    std::fs::create_dir_all(state_dir)?;
    let id = uuid::Uuid::new_v4().to_string();
    std::fs::write(&path, format!("{id}\n"))?;
    Ok(id)
}
