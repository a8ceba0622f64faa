//! System collectors backed by `sysinfo`
//!
//! - heartbeat: liveness of the collection pipeline itself
//! - cpu: 1/5/15 minute load averages (Unix) and logical core count
//! - memory: total and available bytes
//! - disk: capacity of the filesystem holding a configured path

use super::{put, Collector, CollectorError};
use nodehealth_contracts::{signal, Signals};
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};
use tracing::debug;

pub struct HeartbeatCollector;

impl Collector for HeartbeatCollector {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn collect(&self) -> Result<Signals, CollectorError> {
        let mut signals = Signals::new();
        put(&mut signals, signal::HEARTBEAT_OK, true);
        Ok(signals)
    }
}

pub struct CpuCollector;

impl Collector for CpuCollector {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn collect(&self) -> Result<Signals, CollectorError> {
        let mut sys = System::new();
        sys.refresh_cpu();
        let core_count = sys.cpus().len();

        // Load averages only exist on Unix
        let load = if cfg!(unix) {
            let load = System::load_average();
            Some([load.one, load.five, load.fifteen])
        } else {
            None
        };

        if core_count == 0 && load.is_none() {
            return Err(CollectorError::Unavailable("cpu metrics".into()));
        }

        let mut signals = Signals::new();
        if core_count > 0 {
            put(&mut signals, signal::CPU_COUNT_LOGICAL, core_count);
        }
        if let Some([one, five, fifteen]) = load {
            put(&mut signals, signal::LOADAVG_1M, one);
            put(&mut signals, signal::LOADAVG_5M, five);
            put(&mut signals, signal::LOADAVG_15M, fifteen);
        }
        Ok(signals)
    }
}

pub struct MemoryCollector;

impl Collector for MemoryCollector {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn collect(&self) -> Result<Signals, CollectorError> {
        let mut sys = System::new();
        sys.refresh_memory();

        let total = sys.total_memory();
        let available = sys.available_memory();
        if total == 0 {
            return Err(CollectorError::Unavailable("memory totals".into()));
        }

        let mut signals = Signals::new();
        put(&mut signals, signal::MEM_TOTAL, total);
        put(&mut signals, signal::MEM_AVAILABLE, available.min(total));
        Ok(signals)
    }
}

pub struct DiskCollector {
    path: PathBuf,
}

impl DiskCollector {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Collector for DiskCollector {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn collect(&self) -> Result<Signals, CollectorError> {
        let target = self.path.canonicalize()?;
        let disks = Disks::new_with_refreshed_list();

        // Deepest mount point containing the target wins
        let disk = disks
            .list()
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| mount_depth(d.mount_point()))
            .ok_or_else(|| {
                CollectorError::Unavailable(format!("filesystem for {}", target.display()))
            })?;

        let total = disk.total_space();
        let free = disk.available_space().min(total);
        if total == 0 {
            return Err(CollectorError::Unavailable(format!(
                "capacity of {}",
                disk.mount_point().display()
            )));
        }

        debug!(
            "Disk {} mounted at {}: {} free of {} bytes",
            disk.name().to_string_lossy(),
            disk.mount_point().display(),
            free,
            total
        );

        let mut signals = Signals::new();
        put(&mut signals, signal::DISK_TOTAL, total);
        put(&mut signals, signal::DISK_USED, total - free);
        put(&mut signals, signal::DISK_FREE, free);
        Ok(signals)
    }
}

fn mount_depth(path: &Path) -> usize {
    path.components().count()
}
