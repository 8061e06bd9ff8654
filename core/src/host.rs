//! Host capabilities injected into the hooks.
//!
//! Memory sampling, collection requests and process termination go through
//! these traits so the guards can run against fakes in tests.

use crate::error::{KrakenError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Process memory sample, in whole megabytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Resident set size
    pub rss: u64,
    /// Managed heap in use
    pub heap_used: u64,
    /// Memory held outside the managed heap
    pub external: u64,
    pub timestamp: DateTime<Utc>,
}

impl MemorySnapshot {
    /// Snapshot with only RSS known
    pub fn rss_only(rss: u64) -> Self {
        Self {
            rss,
            heap_used: 0,
            external: 0,
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for MemorySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RSS: {}MB | Heap: {}MB | External: {}MB",
            self.rss, self.heap_used, self.external
        )
    }
}

/// Round a byte count to whole megabytes
pub fn bytes_to_mb(bytes: u64) -> u64 {
    (bytes + BYTES_PER_MB / 2) / BYTES_PER_MB
}

/// Source of memory samples
pub trait MemoryProbe: Send + Sync {
    /// Take a memory sample
    fn snapshot(&self) -> Result<MemorySnapshot>;

    /// Ask the host to reclaim memory.
    ///
    /// Returns `false` when the host exposes no collector.
    fn collect_garbage(&self) -> bool {
        false
    }
}

/// Memory probe for the current process, backed by `sysinfo`.
///
/// Heap and external figures are not observable from outside the host
/// runtime and are reported as 0.
pub struct ProcessMemoryProbe {
    pid: Pid,
    sys: Mutex<System>,
}

impl ProcessMemoryProbe {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| KrakenError::MemoryProbeError(e.to_string()))?;
        Ok(Self::for_pid(pid))
    }

    /// Probe another process by PID
    pub fn for_pid(pid: Pid) -> Self {
        Self {
            pid,
            sys: Mutex::new(System::new()),
        }
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn snapshot(&self) -> Result<MemorySnapshot> {
        let mut sys = self.sys.lock();
        if !sys.refresh_process(self.pid) {
            return Err(KrakenError::MemoryProbeError(format!(
                "process {} not found",
                self.pid
            )));
        }

        let rss_bytes = sys
            .process(self.pid)
            .map(|p| p.memory())
            .ok_or_else(|| KrakenError::MemoryProbeError(format!("process {} vanished", self.pid)))?;

        Ok(MemorySnapshot::rss_only(bytes_to_mb(rss_bytes)))
    }
}

/// Ends the process on the memory guard's fatal path
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32);
}

/// Terminator that exits the current process
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, code: i32) {
        tracing::error!(code, "Exiting process");
        std::process::exit(code);
    }
}
