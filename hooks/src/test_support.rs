//! Fakes for the host capabilities

use kraken_core::{KrakenError, MemoryProbe, MemorySnapshot, Result, Terminator};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Probe reporting a settable RSS and counting calls
#[derive(Default)]
pub struct FakeProbe {
    pub rss: AtomicU64,
    /// RSS reported after a collection, when set
    pub rss_after_gc: Mutex<Option<u64>>,
    pub snapshots: AtomicU64,
    pub collections: AtomicU64,
    pub has_collector: AtomicBool,
    /// Snapshots fail while set
    pub failing: AtomicBool,
    /// Start failing snapshots once a collection runs
    pub fail_after_collection: AtomicBool,
}

impl FakeProbe {
    pub fn with_rss(rss: u64) -> Arc<Self> {
        Arc::new(Self {
            rss: AtomicU64::new(rss),
            ..Default::default()
        })
    }

    pub fn set_rss(&self, rss: u64) {
        self.rss.store(rss, Ordering::SeqCst);
    }

    pub fn fail_snapshots(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot_count(&self) -> u64 {
        self.snapshots.load(Ordering::SeqCst)
    }

    pub fn collection_count(&self) -> u64 {
        self.collections.load(Ordering::SeqCst)
    }
}

impl MemoryProbe for FakeProbe {
    fn snapshot(&self) -> Result<MemorySnapshot> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(KrakenError::MemoryProbeError("process not found".to_string()));
        }
        Ok(MemorySnapshot::rss_only(self.rss.load(Ordering::SeqCst)))
    }

    fn collect_garbage(&self) -> bool {
        self.collections.fetch_add(1, Ordering::SeqCst);
        if let Some(rss) = *self.rss_after_gc.lock() {
            self.set_rss(rss);
        }
        if self.fail_after_collection.load(Ordering::SeqCst) {
            self.fail_snapshots(true);
        }
        self.has_collector.load(Ordering::SeqCst)
    }
}

/// Terminator recording requested exit codes
#[derive(Default)]
pub struct RecordingTerminator {
    pub codes: Mutex<Vec<i32>>,
}

impl RecordingTerminator {
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().clone()
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, code: i32) {
        self.codes.lock().push(code);
    }
}
