//! Memory guard
//!
//! Samples process RSS every `check_interval`-th tool call and escalates
//! through warning, critical and fatal levels. The fatal level ends the
//! process after a short grace delay.

use crate::hook::Hook;
use async_trait::async_trait;
use kraken_core::config::{hook_names, MemoryGuardConfig};
use kraken_core::{MemoryProbe, MemorySnapshot, Result, SessionEvent, Terminator, ToolInput, ToolOutput};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Escalation level for one RSS sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLevel {
    Normal,
    Warning,
    Critical,
    Fatal,
}

impl MemoryLevel {
    pub fn classify(rss_mb: u64, config: &MemoryGuardConfig) -> Self {
        if rss_mb >= config.kill_threshold_mb {
            MemoryLevel::Fatal
        } else if rss_mb >= config.critical_threshold_mb {
            MemoryLevel::Critical
        } else if rss_mb >= config.warning_threshold_mb {
            MemoryLevel::Warning
        } else {
            MemoryLevel::Normal
        }
    }
}

/// Result of one periodic check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCheck {
    pub snapshot: MemorySnapshot,
    pub level: MemoryLevel,
    /// Growth across the recent window, in whole percent
    pub growth_percent: i64,
    /// MB reclaimed by a collection, when above the reporting threshold
    pub freed_mb: Option<u64>,
}

/// Direction of RSS over the recorded history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTrend {
    Increased(u64),
    Decreased(u64),
    Stable,
}

impl std::fmt::Display for MemoryTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryTrend::Increased(mb) => write!(f, "increased by {}MB", mb),
            MemoryTrend::Decreased(mb) => write!(f, "decreased by {}MB", mb),
            MemoryTrend::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Default)]
struct GuardState {
    tool_count: u64,
    history: VecDeque<MemorySnapshot>,
}

pub struct MemoryGuard {
    config: MemoryGuardConfig,
    probe: Arc<dyn MemoryProbe>,
    terminator: Arc<dyn Terminator>,
    state: Mutex<GuardState>,
    shutdown_scheduled: AtomicBool,
}

impl MemoryGuard {
    pub fn new(
        config: MemoryGuardConfig,
        probe: Arc<dyn MemoryProbe>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        Self {
            config,
            probe,
            terminator,
            state: Mutex::new(GuardState::default()),
            shutdown_scheduled: AtomicBool::new(false),
        }
    }

    /// Tool calls observed so far
    pub fn tool_count(&self) -> u64 {
        self.state.lock().tool_count
    }

    /// Recorded samples, oldest first
    pub fn history(&self) -> Vec<MemorySnapshot> {
        self.state.lock().history.iter().copied().collect()
    }

    /// Forget the counter and history
    pub fn reset(&self) {
        *self.state.lock() = GuardState::default();
    }

    /// Growth between the first and last of the recent samples
    fn growth_percent(&self, history: &VecDeque<MemorySnapshot>) -> i64 {
        if history.len() < 2 {
            return 0;
        }
        let window = self.config.growth_window.max(2).min(history.len());
        let first = history[history.len() - window].rss;
        let last = history[history.len() - 1].rss;
        if first == 0 {
            return 0;
        }
        ((last as f64 - first as f64) / first as f64 * 100.0) as i64
    }

    /// Count a tool call and sample memory when the interval is reached
    pub fn record_tool(&self, session_id: &str) -> Result<Option<MemoryCheck>> {
        let tool_count = {
            let mut state = self.state.lock();
            state.tool_count += 1;
            state.tool_count
        };
        if tool_count % self.config.check_interval.max(1) != 0 {
            return Ok(None);
        }

        let snapshot = self.probe.snapshot()?;
        let growth_percent = {
            let mut state = self.state.lock();
            state.history.push_back(snapshot);
            while state.history.len() > self.config.max_history.max(1) {
                state.history.pop_front();
            }
            self.growth_percent(&state.history)
        };

        let level = MemoryLevel::classify(snapshot.rss, &self.config);
        let mut check = MemoryCheck {
            snapshot,
            level,
            growth_percent,
            freed_mb: None,
        };

        match level {
            MemoryLevel::Normal => {}
            MemoryLevel::Warning => {
                tracing::warn!(memory = %snapshot, "Memory usage elevated");
                if growth_percent > self.config.rapid_growth_percent {
                    tracing::warn!(
                        growth_percent,
                        window = self.config.check_interval,
                        "Memory growing rapidly"
                    );
                }
            }
            MemoryLevel::Critical => {
                tracing::error!(rss_mb = snapshot.rss, "Memory critical, consider starting a new session");
                check.freed_mb = self.try_collect(snapshot.rss);
            }
            MemoryLevel::Fatal => {
                tracing::error!(
                    rss_mb = snapshot.rss,
                    kill_threshold_mb = self.config.kill_threshold_mb,
                    session_id,
                    tool_count,
                    "Memory exceeds kill threshold, shutting down"
                );
                self.schedule_shutdown();
            }
        }

        Ok(Some(check))
    }

    fn try_collect(&self, rss_before: u64) -> Option<u64> {
        if !self.probe.collect_garbage() {
            return None;
        }
        tracing::info!("Requested garbage collection");

        let after = match self.probe.snapshot() {
            Ok(after) => after,
            Err(e) => {
                tracing::warn!(error = %e, "Could not sample memory after collection");
                return None;
            }
        };
        let freed = rss_before.saturating_sub(after.rss);
        if freed > self.config.gc_report_threshold_mb {
            tracing::info!(freed_mb = freed, "Garbage collection freed memory");
            return Some(freed);
        }
        None
    }

    fn schedule_shutdown(&self) {
        if self.shutdown_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let terminator = self.terminator.clone();
        let grace = Duration::from_millis(self.config.exit_grace_ms);
        let code = self.config.exit_code;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    terminator.terminate(code);
                });
            }
            // Called from a plain thread
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(grace);
                    terminator.terminate(code);
                });
            }
        }
    }

    /// Trend between the first and last recorded samples
    pub fn trend(&self) -> Option<MemoryTrend> {
        let state = self.state.lock();
        if state.history.len() < 2 {
            return None;
        }
        let first = state.history.front()?.rss;
        let last = state.history.back()?.rss;
        Some(match last.cmp(&first) {
            std::cmp::Ordering::Greater => MemoryTrend::Increased(last - first),
            std::cmp::Ordering::Less => MemoryTrend::Decreased(first - last),
            std::cmp::Ordering::Equal => MemoryTrend::Stable,
        })
    }

    fn on_session_end(&self, session_id: &str) -> Result<()> {
        let snapshot = self.probe.snapshot()?;
        tracing::info!(session_id, memory = %snapshot, "Session ended");
        if let Some(trend) = self.trend() {
            tracing::info!(session_id, %trend, "Memory trend during session");
        }
        Ok(())
    }
}

#[async_trait]
impl Hook for MemoryGuard {
    fn name(&self) -> &str {
        hook_names::MEMORY_GUARD
    }

    async fn tool_execute_after(&self, input: &ToolInput, _output: &mut ToolOutput) {
        if let Err(e) = self.record_tool(input.session_or_unknown()) {
            tracing::error!(error = %e, "Memory guard check failed");
        }
    }

    async fn event(&self, event: &SessionEvent) {
        if let SessionEvent::End { session_id } = event {
            if let Err(e) = self.on_session_end(session_id) {
                tracing::error!(error = %e, "Memory guard session summary failed");
            }
        }
    }
}
