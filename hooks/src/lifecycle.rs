//! Session lifecycle tracking
//!
//! Per-session tool-count and wall-clock thresholds. Signals are advisory:
//! they are logged and returned, nothing is ever terminated.

use crate::hook::Hook;
use async_trait::async_trait;
use kraken_core::config::{hook_names, SessionLifecycleConfig};
use kraken_core::{SessionEvent, SessionRegistry, ToolInput};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const TOOL_WARNING: &str = "tools-warning";
const DURATION_WARNING: &str = "duration-warning";

/// Per-session counters
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub start: Instant,
    pub tool_count: u64,
    /// One-shot warnings already issued
    pub warnings_issued: HashSet<String>,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            tool_count: 0,
            warnings_issued: HashSet::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Advisory signal raised by a tool call
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleSignal {
    ToolWarning { count: u64, max: u64 },
    ToolLimitReached { max: u64 },
    DurationWarning { minutes: f64, remaining_minutes: f64 },
    DurationExceeded { minutes: f64, max_minutes: f64 },
    Progress { count: u64, elapsed: Duration },
}

/// `12m 5s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

pub struct SessionLifecycle {
    config: SessionLifecycleConfig,
    sessions: Arc<SessionRegistry<SessionStats>>,
}

impl SessionLifecycle {
    pub fn new(config: SessionLifecycleConfig) -> Self {
        Self::with_registry(config, Arc::new(SessionRegistry::new()))
    }

    pub fn with_registry(
        config: SessionLifecycleConfig,
        sessions: Arc<SessionRegistry<SessionStats>>,
    ) -> Self {
        Self { config, sessions }
    }

    /// Count a tool call for `session_id` and collect the signals it raises
    pub fn record_tool(&self, session_id: &str) -> Vec<LifecycleSignal> {
        let config = &self.config;
        self.sessions.update(session_id, SessionStats::new, |stats| {
            let mut signals = Vec::new();
            stats.tool_count += 1;
            let count = stats.tool_count;
            let elapsed = stats.elapsed();
            let minutes = elapsed.as_secs_f64() / 60.0;

            let tool_warning_at =
                (config.max_tools_per_session as f64 * config.warning_threshold_tools).floor() as u64;
            if count == tool_warning_at && stats.warnings_issued.insert(TOOL_WARNING.to_string()) {
                signals.push(LifecycleSignal::ToolWarning {
                    count,
                    max: config.max_tools_per_session,
                });
            }

            if count == config.max_tools_per_session {
                signals.push(LifecycleSignal::ToolLimitReached {
                    max: config.max_tools_per_session,
                });
            }

            let max_minutes = config.max_session_duration_minutes;
            let duration_warning_at = max_minutes * config.warning_threshold_minutes;
            if minutes >= duration_warning_at
                && minutes < max_minutes
                && stats.warnings_issued.insert(DURATION_WARNING.to_string())
            {
                signals.push(LifecycleSignal::DurationWarning {
                    minutes,
                    remaining_minutes: max_minutes - minutes,
                });
            }

            if minutes >= max_minutes {
                signals.push(LifecycleSignal::DurationExceeded {
                    minutes,
                    max_minutes,
                });
            }

            if count % config.progress_interval.max(1) == 0 {
                signals.push(LifecycleSignal::Progress { count, elapsed });
            }

            signals
        })
    }

    fn log_signal(session_id: &str, signal: &LifecycleSignal) {
        match signal {
            LifecycleSignal::ToolWarning { count, max } => tracing::warn!(
                session_id,
                count,
                max,
                "Session approaching tool limit, consider starting a new session"
            ),
            LifecycleSignal::ToolLimitReached { max } => tracing::error!(
                session_id,
                max,
                "Session reached tool limit, start a new session"
            ),
            LifecycleSignal::DurationWarning {
                minutes,
                remaining_minutes,
            } => tracing::warn!(
                session_id,
                minutes = minutes.round() as u64,
                remaining_minutes = remaining_minutes.round() as u64,
                "Session running long"
            ),
            LifecycleSignal::DurationExceeded {
                minutes,
                max_minutes,
            } => tracing::error!(
                session_id,
                minutes = minutes.round() as u64,
                max_minutes,
                "Session exceeded max duration"
            ),
            LifecycleSignal::Progress { count, elapsed } => tracing::info!(
                session_id,
                tools = count,
                elapsed = %format_elapsed(*elapsed),
                "Session stats"
            ),
        }
    }

    pub fn session(&self, session_id: &str) -> Option<SessionStats> {
        self.sessions.get(session_id)
    }

    pub fn clear_session(&self, session_id: &str) -> Option<SessionStats> {
        self.sessions.clear(session_id)
    }

    pub fn all_sessions(&self) -> HashMap<String, SessionStats> {
        self.sessions.all()
    }
}

#[async_trait]
impl Hook for SessionLifecycle {
    fn name(&self) -> &str {
        hook_names::SESSION_LIFECYCLE
    }

    async fn tool_execute_before(&self, input: &mut ToolInput) {
        let Some(session_id) = input.session_id.as_deref() else {
            return;
        };
        for signal in self.record_tool(session_id) {
            Self::log_signal(session_id, &signal);
        }
    }

    async fn event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Start { session_id } => {
                self.sessions.update(session_id, SessionStats::new, |_| ());
                tracing::info!(
                    session_id = %session_id,
                    max_tools = self.config.max_tools_per_session,
                    max_minutes = self.config.max_session_duration_minutes,
                    "Session started"
                );
            }
            SessionEvent::End { session_id } => {
                if let Some(stats) = self.sessions.clear(session_id) {
                    tracing::info!(
                        session_id = %session_id,
                        tools = stats.tool_count,
                        elapsed = %format_elapsed(stats.elapsed()),
                        "Session ended"
                    );
                }
            }
            _ => {}
        }
    }
}
