//! Tool throttle
//!
//! Inserts short pauses between tool calls so the host can reclaim memory
//! during long bursts, and caps oversized shell output.

use crate::hook::Hook;
use crate::text::take_bytes;
use async_trait::async_trait;
use kraken_core::config::{hook_names, ThrottleConfig};
use kraken_core::{MemoryProbe, ToolInput, ToolOutput, ToolPayload};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Every Nth shell call gets a breather
const SHELL_BREATHER_EVERY: u64 = 3;

#[derive(Debug, Default)]
struct ThrottleState {
    tool_count: u64,
    shell_count: u64,
    last_pause: Option<Instant>,
}

/// What the throttle did for one call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleAction {
    /// Global call number (1-based)
    pub tool_count: u64,
    /// Yielded one tick to the scheduler
    pub yielded: bool,
    /// An explicit collection ran
    pub collected: bool,
    /// Pause taken, if any
    pub pause: Option<Duration>,
    /// RSS in MB when the pause was lengthened for high memory
    pub high_memory_mb: Option<u64>,
    /// Shell breather taken
    pub shell_breather: bool,
}

pub struct ToolThrottle {
    config: ThrottleConfig,
    probe: Arc<dyn MemoryProbe>,
    state: Mutex<ThrottleState>,
}

impl ToolThrottle {
    pub fn new(config: ThrottleConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            config,
            probe,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    /// Calls seen so far
    pub fn tool_count(&self) -> u64 {
        self.state.lock().tool_count
    }

    /// Run the pre-call throttling for `tool`. A failing probe is logged and
    /// the base pause is taken instead.
    pub async fn before_tool(&self, tool: &str) -> ThrottleAction {
        let is_shell = tool == self.config.shell_tool;
        let (tool_count, shell_count) = {
            let mut state = self.state.lock();
            state.tool_count += 1;
            if is_shell {
                state.shell_count += 1;
            }
            (state.tool_count, state.shell_count)
        };

        let mut action = ThrottleAction {
            tool_count,
            ..Default::default()
        };

        let gc_interval = self.config.gc_hint_interval.max(1);
        if tool_count % gc_interval == 0 {
            sleep(Duration::from_millis(1)).await;
            action.yielded = true;

            if tool_count % (gc_interval * 4) == 0 {
                action.collected = self.probe.collect_garbage();
            }
        }

        if tool_count % self.config.tools_before_pause.max(1) == 0 {
            let base = Duration::from_millis(self.config.pause_duration_ms);
            let due = self
                .state
                .lock()
                .last_pause
                .map_or(true, |at| at.elapsed() > base);

            if due {
                let pause = match self.probe.snapshot() {
                    Ok(snapshot) if snapshot.rss > self.config.high_memory_threshold_mb => {
                        tracing::warn!(
                            rss_mb = snapshot.rss,
                            threshold_mb = self.config.high_memory_threshold_mb,
                            "High memory usage, lengthening tool pause"
                        );
                        action.high_memory_mb = Some(snapshot.rss);
                        Duration::from_millis(self.config.high_memory_pause_ms)
                    }
                    Ok(_) => base,
                    Err(e) => {
                        tracing::error!(tool, error = %e, "Memory probe failed, using base pause");
                        base
                    }
                };

                sleep(pause).await;
                self.state.lock().last_pause = Some(Instant::now());
                action.pause = Some(pause);
            }
        }

        if is_shell && shell_count % SHELL_BREATHER_EVERY == 0 {
            sleep(Duration::from_millis(self.config.shell_pause_ms)).await;
            action.shell_breather = true;
        }

        action
    }

    /// Cap oversized shell output. Returns the original size in bytes when
    /// the output was cut.
    pub fn cap_shell_output(&self, tool: &str, output: &mut ToolOutput) -> Option<usize> {
        if tool != self.config.shell_tool {
            return None;
        }

        let payload = output.output.as_mut()?;
        let size = match &*payload {
            ToolPayload::Text(text) => text.len(),
            other => other.char_len(),
        };
        if size <= self.config.large_output_bytes {
            return None;
        }

        let ToolPayload::Text(text) = payload else {
            tracing::warn!(size_kb = size / 1024, "Large non-text shell output left as is");
            return None;
        };

        let mut capped = take_bytes(text, self.config.large_output_keep_bytes).to_string();
        capped.push_str(&format!(
            "\n\n[Output truncated by kraken-code due to size - {}KB exceeded {}KB limit]",
            (size as f64 / 1024.0).round() as u64,
            self.config.large_output_bytes / 1000
        ));
        *text = capped;

        tracing::warn!(size_kb = size / 1024, "Truncated large shell output");
        Some(size)
    }
}

#[async_trait]
impl Hook for ToolThrottle {
    fn name(&self) -> &str {
        hook_names::TOOL_THROTTLE
    }

    async fn tool_execute_before(&self, input: &mut ToolInput) {
        let action = self.before_tool(&input.tool).await;
        if let Some(pause) = action.pause {
            tracing::debug!(
                tool = %input.tool,
                count = action.tool_count,
                pause_ms = pause.as_millis() as u64,
                "Throttled tool call"
            );
        }
    }

    async fn tool_execute_after(&self, input: &ToolInput, output: &mut ToolOutput) {
        self.cap_shell_output(&input.tool, output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProbe;
    use std::sync::atomic::Ordering;

    fn throttle(config: ThrottleConfig, rss: u64) -> (ToolThrottle, Arc<FakeProbe>) {
        let probe = FakeProbe::with_rss(rss);
        (ToolThrottle::new(config, probe.clone()), probe)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_on_nth_call() {
        let (throttle, _) = throttle(
            ThrottleConfig {
                tools_before_pause: 3,
                ..Default::default()
            },
            100,
        );

        for _ in 0..2 {
            let action = throttle.before_tool("read").await;
            assert!(action.pause.is_none());
        }

        let start = Instant::now();
        let action = throttle.before_tool("read").await;
        assert_eq!(action.pause, Some(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_memory_lengthens_pause() {
        let (throttle, _) = throttle(
            ThrottleConfig {
                tools_before_pause: 1,
                ..Default::default()
            },
            1500,
        );

        let action = throttle.before_tool("read").await;
        assert_eq!(action.pause, Some(Duration::from_millis(200)));
        assert_eq!(action.high_memory_mb, Some(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_skipped_when_recent() {
        let (throttle, probe) = throttle(
            ThrottleConfig {
                tools_before_pause: 1,
                pause_duration_ms: 50,
                ..Default::default()
            },
            100,
        );

        // The first pause ends "now", so the next call is too soon
        assert!(throttle.before_tool("read").await.pause.is_some());
        assert!(throttle.before_tool("read").await.pause.is_none());
        assert_eq!(probe.snapshot_count(), 1);

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(throttle.before_tool("read").await.pause.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gc_hints() {
        let (throttle, probe) = throttle(
            ThrottleConfig {
                tools_before_pause: 1000,
                gc_hint_interval: 5,
                ..Default::default()
            },
            100,
        );
        probe.has_collector.store(true, Ordering::SeqCst);

        let mut yields = 0;
        let mut collections = 0;
        for _ in 0..20 {
            let action = throttle.before_tool("read").await;
            yields += action.yielded as u32;
            collections += action.collected as u32;
        }

        assert_eq!(yields, 4);
        assert_eq!(collections, 1);
        assert_eq!(probe.collection_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shell_breather_every_third_shell_call() {
        let (throttle, _) = throttle(
            ThrottleConfig {
                tools_before_pause: 1000,
                ..Default::default()
            },
            100,
        );

        let mut breathers = Vec::new();
        for tool in ["bash", "read", "bash", "read", "bash", "bash", "bash", "bash"] {
            breathers.push(throttle.before_tool(tool).await.shell_breather);
        }

        assert_eq!(
            breathers,
            vec![false, false, false, false, true, false, false, true]
        );
        assert_eq!(throttle.tool_count(), 8);
    }

    #[test]
    fn test_caps_large_shell_output() {
        let (throttle, _) = throttle(ThrottleConfig::default(), 100);
        let mut output = ToolOutput::text("x".repeat(1_000_000));

        assert_eq!(throttle.cap_shell_output("bash", &mut output), Some(1_000_000));

        let text = output.output_text().unwrap();
        assert!(text.starts_with(&"x".repeat(100_000)));
        assert!(text.ends_with("[Output truncated by kraken-code due to size - 977KB exceeded 500KB limit]"));
        assert!(text.len() < 100_200);
    }

    #[test]
    fn test_leaves_small_or_other_output() {
        let (throttle, _) = throttle(ThrottleConfig::default(), 100);

        let mut small = ToolOutput::text("ok");
        assert!(throttle.cap_shell_output("bash", &mut small).is_none());

        let mut other = ToolOutput::text("x".repeat(1_000_000));
        assert!(throttle.cap_shell_output("read", &mut other).is_none());
        assert_eq!(other.output_text().unwrap().len(), 1_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_probe_falls_back_to_base_pause() {
        let (throttle, probe) = throttle(
            ThrottleConfig {
                tools_before_pause: 1,
                ..Default::default()
            },
            1500,
        );
        probe.fail_snapshots(true);

        let mut input = ToolInput::new("bash", "s1");
        throttle.tool_execute_before(&mut input).await;
        assert_eq!(throttle.tool_count(), 1);

        tokio::time::advance(Duration::from_millis(60)).await;
        let action = throttle.before_tool("bash").await;
        assert_eq!(action.pause, Some(Duration::from_millis(50)));
        assert_eq!(action.high_memory_mb, None);

        // The shell breather still runs after a failed probe
        tokio::time::advance(Duration::from_millis(60)).await;
        let start = Instant::now();
        let action = throttle.before_tool("bash").await;
        assert_eq!(action.pause, Some(Duration::from_millis(50)));
        assert!(action.shell_breather);
        assert!(start.elapsed() >= Duration::from_millis(55));
        assert_eq!(probe.snapshot_count(), 3);
    }

    #[test]
    fn test_non_text_shell_output_left_alone() {
        let (throttle, _) = throttle(ThrottleConfig::default(), 100);
        let big = serde_json::Value::String("x".repeat(600_000));
        let mut output = ToolOutput {
            output: Some(ToolPayload::Json(serde_json::json!([big]))),
            ..Default::default()
        };

        assert!(throttle.cap_shell_output("bash", &mut output).is_none());
        assert!(matches!(output.output, Some(ToolPayload::Json(_))));
    }
}
