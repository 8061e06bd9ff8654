use crate::error::{KrakenError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hook name catalog, as used in `disabled_hooks`
pub mod hook_names {
    pub const SESSION_RECOVERY: &str = "session-recovery";
    pub const MEMORY_GUARD: &str = "memory-guard";
    pub const TOOL_THROTTLE: &str = "tool-throttle";
    pub const SESSION_LIFECYCLE: &str = "session-lifecycle";
    pub const TOOL_OUTPUT_TRUNCATOR: &str = "tool-output-truncator";
    pub const GREP_OUTPUT_TRUNCATOR: &str = "grep-output-truncator";
    pub const EMPTY_TASK_RESPONSE_DETECTOR: &str = "empty-task-response-detector";

    /// All hook names in registration order
    pub const ALL: &[&str] = &[
        SESSION_RECOVERY,
        MEMORY_GUARD,
        TOOL_THROTTLE,
        SESSION_LIFECYCLE,
        TOOL_OUTPUT_TRUNCATOR,
        GREP_OUTPUT_TRUNCATOR,
        EMPTY_TASK_RESPONSE_DETECTOR,
    ];
}

/// Guard configuration
///
/// Groups one section per hook. Every field is optional in the config file;
/// missing fields take the documented defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Generic tool output truncation
    pub truncator: TruncatorConfig,

    /// Line-based grep output truncation
    pub grep_truncator: GrepTruncatorConfig,

    /// Tool execution pacing
    pub throttle: ThrottleConfig,

    /// Resident memory guard
    pub memory_guard: MemoryGuardConfig,

    /// Per-session tool count and duration limits
    pub session_lifecycle: SessionLifecycleConfig,

    /// Empty task response detection
    pub empty_response: EmptyResponseConfig,

    /// Error classification and recovery
    pub session_recovery: SessionRecoveryConfig,

    /// Hooks to leave out of the pipeline, by name
    pub disabled_hooks: Vec<String>,

    /// Log level
    pub log_level: LogLevel,
}

impl GuardConfig {
    /// Load configuration from a YAML (`.yaml`/`.yml`) or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;

        let config: GuardConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            Some("json") => serde_json::from_str(&raw)?,
            other => {
                return Err(KrakenError::ConfigError(format!(
                    "unsupported config format: {} (expected .yaml, .yml or .json)",
                    other.unwrap_or("<none>")
                )))
            }
        };

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded guard configuration");
        Ok(config)
    }

    /// Check whether a hook is listed in `disabled_hooks`
    pub fn is_hook_disabled(&self, name: &str) -> bool {
        self.disabled_hooks.iter().any(|h| h == name)
    }

    /// Validate thresholds and intervals
    pub fn validate(&self) -> Result<()> {
        for name in &self.disabled_hooks {
            if !hook_names::ALL.contains(&name.as_str()) {
                return Err(KrakenError::ConfigError(format!(
                    "unknown hook in disabled_hooks: '{}'",
                    name
                )));
            }
        }

        non_zero("throttle.tools_before_pause", self.throttle.tools_before_pause)?;
        non_zero("throttle.gc_hint_interval", self.throttle.gc_hint_interval)?;
        non_zero("memory_guard.check_interval", self.memory_guard.check_interval)?;
        non_zero("memory_guard.max_history", self.memory_guard.max_history as u64)?;
        non_zero(
            "session_lifecycle.progress_interval",
            self.session_lifecycle.progress_interval,
        )?;

        let mg = &self.memory_guard;
        if !(mg.warning_threshold_mb < mg.critical_threshold_mb
            && mg.critical_threshold_mb < mg.kill_threshold_mb)
        {
            return Err(KrakenError::ConfigError(format!(
                "memory thresholds must increase: warning {}MB < critical {}MB < kill {}MB",
                mg.warning_threshold_mb, mg.critical_threshold_mb, mg.kill_threshold_mb
            )));
        }

        ratio("truncator.headroom_ratio", self.truncator.headroom_ratio)?;
        ratio("grep_truncator.headroom_ratio", self.grep_truncator.headroom_ratio)?;
        ratio(
            "session_lifecycle.warning_threshold_tools",
            self.session_lifecycle.warning_threshold_tools,
        )?;
        ratio(
            "session_lifecycle.warning_threshold_minutes",
            self.session_lifecycle.warning_threshold_minutes,
        )?;

        Ok(())
    }
}

fn non_zero(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(KrakenError::ConfigError(format!("{} must be > 0", field)));
    }
    Ok(())
}

fn ratio(field: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(KrakenError::ConfigError(format!(
            "{} must be in (0, 1], got {}",
            field, value
        )));
    }
    Ok(())
}

/// Tool output truncator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncatorConfig {
    pub enabled: bool,

    /// Token ceiling for tools without a specific entry
    pub max_tokens: usize,

    /// Fraction of `max_tokens` a structured payload may use before it is truncated
    pub headroom_ratio: f64,

    /// Leading lines kept verbatim
    pub preserve_header_lines: usize,
}

impl Default for TruncatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens: 50_000,
            headroom_ratio: 0.5,
            preserve_header_lines: 3,
        }
    }
}

/// Grep output truncator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrepTruncatorConfig {
    pub enabled: bool,

    /// Token ceiling before truncation
    pub max_tokens: usize,

    /// Fraction of the ceiling kept in reserve
    pub headroom_ratio: f64,

    /// Tool whose output is truncated
    pub tool: String,
}

impl Default for GrepTruncatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens: 50_000,
            headroom_ratio: 0.5,
            tool: "grep".to_string(),
        }
    }
}

/// Tool throttle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub enabled: bool,

    /// Pause every N tool calls
    pub tools_before_pause: u64,

    /// Regular pause length
    pub pause_duration_ms: u64,

    /// Yield every N tool calls, request collection every 4N
    pub gc_hint_interval: u64,

    /// Pause length while RSS is above `high_memory_threshold_mb`
    pub high_memory_pause_ms: u64,

    pub high_memory_threshold_mb: u64,

    /// Tool known to leak memory in its native dependency
    pub shell_tool: String,

    /// Extra sleep every 3rd shell invocation
    pub shell_pause_ms: u64,

    /// Shell output above this many bytes is cut down
    pub large_output_bytes: usize,

    /// Bytes kept when cutting down large shell output
    pub large_output_keep_bytes: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tools_before_pause: 15,
            pause_duration_ms: 50,
            gc_hint_interval: 5,
            high_memory_pause_ms: 200,
            high_memory_threshold_mb: 1200,
            shell_tool: "bash".to_string(),
            shell_pause_ms: 5,
            large_output_bytes: 500_000,
            large_output_keep_bytes: 100_000,
        }
    }
}

/// Memory guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryGuardConfig {
    pub enabled: bool,
    pub warning_threshold_mb: u64,
    pub critical_threshold_mb: u64,
    pub kill_threshold_mb: u64,

    /// Sample every N tool calls
    pub check_interval: u64,

    /// Bounded sample history
    pub max_history: usize,

    /// Samples considered for growth detection
    pub growth_window: usize,

    /// Growth (percent) flagged as rapid
    pub rapid_growth_percent: i64,

    /// Minimum MB freed by a collection before it is reported
    pub gc_report_threshold_mb: u64,

    /// Delay between the fatal log and process exit
    pub exit_grace_ms: u64,

    pub exit_code: i32,
}

impl Default for MemoryGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warning_threshold_mb: 1024,
            critical_threshold_mb: 1536,
            kill_threshold_mb: 2048,
            check_interval: 10,
            max_history: 50,
            growth_window: 5,
            rapid_growth_percent: 20,
            gc_report_threshold_mb: 50,
            exit_grace_ms: 100,
            exit_code: 1,
        }
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLifecycleConfig {
    pub enabled: bool,
    pub max_session_duration_minutes: f64,
    pub max_tools_per_session: u64,

    /// Fraction of `max_tools_per_session` that triggers the one-time warning
    pub warning_threshold_tools: f64,

    /// Fraction of `max_session_duration_minutes` that triggers the one-time warning
    pub warning_threshold_minutes: f64,

    /// Progress log every N tool calls
    pub progress_interval: u64,
}

impl Default for SessionLifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_session_duration_minutes: 45.0,
            max_tools_per_session: 100,
            warning_threshold_tools: 0.7,
            warning_threshold_minutes: 0.8,
            progress_interval: 25,
        }
    }
}

/// Empty task response detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmptyResponseConfig {
    pub enabled: bool,
    pub max_retries: u32,

    /// Base retry delay in milliseconds, doubled per retry
    pub retry_delay: u64,

    pub auto_recover: bool,

    /// Cumulative empty count that triggers the escalation warning
    pub notify_on_threshold: u32,

    /// Record detection history entries
    pub track_patterns: bool,

    /// Bounded detection history per session
    pub max_history: usize,

    /// Delegation tool whose output is checked
    pub task_tool: String,
}

impl Default for EmptyResponseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            retry_delay: 1000,
            auto_recover: false,
            notify_on_threshold: 3,
            track_patterns: true,
            max_history: 100,
            task_tool: "task".to_string(),
        }
    }
}

/// Session recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecoveryConfig {
    pub enabled: bool,
    pub auto_recover: bool,
    pub max_retries: u32,

    /// Wait applied by the rate-limit strategy
    pub rate_limit_delay_ms: u64,
}

impl Default for SessionRecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_recover: false,
            max_retries: 3,
            rate_limit_delay_ms: 5000,
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
