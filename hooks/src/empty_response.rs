//! Empty task-response detector
//!
//! Watches the task-delegation tool for empty results, keeps a bounded
//! per-session history of them and, when auto-recovery is on, decides how
//! long to back off before the caller retries.

use crate::hook::Hook;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kraken_core::config::{hook_names, EmptyResponseConfig};
use kraken_core::{SessionRegistry, ToolInput, ToolOutput, ToolPayload};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of the emptiness test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyCheck {
    pub empty: bool,
    pub reason: &'static str,
}

impl EmptyCheck {
    const NOT_EMPTY: Self = Self {
        empty: false,
        reason: "",
    };

    fn empty(reason: &'static str) -> Self {
        Self {
            empty: true,
            reason,
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decide whether a task result carries anything.
///
/// A `content` list wins over the `output` field: its items are joined and
/// tested as the response text.
pub fn is_output_empty(output: Option<&ToolOutput>) -> EmptyCheck {
    let Some(output) = output else {
        return EmptyCheck::empty("output is absent");
    };

    let text = match (&output.content, &output.output) {
        (Some(content), _) => content.iter().map(value_to_text).collect::<String>(),
        (None, None) | (None, Some(ToolPayload::Json(Value::Null))) => {
            return EmptyCheck::empty("output.output is absent");
        }
        (None, Some(ToolPayload::Text(text))) => text.clone(),
        (None, Some(payload)) => serde_json::to_string(payload).unwrap_or_default(),
    };

    if text.trim().is_empty() {
        return EmptyCheck::empty("output content is empty or whitespace-only");
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) if map.is_empty() => EmptyCheck::empty("output is empty JSON object"),
        Ok(Value::Array(items)) if items.is_empty() => EmptyCheck::empty("output is empty JSON object"),
        _ => EmptyCheck::NOT_EMPTY,
    }
}

/// One recorded empty response
#[derive(Debug, Clone, PartialEq)]
pub struct EmptyResponseRecord {
    pub timestamp: DateTime<Utc>,
    pub call_id: String,
    pub reason: String,
}

/// Per-session empty-response history
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResponseHistory {
    pub session_id: String,
    pub empty_count: u64,
    pub last_empty_time: Option<DateTime<Utc>>,
    pub history: VecDeque<EmptyResponseRecord>,
}

impl SessionResponseHistory {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            empty_count: 0,
            last_empty_time: None,
            history: VecDeque::new(),
        }
    }
}

pub struct EmptyResponseDetector {
    config: EmptyResponseConfig,
    sessions: Arc<SessionRegistry<SessionResponseHistory>>,
}

impl EmptyResponseDetector {
    pub fn new(config: EmptyResponseConfig) -> Self {
        Self::with_registry(config, Arc::new(SessionRegistry::new()))
    }

    pub fn with_registry(
        config: EmptyResponseConfig,
        sessions: Arc<SessionRegistry<SessionResponseHistory>>,
    ) -> Self {
        Self { config, sessions }
    }

    /// `retry_delay * 2^retry_count`
    pub fn backoff(&self, retry_count: u32) -> Duration {
        Duration::from_millis(
            self.config
                .retry_delay
                .saturating_mul(2u64.saturating_pow(retry_count)),
        )
    }

    /// Record an empty response and decide on recovery.
    ///
    /// Returns `true` once the backoff has elapsed and the caller should
    /// retry the task; `false` when the output was not empty or recovery is
    /// off or exhausted.
    pub async fn handle_empty_response(
        &self,
        input: &ToolInput,
        output: Option<&ToolOutput>,
        retry_count: u32,
    ) -> bool {
        let check = is_output_empty(output);
        if !check.empty {
            return false;
        }

        let session_id = input.session_or_unknown();
        let call_id = input.call_id.as_deref().unwrap_or("unknown");
        let now = Utc::now();

        let empty_count = self.sessions.update(
            session_id,
            || SessionResponseHistory::new(session_id),
            |history| {
                history.empty_count += 1;
                history.last_empty_time = Some(now);
                if self.config.track_patterns {
                    history.history.push_back(EmptyResponseRecord {
                        timestamp: now,
                        call_id: call_id.to_string(),
                        reason: check.reason.to_string(),
                    });
                    while history.history.len() > self.config.max_history.max(1) {
                        history.history.pop_front();
                    }
                }
                history.empty_count
            },
        );

        tracing::warn!(session_id, call_id, reason = check.reason, "Task tool returned empty response");

        if empty_count >= u64::from(self.config.notify_on_threshold) {
            tracing::warn!(
                session_id,
                empty_count,
                "Repeated empty task responses, the agent or model may be failing"
            );
        }

        if !self.config.auto_recover || retry_count >= self.config.max_retries {
            return false;
        }

        let delay = self.backoff(retry_count);
        tracing::info!(
            session_id,
            delay_ms = delay.as_millis() as u64,
            attempt = retry_count + 1,
            max_retries = self.config.max_retries,
            "Auto-recovering empty task response"
        );
        tokio::time::sleep(delay).await;
        tracing::info!(session_id, "Session recovered, continuing previous task");

        true
    }

    pub fn session(&self, session_id: &str) -> Option<SessionResponseHistory> {
        self.sessions.get(session_id)
    }

    pub fn clear_session(&self, session_id: &str) -> Option<SessionResponseHistory> {
        self.sessions.clear(session_id)
    }

    pub fn all_sessions(&self) -> HashMap<String, SessionResponseHistory> {
        self.sessions.all()
    }
}

#[async_trait]
impl Hook for EmptyResponseDetector {
    fn name(&self) -> &str {
        hook_names::EMPTY_TASK_RESPONSE_DETECTOR
    }

    async fn tool_execute_after(&self, input: &ToolInput, output: &mut ToolOutput) {
        if input.tool != self.config.task_tool {
            return;
        }
        self.handle_empty_response(input, Some(output), 0).await;
    }
}
