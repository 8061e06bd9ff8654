//! Session recovery
//!
//! Classifies `session.error` events, keeps per-session error counters and,
//! when auto-recovery is on, dispatches recoverable categories to their
//! strategy.

pub mod detector;
pub mod strategies;

pub use detector::{
    detect_error_from_output, detect_error_type, detect_thinking_block_order_error, ErrorCategory,
};
pub use strategies::{
    retry_with_backoff, ErrorContext, RecoveryOptions, RecoveryStrategy, StrategyTable,
};

use crate::hook::Hook;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kraken_core::config::{hook_names, SessionRecoveryConfig};
use kraken_core::{
    ChatMessageInput, ChatMessageOutput, SessionError, SessionEvent, SessionRegistry,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Error classifier used by the hook
pub type Classifier = fn(Option<&str>) -> ErrorCategory;

/// Per-session error bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct SessionErrorState {
    pub session_id: String,
    /// Category of the current turn's error; reset on every chat message
    pub error_type: Option<ErrorCategory>,
    pub error_count: u64,
    pub last_error_time: Option<DateTime<Utc>>,
    pub recovery_attempts: u32,
    /// Chat messages seen between the previous error and the latest one
    pub messages_before_error: u64,
    messages_since_error: u64,
}

impl SessionErrorState {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            error_type: None,
            error_count: 0,
            last_error_time: None,
            recovery_attempts: 0,
            messages_before_error: 0,
            messages_since_error: 0,
        }
    }
}

/// What handling one error did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub category: ErrorCategory,
    pub error_count: u64,
    /// `None` when no recovery was attempted
    pub recovered: Option<bool>,
}

pub struct SessionRecovery {
    config: SessionRecoveryConfig,
    sessions: Arc<SessionRegistry<SessionErrorState>>,
    classify: Classifier,
    strategies: Arc<StrategyTable>,
}

impl SessionRecovery {
    pub fn new(config: SessionRecoveryConfig) -> Self {
        let strategies = StrategyTable::with_defaults(Duration::from_millis(config.rate_limit_delay_ms));
        Self {
            config,
            sessions: Arc::new(SessionRegistry::new()),
            classify: detect_error_type,
            strategies: Arc::new(strategies),
        }
    }

    pub fn with_registry(mut self, sessions: Arc<SessionRegistry<SessionErrorState>>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_classifier(mut self, classify: Classifier) -> Self {
        self.classify = classify;
        self
    }

    pub fn with_strategies(mut self, strategies: Arc<StrategyTable>) -> Self {
        self.strategies = strategies;
        self
    }

    /// A new chat turn clears the session's current error
    pub fn on_chat_message(&self, session_id: &str) {
        self.sessions.update(
            session_id,
            || SessionErrorState::new(session_id),
            |state| {
                state.error_type = None;
                state.messages_since_error += 1;
            },
        );
    }

    /// Classify and record an error, attempting recovery when enabled
    pub async fn handle_error(&self, session_id: &str, error: Option<&str>) -> RecoveryOutcome {
        let category = (self.classify)(error);
        let attempt = self.config.auto_recover && category.is_recoverable();

        let error_count = self.sessions.update(
            session_id,
            || SessionErrorState::new(session_id),
            |state| {
                state.error_type = Some(category);
                state.last_error_time = Some(Utc::now());
                state.error_count += 1;
                state.messages_before_error = state.messages_since_error;
                state.messages_since_error = 0;
                if attempt {
                    state.recovery_attempts += 1;
                }
                state.error_count
            },
        );

        tracing::info!(
            session_id,
            %category,
            error_count,
            reason = category.recovery_message(),
            "Detected session error"
        );

        let recovered = if attempt {
            let mut context = ErrorContext::new(session_id, error.map(str::to_string));
            let options = RecoveryOptions {
                max_retries: self.config.max_retries,
                ..Default::default()
            };
            let recovered = self
                .strategies
                .attempt_recovery(category, &mut context, &options)
                .await;
            if recovered {
                tracing::info!(session_id, %category, "Session recovered, continuing previous task");
            } else {
                tracing::warn!(session_id, %category, "Auto-recovery did not succeed");
            }
            Some(recovered)
        } else {
            None
        };

        RecoveryOutcome {
            category,
            error_count,
            recovered,
        }
    }

    pub fn session(&self, session_id: &str) -> Option<SessionErrorState> {
        self.sessions.get(session_id)
    }

    pub fn clear_session(&self, session_id: &str) -> Option<SessionErrorState> {
        self.sessions.clear(session_id)
    }

    pub fn all_sessions(&self) -> HashMap<String, SessionErrorState> {
        self.sessions.all()
    }
}

#[async_trait]
impl Hook for SessionRecovery {
    fn name(&self) -> &str {
        hook_names::SESSION_RECOVERY
    }

    async fn chat_message(&self, input: &ChatMessageInput, _output: &mut ChatMessageOutput) {
        if let Some(session_id) = input.session_id.as_deref() {
            self.on_chat_message(session_id);
        }
    }

    async fn event(&self, event: &SessionEvent) {
        if let SessionEvent::Error { session_id, error } = event {
            if session_id.is_empty() {
                tracing::debug!("Ignoring session.error without a session");
                return;
            }
            self.handle_error(session_id, error.as_ref().and_then(SessionError::message))
                .await;
        }
    }
}
