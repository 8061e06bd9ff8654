//! Hook pipeline
//!
//! Holds the enabled hooks in registration order and fans each lifecycle
//! point out to them one after another.

use crate::empty_response::EmptyResponseDetector;
use crate::grep_truncator::GrepOutputTruncator;
use crate::hook::Hook;
use crate::lifecycle::SessionLifecycle;
use crate::memory_guard::MemoryGuard;
use crate::recovery::SessionRecovery;
use crate::throttle::ToolThrottle;
use crate::truncator::ToolOutputTruncator;
use kraken_core::{
    ChatMessageInput, ChatMessageOutput, GuardConfig, MemoryProbe, SessionEvent, Terminator,
    ToolInput, ToolOutput,
};
use std::sync::Arc;

#[derive(Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard pipeline, skipping disabled hooks
    pub fn from_config(
        config: &GuardConfig,
        probe: Arc<dyn MemoryProbe>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        let candidates: Vec<(bool, Arc<dyn Hook>)> = vec![
            (
                config.session_recovery.enabled,
                Arc::new(SessionRecovery::new(config.session_recovery.clone())) as Arc<dyn Hook>,
            ),
            (
                config.memory_guard.enabled,
                Arc::new(MemoryGuard::new(
                    config.memory_guard.clone(),
                    probe.clone(),
                    terminator,
                )) as Arc<dyn Hook>,
            ),
            (
                config.throttle.enabled,
                Arc::new(ToolThrottle::new(config.throttle.clone(), probe)) as Arc<dyn Hook>,
            ),
            (
                config.session_lifecycle.enabled,
                Arc::new(SessionLifecycle::new(config.session_lifecycle.clone())) as Arc<dyn Hook>,
            ),
            (
                config.truncator.enabled,
                Arc::new(ToolOutputTruncator::new(config.truncator.clone())) as Arc<dyn Hook>,
            ),
            (
                config.grep_truncator.enabled,
                Arc::new(GrepOutputTruncator::new(config.grep_truncator.clone())) as Arc<dyn Hook>,
            ),
            (
                config.empty_response.enabled,
                Arc::new(EmptyResponseDetector::new(config.empty_response.clone())) as Arc<dyn Hook>,
            ),
        ];

        let mut pipeline = Self::new();
        for (enabled, hook) in candidates {
            if !enabled || config.is_hook_disabled(hook.name()) {
                tracing::debug!(hook = hook.name(), "Hook disabled");
                continue;
            }
            pipeline.register(hook);
        }

        tracing::info!(hooks = ?pipeline.hook_names(), "Hook pipeline ready");
        pipeline
    }

    /// Append a hook; it runs after every hook already registered
    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// Registered hook names, in dispatch order
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub async fn tool_execute_before(&self, input: &mut ToolInput) {
        for hook in &self.hooks {
            hook.tool_execute_before(input).await;
        }
    }

    pub async fn tool_execute_after(&self, input: &ToolInput, output: &mut ToolOutput) {
        for hook in &self.hooks {
            hook.tool_execute_after(input, output).await;
        }
    }

    pub async fn chat_message(&self, input: &ChatMessageInput, output: &mut ChatMessageOutput) {
        for hook in &self.hooks {
            hook.chat_message(input, output).await;
        }
    }

    pub async fn event(&self, event: &SessionEvent) {
        for hook in &self.hooks {
            hook.event(event).await;
        }
    }
}
