//! Core hook trait

use async_trait::async_trait;
use kraken_core::{ChatMessageInput, ChatMessageOutput, SessionEvent, ToolInput, ToolOutput};

/// A set of callbacks registered against host lifecycle points.
///
/// Every method has a no-op default so a hook implements only the points it
/// cares about. Methods never fail: internal errors are logged by the hook
/// itself and must not reach the host's tool pipeline.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Hook name (matches `disabled_hooks` entries)
    fn name(&self) -> &str;

    /// Before a tool runs
    async fn tool_execute_before(&self, _input: &mut ToolInput) {}

    /// After a tool ran; may rewrite the output
    async fn tool_execute_after(&self, _input: &ToolInput, _output: &mut ToolOutput) {}

    /// On every chat message
    async fn chat_message(&self, _input: &ChatMessageInput, _output: &mut ChatMessageOutput) {}

    /// On generic bus events
    async fn event(&self, _event: &SessionEvent) {}
}
