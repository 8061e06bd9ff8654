//! Kraken Hooks Library
//!
//! Resource-guard and output-shaping hooks for a coding-agent host. Each hook
//! observes tool execution and chat events, keeps its own per-session state
//! and may pace, rewrite or recover what flows through the host.
//!
//! ## Pipeline
//!
//! ```text
//! host callback --> HookPipeline
//!                     +-- session-recovery          (chat.message, session.error)
//!                     +-- memory-guard              (tool.execute.after, session.end)
//!                     +-- tool-throttle             (tool.execute.before/after)
//!                     +-- session-lifecycle         (tool.execute.before, session.start/end)
//!                     +-- tool-output-truncator     (tool.execute.after)
//!                     +-- grep-output-truncator     (tool.execute.after)
//!                     +-- empty-task-response-detector (tool.execute.after)
//! ```
//!
//! Hooks run sequentially against the same mutable output. A hook never
//! returns an error to the host; failures are logged and swallowed. The one
//! deliberate exit is the memory guard's kill threshold.

pub mod content_hash;
pub mod empty_response;
pub mod grep_truncator;
pub mod hook;
pub mod lifecycle;
pub mod memory_guard;
pub mod pipeline;
pub mod recovery;
pub mod replay;
pub mod text;
pub mod throttle;
pub mod truncator;

#[cfg(test)]
pub(crate) mod test_support;

pub use content_hash::{ContentHasher, HashLookup};
pub use empty_response::{is_output_empty, EmptyCheck, EmptyResponseDetector};
pub use grep_truncator::GrepOutputTruncator;
pub use hook::Hook;
pub use lifecycle::{LifecycleSignal, SessionLifecycle};
pub use memory_guard::{MemoryGuard, MemoryLevel};
pub use pipeline::HookPipeline;
pub use recovery::{ErrorCategory, SessionRecovery, StrategyTable};
pub use replay::{replay, HostMessage, ReplayStats};
pub use throttle::ToolThrottle;
pub use truncator::ToolOutputTruncator;

/// Kraken hooks version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
