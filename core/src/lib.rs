//! Kraken Core - Shared Types for the Guard Hooks
//!
//! Configuration, error type, typed host payloads, the per-session state
//! registry and the host capabilities (memory probe, terminator) used by
//! the hook crate.

pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod registry;

// Re-export commonly used types
pub use config::{hook_names, GuardConfig, LogLevel};
pub use error::{KrakenError, Result};
pub use event::{
    ChatMessageInput, ChatMessageOutput, ContentBlock, HookPoint, ResourceBlock, SessionError,
    SessionEvent, ToolInput, ToolOutput, ToolPayload,
};
pub use host::{MemoryProbe, MemorySnapshot, ProcessMemoryProbe, ProcessTerminator, Terminator};
pub use registry::SessionRegistry;

/// Kraken core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
