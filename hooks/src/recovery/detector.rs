//! Error classification for session recovery

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Known session error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ToolResultMissing,
    ThinkingBlockOrder,
    ThinkingDisabledViolation,
    NetworkTimeout,
    RateLimit,
    AuthError,
    /// Sentinel for "nothing recognised"
    NoError,
}

/// Patterns in match priority order
const PATTERN_TABLE: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::ToolResultMissing,
        &[r"Tool.*returned.*empty", r"No.*tool.*output", r"Tool.*result.*missing"],
    ),
    (
        ErrorCategory::ThinkingBlockOrder,
        &[
            r"Thinking.*block.*order",
            r"thinking.*blocks.*must.*come.*before",
            r"Invalid.*thinking.*order",
        ],
    ),
    (
        ErrorCategory::ThinkingDisabledViolation,
        &[
            r"Thinking.*disabled.*but.*block.*found",
            r"thinking.*block.*without.*mode",
            r"thinking.*tag.*without.*enabled.*mode",
        ],
    ),
    (
        ErrorCategory::NetworkTimeout,
        &[r"network.*timeout", r"connection.*timed.*out", r"ETIMEDOUT"],
    ),
    (
        ErrorCategory::RateLimit,
        &[r"rate.*limit", r"too.*many.*requests", r"429.*Too.*Many.*Requests"],
    ),
    (
        ErrorCategory::AuthError,
        &[r"authentication.*failed", r"invalid.*api.*key", r"unauthorized"],
    ),
    (ErrorCategory::NoError, &[r"no error detected"]),
];

static ERROR_PATTERNS: LazyLock<Vec<(ErrorCategory, Vec<Regex>)>> = LazyLock::new(|| {
    PATTERN_TABLE
        .iter()
        .map(|(category, patterns)| {
            let compiled = patterns
                .iter()
                .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
                .collect();
            (*category, compiled)
        })
        .collect()
});

static THINKING_ORDER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)thinking.*after.*reply",
        r"(?i)thinking.*after.*response",
        r"(?i)<!--thinking-->.*<!--/thinking-->.*<!--thinking-->",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

fn first_match(text: &str) -> Option<ErrorCategory> {
    ERROR_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(text)))
        .map(|(category, _)| *category)
}

/// Classify an error message; unknown or absent errors are `NoError`
pub fn detect_error_type(error: Option<&str>) -> ErrorCategory {
    error
        .and_then(first_match)
        .unwrap_or(ErrorCategory::NoError)
}

/// Scan tool output text for a known error signature
pub fn detect_error_from_output(output: &str) -> Option<ErrorCategory> {
    if output.is_empty() {
        return None;
    }
    first_match(output)
}

/// Detect thinking blocks that appear after the reply
pub fn detect_thinking_block_order_error<S: AsRef<str>>(blocks: &[S]) -> Option<ErrorCategory> {
    if blocks.len() < 2 {
        return None;
    }

    let joined = blocks
        .iter()
        .map(|b| b.as_ref().trim())
        .filter(|b| !b.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    THINKING_ORDER_PATTERNS
        .iter()
        .any(|re| re.is_match(&joined))
        .then_some(ErrorCategory::ThinkingBlockOrder)
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ToolResultMissing => "tool_result_missing",
            ErrorCategory::ThinkingBlockOrder => "thinking_block_order",
            ErrorCategory::ThinkingDisabledViolation => "thinking_disabled_violation",
            ErrorCategory::NetworkTimeout => "network_timeout",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::AuthError => "auth_error",
            ErrorCategory::NoError => "no_error",
        }
    }

    /// Categories worth an automatic recovery attempt
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::ToolResultMissing
                | ErrorCategory::ThinkingBlockOrder
                | ErrorCategory::NetworkTimeout
        )
    }

    /// Categories expected to clear up on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorCategory::NetworkTimeout | ErrorCategory::RateLimit)
    }

    /// Categories that need user action
    pub fn is_permanent(&self) -> bool {
        matches!(self, ErrorCategory::AuthError)
    }

    /// Human-readable description
    pub fn recovery_message(&self) -> &'static str {
        match self {
            ErrorCategory::ToolResultMissing => "Tool result appears to be missing or empty",
            ErrorCategory::ThinkingBlockOrder => "Thinking blocks are in incorrect order",
            ErrorCategory::ThinkingDisabledViolation => {
                "Thinking block found but thinking mode is disabled"
            }
            ErrorCategory::NetworkTimeout => "Network connection timed out",
            ErrorCategory::RateLimit => "Rate limit exceeded",
            ErrorCategory::AuthError => "Authentication failed",
            ErrorCategory::NoError => "No error detected",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
