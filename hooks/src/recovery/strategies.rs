//! Recovery strategies, one per error category

use super::detector::ErrorCategory;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// What a strategy gets to look at (and may repair)
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
    pub session_id: String,
    pub error: Option<String>,
    pub tool_output: Option<serde_json::Value>,
    pub thinking_blocks: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    pub fn new(session_id: impl Into<String>, error: Option<String>) -> Self {
        Self {
            session_id: session_id.into(),
            error,
            tool_output: None,
            thinking_blocks: None,
            timestamp: Utc::now(),
        }
    }
}

/// Knobs for a recovery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOptions {
    /// Extra attempts for transient categories
    pub max_retries: u32,
    /// Base delay between those attempts
    pub retry_delay: Duration,
    /// Run the strategy without announcing it first
    pub skip_confirmation: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            skip_confirmation: false,
        }
    }
}

#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn category(&self) -> ErrorCategory;

    /// Shown before the strategy runs
    fn description(&self) -> &str;

    async fn can_recover(&self, context: &ErrorContext) -> bool;

    async fn recover(&self, context: &mut ErrorContext) -> bool;
}

pub struct ToolResultMissingStrategy;

#[async_trait]
impl RecoveryStrategy for ToolResultMissingStrategy {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::ToolResultMissing
    }

    fn description(&self) -> &str {
        "Retry of tool execution or continue with alternative approach"
    }

    async fn can_recover(&self, context: &ErrorContext) -> bool {
        context.tool_output.is_none()
    }

    async fn recover(&self, context: &mut ErrorContext) -> bool {
        tracing::info!(session_id = %context.session_id, "Recovering missing tool result");
        true
    }
}

pub struct ThinkingBlockOrderStrategy;

#[async_trait]
impl RecoveryStrategy for ThinkingBlockOrderStrategy {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::ThinkingBlockOrder
    }

    fn description(&self) -> &str {
        "Reorder thinking blocks to correct order"
    }

    async fn can_recover(&self, context: &ErrorContext) -> bool {
        context.thinking_blocks.is_some()
    }

    async fn recover(&self, context: &mut ErrorContext) -> bool {
        let Some(blocks) = context.thinking_blocks.as_mut() else {
            return false;
        };
        blocks.reverse();
        tracing::info!(
            session_id = %context.session_id,
            blocks = blocks.len(),
            "Reordered thinking blocks"
        );
        true
    }
}

pub struct ThinkingDisabledViolationStrategy;

#[async_trait]
impl RecoveryStrategy for ThinkingDisabledViolationStrategy {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::ThinkingDisabledViolation
    }

    fn description(&self) -> &str {
        "Re-enable thinking mode in next request"
    }

    async fn can_recover(&self, _context: &ErrorContext) -> bool {
        true
    }

    async fn recover(&self, context: &mut ErrorContext) -> bool {
        tracing::info!(
            session_id = %context.session_id,
            "Ignoring thinking-disabled violation, thinking mode will be re-enabled"
        );
        true
    }
}

pub struct NetworkTimeoutStrategy;

#[async_trait]
impl RecoveryStrategy for NetworkTimeoutStrategy {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::NetworkTimeout
    }

    fn description(&self) -> &str {
        "Retry of request with exponential backoff"
    }

    async fn can_recover(&self, _context: &ErrorContext) -> bool {
        true
    }

    async fn recover(&self, context: &mut ErrorContext) -> bool {
        tracing::info!(session_id = %context.session_id, "Network timeout, will retry");
        true
    }
}

pub struct RateLimitStrategy {
    delay: Duration,
}

impl RateLimitStrategy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl RecoveryStrategy for RateLimitStrategy {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::RateLimit
    }

    fn description(&self) -> &str {
        "Wait and retry with exponential backoff"
    }

    async fn can_recover(&self, _context: &ErrorContext) -> bool {
        true
    }

    async fn recover(&self, context: &mut ErrorContext) -> bool {
        tracing::info!(
            session_id = %context.session_id,
            delay_ms = self.delay.as_millis() as u64,
            "Rate limit hit, waiting"
        );
        tokio::time::sleep(self.delay).await;
        true
    }
}

pub struct AuthErrorStrategy;

#[async_trait]
impl RecoveryStrategy for AuthErrorStrategy {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::AuthError
    }

    fn description(&self) -> &str {
        "User must re-authenticate manually"
    }

    async fn can_recover(&self, _context: &ErrorContext) -> bool {
        false
    }

    async fn recover(&self, context: &mut ErrorContext) -> bool {
        tracing::warn!(
            session_id = %context.session_id,
            "Authentication error, cannot recover automatically"
        );
        false
    }
}

/// Category to strategy dispatch
pub struct StrategyTable {
    strategies: HashMap<ErrorCategory, Arc<dyn RecoveryStrategy>>,
}

impl StrategyTable {
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// The six built-in strategies
    pub fn with_defaults(rate_limit_delay: Duration) -> Self {
        let mut table = Self::empty();
        table.register(Arc::new(ToolResultMissingStrategy));
        table.register(Arc::new(ThinkingBlockOrderStrategy));
        table.register(Arc::new(ThinkingDisabledViolationStrategy));
        table.register(Arc::new(NetworkTimeoutStrategy));
        table.register(Arc::new(RateLimitStrategy::new(rate_limit_delay)));
        table.register(Arc::new(AuthErrorStrategy));
        table
    }

    /// Add or replace the strategy for its category
    pub fn register(&mut self, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies.insert(strategy.category(), strategy);
    }

    pub fn get(&self, category: ErrorCategory) -> Option<Arc<dyn RecoveryStrategy>> {
        self.strategies.get(&category).cloned()
    }

    /// Run the strategy for `category`.
    ///
    /// Transient categories get up to `max_retries` further attempts with
    /// doubling delays when the strategy reports failure.
    pub async fn attempt_recovery(
        &self,
        category: ErrorCategory,
        context: &mut ErrorContext,
        options: &RecoveryOptions,
    ) -> bool {
        let Some(strategy) = self.get(category) else {
            tracing::info!(%category, "No recovery strategy");
            return false;
        };

        if !strategy.can_recover(context).await {
            tracing::info!(%category, "Cannot recover");
            return false;
        }

        if !options.skip_confirmation {
            tracing::info!(%category, option = strategy.description(), "Recovery option");
        }

        let attempts = if category.is_transient() {
            options.max_retries + 1
        } else {
            1
        };
        for attempt in 0..attempts {
            if strategy.recover(context).await {
                return true;
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(backoff(options.retry_delay, attempt)).await;
            }
        }
        false
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self::with_defaults(Duration::from_millis(5000))
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Retry `f` with `base_delay * 2^attempt` between tries.
///
/// Calls `f` at most `max_retries + 1` times and returns the last error when
/// every call failed.
pub async fn retry_with_backoff<T, E, F, Fut>(
    mut f: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_retries => return Err(e),
            Err(e) => {
                let delay = backoff(base_delay, attempt);
                tracing::debug!(
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn context() -> ErrorContext {
        ErrorContext::new("s1", Some("boom".to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_third_call() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<&str, String> = retry_with_backoff(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("failure {}", n))
                } else {
                    Ok("done")
                }
            },
            3,
            Duration::from_millis(1000),
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_returns_last_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();
        let result: Result<(), String> = retry_with_backoff(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {}", n))
            },
            2,
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        // 100 + 200
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits() {
        let table = StrategyTable::default();
        let mut ctx = context();

        let start = Instant::now();
        assert!(
            table
                .attempt_recovery(ErrorCategory::RateLimit, &mut ctx, &RecoveryOptions::default())
                .await
        );
        assert!(start.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_auth_error_declines() {
        let table = StrategyTable::default();
        let mut ctx = context();
        assert!(
            !table
                .attempt_recovery(ErrorCategory::AuthError, &mut ctx, &RecoveryOptions::default())
                .await
        );
        assert!(!AuthErrorStrategy.recover(&mut ctx).await);
    }

    #[tokio::test]
    async fn test_no_strategy_for_no_error() {
        let table = StrategyTable::default();
        assert!(table.get(ErrorCategory::NoError).is_none());
        assert!(
            !table
                .attempt_recovery(ErrorCategory::NoError, &mut context(), &RecoveryOptions::default())
                .await
        );
    }

    #[tokio::test]
    async fn test_thinking_blocks_reordered() {
        let table = StrategyTable::default();
        let options = RecoveryOptions {
            skip_confirmation: true,
            ..Default::default()
        };

        let mut ctx = context();
        assert!(
            !table
                .attempt_recovery(ErrorCategory::ThinkingBlockOrder, &mut ctx, &options)
                .await
        );

        ctx.thinking_blocks = Some(vec!["reply".to_string(), "thinking".to_string()]);
        assert!(
            table
                .attempt_recovery(ErrorCategory::ThinkingBlockOrder, &mut ctx, &options)
                .await
        );
        assert_eq!(
            ctx.thinking_blocks,
            Some(vec!["thinking".to_string(), "reply".to_string()])
        );
    }

    #[tokio::test]
    async fn test_tool_result_missing_needs_absent_output() {
        let table = StrategyTable::default();
        let mut ctx = context();
        assert!(
            table
                .attempt_recovery(ErrorCategory::ToolResultMissing, &mut ctx, &RecoveryOptions::default())
                .await
        );

        ctx.tool_output = Some(serde_json::json!("partial"));
        assert!(
            !table
                .attempt_recovery(ErrorCategory::ToolResultMissing, &mut ctx, &RecoveryOptions::default())
                .await
        );
    }

    struct Flaky {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RecoveryStrategy for Flaky {
        fn category(&self) -> ErrorCategory {
            ErrorCategory::NetworkTimeout
        }

        fn description(&self) -> &str {
            "flaky"
        }

        async fn can_recover(&self, _context: &ErrorContext) -> bool {
            true
        }

        async fn recover(&self, _context: &mut ErrorContext) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) >= 1
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_category_retried() {
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
        });
        let mut table = StrategyTable::empty();
        table.register(flaky.clone());

        assert!(
            table
                .attempt_recovery(ErrorCategory::NetworkTimeout, &mut context(), &RecoveryOptions::default())
                .await
        );
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }
}
