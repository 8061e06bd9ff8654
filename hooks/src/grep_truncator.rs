//! Grep output truncator
//!
//! Same token-budget idea as the generic truncator, but cuts on a line
//! boundary so no match line is ever split.

use crate::hook::Hook;
use crate::text::{format_count, CHARS_PER_TOKEN};
use async_trait::async_trait;
use kraken_core::config::{hook_names, GrepTruncatorConfig};
use kraken_core::{ToolInput, ToolOutput, ToolPayload};

/// Truncate grep output at the first line that overruns the budget.
///
/// The usable budget is `max_tokens * (1 - headroom_ratio)` tokens. Returns
/// `None` when the output already fits.
pub fn truncate_grep_output(output: &str, max_tokens: usize, headroom_ratio: f64) -> Option<String> {
    let usable_tokens = max_tokens as f64 * (1.0 - headroom_ratio);
    let max_chars = (usable_tokens * CHARS_PER_TOKEN as f64).floor() as usize;

    let total_chars = output.chars().count();
    if total_chars <= max_chars {
        return None;
    }

    let lines: Vec<&str> = output.split('\n').collect();
    let mut running = 0usize;
    let cut = lines.iter().position(|line| {
        running += line.chars().count() + 1;
        running > max_chars
    })?;

    let omitted = lines.len() - cut;
    let estimated_tokens = total_chars.div_ceil(CHARS_PER_TOKEN);

    Some(format!(
        "{}\n\n[Grep output truncated: {} tokens estimated, {} matches omitted]",
        lines[..cut].join("\n"),
        format_count(estimated_tokens),
        format_count(omitted)
    ))
}

/// Grep-specific truncator hook
pub struct GrepOutputTruncator {
    config: GrepTruncatorConfig,
}

impl GrepOutputTruncator {
    pub fn new(config: GrepTruncatorConfig) -> Self {
        Self { config }
    }

    fn truncate(&self, text: &str) -> Option<String> {
        truncate_grep_output(text, self.config.max_tokens, self.config.headroom_ratio)
    }

    /// Truncate every string in `output.content`, else the text output.
    /// Returns the number of strings rewritten.
    pub fn apply(&self, output: &mut ToolOutput) -> usize {
        if let Some(content) = output.content.as_mut() {
            let mut rewritten = 0;
            for item in content.iter_mut() {
                if let serde_json::Value::String(text) = item {
                    if let Some(truncated) = self.truncate(text) {
                        *text = truncated;
                        rewritten += 1;
                    }
                }
            }
            return rewritten;
        }

        if let Some(ToolPayload::Text(text)) = output.output.as_mut() {
            if let Some(truncated) = self.truncate(text) {
                *text = truncated;
                return 1;
            }
        }

        0
    }
}

#[async_trait]
impl Hook for GrepOutputTruncator {
    fn name(&self) -> &str {
        hook_names::GREP_OUTPUT_TRUNCATOR
    }

    async fn tool_execute_after(&self, input: &ToolInput, output: &mut ToolOutput) {
        if input.tool != self.config.tool {
            return;
        }

        let rewritten = self.apply(output);
        if rewritten > 0 {
            tracing::debug!(tool = %input.tool, rewritten, "Truncated grep output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn matches(count: usize) -> String {
        (0..count)
            .map(|i| format!("src/file_{:04}.rs:{}:let x = {};", i, i + 1, i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_fits_unchanged() {
        assert!(truncate_grep_output("a:1:match", 50_000, 0.5).is_none());
    }

    #[test]
    fn test_cuts_on_line_boundary() {
        // 100 tokens, half reserved: 200 chars usable
        let output = matches(50);
        let result = truncate_grep_output(&output, 100, 0.5).unwrap();

        let (kept, banner) = result.split_once("\n\n").unwrap();
        assert!(kept.chars().count() <= 200);
        for line in kept.split('\n') {
            assert!(output.lines().any(|l| l == line), "partial line: {line}");
        }

        let kept_lines = kept.split('\n').count();
        assert_eq!(
            banner,
            format!(
                "[Grep output truncated: {} tokens estimated, {} matches omitted]",
                format_count(output.chars().count().div_ceil(4)),
                50 - kept_lines
            )
        );
    }

    #[test]
    fn test_first_line_too_long() {
        let output = format!("{}\nshort", "x".repeat(500));
        let result = truncate_grep_output(&output, 100, 0.5).unwrap();
        assert!(result.starts_with("\n\n[Grep output truncated: "));
        assert!(result.ends_with("2 matches omitted]"));
    }

    #[tokio::test]
    async fn test_hook_truncates_output_text() {
        let hook = GrepOutputTruncator::new(GrepTruncatorConfig {
            max_tokens: 100,
            ..Default::default()
        });
        let mut output = ToolOutput::text(matches(100));

        hook.tool_execute_after(&ToolInput::new("grep", "s1"), &mut output).await;

        assert!(output
            .output_text()
            .unwrap()
            .contains("[Grep output truncated: "));
    }

    #[tokio::test]
    async fn test_hook_truncates_content_strings() {
        let hook = GrepOutputTruncator::new(GrepTruncatorConfig {
            max_tokens: 100,
            ..Default::default()
        });
        let mut output = ToolOutput {
            content: Some(vec![json!(matches(100)), json!({"type": "meta"}), json!("ok")]),
            ..Default::default()
        };

        assert_eq!(hook.apply(&mut output), 1);
        let content = output.content.unwrap();
        assert!(content[0].as_str().unwrap().contains("matches omitted"));
        assert_eq!(content[1], json!({"type": "meta"}));
        assert_eq!(content[2], json!("ok"));
    }

    #[tokio::test]
    async fn test_hook_ignores_other_tools() {
        let hook = GrepOutputTruncator::new(GrepTruncatorConfig {
            max_tokens: 100,
            ..Default::default()
        });
        let original = matches(100);
        let mut output = ToolOutput::text(original.clone());

        hook.tool_execute_after(&ToolInput::new("glob", "s1"), &mut output).await;

        assert_eq!(output.output_text(), Some(original.as_str()));
    }
}
