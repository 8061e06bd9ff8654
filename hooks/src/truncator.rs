//! Tool output truncator
//!
//! Bounds tool output using a 4-chars-per-token estimate against a per-tool
//! token ceiling. Only 75% of the ceiling is usable; leading header lines are
//! kept verbatim and the rest is cut to fit, followed by a banner describing
//! what was dropped.

use crate::hook::Hook;
use crate::text::{estimate_tokens, format_count, take_chars, CHARS_PER_TOKEN};
use async_trait::async_trait;
use kraken_core::config::{hook_names, TruncatorConfig};
use kraken_core::{ContentBlock, ToolInput, ToolOutput, ToolPayload};

/// Fraction of a tool's token ceiling that output may use
pub const USABLE_FRACTION: f64 = 0.75;

/// Tools whose output is subject to truncation
pub const TRUNCATABLE_TOOLS: &[&str] = &[
    "lsp_hover",
    "lsp_document_symbols",
    "lsp_workspace_symbols",
    "lsp_find_references",
    "lsp_diagnostics",
    "ast_grep_search",
    "grep",
    "glob",
    "session_list",
    "session_search",
    "session_info",
    "websearch",
    "webfetch",
];

/// Token ceiling for tools with a dedicated budget
pub fn tool_max_tokens(tool: &str) -> Option<usize> {
    let limit = match tool {
        "webfetch" => 10_000,
        "grep" | "safe_grep" | "glob" => 50_000,
        "interactive_bash" => 20_000,
        "skill_mcp" => 10_000,
        "websearch" => 15_000,
        "lsp_hover"
        | "lsp_goto_definition"
        | "lsp_find_references"
        | "lsp_document_symbols"
        | "lsp_workspace_symbols"
        | "lsp_diagnostics"
        | "lsp_prepare_rename"
        | "lsp_rename"
        | "lsp_code_actions"
        | "lsp_code_action_resolve" => 30_000,
        "lsp_servers" => 10_000,
        "call_kraken_agent" => 50_000,
        "ast_grep_search" | "ast_grep_replace" => 30_000,
        "session_list" => 5_000,
        "session_read" => 30_000,
        "session_search" => 20_000,
        "session_info" => 10_000,
        _ => return None,
    };
    Some(limit)
}

/// Whether the tool's output is ever truncated
pub fn is_truncatable(tool: &str) -> bool {
    TRUNCATABLE_TOOLS.contains(&tool)
}

/// Character budget for a token ceiling
pub fn max_chars_for(max_tokens: usize) -> usize {
    let usable_tokens = (max_tokens as f64 * USABLE_FRACTION).floor() as usize;
    usable_tokens * CHARS_PER_TOKEN
}

fn truncation_banner(total_chars: usize, shown_chars: usize) -> String {
    let rule = "=".repeat(60);
    let omitted_lines = ((total_chars - shown_chars) as f64 / 100.0).round() as usize;

    let mut banner = format!("\n\n{}", rule);
    banner.push_str(&format!(
        "\n[Output truncated: {} tokens estimated]",
        format_count(total_chars.div_ceil(CHARS_PER_TOKEN))
    ));
    banner.push_str(&format!(
        "\nShowing {} of {} characters",
        format_count(shown_chars),
        format_count(total_chars)
    ));
    if omitted_lines > 0 {
        banner.push_str(&format!(" (~{} lines omitted)", omitted_lines));
    }
    banner.push_str(&format!("\n{}\n", rule));
    banner
}

/// Truncate `content` to the budget of `max_tokens`.
///
/// Returns `None` when nothing needs trimming. The result always starts with
/// the preserved header lines (when they fit in the budget on their own) and
/// is strictly shorter than the input, banner included.
pub fn truncate_content(
    content: &str,
    max_tokens: usize,
    preserve_header_lines: usize,
) -> Option<String> {
    let max_chars = max_chars_for(max_tokens);
    let total_chars = content.chars().count();
    if total_chars <= max_chars {
        return None;
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let mut split = preserve_header_lines.min(lines.len());
    let mut header = lines[..split].join("\n");
    let mut header_chars = header.chars().count();
    if header_chars >= max_chars {
        // Header alone blows the budget; cut from the top instead
        split = 0;
        header.clear();
        header_chars = 0;
    }

    let remaining = lines[split..].join("\n");
    let remaining_chars = remaining.chars().count();
    let separator = usize::from(!header.is_empty());
    let mut budget = max_chars.saturating_sub(header_chars + separator);
    if remaining_chars <= budget {
        return None;
    }

    loop {
        let shown_chars = header_chars + separator + budget;
        let banner = truncation_banner(total_chars, shown_chars);
        let result_chars = shown_chars + banner.chars().count();

        if result_chars < total_chars || budget == 0 {
            let mut out = header.clone();
            if separator == 1 {
                out.push('\n');
            }
            out.push_str(take_chars(&remaining, budget));
            out.push_str(&banner);
            return Some(out);
        }

        budget = budget.saturating_sub(result_chars - total_chars + 1);
    }
}

/// Generic tool output truncator hook
pub struct ToolOutputTruncator {
    config: TruncatorConfig,
}

impl ToolOutputTruncator {
    pub fn new(config: TruncatorConfig) -> Self {
        Self { config }
    }

    /// Token ceiling for `tool`, falling back to the configured default
    pub fn max_tokens_for(&self, tool: &str) -> usize {
        tool_max_tokens(tool).unwrap_or(self.config.max_tokens)
    }

    /// Truncate a payload in place. Returns true if anything changed.
    ///
    /// Arrays, typed or not, are measured as JSON and left alone while they
    /// fit the headroom; past it they are replaced by truncated text.
    pub fn truncate_payload(&self, tool: &str, payload: &mut ToolPayload) -> bool {
        let tool_max = self.max_tokens_for(tool);
        let header_lines = self.config.preserve_header_lines;

        match payload {
            ToolPayload::Text(text) => replace_if_truncated(text, tool_max, header_lines),
            ToolPayload::Blocks(_) | ToolPayload::Json(serde_json::Value::Array(_)) => {
                self.truncate_array(payload, tool_max, header_lines)
            }
            ToolPayload::Block(ContentBlock::Resource { resource }) => {
                match resource.text.as_mut() {
                    Some(text) => {
                        replace_if_truncated(text, self.config.max_tokens, header_lines)
                    }
                    None => false,
                }
            }
            ToolPayload::Block(_) | ToolPayload::Json(_) => false,
        }
    }

    fn truncate_array(
        &self,
        payload: &mut ToolPayload,
        tool_max: usize,
        header_lines: usize,
    ) -> bool {
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Could not serialize tool output");
                return false;
            }
        };
        let headroom = (self.config.max_tokens as f64 * self.config.headroom_ratio) as usize;
        if estimate_tokens(&text) <= headroom {
            return false;
        }
        match truncate_content(&text, tool_max, header_lines) {
            Some(truncated) => {
                *payload = ToolPayload::Text(truncated);
                true
            }
            None => false,
        }
    }
}

fn replace_if_truncated(text: &mut String, max_tokens: usize, header_lines: usize) -> bool {
    match truncate_content(text, max_tokens, header_lines) {
        Some(truncated) => {
            *text = truncated;
            true
        }
        None => false,
    }
}

#[async_trait]
impl Hook for ToolOutputTruncator {
    fn name(&self) -> &str {
        hook_names::TOOL_OUTPUT_TRUNCATOR
    }

    async fn tool_execute_after(&self, input: &ToolInput, output: &mut ToolOutput) {
        if !is_truncatable(&input.tool) {
            return;
        }

        let Some(payload) = output.output.as_mut() else {
            return;
        };

        let before = payload.char_len();
        if self.truncate_payload(&input.tool, payload) {
            tracing::debug!(
                tool = %input.tool,
                before_chars = before,
                after_chars = payload.char_len(),
                "Truncated tool output"
            );
        }
    }
}
