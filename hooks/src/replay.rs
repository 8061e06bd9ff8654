//! JSON-lines replay driver
//!
//! Each input line is one host callback:
//! `{"hook": "tool.execute.after", "input": {...}, "output": {...}}`.
//! The line is dispatched through the pipeline and echoed back with the
//! (possibly rewritten) payload.

use crate::pipeline::HookPipeline;
use kraken_core::{
    ChatMessageInput, ChatMessageOutput, HookPoint, KrakenError, Result, SessionEvent, ToolInput,
    ToolOutput,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// One host callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMessage {
    pub hook: HookPoint,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
}

/// Replay summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub dispatched: usize,
    pub failed: usize,
}

fn decode<T: serde::de::DeserializeOwned>(hook: HookPoint, field: &str, value: Value) -> Result<T> {
    let value = if value.is_null() {
        Value::Object(Default::default())
    } else {
        value
    };
    serde_json::from_value(value)
        .map_err(|e| KrakenError::hook(hook.to_string(), format!("invalid {}: {}", field, e)))
}

/// Dispatch one message and return the reply
pub async fn dispatch(pipeline: &HookPipeline, message: HostMessage) -> Result<HostMessage> {
    let hook = message.hook;
    match hook {
        HookPoint::ToolExecuteBefore => {
            let mut input: ToolInput = decode(hook, "input", message.input)?;
            pipeline.tool_execute_before(&mut input).await;
            Ok(HostMessage {
                hook,
                input: serde_json::to_value(&input)?,
                output: Value::Null,
            })
        }
        HookPoint::ToolExecuteAfter => {
            let input: ToolInput = decode(hook, "input", message.input)?;
            let mut output: ToolOutput = decode(hook, "output", message.output)?;
            pipeline.tool_execute_after(&input, &mut output).await;
            Ok(HostMessage {
                hook,
                input: serde_json::to_value(&input)?,
                output: serde_json::to_value(&output)?,
            })
        }
        HookPoint::ChatMessage => {
            let input: ChatMessageInput = decode(hook, "input", message.input)?;
            let mut output: ChatMessageOutput = decode(hook, "output", message.output)?;
            pipeline.chat_message(&input, &mut output).await;
            Ok(HostMessage {
                hook,
                input: serde_json::to_value(&input)?,
                output: serde_json::to_value(&output)?,
            })
        }
        HookPoint::Event => {
            let event: SessionEvent = decode(hook, "input", message.input)?;
            pipeline.event(&event).await;
            Ok(HostMessage {
                hook,
                input: serde_json::to_value(&event)?,
                output: Value::Null,
            })
        }
    }
}

/// Replay every line of `reader` through `pipeline`, writing replies to
/// `writer`. Malformed lines are logged and skipped.
pub async fn replay<R, W>(pipeline: &HookPipeline, reader: R, mut writer: W) -> Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<HostMessage>(&line) {
            Ok(message) => dispatch(pipeline, message).await,
            Err(e) => Err(e.into()),
        };

        match reply {
            Ok(reply) => {
                let mut encoded = serde_json::to_string(&reply)?;
                encoded.push('\n');
                writer.write_all(encoded.as_bytes()).await?;
                stats.dispatched += 1;
            }
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping replay line");
                stats.failed += 1;
            }
        }
    }

    writer.flush().await?;
    Ok(stats)
}
